use anyhow::Result;
use serde::Serialize;

use celt::process::analyze::{AnalyzerConfig, FrameDecisions};

use crate::cli::command::ReportFormat;

/// Formats seconds as `hh:mm:ss.mmm`.
pub fn time_str(sec: f64) -> String {
    let total_ms = (sec * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    format!("{hours:02}:{minutes:02}:{:02}.{:03}", rest / 1000, rest % 1000)
}

#[derive(Debug, Serialize)]
pub struct StreamReport {
    pub input: String,
    pub config: ConfigReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<FrameReport>,
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub channels: usize,
    pub coded_channels: usize,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub bitrate: i32,
    pub rate_control: &'static str,
    pub complexity: u32,
}

impl From<&AnalyzerConfig> for ConfigReport {
    fn from(config: &AnalyzerConfig) -> Self {
        Self {
            channels: config.channels,
            coded_channels: config.coded_channels,
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
            bitrate: config.bitrate,
            rate_control: match (config.vbr, config.constrained_vbr) {
                (false, _) => "cbr",
                (true, false) => "vbr",
                (true, true) => "cvbr",
            },
            complexity: config.complexity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FrameReport {
    pub index: u64,
    pub time: String,
    pub silence: bool,
    pub transient: bool,
    pub mask_metric: i32,
    pub tf_estimate: f32,
    pub tf_select: usize,
    pub tf_res: Vec<i32>,
    pub alloc_trim: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid_side: Option<bool>,
    pub offsets: Vec<i32>,
    /// Target size in bytes; absent for CBR and silent frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_bytes: Option<f32>,
    pub budget_bytes: usize,
}

impl FrameReport {
    pub fn new(decisions: &FrameDecisions, frame_duration: f64) -> Self {
        Self {
            index: decisions.index,
            time: time_str(decisions.index as f64 * frame_duration),
            silence: decisions.silence,
            transient: decisions.is_transient,
            mask_metric: decisions.mask_metric,
            tf_estimate: decisions.tf_estimate as f32 / 16384.0,
            tf_select: decisions.tf_select,
            tf_res: decisions.tf_res.clone(),
            alloc_trim: decisions.alloc_trim,
            mid_side: decisions.prefer_mid_side,
            offsets: decisions.offsets.clone(),
            target_bytes: decisions.vbr_target.map(|t| t as f32 / 64.0),
            budget_bytes: decisions.storage_bytes,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub frames: u64,
    pub duration: String,
    pub silent_frames: u64,
    pub transient_frames: u64,
    pub mid_side_frames: u64,
    pub mean_trim: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_target_bytes: Option<f64>,
    #[serde(skip)]
    trim_sum: i64,
    #[serde(skip)]
    target_sum: i64,
    #[serde(skip)]
    target_frames: u64,
}

impl Summary {
    pub fn add(&mut self, decisions: &FrameDecisions) {
        self.frames += 1;
        self.silent_frames += decisions.silence as u64;
        self.transient_frames += decisions.is_transient as u64;
        self.mid_side_frames += (decisions.prefer_mid_side == Some(true)) as u64;
        self.trim_sum += decisions.alloc_trim as i64;
        if let Some(target) = decisions.vbr_target {
            self.target_sum += target as i64;
            self.target_frames += 1;
        }
    }

    pub fn finish(&mut self, frame_duration: f64) {
        self.duration = time_str(self.frames as f64 * frame_duration);
        if self.frames > 0 {
            self.mean_trim = self.trim_sum as f64 / self.frames as f64;
        }
        if self.target_frames > 0 {
            self.mean_target_bytes = Some(self.target_sum as f64 / self.target_frames as f64 / 64.0);
        }
    }
}

pub fn render(report: &StreamReport, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Yaml => serde_yaml_ng::to_string(report)?,
        ReportFormat::Json => serde_json::to_string_pretty(report)? + "\n",
    })
}
