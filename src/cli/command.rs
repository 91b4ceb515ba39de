use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

use celt::process::analyze::AnalyzerConfig;
use celt::process::synthesize::SynthesizerConfig;

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (celt ", env!("CELT_VERSION"), ", built ", env!("BUILD_TIMESTAMP"), ")"
    ),
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting CELT perceptual analysis and rate control",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the frame analysis and report every decision.
    Analyze(AnalyzeArgs),

    /// Analyse, read back and resynthesise the input without quantization.
    Loopback(LoopbackArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Input PCM: 16-bit WAV or raw s16le (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub stream: StreamArgs,

    /// Report format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Yaml)]
    pub format: ReportFormat,

    /// Write the report here instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Only report the summary.
    #[arg(long)]
    pub summary_only: bool,
}

#[derive(Debug, Args)]
pub struct LoopbackArgs {
    /// Input PCM: 16-bit WAV or raw s16le (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub stream: StreamArgs,

    /// Output WAV file.
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct StreamArgs {
    /// Channels of raw input; WAV input carries its own.
    #[arg(long, default_value_t = 2)]
    pub channels: usize,

    /// Sample rate of raw input; WAV input carries its own.
    #[arg(long, default_value_t = 48000)]
    pub rate: u32,

    /// Target bitrate in bits per second.
    #[arg(long, default_value_t = 64000)]
    pub bitrate: i32,

    /// Rate control mode.
    #[arg(long, value_enum, default_value_t = RateMode::Vbr)]
    pub rate_mode: RateMode,

    /// Frame size in samples at 48 kHz (120, 240, 480 or 960).
    #[arg(long, default_value_t = 960)]
    pub frame_size: usize,

    /// Analysis complexity (0-10).
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub complexity: u32,

    /// Code a stereo input as mono.
    #[arg(long)]
    pub downmix: bool,

    /// Last coded band (exclusive).
    #[arg(long, default_value_t = 21)]
    pub end_band: usize,

    /// Treat the input as a low-frequency effects channel.
    #[arg(long)]
    pub lfe: bool,
}

impl StreamArgs {
    pub fn analyzer_config(&self, channels: usize, sample_rate: u32) -> AnalyzerConfig {
        AnalyzerConfig {
            channels,
            coded_channels: self.coded_channels(channels),
            sample_rate,
            frame_size: self.frame_size,
            bitrate: self.bitrate,
            vbr: self.rate_mode != RateMode::Cbr,
            constrained_vbr: self.rate_mode == RateMode::Cvbr,
            complexity: self.complexity,
            end_band: self.end_band,
            lfe: self.lfe,
            ..Default::default()
        }
    }

    pub fn synthesizer_config(&self, channels: usize, sample_rate: u32) -> SynthesizerConfig {
        SynthesizerConfig {
            channels,
            coded_channels: self.coded_channels(channels),
            sample_rate,
            frame_size: self.frame_size,
            end_band: self.end_band,
            ..Default::default()
        }
    }

    fn coded_channels(&self, channels: usize) -> usize {
        if self.downmix { 1 } else { channels }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum RateMode {
    /// Unconstrained variable bitrate.
    Vbr,
    /// Variable bitrate pulled towards the nominal rate.
    Cvbr,
    /// Constant bitrate.
    Cbr,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ReportFormat {
    Yaml,
    Json,
}
