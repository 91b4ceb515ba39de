use std::fs;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use super::command::{AnalyzeArgs, Cli};
use crate::input::{PcmFormat, PcmReader};
use crate::report::{ConfigReport, FrameReport, StreamReport, Summary, render};
use celt::process::analyze::FrameAnalyzer;
use celt::structs::mode::Mode;

pub fn cmd_analyze(args: &AnalyzeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing PCM input: {}", args.input.display());

    let mut reader = PcmReader::open(
        &args.input,
        PcmFormat {
            channels: args.stream.channels,
            sample_rate: args.stream.rate,
        },
    )
    .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let format = reader.format();
    let config = args
        .stream
        .analyzer_config(format.channels, format.sample_rate);

    let mode = Mode::standard();
    let mut analyzer = FrameAnalyzer::new(mode, config)?;
    analyzer.set_fail_level(if cli.strict { Level::Warn } else { Level::Error });

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} {pos} frames | elapsed: {elapsed_precise}",
            )?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        }
        None => None,
    };

    let frame_duration = config.frame_size as f64 / mode.fs as f64;
    let samples = analyzer.samples_per_frame();
    let mut frames = Vec::new();
    let mut summary = Summary::default();

    while let Some((pcm, _)) = reader.read_frame(samples)? {
        let decisions = analyzer.analyze(&pcm)?;
        summary.add(&decisions);
        if !args.summary_only {
            frames.push(FrameReport::new(&decisions, frame_duration));
        }
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    summary.finish(frame_duration);
    log::info!(
        "{} frames ({}), {} transient, {} silent",
        summary.frames,
        summary.duration,
        summary.transient_frames,
        summary.silent_frames
    );

    let report = StreamReport {
        input: args.input.display().to_string(),
        config: ConfigReport::from(&config),
        frames,
        summary,
    };
    let text = render(&report, args.format)?;
    match &args.output {
        Some(path) => {
            fs::write(path, text)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            log::info!("Report written to {}", path.display());
        }
        None => print!("{text}"),
    }

    Ok(())
}
