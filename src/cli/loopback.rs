use std::collections::VecDeque;
use std::fs::File;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use super::command::{Cli, LoopbackArgs};
use crate::input::{PcmFormat, PcmReader};
use crate::report::time_str;
use crate::wav::WAVWriter;
use celt::process::analyze::FrameAnalyzer;
use celt::process::synthesize::{FrameSynthesizer, SynthesisInput};
use celt::structs::mode::Mode;
use celt::structs::state::PostfilterParams;

/// Signal and error energy of the output against the delayed input.
#[derive(Default)]
struct SnrMeter {
    delay_line: VecDeque<i16>,
    signal: f64,
    noise: f64,
}

impl SnrMeter {
    fn new(delay: usize) -> Self {
        Self {
            delay_line: std::iter::repeat_n(0, delay).collect(),
            ..Default::default()
        }
    }

    fn push(&mut self, input: &[i16], output: &[i16]) {
        for (&x, &y) in input.iter().zip(output) {
            self.delay_line.push_back(x);
            let Some(reference) = self.delay_line.pop_front() else {
                continue;
            };
            let r = reference as f64;
            self.signal += r * r;
            self.noise += (y as f64 - r).powi(2);
        }
    }

    fn snr_db(&self) -> Option<f64> {
        (self.signal > 0.0).then(|| 10.0 * (self.signal / self.noise.max(1.0)).log10())
    }
}

pub fn cmd_loopback(args: &LoopbackArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Loopback of PCM input: {}", args.input.display());

    let mut reader = PcmReader::open(
        &args.input,
        PcmFormat {
            channels: args.stream.channels,
            sample_rate: args.stream.rate,
        },
    )
    .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let format = reader.format();

    let mode = Mode::standard();
    let fail_level = if cli.strict { Level::Warn } else { Level::Error };
    let mut analyzer = FrameAnalyzer::new(
        mode,
        args.stream.analyzer_config(format.channels, format.sample_rate),
    )?;
    analyzer.set_fail_level(fail_level);
    let mut synthesizer = FrameSynthesizer::new(
        mode,
        args.stream.synthesizer_config(format.channels, format.sample_rate),
    )?;
    synthesizer.set_fail_level(fail_level);

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = WAVWriter::new(file, format.sample_rate, format.channels as u16);
    writer.write_header()?;

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
            )?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        }
        None => None,
    };

    let samples = analyzer.samples_per_frame();
    let frame_duration = args.stream.frame_size as f64 / mode.fs as f64;
    let upsample = args.stream.frame_size / samples;
    let mut meter = SnrMeter::new(mode.overlap / upsample * format.channels);
    let mut output = vec![0i16; samples * format.channels];
    let mut frames = 0u64;
    let mut tf_mismatches = 0u64;
    let mut saturated = 0usize;

    while let Some((pcm, valid)) = reader.read_frame(samples)? {
        let decisions = analyzer.analyze(&pcm)?;

        let decoded = synthesizer.decode_tf(&decisions.tf_bytes)?;
        if decoded.is_transient != decisions.is_transient
            || decoded.tf_select != decisions.tf_select
            || decoded.tf_res != decisions.tf_res
        {
            tf_mismatches += 1;
            log::warn!(
                "Frame {}: TF decisions read back differently ({:?} vs {:?})",
                decisions.index,
                decoded.tf_res,
                decisions.tf_res
            );
        }

        let input = SynthesisInput {
            spectrum: &decisions.spectrum,
            band_log_e: &decisions.band_log_e,
            is_transient: decisions.is_transient,
            silence: decisions.silence,
            postfilter: PostfilterParams::default(),
        };
        saturated += synthesizer.synthesize(&input, &mut output)?;

        let keep = valid * format.channels;
        meter.push(&pcm[..keep], &output[..keep]);
        writer.write_samples(&output[..keep])?;
        frames += 1;

        if let Some(ref pb) = pb {
            pb.inc(1);
            pb.set_message(time_str(frames as f64 * frame_duration));
        }
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    writer.finish()?;
    let data_bytes = writer.data_written();
    writer.into_inner()?.sync_all()?;

    log::info!(
        "{frames} frames ({}, {data_bytes} bytes) written to {}",
        time_str(frames as f64 * frame_duration),
        args.output.display()
    );
    if let Some(snr) = meter.snr_db() {
        log::info!("Loopback SNR: {snr:.1} dB");
    }
    if tf_mismatches > 0 {
        log::warn!("{tf_mismatches} frames with mismatched TF decisions");
    }
    if saturated > 0 {
        log::warn!("{saturated} samples saturated in de-emphasis");
    }

    Ok(())
}
