use anyhow::{Result, anyhow, bail};
use log::{Level, trace};

use crate::log_or_err;
use crate::process::conditioning::{
    comb_filter_in_place, deemphasis, resampling_factor, synthesis,
};
use crate::process::plc::plc_pitch_search;
use crate::process::tf::tf_decode;
use crate::structs::frame::FrameContext;
use crate::structs::mode::Mode;
use crate::structs::state::{
    COMBFILTER_MAXPERIOD, COMBFILTER_MINPERIOD, DECODE_BUFFER_SIZE, DecodeHistory,
    DeemphasisState, PostfilterParams, PostfilterState,
};
use crate::utils::bands::FixedBands;
use crate::utils::errors::{FrameError, SynthesisError};
use crate::utils::fixed::{Glog, Norm};
use crate::utils::mdct::DirectMdct;
use crate::utils::pitch::PitchAnalysis;
use crate::utils::range_coder::{EntropyDecoder, RangeDecoder};
use crate::utils::tables::TF_SELECT_TABLE;

/// Decoder-side settings that stay fixed for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesizerConfig {
    /// Interleaved channels in the PCM output.
    pub channels: usize,
    /// Channels in the coded stream.
    pub coded_channels: usize,
    pub sample_rate: u32,
    /// Frame length at 48 kHz.
    pub frame_size: usize,
    pub start_band: usize,
    pub end_band: usize,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            coded_channels: 2,
            sample_rate: 48000,
            frame_size: 960,
            start_band: 0,
            end_band: 21,
        }
    }
}

/// Frame flags and TF decisions read back from a coded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTf {
    pub silence: bool,
    pub is_transient: bool,
    pub tf_select: usize,
    pub tf_res: Vec<i32>,
}

/// One frame's worth of input to [`FrameSynthesizer::synthesize`].
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    /// Normalised spectrum, `coded_channels` blocks of `frame_size` bins.
    pub spectrum: &'a [Norm],
    /// Mean-removed log2 band energies, `coded_channels * nb_ebands`.
    pub band_log_e: &'a [Glog],
    pub is_transient: bool,
    pub silence: bool,
    /// Post-filter to crossfade to within this frame.
    pub postfilter: PostfilterParams,
}

/// Rebuilds PCM from analysed frames and keeps the decoded history the
/// post-filter and concealment search read from.
pub struct FrameSynthesizer<'a> {
    mode: &'a Mode,
    config: SynthesizerConfig,
    downsample: usize,
    mdct: DirectMdct,
    bands: FixedBands,
    history: DecodeHistory,
    deemph: DeemphasisState,
    postfilter: PostfilterState,
    frame_count: u64,
    fail_level: Level,
}

impl<'a> FrameSynthesizer<'a> {
    pub fn new(mode: &'a Mode, config: SynthesizerConfig) -> Result<Self> {
        let downsample = resampling_factor(config.sample_rate);
        if downsample == 0 {
            bail!(FrameError::UnsupportedSampleRate(config.sample_rate));
        }
        FrameContext::new(
            mode,
            config.coded_channels,
            config.channels,
            config.frame_size,
            config.start_band,
            config.end_band,
        )?;

        Ok(Self {
            mode,
            config,
            downsample,
            mdct: DirectMdct::new(mode.mdct_size(), mode.max_lm),
            bands: FixedBands,
            history: DecodeHistory::new(config.channels, mode.overlap),
            deemph: DeemphasisState::default(),
            postfilter: PostfilterState::default(),
            frame_count: 0,
            fail_level: Level::Error,
        })
    }

    /// Sets the failure level for validation errors.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on Warning level and above (strict mode)
    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    /// PCM samples per channel produced by [`Self::synthesize`].
    pub fn samples_per_frame(&self) -> usize {
        self.config.frame_size / self.downsample
    }

    pub fn postfilter(&self) -> &PostfilterState {
        &self.postfilter
    }

    pub fn history(&self) -> &DecodeHistory {
        &self.history
    }

    fn frame(&self) -> Result<FrameContext> {
        FrameContext::new(
            self.mode,
            self.config.coded_channels,
            self.config.channels,
            self.config.frame_size,
            self.config.start_band,
            self.config.end_band,
        )
    }

    /// Reads the silence, transient and TF decisions from a coded frame.
    pub fn decode_tf(&self, bytes: &[u8]) -> Result<DecodedTf> {
        let frame = self.frame()?;
        let lm = frame.lm;
        if bytes.is_empty() {
            log_or_err!(
                self,
                Level::Warn,
                anyhow!(SynthesisError::RangeDecoderOverrun { storage: 0 })
            );
        }

        let mut dec = RangeDecoder::new(bytes);
        let total_bits = dec.storage() * 8;
        let tell = dec.tell();
        let silence = if tell >= total_bits {
            true
        } else if tell == 1 {
            dec.dec_bit_logp(15)
        } else {
            false
        };

        let nb = self.mode.nb_ebands;
        if silence {
            return Ok(DecodedTf {
                silence,
                is_transient: false,
                tf_select: 0,
                tf_res: vec![TF_SELECT_TABLE[lm][0] as i32; nb],
            });
        }

        let is_transient = lm > 0 && dec.tell() + 3 <= total_bits && dec.dec_bit_logp(3);
        let mut tf_res = vec![0; nb];
        let tf_select = tf_decode(
            frame.start,
            frame.end,
            is_transient,
            &mut tf_res,
            lm,
            &mut dec,
        );

        Ok(DecodedTf {
            silence,
            is_transient,
            tf_select,
            tf_res,
        })
    }

    /// Synthesises one frame into interleaved `pcm`. Returns the number of
    /// samples the de-emphasis had to saturate.
    pub fn synthesize(&mut self, input: &SynthesisInput, pcm: &mut [i16]) -> Result<usize> {
        let mode = self.mode;
        let frame = self.frame()?;
        let (c, cc, lm) = (frame.c, frame.cc, frame.lm);
        let n = frame.n(mode);
        let nb = mode.nb_ebands;
        let overlap = mode.overlap;

        let expected = cc * self.samples_per_frame();
        if pcm.len() != expected {
            bail!(FrameError::OutputLength {
                expected,
                actual: pcm.len(),
            });
        }
        if input.spectrum.len() < c * n {
            bail!(FrameError::InputLength {
                expected: c * n,
                actual: input.spectrum.len(),
            });
        }
        if input.band_log_e.len() < c * nb {
            bail!(FrameError::InputLength {
                expected: c * nb,
                actual: input.band_log_e.len(),
            });
        }
        let next = input.postfilter;
        if next.tapset >= 3 {
            bail!(FrameError::InvalidTapset(next.tapset));
        }
        if next.gain != 0
            && !(COMBFILTER_MINPERIOD..COMBFILTER_MAXPERIOD).contains(&next.period)
        {
            bail!(FrameError::InvalidPeriod {
                period: next.period,
                min: COMBFILTER_MINPERIOD,
                max: COMBFILTER_MAXPERIOD,
            });
        }

        self.history.shift(n);
        let mut windows = self.history.synthesis_windows(n);
        synthesis(
            mode,
            input.spectrum,
            &mut windows,
            input.band_log_e,
            frame.start,
            frame.eff_end,
            c,
            cc,
            input.is_transient,
            lm,
            self.downsample,
            input.silence,
            &self.mdct,
            &self.bands,
        );

        let pf = self.postfilter;
        let next_period = next.period.max(COMBFILTER_MINPERIOD);
        let from = DECODE_BUFFER_SIZE - n;
        let short = mode.short_mdct_size;
        for ch in 0..cc {
            let buf = self.history.channel_mut(ch);
            comb_filter_in_place(
                buf,
                from,
                pf.period_old.max(COMBFILTER_MINPERIOD),
                pf.period.max(COMBFILTER_MINPERIOD),
                short,
                pf.gain_old,
                pf.gain,
                pf.tapset_old,
                pf.tapset,
                &mode.window,
                overlap,
            );
            if lm != 0 {
                comb_filter_in_place(
                    buf,
                    from + short,
                    pf.period.max(COMBFILTER_MINPERIOD),
                    next_period,
                    n - short,
                    pf.gain,
                    next.gain,
                    pf.tapset,
                    next.tapset,
                    &mode.window,
                    overlap,
                );
            }
        }
        self.postfilter.advance(
            PostfilterParams {
                period: next_period,
                ..next
            },
            lm,
        );

        let outputs: Vec<_> = (0..cc)
            .map(|ch| &self.history.channel(ch)[from..DECODE_BUFFER_SIZE])
            .collect();
        let saturated = deemphasis(
            &outputs,
            pcm,
            n,
            cc,
            self.downsample,
            &mode.preemph,
            &mut self.deemph.mem,
            false,
        );

        let index = self.frame_count;
        self.frame_count += 1;
        if saturated > 0 {
            log_or_err!(
                self,
                Level::Warn,
                anyhow!(SynthesisError::DeemphasisSaturated {
                    samples: saturated,
                    frame: index,
                })
            );
        }
        trace!("frame {index}: synthesised {n} samples");
        Ok(saturated)
    }

    /// Pitch period of the decoded history for concealing a lost frame.
    pub fn plc_pitch<P: PitchAnalysis + ?Sized>(&self, pitch: &P) -> usize {
        plc_pitch_search(&self.history.channels(), self.config.channels, pitch)
    }

    /// Drops all history, as after a stream reset.
    pub fn reset(&mut self) {
        self.history.clear();
        self.deemph = DeemphasisState::default();
        self.postfilter = PostfilterState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::analyze::{AnalyzerConfig, FrameAnalyzer};
    use crate::utils::pitch::XcorrPitch;

    fn mono_sine(len: usize, amplitude: f64) -> Vec<i16> {
        (0..len)
            .map(|i| (amplitude * (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / 48000.0).sin()) as i16)
            .collect()
    }

    fn mono() -> (AnalyzerConfig, SynthesizerConfig) {
        (
            AnalyzerConfig {
                channels: 1,
                coded_channels: 1,
                ..Default::default()
            },
            SynthesizerConfig {
                channels: 1,
                coded_channels: 1,
                ..Default::default()
            },
        )
    }

    #[test]
    fn silence_decodes_to_silence() {
        let mode = Mode::standard();
        let mut synth = FrameSynthesizer::new(mode, SynthesizerConfig::default()).unwrap();
        let spectrum = vec![0; 1920];
        let band_log_e = vec![-28 << 10; 2 * mode.nb_ebands];
        let mut pcm = vec![1i16; 1920];
        let input = SynthesisInput {
            spectrum: &spectrum,
            band_log_e: &band_log_e,
            is_transient: false,
            silence: true,
            postfilter: PostfilterParams::default(),
        };
        assert_eq!(synth.synthesize(&input, &mut pcm).unwrap(), 0);
        assert!(pcm.iter().all(|&s| s == 0));
    }

    #[test]
    fn decoded_flags_match_the_analysis() {
        let mode = Mode::standard();
        let (acfg, scfg) = mono();
        let mut analyzer = FrameAnalyzer::new(mode, acfg).unwrap();
        let synth = FrameSynthesizer::new(mode, scfg).unwrap();

        let mut pcm = vec![0i16; 960];
        let mut state = 7u32;
        for frame in 0..4 {
            for (i, s) in pcm.iter_mut().enumerate() {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                let burst = frame % 2 == 1 && i > 500;
                *s = if burst { (state >> 17) as i16 } else { 0 };
            }
            let d = analyzer.analyze(&pcm).unwrap();
            let tf = synth.decode_tf(&d.tf_bytes).unwrap();
            assert_eq!(tf.silence, d.silence);
            assert_eq!(tf.is_transient, d.is_transient);
            assert_eq!(tf.tf_select, d.tf_select);
            assert_eq!(tf.tf_res, d.tf_res);
        }
    }

    #[test]
    fn empty_packet_is_silence() {
        let mode = Mode::standard();
        let mut synth = FrameSynthesizer::new(mode, SynthesizerConfig::default()).unwrap();
        assert!(synth.decode_tf(&[]).unwrap().silence);

        synth.set_fail_level(Level::Warn);
        assert!(synth.decode_tf(&[]).is_err());
    }

    #[test]
    fn loopback_reconstructs_a_sine() {
        let mode = Mode::standard();
        let (acfg, scfg) = mono();
        let mut analyzer = FrameAnalyzer::new(mode, acfg).unwrap();
        let mut synth = FrameSynthesizer::new(mode, scfg).unwrap();

        let frames = 5;
        let input = mono_sine(frames * 960, 8000.0);
        let mut output = Vec::new();
        for chunk in input.chunks(960) {
            let d = analyzer.analyze(chunk).unwrap();
            let mut pcm = vec![0i16; 960];
            let si = SynthesisInput {
                spectrum: &d.spectrum,
                band_log_e: &d.band_log_e,
                is_transient: d.is_transient,
                silence: d.silence,
                postfilter: PostfilterParams::default(),
            };
            synth.synthesize(&si, &mut pcm).unwrap();
            output.extend(pcm);
        }

        // The overlap is the codec delay
        let delay = mode.overlap;
        for i in 2 * 960..frames * 960 {
            let err = (output[i] as i32 - input[i - delay] as i32).abs();
            assert!(err < 400, "sample {i}: {} vs {}", output[i], input[i - delay]);
        }
        assert!(synth.plc_pitch(&XcorrPitch) >= 100);
    }

    #[test]
    fn rejects_bad_postfilter() {
        let mode = Mode::standard();
        let mut synth = FrameSynthesizer::new(mode, SynthesizerConfig::default()).unwrap();
        let spectrum = vec![0; 1920];
        let band_log_e = vec![0; 2 * mode.nb_ebands];
        let mut pcm = vec![0i16; 1920];
        let mut input = SynthesisInput {
            spectrum: &spectrum,
            band_log_e: &band_log_e,
            is_transient: false,
            silence: true,
            postfilter: PostfilterParams {
                period: 5,
                gain: 1000,
                tapset: 0,
            },
        };
        assert!(synth.synthesize(&input, &mut pcm).is_err());
        input.postfilter.period = 100;
        input.postfilter.tapset = 3;
        assert!(synth.synthesize(&input, &mut pcm).is_err());
        assert!(synth.synthesize(&input, &mut pcm[..10]).is_err());
    }

    #[test]
    fn postfilter_state_advances() {
        let mode = Mode::standard();
        let (_, scfg) = mono();
        let mut synth = FrameSynthesizer::new(mode, scfg).unwrap();
        let spectrum = vec![0; 960];
        let band_log_e = vec![0; mode.nb_ebands];
        let mut pcm = vec![0i16; 960];
        let input = SynthesisInput {
            spectrum: &spectrum,
            band_log_e: &band_log_e,
            is_transient: false,
            silence: true,
            postfilter: PostfilterParams {
                period: 200,
                gain: 8000,
                tapset: 1,
            },
        };
        synth.synthesize(&input, &mut pcm).unwrap();
        let pf = synth.postfilter();
        assert_eq!((pf.period, pf.gain, pf.tapset), (200, 8000, 1));
        assert_eq!(pf.period_old, 200);
        assert!(pcm.iter().all(|&s| s == 0));
    }
}
