use anyhow::{Result, anyhow, bail};
use log::{Level, debug, trace};

use crate::log_or_err;
use crate::process::conditioning::{compute_mdcts, preemphasis, resampling_factor};
use crate::process::rate::{
    DynallocParams, VbrParams, alloc_trim_analysis, compute_vbr, dynalloc_analysis, init_caps,
    temporal_vbr,
};
use crate::process::stereo::stereo_analysis;
use crate::process::tf::{TfAnalysis, tf_analysis, tf_encode};
use crate::process::transient::{
    TransientAnalysis, patch_transient_decision, transient_analysis,
};
use crate::structs::analysis::AnalysisInfo;
use crate::structs::frame::FrameContext;
use crate::structs::mode::Mode;
use crate::structs::state::PreemphasisState;
use crate::utils::bands::{FixedBands, amp2log2, compute_band_energies, normalise_bands};
use crate::utils::errors::{AnalysisError, FrameError};
use crate::utils::fixed::{
    BITRES, DB_SHIFT, Glog, Norm, Sig, Val32, celt_maxabs16, half32, qconst16, qconst32,
};
use crate::utils::mdct::DirectMdct;
use crate::utils::range_coder::{EntropyEncoder, RangeEncoder};
use crate::utils::tables::TF_SELECT_TABLE;

/// Largest frame the range coder is ever sized for.
pub const MAX_FRAME_BYTES: usize = 1275;

/// Encoder-side settings that stay fixed for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Interleaved channels in the PCM input.
    pub channels: usize,
    /// Channels in the coded stream.
    pub coded_channels: usize,
    pub sample_rate: u32,
    /// Frame length at 48 kHz.
    pub frame_size: usize,
    pub bitrate: i32,
    pub vbr: bool,
    pub constrained_vbr: bool,
    /// 0 to 10; lower values skip the costlier analysis stages.
    pub complexity: u32,
    pub start_band: usize,
    pub end_band: usize,
    /// First band coded with intensity stereo, `end_band` when unset.
    pub intensity: Option<usize>,
    pub lsb_depth: i32,
    pub variable_duration: bool,
    pub lfe: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            coded_channels: 2,
            sample_rate: 48000,
            frame_size: 960,
            bitrate: 64000,
            vbr: true,
            constrained_vbr: false,
            complexity: 10,
            start_band: 0,
            end_band: 21,
            intensity: None,
            lsb_depth: 16,
            variable_duration: false,
            lfe: false,
        }
    }
}

/// Byte and bit budgets of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameBudget {
    /// Range coder size in bytes.
    storage: usize,
    /// Bytes the allocator may plan with.
    effective_bytes: i32,
    /// VBR target before adjustment, in 1/8 bits.
    base_target: i32,
}

impl FrameBudget {
    fn new(bitrate: i32, vbr: bool, frame_size: usize, fs: u32, c: usize) -> Self {
        let bits = bitrate as i64 * frame_size as i64;
        if vbr {
            let den = (fs >> BITRES) as i64;
            let vbr_rate = ((bits + (den >> 1)) / den) as i32;
            Self {
                storage: (((2 * vbr_rate) >> (BITRES + 3)) as usize).clamp(2, MAX_FRAME_BYTES),
                effective_bytes: vbr_rate >> (BITRES + 3),
                base_target: vbr_rate - (((40 * c as i32) + 20) << BITRES),
            }
        } else {
            let bytes = ((bits + 4 * fs as i64) / (8 * fs as i64)) as usize;
            let storage = bytes.clamp(2, MAX_FRAME_BYTES);
            Self {
                storage,
                effective_bytes: storage as i32,
                base_target: (storage as i32) << (BITRES + 3),
            }
        }
    }
}

/// Every decision the analysis core makes for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDecisions {
    pub index: u64,
    pub lm: usize,
    pub silence: bool,
    pub is_transient: bool,
    pub short_blocks: usize,
    pub mask_metric: i32,
    /// Q14.
    pub tf_estimate: i32,
    pub tf_chan: usize,
    pub tf_select: usize,
    pub tf_sum: i32,
    /// Resolved TF change per band.
    pub tf_res: Vec<i32>,
    pub alloc_trim: i32,
    /// `None` for mono streams.
    pub prefer_mid_side: Option<bool>,
    pub offsets: Vec<i32>,
    pub tot_boost: i32,
    pub max_depth: Glog,
    pub caps: Vec<i32>,
    pub storage_bytes: usize,
    pub effective_bytes: i32,
    /// `None` for CBR and silent frames.
    pub vbr_target: Option<i32>,
    pub temporal_vbr: Glog,
    pub stereo_saving: i32,
    /// Normalised spectrum, `coded_channels` blocks of `frame_size` bins.
    pub spectrum: Vec<Norm>,
    pub band_log_e: Vec<Glog>,
    /// Range-coded silence, transient and TF bits.
    pub tf_bytes: Vec<u8>,
}

/// Runs the perceptual analysis and rate control on successive frames,
/// carrying filter memory and long-term estimates between them.
pub struct FrameAnalyzer<'a> {
    mode: &'a Mode,
    config: AnalyzerConfig,
    upsample: usize,
    mdct: DirectMdct,
    bands: FixedBands,
    preemph: PreemphasisState,
    /// Last `overlap` pre-emphasised samples of each channel.
    in_mem: Vec<Sig>,
    /// Peak magnitude of the PCM that fed the last `overlap` samples.
    overlap_max: i32,
    old_band_log_e: Vec<Glog>,
    stereo_saving: i32,
    spec_avg: Glog,
    frame_count: u64,
    fail_level: Level,
}

impl<'a> FrameAnalyzer<'a> {
    pub fn new(mode: &'a Mode, config: AnalyzerConfig) -> Result<Self> {
        let upsample = resampling_factor(config.sample_rate);
        if upsample == 0 {
            bail!(FrameError::UnsupportedSampleRate(config.sample_rate));
        }
        if config.bitrate <= 0 {
            bail!(FrameError::InvalidBitrate(config.bitrate));
        }
        // Validates channels, frame size and band range once up front
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
            upsample,
            mdct: DirectMdct::new(mode.mdct_size(), mode.max_lm),
            bands: FixedBands,
            preemph: PreemphasisState::default(),
            in_mem: vec![0; config.channels * mode.overlap],
            overlap_max: 0,
            old_band_log_e: vec![0; config.coded_channels * mode.nb_ebands],
            stereo_saving: 0,
            spec_avg: 0,
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

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// PCM samples per channel expected by [`Self::analyze`].
    pub fn samples_per_frame(&self) -> usize {
        self.config.frame_size / self.upsample
    }

    /// Analyzes one frame of interleaved PCM without external analysis.
    pub fn analyze(&mut self, pcm: &[i16]) -> Result<FrameDecisions> {
        self.analyze_with(pcm, &AnalysisInfo::default())
    }

    /// Analyzes one frame of interleaved PCM.
    pub fn analyze_with(&mut self, pcm: &[i16], analysis: &AnalysisInfo) -> Result<FrameDecisions> {
        let mode = self.mode;
        let cfg = self.config;
        let mut frame = FrameContext::new(
            mode,
            cfg.coded_channels,
            cfg.channels,
            cfg.frame_size,
            cfg.start_band,
            cfg.end_band,
        )?;
        frame.vbr = cfg.vbr;
        frame.constrained_vbr = cfg.vbr && cfg.constrained_vbr;

        let (c, cc, lm) = (frame.c, frame.cc, frame.lm);
        let n = frame.n(mode);
        let nb = mode.nb_ebands;
        let overlap = mode.overlap;

        let expected = cc * self.samples_per_frame();
        if pcm.len() != expected {
            bail!(FrameError::InputLength {
                expected,
                actual: pcm.len(),
            });
        }

        let budget = FrameBudget::new(cfg.bitrate, cfg.vbr, n, mode.fs, c);
        let total_bits = budget.storage as u32 * 8;
        let index = self.frame_count;
        self.frame_count += 1;

        // Pre-emphasis, prefixed with the previous frame's tail
        let stride = n + overlap;
        let mut input = vec![0 as Sig; cc * stride];
        for ch in 0..cc {
            let buf = &mut input[ch * stride..(ch + 1) * stride];
            let mem = &mut self.in_mem[ch * overlap..(ch + 1) * overlap];
            buf[..overlap].copy_from_slice(mem);
            preemphasis(
                &pcm[ch..],
                &mut buf[overlap..],
                n,
                cc,
                self.upsample,
                &mode.preemph,
                &mut self.preemph.mem[ch],
                false,
            );
            mem.copy_from_slice(&buf[n..n + overlap]);
        }

        // The overlap carried from the previous frame counts towards silence
        let split = cc * (n - overlap) / self.upsample;
        let sample_max = self.overlap_max.max(celt_maxabs16(&pcm[..split]));
        self.overlap_max = celt_maxabs16(&pcm[split..]);
        frame.silence = sample_max.max(self.overlap_max) == 0;

        let mut enc = RangeEncoder::new(budget.storage);
        if enc.tell() == 1 {
            enc.enc_bit_logp(frame.silence, 15);
        } else {
            frame.silence = false;
        }
        if frame.silence {
            debug!("frame {index}: silence");
            return Ok(self.silent_frame(index, &frame, budget, enc));
        }

        let mut transient = TransientAnalysis::default();
        if cfg.complexity >= 1 && !cfg.lfe {
            transient = transient_analysis(&input, stride, cc);
        }
        // A stereo input coded as mono has only one spectrum to inspect
        transient.tf_chan = transient.tf_chan.min(c - 1);
        let mut tf_estimate = transient.tf_estimate;
        let transient_allowed = lm > 0 && enc.tell() + 3 <= total_bits;
        frame.set_transient(transient.is_transient && transient_allowed);

        let second_mdct = frame.short_blocks != 0 && cfg.complexity >= 8;
        let mut freq = vec![0 as Sig; cc * n];
        let mut band_e = vec![0 as Val32; c * nb];
        let mut band_log_e = vec![0 as Glog; c * nb];
        let mut band_log_e2 = vec![0 as Glog; c * nb];
        // Short blocks spread the same energy over smaller transforms
        let short_offset = half32((lm as i32) << DB_SHIFT);

        if second_mdct {
            compute_mdcts(mode, 0, &input, &mut freq, c, cc, lm, self.upsample, &self.mdct);
            compute_band_energies(mode, &freq, &mut band_e, frame.eff_end, c, lm);
            amp2log2(mode, frame.eff_end, frame.end, &band_e, &mut band_log_e2, c);
            for e in &mut band_log_e2 {
                *e += short_offset;
            }
        }

        compute_mdcts(
            mode,
            frame.short_blocks,
            &input,
            &mut freq,
            c,
            cc,
            lm,
            self.upsample,
            &self.mdct,
        );
        compute_band_energies(mode, &freq, &mut band_e, frame.eff_end, c, lm);
        amp2log2(mode, frame.eff_end, frame.end, &band_e, &mut band_log_e, c);
        if !second_mdct {
            band_log_e2.copy_from_slice(&band_log_e);
        }

        if transient_allowed
            && !frame.is_transient
            && cfg.complexity >= 5
            && !cfg.lfe
            && patch_transient_decision(
                &band_log_e,
                &self.old_band_log_e,
                nb,
                frame.start,
                frame.end,
                c,
            )
        {
            debug!("frame {index}: energy jump forces short blocks");
            frame.set_transient(true);
            compute_mdcts(
                mode,
                frame.short_blocks,
                &input,
                &mut freq,
                c,
                cc,
                lm,
                self.upsample,
                &self.mdct,
            );
            compute_band_energies(mode, &freq, &mut band_e, frame.eff_end, c, lm);
            amp2log2(mode, frame.eff_end, frame.end, &band_e, &mut band_log_e, c);
            for e in &mut band_log_e2 {
                *e += short_offset;
            }
            tf_estimate = qconst16(0.2, 14) as i32;
        }

        if transient_allowed {
            enc.enc_bit_logp(frame.is_transient, 3);
        }

        let mut x = vec![0 as Norm; c * n];
        normalise_bands(mode, &freq, &mut x, &band_e, frame.eff_end, c, frame.m());

        let mut tf_res = vec![0i32; nb];
        let tf = if budget.effective_bytes >= 15 * c as i32
            && frame.start == 0
            && cfg.complexity >= 2
            && !cfg.lfe
        {
            let tf = tf_analysis(
                mode,
                frame.eff_end,
                frame.is_transient,
                &mut tf_res,
                tf_lambda(budget.effective_bytes),
                &x,
                n,
                lm,
                tf_estimate,
                transient.tf_chan,
                &self.bands,
            );
            let last = tf_res[frame.eff_end - 1];
            tf_res[frame.eff_end..frame.end].fill(last);
            tf
        } else {
            tf_res.fill(frame.is_transient as i32);
            TfAnalysis::default()
        };

        let dynalloc = dynalloc_analysis(
            mode,
            &DynallocParams {
                band_log_e: &band_log_e,
                band_log_e2: &band_log_e2,
                start: frame.start,
                end: frame.end,
                c,
                lsb_depth: cfg.lsb_depth,
                is_transient: frame.is_transient,
                vbr: frame.vbr,
                constrained_vbr: frame.constrained_vbr,
                lm,
                effective_bytes: budget.effective_bytes,
                lfe: cfg.lfe,
                surround_dynalloc: None,
            },
        );

        let intensity = cfg.intensity.unwrap_or(frame.end).min(frame.end);
        let alloc_trim = if cfg.lfe {
            5
        } else {
            alloc_trim_analysis(
                mode,
                &x,
                &band_log_e,
                frame.end,
                lm,
                c,
                n,
                analysis,
                &mut self.stereo_saving,
                tf_estimate,
                intensity,
                0,
            )
        };

        let prefer_mid_side = (c == 2).then(|| lm == 0 || stereo_analysis(mode, &x, lm, n));

        let temporal = if cfg.lfe {
            0
        } else {
            temporal_vbr(
                mode,
                &band_log_e,
                frame.start,
                frame.end,
                c,
                lm,
                frame.short_blocks != 0,
                &mut self.spec_avg,
            )
        };

        let vbr_target = cfg.vbr.then(|| {
            compute_vbr(
                mode,
                &VbrParams {
                    analysis,
                    base_target: budget.base_target,
                    lm,
                    bitrate: cfg.bitrate,
                    last_coded_bands: 0,
                    channels: c,
                    intensity,
                    constrained_vbr: frame.constrained_vbr,
                    stereo_saving: self.stereo_saving,
                    tot_boost: dynalloc.tot_boost,
                    tf_estimate,
                    max_depth: dynalloc.max_depth,
                    variable_duration: cfg.variable_duration,
                    lfe: cfg.lfe,
                    surround_masking: None,
                    temporal_vbr: temporal,
                },
            )
        });

        let tf_select = tf_encode(
            frame.start,
            frame.end,
            frame.is_transient,
            &mut tf_res,
            lm,
            tf.tf_select,
            &mut enc,
        );
        if enc.error() {
            log_or_err!(
                self,
                Level::Error,
                anyhow!(AnalysisError::RangeEncoderOverflow {
                    storage: budget.storage,
                    frame: index,
                })
            );
        }

        self.old_band_log_e.copy_from_slice(&band_log_e);
        trace!(
            "frame {index}: transient {}, tf_select {tf_select}, trim {alloc_trim}, target {vbr_target:?}",
            frame.is_transient
        );

        Ok(FrameDecisions {
            index,
            lm,
            silence: false,
            is_transient: frame.is_transient,
            short_blocks: frame.short_blocks,
            mask_metric: transient.mask_metric,
            tf_estimate,
            tf_chan: transient.tf_chan,
            tf_select,
            tf_sum: tf.tf_sum,
            tf_res,
            alloc_trim,
            prefer_mid_side,
            offsets: dynalloc.offsets,
            tot_boost: dynalloc.tot_boost,
            max_depth: dynalloc.max_depth,
            caps: init_caps(mode, lm, c),
            storage_bytes: budget.storage,
            effective_bytes: budget.effective_bytes,
            vbr_target,
            temporal_vbr: temporal,
            stereo_saving: self.stereo_saving,
            spectrum: x,
            band_log_e,
            tf_bytes: enc.finish(),
        })
    }

    fn silent_frame(
        &mut self,
        index: u64,
        frame: &FrameContext,
        budget: FrameBudget,
        enc: RangeEncoder,
    ) -> FrameDecisions {
        let mode = self.mode;
        let nb = mode.nb_ebands;
        let band_log_e = vec![-qconst32(28.0, DB_SHIFT); frame.c * nb];
        self.old_band_log_e.copy_from_slice(&band_log_e);

        FrameDecisions {
            index,
            lm: frame.lm,
            silence: true,
            is_transient: false,
            short_blocks: 0,
            mask_metric: 0,
            tf_estimate: 0,
            tf_chan: 0,
            tf_select: 0,
            tf_sum: 0,
            tf_res: vec![TF_SELECT_TABLE[frame.lm][0] as i32; nb],
            alloc_trim: 5,
            prefer_mid_side: (frame.c == 2).then_some(true),
            offsets: vec![0; nb],
            tot_boost: 0,
            max_depth: 0,
            caps: init_caps(mode, frame.lm, frame.c),
            storage_bytes: budget.storage,
            effective_bytes: budget.effective_bytes,
            vbr_target: None,
            temporal_vbr: 0,
            stereo_saving: self.stereo_saving,
            spectrum: vec![0; frame.c * frame.n(mode)],
            band_log_e,
            tf_bytes: enc.finish(),
        }
    }
}

/// Switching penalty of the TF path search; fewer bytes make switching
/// relatively more expensive.
fn tf_lambda(effective_bytes: i32) -> i32 {
    let lambda = if effective_bytes < 40 {
        12
    } else if effective_bytes < 60 {
        6
    } else if effective_bytes < 100 {
        4
    } else {
        3
    };
    lambda * 2
}
