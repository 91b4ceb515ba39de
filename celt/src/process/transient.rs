//! Time-domain transient detection and the band-energy patch heuristic.

use log::trace;

use crate::utils::fixed::{
    DB_SHIFT, EPSILON, Glog, SIG_SHIFT, Sig, celt_ilog2, celt_maxabs32, celt_sqrt, extract16,
    mult16_16, mult16_32_q15, pshr32, qconst16, qconst32, vshr32,
};
use crate::utils::tables::INV_TABLE;

/// Masking metric above which a frame is coded with short blocks.
pub const TRANSIENT_THRESHOLD: i32 = 200;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransientAnalysis {
    pub is_transient: bool,
    /// Transient confidence in Q14, used to boost the VBR target.
    pub tf_estimate: i32,
    /// Channel with the largest masking metric.
    pub tf_chan: usize,
    pub mask_metric: i32,
}

/// Detects pre-echo-prone frames from `c` channels of `len` samples each.
///
/// `len` must be at least 36 so the harmonic mean covers some samples.
pub fn transient_analysis(input: &[Sig], len: usize, c: usize) -> TransientAnalysis {
    assert!(len >= 36, "transient analysis needs at least 36 samples, got {len}");
    let len2 = len / 2;
    let mut tmp = vec![0i32; len];
    let mut result = TransientAnalysis::default();

    for ch in 0..c {
        // High-pass filter: (1 - 2*z^-1 + z^-2) / (1 - z^-1 + .5*z^-2)
        let (mut mem0, mut mem1) = (0i32, 0i32);
        for (i, out) in tmp.iter_mut().enumerate() {
            let x = input[i + ch * len] >> SIG_SHIFT;
            let y = mem0.wrapping_add(x);
            mem0 = mem1.wrapping_add(y).wrapping_sub(x << 1);
            mem1 = x.wrapping_sub(y >> 1);
            *out = extract16(y >> 2) as i32;
        }
        // The filter memory is not carried over, so the start is unreliable
        tmp[..12.min(len)].fill(0);

        let shift = 14 - celt_ilog2(1 + celt_maxabs32(&tmp));
        if shift != 0 {
            for v in &mut tmp {
                *v = extract16(vshr32(*v, -shift)) as i32;
            }
        }

        // Forward pass for the post-echo threshold, two samples at a time
        let mut mean = 0i32;
        let mut mem = 0i32;
        for i in 0..len2 {
            let a = tmp[2 * i] as i16;
            let b = tmp[2 * i + 1] as i16;
            let x2 = pshr32(mult16_16(a, a).wrapping_add(mult16_16(b, b)), 16);
            mean = mean.wrapping_add(x2);
            tmp[i] = mem + pshr32(x2 - mem, 4);
            mem = tmp[i];
        }

        // Backward pass for the pre-echo threshold
        mem = 0;
        let mut max_e = 0;
        for i in (0..len2).rev() {
            tmp[i] = mem + pshr32(tmp[i] - mem, 3);
            mem = tmp[i];
            max_e = max_e.max(mem);
        }

        // Frame energy is the geometric mean of the energy and half the max
        let mean = celt_sqrt(mean).wrapping_mul(celt_sqrt(max_e * (len2 as i32 >> 1)));
        // Inverse of the mean energy in Q15+6
        let norm = ((len2 as i32) << (6 + 14)) / (EPSILON + (mean >> 1));

        // Harmonic mean over every fourth smoothed sample, skipping the edges
        let mut unmask = 0i32;
        let mut i = 12;
        while i + 5 < len2 {
            let id = mult16_32_q15((tmp[i] + EPSILON) as i16, norm).clamp(0, 127);
            unmask += INV_TABLE[id as usize] as i32;
            i += 4;
        }
        let unmask = 64 * unmask * 4 / (6 * (len2 as i32 - 17));
        if unmask > result.mask_metric {
            result.tf_chan = ch;
            result.mask_metric = unmask;
        }
    }

    result.is_transient = result.mask_metric > TRANSIENT_THRESHOLD;
    let tf_max = (celt_sqrt(27 * result.mask_metric) - 42).max(0);
    result.tf_estimate = celt_sqrt(
        ((mult16_16(qconst16(0.0069, 14), tf_max.min(163) as i16)) << 14)
            .wrapping_sub(qconst32(0.139, 28))
            .max(0),
    );

    trace!(
        "transient analysis: metric {} on channel {}, tf_estimate {}",
        result.mask_metric, result.tf_chan, result.tf_estimate
    );
    result
}

/// Checks whether the band energies jumped far enough above a spread
/// version of the previous frame's energies to force short blocks.
pub fn patch_transient_decision(
    new_e: &[Glog],
    old_e: &[Glog],
    nb_ebands: usize,
    start: usize,
    end: usize,
    c: usize,
) -> bool {
    let first = start.max(2);
    if end <= first + 1 {
        return false;
    }

    // -6 dB per band spreading in both directions
    let step = qconst32(1.0, DB_SHIFT);
    let old_max = |i: usize| {
        if c == 1 {
            old_e[i]
        } else {
            old_e[i].max(old_e[i + nb_ebands])
        }
    };
    let mut spread_old = vec![0 as Glog; end];
    spread_old[start] = old_max(start);
    for i in start + 1..end {
        spread_old[i] = (spread_old[i - 1] - step).max(old_max(i));
    }
    for i in (start..end - 1).rev() {
        spread_old[i] = spread_old[i].max(spread_old[i + 1] - step);
    }

    let mut mean_diff = 0i32;
    for ch in 0..c {
        for i in first..end - 1 {
            let x1 = new_e[i + ch * nb_ebands].max(0);
            let x2 = spread_old[i].max(0);
            mean_diff += (x1 - x2).max(0);
        }
    }
    mean_diff /= (c * (end - 1 - first)) as i32;
    mean_diff > step
}
