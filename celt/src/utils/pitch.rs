//! Pitch correlation primitives used by the concealment pitch locator.

use crate::utils::fixed::{Sig, Val16, celt_ilog2, celt_maxabs32, extract16, mult16_16};

pub trait PitchAnalysis {
    /// Low-passes and decimates `len` samples of each channel 2:1 into
    /// `x_lp`, mixing channels down to one.
    fn pitch_downsample(&self, x: &[&[Sig]], x_lp: &mut [Val16], len: usize);

    /// Finds the lag in `[0, max_pitch)` (full-rate samples) at which `y`
    /// best matches `x_lp`. Both buffers are at half rate; `x_lp` holds
    /// `len / 2` samples and `y` holds `(len + max_pitch) / 2`.
    fn pitch_search(&self, x_lp: &[Val16], y: &[Val16], len: usize, max_pitch: usize) -> usize;
}

/// Brute-force normalised cross-correlation search.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcorrPitch;

impl PitchAnalysis for XcorrPitch {
    fn pitch_downsample(&self, x: &[&[Sig]], x_lp: &mut [Val16], len: usize) {
        let half = len >> 1;
        let maxabs = x
            .iter()
            .map(|ch| celt_maxabs32(&ch[..len]))
            .max()
            .unwrap_or(0);
        let mut shift = if maxabs > 1 { celt_ilog2(maxabs) - 10 } else { 0 };
        shift = shift.max(0);
        if x.len() == 2 {
            shift += 1;
        }

        x_lp[..half].fill(0);
        for ch in x {
            let tap = |i: usize| (ch[i] >> shift) as i64;
            for (i, out) in x_lp[..half].iter_mut().enumerate() {
                let centre = 2 * i;
                let prev = if centre > 0 { tap(centre - 1) } else { 0 };
                let next = if centre + 1 < len { tap(centre + 1) } else { 0 };
                let v = (prev + 2 * tap(centre) + next) >> 2;
                *out = extract16((*out as i64 + v).clamp(-32768, 32767) as i32);
            }
        }
    }

    fn pitch_search(&self, x_lp: &[Val16], y: &[Val16], len: usize, max_pitch: usize) -> usize {
        let lag_len = len >> 1;
        let target = &x_lp[..lag_len];

        let mut energy: i64 = y[..lag_len].iter().map(|&v| mult16_16(v, v) as i64).sum();
        let mut best = (0usize, 0i64, 1i64);
        for d in 0..max_pitch >> 1 {
            let corr: i64 = target
                .iter()
                .zip(&y[d..d + lag_len])
                .map(|(&a, &b)| mult16_16(a, b) as i64)
                .sum();
            if corr > 0 {
                let e = energy.max(1);
                // corr^2 / e > best_corr^2 / best_e, without dividing
                let lhs = (corr as i128).pow(2) * best.2 as i128;
                let rhs = (best.1 as i128).pow(2) * e as i128;
                if lhs > rhs {
                    best = (d, corr, e);
                }
            }
            let leaving = y[d] as i64;
            let entering = y.get(d + lag_len).map_or(0, |&v| v as i64);
            energy += entering * entering - leaving * leaving;
        }
        2 * best.0
    }
}
