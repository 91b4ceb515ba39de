use crate::structs::mode::Mode;
use crate::utils::fixed::{EPSILON, Norm, mult16_32_q15, qconst16};

/// Bands covered by the L/R versus M/S cost estimate.
const STEREO_ANALYSIS_BANDS: usize = 13;

/// Estimates whether mid/side coding of the normalised spectrum `x` is
/// cheaper than coding left and right separately. The right channel starts
/// at `x[n0]`.
pub fn stereo_analysis(mode: &Mode, x: &[Norm], lm: usize, n0: usize) -> bool {
    let mut sum_lr = EPSILON;
    let mut sum_ms = EPSILON;

    for i in 0..STEREO_ANALYSIS_BANDS {
        for j in mode.band_start(i, lm)..mode.band_start(i + 1, lm) {
            let l = x[j] as i32;
            let r = x[n0 + j] as i32;
            let m = l + r;
            let s = l - r;
            sum_lr += l.abs() + r.abs();
            sum_ms += m.abs() + s.abs();
        }
    }
    sum_ms = mult16_32_q15(qconst16(0.707107, 15), sum_ms);

    // M/S pays for coding the rotation angle on top of the coefficients
    let thetas = if lm <= 1 { 5 } else { 13 };
    let bins = (mode.ebands[STEREO_ANALYSIS_BANDS] as i32) << (lm + 1);
    let ms_cost = mult16_32_q15((bins + thetas) as i16, sum_ms);
    let lr_cost = mult16_32_q15(bins as i16, sum_lr);
    ms_cost <= lr_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(n: usize, seed: u32) -> Vec<Norm> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                ((state >> 16) as i32 % 8000 - 4000) as Norm
            })
            .collect()
    }

    #[test]
    fn correlated_channels_prefer_mid_side() {
        let mode = Mode::standard();
        let lm = 3;
        let n = mode.frame_size(lm);
        let left = spectrum(n, 1);
        let mut x = left.clone();
        x.extend(&left);
        assert!(stereo_analysis(mode, &x, lm, n));

        // Anti-phase is just as cheap in M/S
        let mut anti = left.clone();
        anti.extend(left.iter().map(|&v| -v));
        assert!(stereo_analysis(mode, &anti, lm, n));
    }

    #[test]
    fn one_sided_channels_prefer_left_right() {
        let mode = Mode::standard();
        let lm = 1;
        let n = mode.frame_size(lm);
        let mut x = spectrum(n, 5);
        x.extend(std::iter::repeat_n(0, n));
        assert!(!stereo_analysis(mode, &x, lm, n));
    }
}
