//! Band energy computation, normalisation and the band-level helpers the
//! TF selector and synthesis path delegate to.

use crate::structs::mode::Mode;
use crate::utils::fixed::{
    DB_SHIFT, EPSILON, Glog, Norm, Sig, Val32, celt_exp2_frac, celt_ilog2, celt_log2,
    celt_maxabs32, celt_rcp, celt_sqrt, celt_zlog2, extract16, mult16_16, mult16_16_q15,
    pshr32, qconst16, qconst32, vshr32,
};
use crate::utils::tables::E_MEANS;

/// Band-level operations consumed by the core.
pub trait BandOps {
    /// In-place Haar step over `n0` coefficients interleaved with `stride`.
    fn haar1(&self, x: &mut [Norm], n0: usize, stride: usize);

    /// Scales the unit-norm bands of one channel back to the energies in
    /// `band_log_e` and writes the `m * short_mdct_size` bins of `freq`.
    #[allow(clippy::too_many_arguments)]
    fn denormalise_bands(
        &self,
        mode: &Mode,
        x: &[Norm],
        freq: &mut [Sig],
        band_log_e: &[Glog],
        start: usize,
        end: usize,
        m: usize,
        downsample: usize,
        silence: bool,
    );
}

/// Integer band operations with reference rounding.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedBands;

impl BandOps for FixedBands {
    fn haar1(&self, x: &mut [Norm], n0: usize, stride: usize) {
        let half = n0 >> 1;
        let coef = qconst16(0.70710678, 15);
        for i in 0..stride {
            for j in 0..half {
                let a = stride * 2 * j + i;
                let b = stride * (2 * j + 1) + i;
                let tmp1 = mult16_16(coef, x[a]);
                let tmp2 = mult16_16(coef, x[b]);
                x[a] = extract16(pshr32(tmp1.wrapping_add(tmp2), 15));
                x[b] = extract16(pshr32(tmp1.wrapping_sub(tmp2), 15));
            }
        }
    }

    fn denormalise_bands(
        &self,
        mode: &Mode,
        x: &[Norm],
        freq: &mut [Sig],
        band_log_e: &[Glog],
        mut start: usize,
        mut end: usize,
        m: usize,
        downsample: usize,
        silence: bool,
    ) {
        let n = m * mode.short_mdct_size;
        let mut bound = m * mode.ebands[end] as usize;
        if downsample != 1 {
            bound = bound.min(n / downsample);
        }
        if silence {
            bound = 0;
            start = 0;
            end = 0;
        }

        let first = m * mode.ebands[start] as usize;
        freq[..first].fill(0);
        for i in start..end {
            let lo = m * mode.ebands[i] as usize;
            let hi = m * mode.ebands[i + 1] as usize;
            let lg = band_log_e[i] + ((E_MEANS[i] as i32) << 6);

            let mut shift = 16 - (lg >> DB_SHIFT);
            let mut g = if shift > 31 {
                shift = 0;
                0
            } else {
                celt_exp2_frac(lg & ((1 << DB_SHIFT) - 1)) as i16
            };

            if shift < 0 {
                // Only reachable with corrupted energies
                if shift < -2 {
                    g = 32767;
                    shift = -2;
                }
                for j in lo..hi {
                    freq[j] = mult16_16(x[j], g) << -shift;
                }
            } else {
                for j in lo..hi {
                    freq[j] = mult16_16(x[j], g) >> shift;
                }
            }
        }
        freq[bound..n].fill(0);
    }
}

/// Computes the amplitude of each band from the MDCT bins.
pub fn compute_band_energies(
    mode: &Mode,
    x: &[Sig],
    band_e: &mut [Val32],
    end: usize,
    c: usize,
    lm: usize,
) {
    let n = mode.short_mdct_size << lm;
    let nb = mode.nb_ebands;
    for ch in 0..c {
        let spectrum = &x[ch * n..(ch + 1) * n];
        for i in 0..end {
            let band = &spectrum[mode.band_start(i, lm)..mode.band_start(i + 1, lm)];
            let maxval = celt_maxabs32(band);
            band_e[i + ch * nb] = if maxval > 0 {
                let shift = celt_ilog2(maxval) - 10;
                let sum = band.iter().fold(0i32, |acc, &v| {
                    let s = extract16(vshr32(v, shift));
                    acc.wrapping_add(mult16_16(s, s))
                });
                EPSILON + vshr32(celt_sqrt(sum), -shift)
            } else {
                EPSILON
            };
        }
    }
}

/// Divides each band by its amplitude, producing Q14 unit-norm bands.
pub fn normalise_bands(
    mode: &Mode,
    freq: &[Sig],
    x: &mut [Norm],
    band_e: &[Val32],
    end: usize,
    c: usize,
    m: usize,
) {
    let n = m * mode.short_mdct_size;
    for ch in 0..c {
        for i in 0..end {
            let e = band_e[i + ch * mode.nb_ebands];
            let shift = celt_zlog2(e) - 13;
            let g = extract16(celt_rcp(vshr32(e, shift) << 3));
            let lo = ch * n + m * mode.ebands[i] as usize;
            let hi = ch * n + m * mode.ebands[i + 1] as usize;
            for j in lo..hi {
                x[j] = mult16_16_q15(extract16(vshr32(freq[j], shift - 1)), g) as Norm;
            }
        }
    }
}

/// Converts band amplitudes to mean-removed log2 energies.
pub fn amp2log2(
    mode: &Mode,
    eff_end: usize,
    end: usize,
    band_e: &[Val32],
    band_log_e: &mut [Glog],
    c: usize,
) {
    let nb = mode.nb_ebands;
    for ch in 0..c {
        for i in 0..eff_end {
            band_log_e[i + ch * nb] = celt_log2(band_e[i + ch * nb] << 2) - ((E_MEANS[i] as i32) << 6);
        }
        for i in eff_end..end {
            band_log_e[i + ch * nb] = -qconst32(14.0, DB_SHIFT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haar1_is_orthogonal() {
        let bands = FixedBands;
        let mut x: Vec<Norm> = vec![8192, 8192, 4096, -4096];
        bands.haar1(&mut x, 4, 1);
        assert_eq!(x, vec![11585, 0, 0, 5793]);

        let mut strided: Vec<Norm> = vec![100, 7, 100, 9];
        bands.haar1(&mut strided, 2, 2);
        assert_eq!(strided[0], 141);
        assert_eq!(strided[2], 0);
        assert_eq!(strided[1], 11);
        assert_eq!(strided[3], -1);
    }

    #[test]
    fn energies_normalise_to_unit_bands() {
        let mode = Mode::standard();
        let lm = 3;
        let n = mode.frame_size(lm);
        let freq: Vec<Sig> = (0..n)
            .map(|j| if j % 3 == 0 { 40_000 << 4 } else { -(25_000 << 4) })
            .collect();

        let mut band_e = vec![0; mode.nb_ebands];
        compute_band_energies(mode, &freq, &mut band_e, mode.nb_ebands, 1, lm);
        let mut x = vec![0 as Norm; n];
        normalise_bands(mode, &freq, &mut x, &band_e, mode.nb_ebands, 1, 1 << lm);

        for i in 0..mode.nb_ebands {
            let band = &x[mode.band_start(i, lm)..mode.band_start(i + 1, lm)];
            let energy: i64 = band.iter().map(|&v| v as i64 * v as i64).sum();
            let unit = 1i64 << 28;
            assert!(
                (energy - unit).abs() < unit / 50,
                "band {i}: energy {energy}"
            );
        }
    }

    #[test]
    fn denormalise_restores_energy_and_clears_tail() {
        let mode = Mode::standard();
        let lm = 3;
        let m = 1 << lm;
        let n = mode.frame_size(lm);
        let freq: Vec<Sig> = (0..n).map(|j| ((j as i32 % 17) - 8) << 16).collect();

        let mut band_e = vec![0; mode.nb_ebands];
        compute_band_energies(mode, &freq, &mut band_e, mode.nb_ebands, 1, lm);
        let mut x = vec![0 as Norm; n];
        normalise_bands(mode, &freq, &mut x, &band_e, mode.nb_ebands, 1, m);
        let mut log_e = vec![0; mode.nb_ebands];
        amp2log2(mode, mode.nb_ebands, mode.nb_ebands, &band_e, &mut log_e, 1);

        let mut out = vec![1 as Sig; n];
        FixedBands.denormalise_bands(mode, &x, &mut out, &log_e, 0, 17, m, 1, false);
        for i in 0..17 {
            let lo = mode.band_start(i, lm);
            let hi = mode.band_start(i + 1, lm);
            let want: f64 = freq[lo..hi].iter().map(|&v| (v as f64).powi(2)).sum();
            let got: f64 = out[lo..hi].iter().map(|&v| (v as f64).powi(2)).sum();
            if want > 0.0 {
                assert!((got / want - 1.0).abs() < 0.05, "band {i}: {got} vs {want}");
            }
        }
        assert!(out[mode.band_start(17, lm)..].iter().all(|&v| v == 0));

        FixedBands.denormalise_bands(mode, &x, &mut out, &log_e, 0, 17, m, 1, true);
        assert!(out.iter().all(|&v| v == 0));
    }
}
