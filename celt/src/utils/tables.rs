//! Static tables for the standard 48 kHz mode and the shared analysis tables.

use std::f64::consts::PI;

/// Band edges for 5 ms frames at 48 kHz, in bins of the shortest MDCT.
pub const EBAND_5MS: [i16; 22] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 34, 40, 48, 60, 78, 100,
];

/// Per-band log2 width, in 1/8 bit units.
pub const LOG_N_400: [i16; 21] = [
    0, 0, 0, 0, 0, 0, 0, 0, 8, 8, 8, 8, 16, 16, 16, 21, 21, 24, 29, 34, 36,
];

/// Mean band energy in Q4 log2 units, subtracted before quantization.
pub const E_MEANS: [i16; 25] = [
    103, 100, 92, 85, 81, 77, 72, 70, 78, 75, 73, 71, 78, 74, 69, 72, 70, 74, 76, 71, 60, 60, 60,
    60, 60,
];

/// Maximum pulse cache caps, laid out as `[LM][C-1][band]`.
pub const CACHE_CAPS_50: [u8; 168] = [
    224, 224, 224, 224, 224, 224, 224, 224, 160, 160, 160, 160, 185, 185, 185, 178, 178, 168, 134,
    61, 37, //
    224, 224, 224, 224, 224, 224, 224, 224, 240, 240, 240, 240, 207, 207, 207, 198, 198, 183, 144,
    66, 40, //
    160, 160, 160, 160, 160, 160, 160, 160, 185, 185, 185, 185, 193, 193, 193, 183, 183, 172, 138,
    64, 38, //
    240, 240, 240, 240, 240, 240, 240, 240, 207, 207, 207, 207, 204, 204, 204, 193, 193, 180, 143,
    66, 40, //
    185, 185, 185, 185, 185, 185, 185, 185, 193, 193, 193, 193, 193, 193, 193, 183, 183, 172, 138,
    65, 39, //
    207, 207, 207, 207, 207, 207, 207, 207, 204, 204, 204, 204, 201, 201, 201, 188, 188, 176, 141,
    66, 40, //
    193, 193, 193, 193, 193, 193, 193, 193, 193, 193, 193, 193, 194, 194, 194, 184, 184, 173, 139,
    65, 39, //
    204, 204, 204, 204, 204, 204, 204, 204, 201, 201, 201, 201, 198, 198, 198, 187, 187, 175, 140,
    66, 40,
];

/// Resolution offsets indexed by `[LM][4*is_transient + 2*tf_select + tf_res]`.
pub const TF_SELECT_TABLE: [[i8; 8]; 4] = [
    [0, -1, 0, -1, 0, -1, 0, -1],
    [0, -1, 0, -2, 1, 0, 1, -1],
    [0, -2, 0, -3, 2, 0, 1, -1],
    [0, -2, 0, -3, 3, 0, 1, -1],
];

/// Approximation of `6*64/x`, used to estimate the harmonic mean in the transient detector.
pub const INV_TABLE: [u8; 128] = [
    255, 255, 156, 110, 86, 70, 59, 51, 45, 40, 37, 33, 31, 28, 26, 25, 23, 22, 21, 20, 19, 18,
    17, 16, 16, 15, 15, 14, 13, 13, 12, 12, 12, 12, 11, 11, 11, 10, 10, 10, 9, 9, 9, 9, 9, 9, 8,
    8, 8, 8, 8, 7, 7, 7, 7, 7, 7, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 2,
];

/// Comb filter taps per tapset, Q15.
pub const COMB_GAINS: [[i16; 3]; 3] = [
    [10048, 7112, 4248],
    [15200, 8784, 0],
    [26208, 3280, 0],
];

/// Power-complementary low-overlap window in Q15.
pub fn overlap_window(overlap: usize) -> Vec<i16> {
    (0..overlap)
        .map(|i| {
            let s = (0.5 * PI * (i as f64 + 0.5) / overlap as f64).sin();
            let w = (0.5 + 32768.0 * (0.5 * PI * s * s).sin()).floor();
            w.min(32767.0) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_layout_is_monotonic() {
        assert!(EBAND_5MS.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(CACHE_CAPS_50.len(), 21 * 2 * 4);
    }

    #[test]
    fn window_is_power_complementary() {
        let w = overlap_window(120);
        assert_eq!(w.len(), 120);
        for i in 0..120 {
            let a = w[i] as f64 / 32768.0;
            let b = w[119 - i] as f64 / 32768.0;
            assert!((a * a + b * b - 1.0).abs() < 1e-3, "sample {i}");
        }
        assert!(w.windows(2).all(|p| p[0] <= p[1]));
    }
}
