//! Windowed MDCT used for framing and synthesis.
//!
//! [`DirectMdct`] evaluates the transform sum directly. It is slow next to
//! an FFT kernel and makes no claim to match any FFT kernel bit for bit, but
//! it is deterministic and satisfies the framing contract the conditioning
//! code relies on.

use std::f64::consts::PI;

use crate::utils::fixed::{Sig, Val16};

/// Forward and inverse low-overlap MDCT.
///
/// For a transform of size `N = n >> shift` there are `N/2` coefficients.
/// `forward` reads `N/2 + overlap` input samples and writes coefficient `k`
/// to `output[k * stride]`. `backward` reads `input[k * stride]`, adds the
/// first `overlap` time samples onto what `output` already holds and
/// overwrites the following `N/2` samples.
pub trait Mdct {
    fn forward(
        &self,
        input: &[Sig],
        output: &mut [Sig],
        window: &[Val16],
        overlap: usize,
        shift: usize,
        stride: usize,
    );

    fn backward(
        &self,
        input: &[Sig],
        output: &mut [Sig],
        window: &[Val16],
        overlap: usize,
        shift: usize,
        stride: usize,
    );
}

#[derive(Debug, Clone)]
pub struct DirectMdct {
    n: usize,
    /// `cos(2*pi*j / (8*N2))` for each supported shift.
    twiddles: Vec<Vec<f64>>,
}

impl DirectMdct {
    /// Creates a transform of largest size `n`, usable for every shift up to
    /// `max_shift`.
    pub fn new(n: usize, max_shift: usize) -> Self {
        let twiddles = (0..=max_shift)
            .map(|shift| {
                let period = 4 * (n >> shift);
                (0..period)
                    .map(|j| (2.0 * PI * j as f64 / period as f64).cos())
                    .collect()
            })
            .collect();
        Self { n, twiddles }
    }

    fn layout(&self, overlap: usize, shift: usize) -> (usize, usize, &[f64]) {
        let n2 = (self.n >> shift) / 2;
        assert!(overlap <= n2 && (n2 - overlap) % 2 == 0);
        (n2, (n2 - overlap) / 2, &self.twiddles[shift])
    }
}

#[inline]
fn window_gain(window: &[Val16], overlap: usize, n2: usize, t: usize) -> f64 {
    let w = if t < overlap {
        window[t]
    } else if t < n2 {
        return 1.0;
    } else {
        window[n2 + overlap - 1 - t]
    };
    w as f64 / 32768.0
}

#[inline]
fn phase(offset: usize, t: usize, k: usize, n2: usize) -> usize {
    ((2 * (offset + t) + 1 + n2) * (2 * k + 1)) % (8 * n2)
}

impl Mdct for DirectMdct {
    fn forward(
        &self,
        input: &[Sig],
        output: &mut [Sig],
        window: &[Val16],
        overlap: usize,
        shift: usize,
        stride: usize,
    ) {
        let (n2, offset, cos) = self.layout(overlap, shift);
        let len = n2 + overlap;
        let windowed: Vec<f64> = input[..len]
            .iter()
            .enumerate()
            .map(|(t, &x)| x as f64 * window_gain(window, overlap, n2, t))
            .collect();
        let scale = 2.0 / n2 as f64;
        for k in 0..n2 {
            let sum: f64 = windowed
                .iter()
                .enumerate()
                .map(|(t, &x)| x * cos[phase(offset, t, k, n2)])
                .sum();
            output[k * stride] = (sum * scale).round() as Sig;
        }
    }

    fn backward(
        &self,
        input: &[Sig],
        output: &mut [Sig],
        window: &[Val16],
        overlap: usize,
        shift: usize,
        stride: usize,
    ) {
        let (n2, offset, cos) = self.layout(overlap, shift);
        for t in 0..n2 + overlap {
            let sum: f64 = (0..n2)
                .map(|k| input[k * stride] as f64 * cos[phase(offset, t, k, n2)])
                .sum();
            let y = (sum * window_gain(window, overlap, n2, t)).round() as Sig;
            if t < overlap {
                output[t] = output[t].wrapping_add(y);
            } else {
                output[t] = y;
            }
        }
    }
}
