//! Time-domain conditioning around the transform: pre-emphasis, MDCT
//! framing, synthesis, de-emphasis and the pitch comb filter.

use log::trace;

use crate::structs::mode::Mode;
use crate::utils::bands::BandOps;
use crate::utils::fixed::{
    Glog, Norm, Q15ONE, SIG_SHIFT, Sig, VERY_SMALL, Val16, half32, mult16_16, mult16_16_p15,
    mult16_16_q15, mult16_32_q15, sat16, sig2word16,
};
use crate::utils::mdct::Mdct;
use crate::utils::tables::COMB_GAINS;

/// Pre-emphasises one channel of interleaved PCM into `out`.
///
/// `pcm` starts at the channel's first sample and is read with stride `cc`.
/// `n` samples are always produced; with `upsample > 1` only every
/// `upsample`-th output slot carries an input sample and the rest are zero.
/// `clip` only selects the general path, integer input never needs clipping.
#[allow(clippy::too_many_arguments)]
pub fn preemphasis(
    pcm: &[i16],
    out: &mut [Sig],
    n: usize,
    cc: usize,
    upsample: usize,
    coef: &[Val16; 4],
    mem: &mut Sig,
    clip: bool,
) {
    let coef0 = coef[0];
    let mut m = *mem;

    if coef[1] == 0 && upsample == 1 && !clip {
        for i in 0..n {
            let x = pcm[cc * i];
            out[i] = ((x as Sig) << SIG_SHIFT).wrapping_sub(m);
            m = mult16_16(coef0, x) >> (15 - SIG_SHIFT);
        }
        *mem = m;
        return;
    }

    let nu = n / upsample;
    if upsample != 1 {
        out[..n].fill(0);
    }
    for i in 0..nu {
        out[i * upsample] = pcm[cc * i] as Sig;
    }

    if coef[1] != 0 {
        let (coef1, coef2) = (coef[1], coef[2]);
        for sample in &mut out[..n] {
            let tmp = mult16_16(coef2, *sample as i16);
            *sample = tmp.wrapping_add(m);
            m = mult16_32_q15(coef1, *sample).wrapping_sub(mult16_32_q15(coef0, tmp));
        }
    } else {
        for sample in &mut out[..n] {
            let x = *sample as i16;
            *sample = ((x as Sig) << SIG_SHIFT).wrapping_sub(m);
            m = mult16_16(coef0, x) >> (15 - SIG_SHIFT);
        }
    }
    *mem = m;
}

/// Windows and transforms every channel and sub-block of a frame.
///
/// `input` holds `cc` channels of `B*N + overlap` samples each. Sub-block
/// outputs are interleaved with stride `B` inside each channel's `B*N` bins.
/// A stereo input coded as mono is averaged after the transform.
#[allow(clippy::too_many_arguments)]
pub fn compute_mdcts<T: Mdct + ?Sized>(
    mode: &Mode,
    short_blocks: usize,
    input: &[Sig],
    output: &mut [Sig],
    c: usize,
    cc: usize,
    lm: usize,
    upsample: usize,
    mdct: &T,
) {
    let overlap = mode.overlap;
    let (b_count, n, shift) = if short_blocks != 0 {
        (short_blocks, mode.short_mdct_size, mode.max_lm)
    } else {
        (1, mode.short_mdct_size << lm, mode.max_lm - lm)
    };
    let bn = b_count * n;

    for ch in 0..cc {
        for b in 0..b_count {
            let src = ch * (bn + overlap) + b * n;
            mdct.forward(
                &input[src..],
                &mut output[b + ch * bn..],
                &mode.window,
                overlap,
                shift,
                b_count,
            );
        }
    }

    if cc == 2 && c == 1 {
        for i in 0..bn {
            output[i] = half32(output[i]).wrapping_add(half32(output[bn + i]));
        }
    }
    if upsample != 1 {
        let bound = bn / upsample;
        for ch in 0..c {
            let spectrum = &mut output[ch * bn..(ch + 1) * bn];
            for v in &mut spectrum[..bound] {
                *v = v.wrapping_mul(upsample as Sig);
            }
            spectrum[bound..].fill(0);
        }
    }
}

/// Rebuilds the time-domain signal of a frame from its normalised spectrum.
///
/// Each `out_syn` channel holds `overlap` samples of the previous frame's
/// tail followed by room for `N` new samples. A mono stream played on two
/// channels duplicates the spectrum; a stereo stream played on one channel
/// is averaged in the frequency domain.
#[allow(clippy::too_many_arguments)]
pub fn synthesis<T: Mdct + ?Sized, B: BandOps + ?Sized>(
    mode: &Mode,
    x: &[Norm],
    out_syn: &mut [&mut [Sig]],
    old_band_e: &[Glog],
    start: usize,
    eff_end: usize,
    c: usize,
    cc: usize,
    is_transient: bool,
    lm: usize,
    downsample: usize,
    silence: bool,
    mdct: &T,
    bands: &B,
) {
    let overlap = mode.overlap;
    let nb = mode.nb_ebands;
    let n = mode.short_mdct_size << lm;
    let m = 1 << lm;
    let (b_count, nb_size, shift) = if is_transient {
        (m, mode.short_mdct_size, mode.max_lm)
    } else {
        (1, n, mode.max_lm - lm)
    };
    let mut freq = vec![0 as Sig; n];
    let window = &mode.window;

    if cc == 2 && c == 1 {
        let (first, second) = out_syn.split_at_mut(1);
        let (ch0, ch1) = (&mut *first[0], &mut *second[0]);
        bands.denormalise_bands(
            mode, x, &mut freq, old_band_e, start, eff_end, m, downsample, silence,
        );
        // Park the duplicate past channel 1's overlap history
        ch1[overlap..overlap + n].copy_from_slice(&freq);
        for b in 0..b_count {
            mdct.backward(
                &ch1[overlap + b..overlap + n],
                &mut ch0[nb_size * b..],
                window,
                overlap,
                shift,
                b_count,
            );
        }
        for b in 0..b_count {
            mdct.backward(&freq[b..], &mut ch1[nb_size * b..], window, overlap, shift, b_count);
        }
    } else if cc == 1 && c == 2 {
        let ch0 = &mut *out_syn[0];
        bands.denormalise_bands(
            mode, x, &mut freq, old_band_e, start, eff_end, m, downsample, silence,
        );
        let scratch = &mut ch0[overlap..overlap + n];
        bands.denormalise_bands(
            mode,
            &x[n..],
            scratch,
            &old_band_e[nb..],
            start,
            eff_end,
            m,
            downsample,
            silence,
        );
        for (f, &s) in freq.iter_mut().zip(scratch.iter()) {
            *f = half32(f.wrapping_add(s));
        }
        for b in 0..b_count {
            mdct.backward(&freq[b..], &mut ch0[nb_size * b..], window, overlap, shift, b_count);
        }
    } else {
        for (ch, out) in out_syn.iter_mut().enumerate().take(cc) {
            bands.denormalise_bands(
                mode,
                &x[ch * n..],
                &mut freq,
                &old_band_e[ch * nb..],
                start,
                eff_end,
                m,
                downsample,
                silence,
            );
            for b in 0..b_count {
                mdct.backward(&freq[b..], &mut out[nb_size * b..], window, overlap, shift, b_count);
            }
        }
    }
}

/// Inverse pre-emphasis with optional decimation into interleaved PCM.
///
/// `x + m` saturates at the `i32` bounds rather than wrapping; on saturation
/// the filter state is pinned to the saturated value. With `accum` the
/// filtered samples are added onto the existing PCM with 16-bit saturation.
/// Returns the number of saturated samples.
#[allow(clippy::too_many_arguments)]
pub fn deemphasis(
    input: &[&[Sig]],
    pcm: &mut [i16],
    n: usize,
    c: usize,
    downsample: usize,
    coef: &[Val16; 4],
    mem: &mut [Sig],
    accum: bool,
) -> usize {
    let coef0 = coef[0];
    let nd = n / downsample;
    let custom = coef[1] != 0;
    let decimate = custom || downsample > 1;
    let mut scratch = if decimate { vec![0 as Sig; n] } else { Vec::new() };
    let mut saturated = 0;

    for ch in 0..c {
        let x = input[ch];
        let mut m = mem[ch];

        for j in 0..n {
            let (tmp, overflowed) = match x[j].checked_add(m.saturating_add(VERY_SMALL)) {
                Some(v) => (v, false),
                None => (x[j].saturating_add(m), true),
            };
            let tmp = if overflowed {
                saturated += 1;
                m = tmp;
                tmp
            } else if custom {
                m = mult16_32_q15(coef0, tmp).wrapping_sub(mult16_32_q15(coef[1], x[j]));
                mult16_32_q15(coef[3], tmp) << 2
            } else {
                m = mult16_32_q15(coef0, tmp);
                tmp
            };

            if decimate {
                scratch[j] = tmp;
            } else if accum {
                let y = &mut pcm[j * c + ch];
                *y = sat16(*y as i32 + sig2word16(tmp) as i32);
            } else {
                pcm[j * c + ch] = sig2word16(tmp);
            }
        }
        mem[ch] = m;

        if decimate {
            for j in 0..nd {
                let v = sig2word16(scratch[j * downsample]);
                let y = &mut pcm[j * c + ch];
                *y = if accum { sat16(*y as i32 + v as i32) } else { v };
            }
        }
    }

    if saturated > 0 {
        trace!("de-emphasis saturated on {saturated} samples");
    }
    saturated
}

/// Sample access for the comb filter kernel. Index 0 is the first output
/// sample; negative indices reach into the history before it.
trait CombBuffer {
    fn input(&self, i: isize) -> Sig;
    fn output(&mut self, i: usize, value: Sig);
}

/// Separate input and output: a pure FIR filter.
struct Split<'a> {
    y: &'a mut [Sig],
    x: &'a [Sig],
    history: usize,
}

impl CombBuffer for Split<'_> {
    #[inline]
    fn input(&self, i: isize) -> Sig {
        self.x[(self.history as isize + i) as usize]
    }

    #[inline]
    fn output(&mut self, i: usize, value: Sig) {
        self.y[i] = value;
    }
}

/// One buffer filtered in place, so past outputs feed back.
struct InPlace<'a> {
    buf: &'a mut [Sig],
    start: usize,
}

impl CombBuffer for InPlace<'_> {
    #[inline]
    fn input(&self, i: isize) -> Sig {
        self.buf[(self.start as isize + i) as usize]
    }

    #[inline]
    fn output(&mut self, i: usize, value: Sig) {
        self.buf[self.start + i] = value;
    }
}

#[inline]
fn tap(g: Val16, value: Sig) -> Sig {
    mult16_32_q15(g, value)
}

fn comb_filter_const<B: CombBuffer>(
    buf: &mut B,
    from: usize,
    t: usize,
    n: usize,
    g10: Val16,
    g11: Val16,
    g12: Val16,
) {
    let t = t as isize;
    let base = from as isize;
    let mut x4 = buf.input(base - t - 2);
    let mut x3 = buf.input(base - t - 1);
    let mut x2 = buf.input(base - t);
    let mut x1 = buf.input(base - t + 1);
    for i in from..n {
        let x0 = buf.input(i as isize - t + 2);
        let y = buf
            .input(i as isize)
            .wrapping_add(tap(g10, x2))
            .wrapping_add(tap(g11, x1.wrapping_add(x3)))
            .wrapping_add(tap(g12, x0.wrapping_add(x4)));
        buf.output(i, y);
        x4 = x3;
        x3 = x2;
        x2 = x1;
        x1 = x0;
    }
}

#[allow(clippy::too_many_arguments)]
fn comb_kernel<B: CombBuffer>(
    buf: &mut B,
    t0: usize,
    t1: usize,
    n: usize,
    g0: Val16,
    g1: Val16,
    tapset0: usize,
    tapset1: usize,
    window: &[Val16],
    overlap: usize,
) {
    if g0 == 0 && g1 == 0 {
        for i in 0..n {
            let v = buf.input(i as isize);
            buf.output(i, v);
        }
        return;
    }

    let gains = |g: Val16, tapset: usize| {
        COMB_GAINS[tapset].map(|tap_gain| mult16_16_p15(g, tap_gain) as Val16)
    };
    let [g00, g01, g02] = gains(g0, tapset0);
    let [g10, g11, g12] = gains(g1, tapset1);

    let overlap = if g0 == g1 && t0 == t1 && tapset0 == tapset1 {
        0
    } else {
        overlap.min(n)
    };

    let (t0, t1) = (t0 as isize, t1 as isize);
    let mut x1 = buf.input(-t1 + 1);
    let mut x2 = buf.input(-t1);
    let mut x3 = buf.input(-t1 - 1);
    let mut x4 = buf.input(-t1 - 2);
    for i in 0..overlap {
        let ii = i as isize;
        let x0 = buf.input(ii - t1 + 2);
        let f = mult16_16_q15(window[i], window[i]) as Val16;
        let fade = (Q15ONE as i32 - f as i32) as Val16;
        let old = |g: Val16| mult16_16_q15(fade, g) as Val16;
        let new = |g: Val16| mult16_16_q15(f, g) as Val16;
        let y = buf
            .input(ii)
            .wrapping_add(tap(old(g00), buf.input(ii - t0)))
            .wrapping_add(tap(
                old(g01),
                buf.input(ii - t0 + 1).wrapping_add(buf.input(ii - t0 - 1)),
            ))
            .wrapping_add(tap(
                old(g02),
                buf.input(ii - t0 + 2).wrapping_add(buf.input(ii - t0 - 2)),
            ))
            .wrapping_add(tap(new(g10), x2))
            .wrapping_add(tap(new(g11), x1.wrapping_add(x3)))
            .wrapping_add(tap(new(g12), x0.wrapping_add(x4)));
        buf.output(i, y);
        x4 = x3;
        x3 = x2;
        x2 = x1;
        x1 = x0;
    }

    if g1 == 0 {
        for i in overlap..n {
            let v = buf.input(i as isize);
            buf.output(i, v);
        }
        return;
    }

    comb_filter_const(buf, overlap, t1 as usize, n, g10, g11, g12);
}

/// Three-tap pitch comb filter from `x` into `y`, crossfading from the
/// `(t0, g0, tapset0)` filter to `(t1, g1, tapset1)` over `overlap` samples.
///
/// `x` starts with `history` samples of lookback that must cover the
/// longest period plus two.
#[allow(clippy::too_many_arguments)]
pub fn comb_filter(
    y: &mut [Sig],
    x: &[Sig],
    history: usize,
    t0: usize,
    t1: usize,
    n: usize,
    g0: Val16,
    g1: Val16,
    tapset0: usize,
    tapset1: usize,
    window: &[Val16],
    overlap: usize,
) {
    assert!(history >= t0.max(t1) + 2, "comb filter history too short");
    let mut buf = Split { y, x, history };
    comb_kernel(&mut buf, t0, t1, n, g0, g1, tapset0, tapset1, window, overlap);
}

/// Recursive form of [`comb_filter`] over `buf[start..start + n]`, reading
/// already filtered samples as its history.
#[allow(clippy::too_many_arguments)]
pub fn comb_filter_in_place(
    buf: &mut [Sig],
    start: usize,
    t0: usize,
    t1: usize,
    n: usize,
    g0: Val16,
    g1: Val16,
    tapset0: usize,
    tapset1: usize,
    window: &[Val16],
    overlap: usize,
) {
    assert!(start >= t0.max(t1) + 2, "comb filter history too short");
    let mut buf = InPlace { buf, start };
    comb_kernel(&mut buf, t0, t1, n, g0, g1, tapset0, tapset1, window, overlap);
}

/// Decimation factor from 48 kHz, or 0 for unsupported rates.
pub fn resampling_factor(rate: u32) -> usize {
    match rate {
        48000 => 1,
        24000 => 2,
        16000 => 3,
        12000 => 4,
        8000 => 6,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bands::FixedBands;
    use crate::utils::mdct::DirectMdct;

    fn ramp(len: usize, seed: i32) -> Vec<Sig> {
        (0..len as i32)
            .map(|i| ((i * 7919 + seed * 104_729) % 20011 - 10005) << 10)
            .collect()
    }

    #[test]
    fn preemphasis_paths_agree() {
        let mode = Mode::standard();
        let pcm: Vec<i16> = (0..960).map(|i| ((i * 37) % 2000 - 1000) as i16).collect();

        let mut fast = vec![0; 960];
        let mut fast_mem = 0;
        preemphasis(&pcm, &mut fast, 960, 1, 1, &mode.preemph, &mut fast_mem, false);

        let mut general = vec![0; 960];
        let mut general_mem = 0;
        preemphasis(&pcm, &mut general, 960, 1, 1, &mode.preemph, &mut general_mem, true);

        assert_eq!(fast, general);
        assert_eq!(fast_mem, general_mem);
        assert_eq!(fast[0], (pcm[0] as Sig) << SIG_SHIFT);
    }

    #[test]
    fn preemphasis_upsampling_zero_fills() {
        let mode = Mode::standard();
        let pcm: Vec<i16> = vec![1000, -1000, 1000, -1000, 500, 0, 0, 0];
        let mut out = vec![77; 8];
        let mut mem = 0;
        // Stereo interleave, left channel, upsampled by 2
        preemphasis(&pcm, &mut out, 8, 2, 2, &mode.preemph, &mut mem, false);
        assert_eq!(out[0], 1000 << SIG_SHIFT);
        assert_eq!(out[1], -(mult16_16(mode.preemph[0], 1000) >> 3));
        assert_eq!(out[7], 0);
        assert_eq!(mem, 0);
    }

    #[test]
    fn silent_frame_stays_silent() {
        let mode = Mode::standard();
        let mdct = DirectMdct::new(mode.mdct_size(), mode.max_lm);
        let lm = 3;
        let n = mode.frame_size(lm);
        let overlap = mode.overlap;

        let pcm = vec![0i16; 2 * n];
        let mut input = vec![0 as Sig; 2 * (n + overlap)];
        let mut pre_mem = [0 as Sig; 2];
        for ch in 0..2 {
            let dst = &mut input[ch * (n + overlap) + overlap..(ch + 1) * (n + overlap)];
            preemphasis(&pcm[ch..], dst, n, 2, 1, &mode.preemph, &mut pre_mem[ch], false);
        }
        let mut freq = vec![0 as Sig; 2 * n];
        compute_mdcts(mode, 0, &input, &mut freq, 2, 2, lm, 1, &mdct);
        assert!(freq.iter().all(|&v| v == 0));

        let x = vec![0 as Norm; 2 * n];
        let log_e = vec![-(28 << 10); 2 * mode.nb_ebands];
        let mut left = vec![0 as Sig; n + overlap];
        let mut right = vec![0 as Sig; n + overlap];
        {
            let mut out_syn = [left.as_mut_slice(), right.as_mut_slice()];
            synthesis(
                mode, &x, &mut out_syn, &log_e, 0, 21, 2, 2, false, lm, 1, true, &mdct,
                &FixedBands,
            );
        }

        let mut out = vec![1i16; 2 * n];
        let mut de_mem = [0 as Sig; 2];
        let saturated = deemphasis(
            &[left.as_slice(), right.as_slice()],
            &mut out,
            n,
            2,
            1,
            &mode.preemph,
            &mut de_mem,
            false,
        );
        assert_eq!(saturated, 0);
        assert!(out.iter().all(|&v| v == 0));
        assert_eq!(pre_mem, [0, 0]);
        assert_eq!(de_mem, [0, 0]);
    }

    #[test]
    fn stereo_downmix_averages_channels() {
        let mode = Mode::standard();
        let mdct = DirectMdct::new(mode.mdct_size(), mode.max_lm);
        let n = mode.frame_size(3);
        let input = ramp(2 * (n + mode.overlap), 3);

        let mut both = vec![0; 2 * n];
        compute_mdcts(mode, 0, &input, &mut both, 2, 2, 3, 1, &mdct);
        let mut mixed = vec![0; 2 * n];
        compute_mdcts(mode, 0, &input, &mut mixed, 1, 2, 3, 1, &mdct);
        for i in 0..n {
            assert_eq!(mixed[i], half32(both[i]) + half32(both[n + i]));
        }
    }

    #[test]
    fn upsampled_spectrum_is_scaled_and_truncated() {
        let mode = Mode::standard();
        let mdct = DirectMdct::new(mode.mdct_size(), mode.max_lm);
        let lm = 2;
        let n = mode.frame_size(lm);
        let input = ramp(2 * (n + mode.overlap), 11);

        for short_blocks in [0, 4] {
            let mut plain = vec![0; 2 * n];
            compute_mdcts(mode, short_blocks, &input, &mut plain, 2, 2, lm, 1, &mdct);
            let mut up = vec![0; 2 * n];
            compute_mdcts(mode, short_blocks, &input, &mut up, 2, 2, lm, 2, &mdct);

            for ch in 0..2 {
                let plain = &plain[ch * n..(ch + 1) * n];
                let up = &up[ch * n..(ch + 1) * n];
                for i in 0..n / 2 {
                    assert_eq!(up[i], plain[i] * 2, "channel {ch} bin {i}");
                }
                assert!(up[n / 2..].iter().all(|&v| v == 0));
                assert!(plain[n / 2..].iter().any(|&v| v != 0));
            }
        }
    }

    #[test]
    fn mono_to_stereo_duplicates_the_output() {
        let mode = Mode::standard();
        let mdct = DirectMdct::new(mode.mdct_size(), mode.max_lm);
        let lm = 1;
        let n = mode.frame_size(lm);
        let overlap = mode.overlap;
        let x: Vec<Norm> = (0..n).map(|i| if i % 5 == 0 { 9000 } else { -3000 }).collect();
        let log_e = vec![2 << 10; mode.nb_ebands];

        let mut left = vec![5 as Sig; n + overlap];
        let mut right = vec![5 as Sig; n + overlap];
        {
            let mut out_syn = [left.as_mut_slice(), right.as_mut_slice()];
            synthesis(
                mode, &x, &mut out_syn, &log_e, 0, 21, 1, 2, true, lm, 1, false, &mdct,
                &FixedBands,
            );
        }
        assert_eq!(left, right);
        assert!(left.iter().any(|&v| v != 5));
    }

    #[test]
    fn deemphasis_saturates_instead_of_wrapping() {
        let mode = Mode::standard();
        let x = vec![i32::MAX - 10, 0, 0, 0];
        let mut mem = [1_000_000 as Sig];
        let mut pcm = vec![0i16; 4];
        let saturated = deemphasis(&[x.as_slice()], &mut pcm, 4, 1, 1, &mode.preemph, &mut mem, false);
        assert_eq!(saturated, 1);
        assert_eq!(pcm[0], 32767);
        assert!(pcm[1] > 0);

        let mut pcm = vec![32000i16; 4];
        let mut mem = [0 as Sig];
        let loud = vec![4096 * 2000; 4];
        deemphasis(&[loud.as_slice()], &mut pcm, 4, 1, 1, &mode.preemph, &mut mem, true);
        assert!(pcm.iter().all(|&v| v == 32767));
    }

    #[test]
    fn deemphasis_decimates() {
        let mode = Mode::standard();
        let x: Vec<Sig> = (0..12).map(|i| (i as Sig * 100) << SIG_SHIFT).collect();
        let mut full = vec![0i16; 12];
        let mut mem = [0 as Sig];
        deemphasis(&[x.as_slice()], &mut full, 12, 1, 1, &mode.preemph, &mut mem, false);

        let mut decimated = vec![0i16; 4];
        let mut mem = [0 as Sig];
        deemphasis(&[x.as_slice()], &mut decimated, 12, 1, 3, &mode.preemph, &mut mem, false);
        assert_eq!(decimated, vec![full[0], full[3], full[6], full[9]]);
    }

    #[test]
    fn comb_filter_without_gain_passes_through() {
        let mode = Mode::standard();
        let history = 1026;
        let x = ramp(history + 480, 11);
        for (t0, t1) in [(15, 15), (100, 480), (1024, 37)] {
            let mut y = vec![0; 480];
            comb_filter(&mut y, &x, history, t0, t1, 480, 0, 0, 0, 2, &mode.window, 120);
            assert_eq!(y, x[history..]);

            let mut buf = x.clone();
            comb_filter_in_place(&mut buf, history, t0, t1, 480, 0, 0, 1, 0, &mode.window, 120);
            assert_eq!(buf, x);
        }
    }

    #[test]
    fn unchanged_comb_filter_skips_the_crossfade() {
        let mode = Mode::standard();
        let history = 300;
        let x = ramp(history + 240, 5);
        let mut faded = vec![0; 240];
        comb_filter(&mut faded, &x, history, 200, 200, 240, 9000, 9000, 1, 1, &mode.window, 120);
        let mut plain = vec![0; 240];
        comb_filter(&mut plain, &x, history, 200, 200, 240, 9000, 9000, 1, 1, &mode.window, 0);
        assert_eq!(faded, plain);
        assert_ne!(faded, x[history..]);
    }

    #[test]
    fn comb_filter_crossfades_through_the_window() {
        let window: [Val16; 4] = [8192, 16384, 23170, 32767];
        let history = 8;
        let x: Vec<Sig> = [
            -50, -13, -3, -20, 37, -34, -31, 46, // history
            -5, 18, 14, -17, 26, 42,
        ]
        .iter()
        .map(|&v| v * 4096)
        .collect();

        // Period 3 on tapset 2 at a quarter gain fading into period 2 on
        // tapset 1 at half gain; the last two samples use the new filter only
        let mut y = vec![0; 6];
        comb_filter(&mut y, &x, history, 3, 2, 6, 8192, 16384, 2, 1, &window, 4);
        assert_eq!(y, [-47438, 61595, 89521, -47596, 120345, 177842]);

        // Without the crossfade the new filter starts at once
        let mut abrupt = vec![0; 6];
        comb_filter(&mut abrupt, &x, history, 3, 2, 6, 8192, 16384, 2, 1, &window, 0);
        assert_eq!(abrupt[4..], y[4..]);
        assert_ne!(abrupt[..4], y[..4]);
    }

    #[test]
    fn in_place_comb_filter_feeds_back() {
        let mode = Mode::standard();
        let history = 40;
        let x = ramp(history + 120, 2);
        let mut fir = vec![0; 120];
        comb_filter(&mut fir, &x, history, 20, 20, 120, 16000, 16000, 2, 2, &mode.window, 120);

        let mut iir = x.clone();
        comb_filter_in_place(&mut iir, history, 20, 20, 120, 16000, 16000, 2, 2, &mode.window, 120);
        // Identical until the first filtered sample is read back
        assert_eq!(iir[history..history + 18], fir[..18]);
        assert_ne!(iir[history..], fir[..]);
    }

    #[test]
    fn resampling_factors() {
        assert_eq!(resampling_factor(48000), 1);
        assert_eq!(resampling_factor(16000), 3);
        assert_eq!(resampling_factor(8000), 6);
        assert_eq!(resampling_factor(44100), 0);
    }
}
