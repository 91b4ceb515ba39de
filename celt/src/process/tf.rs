//! Time-frequency resolution selection and its entropy coding.
//!
//! Each band may trade time resolution for frequency resolution by a few
//! Haar steps. The encoder picks a per-band change that minimises an L1
//! sparsity cost plus a switching penalty, then codes the choice as
//! differential bits that both sides skip once the budget runs out.

use log::{debug, trace};

use crate::structs::mode::Mode;
use crate::utils::bands::BandOps;
use crate::utils::fixed::{Norm, mac16_32_q15, mult16_16_q14, qconst16};
use crate::utils::range_coder::{EntropyDecoder, EntropyEncoder};
use crate::utils::tables::TF_SELECT_TABLE;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TfAnalysis {
    pub tf_select: usize,
    /// Sum of the per-band resolution changes, for diagnostics.
    pub tf_sum: i32,
}

/// Sparsity cost of `tmp`: its L1 norm biased towards lower `lm`.
pub fn l1_metric(tmp: &[Norm], n: usize, lm: i32, bias: i16) -> i32 {
    let l1: i32 = tmp[..n].iter().map(|&v| (v as i32).abs()).sum();
    mac16_32_q15(l1, (lm * bias as i32) as i16, l1)
}

/// Target resolution change for each state under `tf_select`.
fn select_targets(lm: usize, is_transient: bool, tf_select: usize) -> [i32; 2] {
    let base = 4 * is_transient as usize + 2 * tf_select;
    [
        TF_SELECT_TABLE[lm][base] as i32,
        TF_SELECT_TABLE[lm][base + 1] as i32,
    ]
}

/// Two-state shortest path over the bands. `from[i][s]` is the state of
/// band `i - 1` on the best path reaching state `s` at band `i`.
struct TfPath {
    cost: [i32; 2],
    from: Vec<[u8; 2]>,
}

impl TfPath {
    fn solve(metric: &[i32], lambda: i32, is_transient: bool, targets: [i32; 2]) -> Self {
        let mut cost = [0, if is_transient { 0 } else { lambda }];
        let mut from = vec![[0u8; 2]; metric.len()];
        for (i, &m) in metric.iter().enumerate().skip(1) {
            let mut next = [0; 2];
            for s in 0..2 {
                let from0 = cost[0] + if s == 0 { 0 } else { lambda };
                let from1 = cost[1] + if s == 1 { 0 } else { lambda };
                // Ties resolve to state 1
                let (best, pred) = if from0 < from1 { (from0, 0) } else { (from1, 1) };
                next[s] = best + (m - 2 * targets[s]).abs();
                from[i][s] = pred;
            }
            cost = next;
        }
        Self { cost, from }
    }

    fn min_cost(&self) -> i32 {
        self.cost[0].min(self.cost[1])
    }

    /// Backtracks the best path into `tf_res`.
    fn trace(&self, tf_res: &mut [i32]) {
        let len = self.from.len();
        let mut state = if self.cost[0] < self.cost[1] { 0 } else { 1 };
        tf_res[len - 1] = state as i32;
        for i in (0..len - 1).rev() {
            state = self.from[i + 1][state] as usize;
            tf_res[i] = state as i32;
        }
    }
}

/// Picks the per-band TF change and the `tf_select` table half.
///
/// `x` holds the normalised spectrum of every channel, `n0` bins apart;
/// only channel `tf_chan` is inspected. `tf_res` receives one raw path
/// state (0 or 1) per band in `0..len`.
#[allow(clippy::too_many_arguments)]
pub fn tf_analysis<B: BandOps + ?Sized>(
    mode: &Mode,
    len: usize,
    is_transient: bool,
    tf_res: &mut [i32],
    lambda: i32,
    x: &[Norm],
    n0: usize,
    lm: usize,
    tf_estimate: i32,
    tf_chan: usize,
    bands: &B,
) -> TfAnalysis {
    let bias = mult16_16_q14(
        qconst16(0.04, 15),
        (qconst16(0.5, 14) as i32 - tf_estimate).max(-(qconst16(0.25, 14) as i32)) as i16,
    ) as i16;
    let lm_i = lm as i32;

    let max_width = (0..len).map(|i| mode.band_width(i, lm)).max().unwrap_or(0);
    let mut tmp = vec![0 as Norm; max_width];
    let mut tmp1 = vec![0 as Norm; max_width];
    let mut metric = vec![0i32; len];
    let mut tf_sum = 0;

    for (i, band_metric) in metric.iter_mut().enumerate() {
        let n = mode.band_width(i, lm);
        let narrow = mode.ebands[i + 1] - mode.ebands[i] == 1;
        let lo = tf_chan * n0 + mode.band_start(i, lm);
        tmp[..n].copy_from_slice(&x[lo..lo + n]);

        let mut best_l1 = l1_metric(&tmp, n, if is_transient { lm_i } else { 0 }, bias);
        let mut best_level = 0i32;

        // One extra time split for transient frames
        if is_transient && !narrow {
            tmp1[..n].copy_from_slice(&tmp[..n]);
            bands.haar1(&mut tmp1[..n], n >> lm, 1 << lm);
            let l1 = l1_metric(&tmp1, n, lm_i + 1, bias);
            if l1 < best_l1 {
                best_l1 = l1;
                best_level = -1;
            }
        }

        let levels = lm + (!(is_transient || narrow)) as usize;
        for k in 0..levels {
            let b = if is_transient {
                lm_i - k as i32 - 1
            } else {
                k as i32 + 1
            };
            bands.haar1(&mut tmp[..n], n >> k, 1 << k);
            let l1 = l1_metric(&tmp, n, b, bias);
            if l1 < best_l1 {
                best_l1 = l1;
                best_level = k as i32 + 1;
            }
        }

        *band_metric = if is_transient {
            2 * best_level
        } else {
            -2 * best_level
        };
        tf_sum += if is_transient { lm_i } else { 0 } - *band_metric / 2;

        // Single-bin bands cannot express these levels, keep them apart
        if narrow && (*band_metric == 0 || *band_metric == -2 * lm_i) {
            *band_metric -= 1;
        }
    }

    let sel_cost = [0, 1].map(|sel| {
        TfPath::solve(&metric, lambda, is_transient, select_targets(lm, is_transient, sel))
            .min_cost()
    });
    let tf_select = usize::from(sel_cost[1] < sel_cost[0] && is_transient);

    let path = TfPath::solve(
        &metric,
        lambda,
        is_transient,
        select_targets(lm, is_transient, tf_select),
    );
    path.trace(&mut tf_res[..len]);

    trace!("tf analysis: select {tf_select}, sum {tf_sum}, metric {metric:?}");
    TfAnalysis { tf_select, tf_sum }
}

/// Probabilities of the first and subsequent differential TF bits.
fn tf_logp(is_transient: bool) -> (u32, u32) {
    if is_transient { (2, 4) } else { (4, 5) }
}

/// Whether the two table halves differ for the current path, which is the
/// only case where coding `tf_select` carries information.
fn tf_select_matters(lm: usize, is_transient: bool, tf_changed: usize) -> bool {
    let base = 4 * is_transient as usize + tf_changed;
    TF_SELECT_TABLE[lm][base] != TF_SELECT_TABLE[lm][base + 2]
}

/// Codes the raw path states in `tf_res[start..end]` and rewrites them to
/// resolved resolution changes. Returns the `tf_select` actually coded.
#[allow(clippy::too_many_arguments)]
pub fn tf_encode<E: EntropyEncoder + ?Sized>(
    start: usize,
    end: usize,
    is_transient: bool,
    tf_res: &mut [i32],
    lm: usize,
    mut tf_select: usize,
    enc: &mut E,
) -> usize {
    let mut budget = enc.storage() * 8;
    let mut tell = enc.tell();
    let (mut logp, next_logp) = tf_logp(is_transient);

    let select_rsv = lm > 0 && tell + logp + 1 <= budget;
    budget -= select_rsv as u32;

    let mut curr = 0;
    let mut tf_changed = 0;
    let mut exhausted = false;
    for (i, res) in tf_res.iter_mut().enumerate().take(end).skip(start) {
        if tell + logp <= budget {
            enc.enc_bit_logp((*res ^ curr) != 0, logp);
            tell = enc.tell();
            curr = *res;
            tf_changed |= curr;
        } else {
            if !exhausted {
                debug!("TF budget exhausted at band {i}, repeating {curr}");
                exhausted = true;
            }
            *res = curr;
        }
        logp = next_logp;
    }

    if select_rsv && tf_select_matters(lm, is_transient, tf_changed as usize) {
        enc.enc_bit_logp(tf_select != 0, 1);
    } else {
        tf_select = 0;
    }

    resolve(tf_res, start, end, lm, is_transient, tf_select);
    tf_select
}

/// Decodes what [`tf_encode`] wrote into resolved per-band changes.
/// Returns the decoded `tf_select`.
pub fn tf_decode<D: EntropyDecoder + ?Sized>(
    start: usize,
    end: usize,
    is_transient: bool,
    tf_res: &mut [i32],
    lm: usize,
    dec: &mut D,
) -> usize {
    let mut budget = dec.storage() * 8;
    let mut tell = dec.tell();
    let (mut logp, next_logp) = tf_logp(is_transient);

    let select_rsv = lm > 0 && tell + logp + 1 <= budget;
    budget -= select_rsv as u32;

    let mut curr = 0;
    let mut tf_changed = 0;
    for res in tf_res.iter_mut().take(end).skip(start) {
        if tell + logp <= budget {
            curr ^= dec.dec_bit_logp(logp) as i32;
            tell = dec.tell();
            tf_changed |= curr;
        }
        *res = curr;
        logp = next_logp;
    }

    let tf_select = if select_rsv && tf_select_matters(lm, is_transient, tf_changed as usize) {
        dec.dec_bit_logp(1) as usize
    } else {
        0
    };

    resolve(tf_res, start, end, lm, is_transient, tf_select);
    tf_select
}

fn resolve(
    tf_res: &mut [i32],
    start: usize,
    end: usize,
    lm: usize,
    is_transient: bool,
    tf_select: usize,
) {
    let base = 4 * is_transient as usize + 2 * tf_select;
    for res in &mut tf_res[start..end] {
        *res = TF_SELECT_TABLE[lm][base + *res as usize] as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bands::FixedBands;
    use crate::utils::range_coder::{RangeDecoder, RangeEncoder};

    struct XorShift(u32);

    impl XorShift {
        fn next(&mut self) -> u32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 17;
            self.0 ^= self.0 << 5;
            self.0
        }
    }

    fn round_trip(
        storage: usize,
        is_transient: bool,
        lm: usize,
        raw: &[i32],
        tf_select: usize,
    ) -> (Vec<i32>, usize, Vec<i32>, usize) {
        let end = raw.len();
        let mut enc = RangeEncoder::new(storage);
        let mut encoded = raw.to_vec();
        let sel_enc = tf_encode(0, end, is_transient, &mut encoded, lm, tf_select, &mut enc);
        let buf = enc.finish();

        let mut dec = RangeDecoder::new(&buf);
        let mut decoded = vec![0; end];
        let sel_dec = tf_decode(0, end, is_transient, &mut decoded, lm, &mut dec);
        (encoded, sel_enc, decoded, sel_dec)
    }

    #[test]
    fn l1_metric_penalises_higher_levels() {
        let tmp: Vec<Norm> = vec![100, -200, 300, -400];
        assert_eq!(l1_metric(&tmp, 4, 0, 1000), 1000);
        // 1000 + 1000 * 2000 / 32768
        assert_eq!(l1_metric(&tmp, 4, 2, 1000), 1061);
    }

    #[test]
    fn viterbi_prefers_state_one_on_ties() {
        let metric = vec![0, 0, 0];
        let mut tf_res = vec![9; 3];
        TfPath::solve(&metric, 0, true, [0, 0]).trace(&mut tf_res);
        assert_eq!(tf_res, vec![1, 1, 1]);

        // A strong switching penalty keeps the path in one state
        let metric = vec![0, -2, 0, -2, 0];
        let mut tf_res = vec![0; 5];
        TfPath::solve(&metric, 100, false, [0, -1]).trace(&mut tf_res);
        assert!(tf_res.iter().all(|&s| s == tf_res[0]));
    }

    #[test]
    fn analysis_round_trips_through_the_coder() {
        let mode = Mode::standard();
        let mut rng = XorShift(0xdead_beef);
        for &(lm, is_transient) in &[(0, false), (1, false), (2, true), (3, true), (3, false)] {
            let n = mode.frame_size(lm);
            let x: Vec<Norm> = (0..2 * n)
                .map(|_| (rng.next() % 16000) as i32 as Norm - 8000)
                .collect();
            let len = mode.nb_ebands;
            let mut raw = vec![0; len];
            let analysis = tf_analysis(
                mode,
                len,
                is_transient,
                &mut raw,
                12,
                &x,
                n,
                lm,
                4000,
                1,
                &FixedBands,
            );
            assert!(raw.iter().all(|&s| s == 0 || s == 1));
            assert!(analysis.tf_select <= 1);
            if !is_transient {
                assert_eq!(analysis.tf_select, 0);
            }

            let (encoded, sel_enc, decoded, sel_dec) =
                round_trip(200, is_transient, lm, &raw, analysis.tf_select);
            assert_eq!(encoded, decoded, "lm {lm} transient {is_transient}");
            assert_eq!(sel_enc, sel_dec);
        }
    }

    #[test]
    fn random_paths_round_trip() {
        let mut rng = XorShift(42);
        for trial in 0..200 {
            let lm = (rng.next() % 4) as usize;
            let is_transient = rng.next() % 2 == 1;
            let tf_select = (rng.next() % 2) as usize;
            let len = 1 + (rng.next() % 21) as usize;
            let raw: Vec<i32> = (0..len).map(|_| (rng.next() % 2) as i32).collect();
            let storage = 1 + (rng.next() % 8) as usize;

            let (encoded, sel_enc, decoded, sel_dec) =
                round_trip(storage, is_transient, lm, &raw, tf_select);
            assert_eq!(encoded, decoded, "trial {trial}");
            assert_eq!(sel_enc, sel_dec, "trial {trial}");
        }
    }

    #[test]
    fn exhausted_budget_repeats_the_last_value() {
        // One byte holds two differential bits plus the reserved select bit
        let raw = vec![1, 0, 1, 0, 1, 0, 1, 0];
        let (encoded, _, decoded, sel) = round_trip(1, true, 3, &raw, 1);
        assert_eq!(encoded, decoded);
        assert_eq!(sel, 1);
        let tail = decoded[1];
        assert!(decoded[2..].iter().all(|&v| v == tail));
    }

    #[test]
    fn non_transient_long_frames_resolve_to_zero() {
        let raw = vec![0; 10];
        let (encoded, sel, decoded, _) = round_trip(100, false, 3, &raw, 0);
        assert_eq!(sel, 0);
        assert!(encoded.iter().all(|&v| v == TF_SELECT_TABLE[3][0] as i32));
        assert_eq!(encoded, decoded);
    }
}
