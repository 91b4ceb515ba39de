//! Filter and history state carried from one frame to the next.
//!
//! Every record here is owned by a codec instance and handed to the
//! conditioning stages by `&mut`; none of it lives in module statics.

use crate::utils::fixed::Sig;

/// Decoder history kept per channel, ahead of the overlap region.
pub const DECODE_BUFFER_SIZE: usize = 2048;

pub const COMBFILTER_MINPERIOD: usize = 15;
pub const COMBFILTER_MAXPERIOD: usize = 1024;

/// One pre-emphasis tap per channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreemphasisState {
    pub mem: [Sig; 2],
}

/// One de-emphasis tap per channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeemphasisState {
    pub mem: [Sig; 2],
}

/// Comb post-filter parameters of the current and previous frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostfilterState {
    pub period: usize,
    pub period_old: usize,
    /// Q15 gain.
    pub gain: i16,
    pub gain_old: i16,
    pub tapset: usize,
    pub tapset_old: usize,
}

impl Default for PostfilterState {
    fn default() -> Self {
        Self {
            period: COMBFILTER_MINPERIOD,
            period_old: COMBFILTER_MINPERIOD,
            gain: 0,
            gain_old: 0,
            tapset: 0,
            tapset_old: 0,
        }
    }
}

/// Parameters of the post-filter for one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PostfilterParams {
    pub period: usize,
    pub gain: i16,
    pub tapset: usize,
}

impl PostfilterState {
    /// Shifts the filter history after a frame has been filtered with
    /// `next`. Frames longer than one short block have already crossfaded
    /// to `next`, so the old parameters catch up as well.
    pub fn advance(&mut self, next: PostfilterParams, lm: usize) {
        self.period_old = self.period;
        self.gain_old = self.gain;
        self.tapset_old = self.tapset;
        self.period = next.period;
        self.gain = next.gain;
        self.tapset = next.tapset;
        if lm != 0 {
            self.period_old = self.period;
            self.gain_old = self.gain;
            self.tapset_old = self.tapset;
        }
    }
}

/// Rolling decoded signal per channel: `DECODE_BUFFER_SIZE` samples of
/// history followed by the `overlap` tail of the last inverse transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeHistory {
    channels: Vec<Vec<Sig>>,
    overlap: usize,
}

impl DecodeHistory {
    pub fn new(channels: usize, overlap: usize) -> Self {
        Self {
            channels: vec![vec![0; DECODE_BUFFER_SIZE + overlap]; channels],
            overlap,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn channel(&self, c: usize) -> &[Sig] {
        &self.channels[c]
    }

    pub fn channel_mut(&mut self, c: usize) -> &mut [Sig] {
        &mut self.channels[c]
    }

    /// All channels as slices, for read-only consumers such as the PLC.
    pub fn channels(&self) -> Vec<&[Sig]> {
        self.channels.iter().map(Vec::as_slice).collect()
    }

    /// Drops the oldest `n` samples to make room for a new frame.
    pub fn shift(&mut self, n: usize) {
        for ch in &mut self.channels {
            ch.copy_within(n.., 0);
        }
    }

    /// Synthesis windows: the last `n + overlap` samples of each channel.
    pub fn synthesis_windows(&mut self, n: usize) -> Vec<&mut [Sig]> {
        let from = DECODE_BUFFER_SIZE - n;
        self.channels.iter_mut().map(|ch| &mut ch[from..]).collect()
    }

    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_shift_keeps_the_tail() {
        let mut history = DecodeHistory::new(1, 4);
        for (i, v) in history.channel_mut(0).iter_mut().enumerate() {
            *v = i as Sig;
        }
        history.shift(8);
        let ch = history.channel(0);
        assert_eq!(ch[0], 8);
        assert_eq!(ch[DECODE_BUFFER_SIZE + 4 - 9], DECODE_BUFFER_SIZE as Sig + 3);

        let windows = history.synthesis_windows(960);
        assert_eq!(windows[0].len(), 960 + 4);
    }

    #[test]
    fn postfilter_advance_catches_up_on_long_frames() {
        let mut state = PostfilterState::default();
        let next = PostfilterParams {
            period: 100,
            gain: 8000,
            tapset: 1,
        };
        state.advance(next, 0);
        assert_eq!(state.period, 100);
        assert_eq!(state.period_old, COMBFILTER_MINPERIOD);

        state.advance(next, 3);
        assert_eq!(state.period_old, 100);
        assert_eq!(state.gain_old, 8000);
    }
}
