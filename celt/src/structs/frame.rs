use anyhow::{Result, bail};

use crate::structs::mode::Mode;
use crate::utils::errors::FrameError;

/// Per-frame scalars shared by every stage of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Coded channels.
    pub c: usize,
    /// Channels on the PCM side.
    pub cc: usize,
    pub lm: usize,
    /// Number of short MDCTs, or 0 for a single long MDCT.
    pub short_blocks: usize,
    pub start: usize,
    pub end: usize,
    /// End of the bands below the coded bandwidth.
    pub eff_end: usize,
    pub silence: bool,
    pub is_transient: bool,
    pub vbr: bool,
    pub constrained_vbr: bool,
}

impl FrameContext {
    pub fn new(
        mode: &Mode,
        c: usize,
        cc: usize,
        frame_size: usize,
        start: usize,
        end: usize,
    ) -> Result<Self> {
        for channels in [c, cc] {
            if !(1..=2).contains(&channels) {
                bail!(FrameError::InvalidChannelCount(channels));
            }
        }
        let Some(lm) = mode.lm_for_frame_size(frame_size) else {
            bail!(FrameError::UnsupportedFrameSize {
                frame_size,
                short_mdct_size: mode.short_mdct_size,
                max_lm: mode.max_lm,
            });
        };
        if start >= end || end > mode.nb_ebands {
            bail!(FrameError::InvalidBandRange {
                start,
                end,
                nb_ebands: mode.nb_ebands,
            });
        }

        Ok(Self {
            c,
            cc,
            lm,
            short_blocks: 0,
            start,
            end,
            eff_end: end.min(mode.eff_ebands),
            silence: false,
            is_transient: false,
            vbr: false,
            constrained_vbr: false,
        })
    }

    /// Block multiplier `1 << lm`.
    #[inline]
    pub fn m(&self) -> usize {
        1 << self.lm
    }

    /// Frame length in samples per channel.
    #[inline]
    pub fn n(&self, mode: &Mode) -> usize {
        mode.short_mdct_size << self.lm
    }

    /// Marks the frame transient and switches it to short blocks.
    pub fn set_transient(&mut self, is_transient: bool) {
        self.is_transient = is_transient;
        self.short_blocks = if is_transient { self.m() } else { 0 };
    }
}

#[test]
fn test_frame_context_validation() {
    let mode = Mode::standard();
    let mut frame = FrameContext::new(mode, 2, 2, 960, 0, 21).unwrap();
    assert_eq!(frame.lm, 3);
    assert_eq!(frame.n(mode), 960);
    frame.set_transient(true);
    assert_eq!(frame.short_blocks, 8);

    assert!(FrameContext::new(mode, 3, 2, 960, 0, 21).is_err());
    assert!(FrameContext::new(mode, 1, 1, 100, 0, 21).is_err());
    assert!(FrameContext::new(mode, 1, 1, 120, 5, 5).is_err());
    assert!(FrameContext::new(mode, 1, 1, 120, 0, 22).is_err());
}
