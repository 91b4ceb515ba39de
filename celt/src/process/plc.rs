use log::trace;

use crate::structs::state::DECODE_BUFFER_SIZE;
use crate::utils::fixed::{Sig, Val16};
use crate::utils::pitch::PitchAnalysis;

pub const PLC_PITCH_LAG_MAX: usize = 720;
pub const PLC_PITCH_LAG_MIN: usize = 100;

/// Estimates the pitch period of the decoded history, in samples, for
/// concealing a lost frame. `decode_mem` holds at least
/// `DECODE_BUFFER_SIZE` samples for each of the first `c` channels.
pub fn plc_pitch_search<P: PitchAnalysis + ?Sized>(
    decode_mem: &[&[Sig]],
    c: usize,
    pitch: &P,
) -> usize {
    let mut lp_pitch_buf: Vec<Val16> = vec![0; DECODE_BUFFER_SIZE >> 1];
    pitch.pitch_downsample(&decode_mem[..c], &mut lp_pitch_buf, DECODE_BUFFER_SIZE);
    let index = pitch.pitch_search(
        &lp_pitch_buf[PLC_PITCH_LAG_MAX >> 1..],
        &lp_pitch_buf,
        DECODE_BUFFER_SIZE - PLC_PITCH_LAG_MAX,
        PLC_PITCH_LAG_MAX - PLC_PITCH_LAG_MIN,
    );
    let lag = PLC_PITCH_LAG_MAX - index;
    trace!("PLC pitch lag {lag}");
    lag
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::utils::pitch::XcorrPitch;

    #[derive(Default)]
    struct FixedLag {
        calls: RefCell<Vec<(usize, usize, usize, usize)>>,
    }

    impl PitchAnalysis for FixedLag {
        fn pitch_downsample(&self, x: &[&[Sig]], x_lp: &mut [Val16], len: usize) {
            self.calls.borrow_mut().push((x.len(), x_lp.len(), len, 0));
        }

        fn pitch_search(&self, x_lp: &[Val16], y: &[Val16], len: usize, max_pitch: usize) -> usize {
            self.calls.borrow_mut().push((x_lp.len(), y.len(), len, max_pitch));
            100
        }
    }

    #[test]
    fn lag_is_measured_from_the_window_end() {
        let history = vec![vec![0 as Sig; DECODE_BUFFER_SIZE + 120]; 2];
        let channels: Vec<&[Sig]> = history.iter().map(Vec::as_slice).collect();
        let mock = FixedLag::default();
        assert_eq!(plc_pitch_search(&channels, 2, &mock), 620);

        let calls = mock.calls.borrow();
        assert_eq!(calls[0], (2, 1024, 2048, 0));
        assert_eq!(calls[1], (1024 - 360, 1024, 2048 - 720, 620));
    }

    #[test]
    fn mono_uses_only_the_first_channel() {
        let history = vec![vec![0 as Sig; DECODE_BUFFER_SIZE]; 2];
        let channels: Vec<&[Sig]> = history.iter().map(Vec::as_slice).collect();
        let mock = FixedLag::default();
        plc_pitch_search(&channels, 1, &mock);
        assert_eq!(mock.calls.borrow()[0].0, 1);
    }

    #[test]
    fn periodic_history_yields_its_period() {
        let period = 240;
        let signal: Vec<Sig> = (0..DECODE_BUFFER_SIZE)
            .map(|i| if i % period < 3 { 16_000 << 12 } else { 0 })
            .collect();
        let lag = plc_pitch_search(&[signal.as_slice()], 1, &XcorrPitch);
        assert!((PLC_PITCH_LAG_MIN..=PLC_PITCH_LAG_MAX).contains(&lag));
        assert_eq!(lag % period, 0, "lag {lag}");
    }
}
