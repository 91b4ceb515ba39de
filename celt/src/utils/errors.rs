/// Logs `$err` at `$level`, or returns it when `$level` is at least as severe
/// as `$state.fail_level`.
#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ModeError {
    #[error("Mode must have between 1 and {max} bands, got {actual}")]
    BandCount { actual: usize, max: usize },

    #[error("Band edges must be strictly increasing, edge {index} = {value}")]
    BandEdgesNotIncreasing { index: usize, value: i16 },

    #[error("{table} has {actual} entries, expected {expected}")]
    TableLength {
        table: &'static str,
        actual: usize,
        expected: usize,
    },

    #[error("Overlap {overlap} must be even and not exceed the short MDCT size {short_mdct_size}")]
    InvalidOverlap {
        overlap: usize,
        short_mdct_size: usize,
    },

    #[error("max_lm must be at most 3, got {0}")]
    InvalidMaxLm(usize),

    #[error("Last band edge {last} exceeds the short MDCT size {short_mdct_size}")]
    BandsExceedMdct { last: i16, short_mdct_size: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("Channel count must be 1 or 2, got {0}")]
    InvalidChannelCount(usize),

    #[error("Frame size {frame_size} is not a power-of-two multiple of {short_mdct_size} up to LM {max_lm}")]
    UnsupportedFrameSize {
        frame_size: usize,
        short_mdct_size: usize,
        max_lm: usize,
    },

    #[error("Unsupported sampling rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Invalid band range: start = {start}, end = {end}, band count = {nb_ebands}")]
    InvalidBandRange {
        start: usize,
        end: usize,
        nb_ebands: usize,
    },

    #[error("Expected {expected} interleaved samples, got {actual}")]
    InputLength { expected: usize, actual: usize },

    #[error("Expected {expected} output samples, got {actual}")]
    OutputLength { expected: usize, actual: usize },

    #[error("Bitrate must be positive, got {0}")]
    InvalidBitrate(i32),

    #[error("Post-filter tapset must be below 3, got {0}")]
    InvalidTapset(usize),

    #[error("Post-filter period {period} outside [{min}, {max}]")]
    InvalidPeriod {
        period: usize,
        min: usize,
        max: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("Range encoder overflowed its {storage}-byte budget in frame {frame}")]
    RangeEncoderOverflow { storage: usize, frame: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("De-emphasis saturated on {samples} samples in frame {frame}")]
    DeemphasisSaturated { samples: usize, frame: u64 },

    #[error("Range decoder overran the {storage}-byte budget")]
    RangeDecoderOverrun { storage: u32 },
}
