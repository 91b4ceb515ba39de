/// Time-domain conditioning around the transform.
///
/// Pre-emphasis, MDCT framing, synthesis, de-emphasis and the pitch comb
/// post-filter.
pub mod conditioning;

/// Transient detection and the energy-jump override.
pub mod transient;

/// Mid/side versus left/right cost estimate.
pub mod stereo;

/// Time-frequency resolution search and its range-coded representation.
pub mod tf;

/// VBR target, allocation trim, dynamic allocation boosts and band caps.
pub mod rate;

/// Pitch lag search over the decoded history for loss concealment.
pub mod plc;

/// Per-frame analysis driver.
///
/// Provides the [`FrameAnalyzer`](analyze::FrameAnalyzer), which runs every
/// analysis stage on successive PCM frames and returns
/// [`FrameDecisions`](analyze::FrameDecisions).
pub mod analyze;

/// Per-frame synthesis driver.
///
/// Provides the [`FrameSynthesizer`](synthesize::FrameSynthesizer), which
/// reads back the coded TF decisions and rebuilds PCM from analysed frames.
pub mod synthesize;
