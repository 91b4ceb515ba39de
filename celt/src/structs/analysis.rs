/// Long-term psychoacoustic analysis computed outside the core.
///
/// An invalid record (the default) makes every dependent computation
/// contribute nothing.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AnalysisInfo {
    pub valid: bool,
    /// Tonality estimate in `[0, 1]`.
    pub tonality: f32,
    /// Spectral slope of the tonality across bands.
    pub tonality_slope: f32,
    /// Voice/music activity in `[0, 1]`.
    pub activity: f32,
    pub pitch_change: bool,
}

impl AnalysisInfo {
    pub fn new(tonality: f32, tonality_slope: f32, activity: f32, pitch_change: bool) -> Self {
        Self {
            valid: true,
            tonality,
            tonality_slope,
            activity,
            pitch_change,
        }
    }
}
