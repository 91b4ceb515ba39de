//! Data structures shared by the processing stages.
//!
//! Contains the immutable mode configuration, the per-frame context, the
//! external psychoacoustic analysis record and the persistent filter state
//! carried between frames.

pub mod analysis;
pub mod frame;
pub mod mode;
pub mod state;
