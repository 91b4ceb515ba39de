//! Utility functions and supporting infrastructure.
//!
//! Provides the fixed-point kernel, the range coder, the transform, band
//! operations, pitch primitives, static tables and error types the
//! processing stages are built on.

pub mod bands;
pub mod errors;
pub mod fixed;
pub mod mdct;
pub mod pitch;
pub mod range_coder;
pub mod tables;
