#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Fixed-point perceptual analysis and rate control for the CELT layer.
//!
//! ### Frame Structure
//!
//! A frame holds `short_mdct_size << LM` samples per channel, transformed
//! either with one long MDCT or with `1 << LM` short ones. Energies are
//! grouped into bands whose edges come from the [`structs::mode::Mode`].
//!
//! ### Numeric Formats
//!
//! - Signal samples: Q12 in `i32`
//! - Normalised coefficients: Q14 in `i16`
//! - Log energies: Q10 log2 in `i32`
//!
//! ## Quick Start
//!
//! 1. Analyse PCM frames with [`process::analyze::FrameAnalyzer`]
//! 2. Read back the coded TF decisions with [`process::synthesize::FrameSynthesizer::decode_tf`]
//! 3. Rebuild PCM with [`process::synthesize::FrameSynthesizer::synthesize`]
//!
//! ```rust,no_run
//! use celt::process::analyze::{AnalyzerConfig, FrameAnalyzer};
//! use celt::structs::mode::Mode;
//!
//! let mode = Mode::standard();
//! let mut analyzer = FrameAnalyzer::new(mode, AnalyzerConfig::default())?;
//!
//! let pcm = vec![0i16; 2 * 960];
//! let decisions = analyzer.analyze(&pcm)?;
//! println!("transient: {}, trim: {}", decisions.is_transient, decisions.alloc_trim);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Processing stages and frame drivers.
///
/// 1. **Conditioning** ([`process::conditioning`]): Filters and transform framing.
///
/// 2. **Analysis** ([`process::transient`], [`process::stereo`], [`process::tf`],
///    [`process::rate`]): Per-frame perceptual decisions.
///
/// 3. **Drivers** ([`process::analyze`], [`process::synthesize`]): Sequencing
///    with persistent state.
pub mod process;

/// Data structures shared by the processing stages.
///
/// - **Mode** ([`structs::mode`]): Band layout and window
/// - **Frame** ([`structs::frame`]): Per-frame scalars
/// - **Analysis** ([`structs::analysis`]): External psychoacoustic input
/// - **State** ([`structs::state`]): Filter memory carried between frames
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Fixed point** ([`utils::fixed`]): Q-format arithmetic
/// - **Range Coder** ([`utils::range_coder`]): Entropy coding of decisions
/// - **Transform** ([`utils::mdct`]): Windowed MDCT
/// - **Bands** ([`utils::bands`]): Energies and normalisation
/// - **Pitch** ([`utils::pitch`]): Downsampling and lag search
/// - **Tables** ([`utils::tables`]): Static mode data
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
