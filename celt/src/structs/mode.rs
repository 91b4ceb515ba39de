use std::sync::OnceLock;

use anyhow::{Result, bail};

use crate::utils::errors::ModeError;
use crate::utils::fixed::{Val16, qconst16};
use crate::utils::tables::{CACHE_CAPS_50, E_MEANS, EBAND_5MS, LOG_N_400, overlap_window};

/// Immutable sample-rate-dependent configuration shared by every frame.
///
/// A mode is built once and then only read; it can be shared freely across
/// analyzers and synthesizers running on different threads.
#[derive(Debug, Clone)]
pub struct Mode {
    /// Sampling frequency in Hz.
    pub fs: u32,
    /// Length of the window overlap, in samples.
    pub overlap: usize,
    pub nb_ebands: usize,
    /// Number of bands below the Nyquist limit of the coded bandwidth.
    pub eff_ebands: usize,
    /// Pre-emphasis coefficients `[coef0, coef1, coef2, gain]`.
    pub preemph: [Val16; 4],
    /// Band edges in bins of the shortest MDCT, `nb_ebands + 1` entries.
    pub ebands: Vec<i16>,
    pub max_lm: usize,
    pub nb_short_mdcts: usize,
    pub short_mdct_size: usize,
    /// Per-band log2 width in 1/8 bits.
    pub log_n: Vec<i16>,
    /// Q15 window over the overlap region.
    pub window: Vec<Val16>,
    /// Allocation caps laid out as `[LM][C-1][band]`.
    pub caps: Vec<u8>,
}

/// Raw tables for building a [`Mode`].
#[derive(Debug, Clone)]
pub struct ModeTables {
    pub fs: u32,
    pub overlap: usize,
    pub preemph: [Val16; 4],
    pub ebands: Vec<i16>,
    pub max_lm: usize,
    pub short_mdct_size: usize,
    pub log_n: Vec<i16>,
    pub caps: Vec<u8>,
}

impl Mode {
    /// Validates `tables` and derives the window.
    pub fn new(tables: ModeTables) -> Result<Self> {
        let nb_ebands = tables.ebands.len().saturating_sub(1);
        if nb_ebands == 0 || nb_ebands > E_MEANS.len() {
            bail!(ModeError::BandCount {
                actual: nb_ebands,
                max: E_MEANS.len(),
            });
        }
        for (index, pair) in tables.ebands.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                bail!(ModeError::BandEdgesNotIncreasing {
                    index: index + 1,
                    value: pair[1],
                });
            }
        }
        if tables.max_lm > 3 {
            bail!(ModeError::InvalidMaxLm(tables.max_lm));
        }
        if tables.overlap % 2 != 0 || tables.overlap > tables.short_mdct_size {
            bail!(ModeError::InvalidOverlap {
                overlap: tables.overlap,
                short_mdct_size: tables.short_mdct_size,
            });
        }
        let last = tables.ebands[nb_ebands];
        if last as usize > tables.short_mdct_size {
            bail!(ModeError::BandsExceedMdct {
                last,
                short_mdct_size: tables.short_mdct_size,
            });
        }
        if tables.log_n.len() != nb_ebands {
            bail!(ModeError::TableLength {
                table: "log_n",
                actual: tables.log_n.len(),
                expected: nb_ebands,
            });
        }
        let caps_len = nb_ebands * 2 * (tables.max_lm + 1);
        if tables.caps.len() != caps_len {
            bail!(ModeError::TableLength {
                table: "caps",
                actual: tables.caps.len(),
                expected: caps_len,
            });
        }

        // Bands whose upper edge lies beyond the coded bandwidth are never coded
        let eff_ebands = (1..=nb_ebands)
            .rev()
            .find(|&i| tables.ebands[i] as usize <= tables.short_mdct_size)
            .unwrap_or(nb_ebands);

        Ok(Self {
            fs: tables.fs,
            overlap: tables.overlap,
            nb_ebands,
            eff_ebands,
            preemph: tables.preemph,
            window: overlap_window(tables.overlap),
            ebands: tables.ebands,
            max_lm: tables.max_lm,
            nb_short_mdcts: 1 << tables.max_lm,
            short_mdct_size: tables.short_mdct_size,
            log_n: tables.log_n,
            caps: tables.caps,
        })
    }

    /// The standard 48 kHz mode with 2.5 ms short blocks and 20 ms frames.
    pub fn standard() -> &'static Mode {
        static STANDARD: OnceLock<Mode> = OnceLock::new();
        STANDARD.get_or_init(|| Mode {
            fs: 48000,
            overlap: 120,
            nb_ebands: 21,
            eff_ebands: 21,
            preemph: [
                qconst16(0.8500061035, 15),
                qconst16(0.0, 15),
                qconst16(1.0, 12),
                qconst16(1.0, 12),
            ],
            ebands: EBAND_5MS.to_vec(),
            max_lm: 3,
            nb_short_mdcts: 8,
            short_mdct_size: 120,
            log_n: LOG_N_400.to_vec(),
            window: overlap_window(120),
            caps: CACHE_CAPS_50.to_vec(),
        })
    }

    /// Tables of the standard mode, as a starting point for custom modes.
    pub fn standard_tables() -> ModeTables {
        let mode = Self::standard();
        ModeTables {
            fs: mode.fs,
            overlap: mode.overlap,
            preemph: mode.preemph,
            ebands: mode.ebands.clone(),
            max_lm: mode.max_lm,
            short_mdct_size: mode.short_mdct_size,
            log_n: mode.log_n.clone(),
            caps: mode.caps.clone(),
        }
    }

    /// Number of MDCT bins in band `i` at block multiplier `1 << lm`.
    #[inline]
    pub fn band_width(&self, i: usize, lm: usize) -> usize {
        ((self.ebands[i + 1] - self.ebands[i]) as usize) << lm
    }

    /// First bin of band `i` at block multiplier `1 << lm`.
    #[inline]
    pub fn band_start(&self, i: usize, lm: usize) -> usize {
        (self.ebands[i] as usize) << lm
    }

    /// Frame length in samples for `lm`.
    #[inline]
    pub fn frame_size(&self, lm: usize) -> usize {
        self.short_mdct_size << lm
    }

    /// Largest MDCT length, covering one full frame at `max_lm`.
    #[inline]
    pub fn mdct_size(&self) -> usize {
        2 * self.short_mdct_size * self.nb_short_mdcts
    }

    /// Maps a frame length to its LM, if the mode supports it.
    pub fn lm_for_frame_size(&self, frame_size: usize) -> Option<usize> {
        (0..=self.max_lm).find(|&lm| self.frame_size(lm) == frame_size)
    }
}
