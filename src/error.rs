//! Error types shared by every analysis stage.
//!
//! All failures surface synchronously as [`DiffractionError`]; nothing in the
//! library retries internally.

use thiserror::Error;

use crate::data::{BoundingBox, Center};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffractionError {
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error(
        "insufficient overlap between valid regions: best candidate has {best_overlap} pixels, \
         at least {required} required"
    )]
    InsufficientOverlap { best_overlap: usize, required: usize },

    #[error("invalid fold order {fold_order}: must be at least 1")]
    InvalidFoldOrder { fold_order: usize },

    #[error("center ({}, {}) lies outside a {shape:?} image (tolerance {tolerance})", center.row, center.col)]
    CenterOutOfBounds {
        center: Center,
        shape: (usize, usize),
        tolerance: f64,
    },

    #[error("no valid pixels to reduce ({valid_pixels} valid)")]
    EmptyProfile { valid_pixels: usize },

    #[error("invalid bin width {bin_width}: must be finite and positive")]
    InvalidBinWidth { bin_width: f64 },

    #[error("region {region:?} does not fit inside a {shape:?} frame")]
    InvalidRegion {
        region: BoundingBox,
        shape: (usize, usize),
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl DiffractionError {
    /// Whether a stack pass may continue past this error for a single frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientOverlap { .. })
    }
}

pub type Result<T> = std::result::Result<T, DiffractionError>;

/// Fails with [`DiffractionError::ShapeMismatch`] unless both shapes agree.
pub fn ensure_same_shape(
    context: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> Result<()> {
    if expected != actual {
        return Err(DiffractionError::ShapeMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}
