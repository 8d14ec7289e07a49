//! Error types surfaced by the evaluation pipeline.
//!
//! Every stage failure aborts the sheet; nothing is retried inside the core.

use thiserror::Error;

/// Typed failure of one sheet evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluateError {
    /// Resolution or contrast below usable bounds.
    #[error("image quality too low: {0}")]
    ImageQuality(String),

    /// Sheet boundary / fiducials not found, or the detected geometry is implausible.
    #[error("sheet alignment failed: {0}")]
    Alignment(String),

    /// Too many bubble regions could not be confirmed on the sheet.
    #[error(
        "layout mismatch: {low_confidence} of {total} bubble regions are low-confidence \
         (allowed fraction {max_fraction:.2})"
    )]
    LayoutMismatch {
        low_confidence: usize,
        total: usize,
        max_fraction: f32,
    },

    /// Answer key, layout or tuning values are inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EvaluateError {
    /// Stable machine-readable name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageQuality(_) => "image_quality",
            Self::Alignment(_) => "alignment",
            Self::LayoutMismatch { .. } => "layout_mismatch",
            Self::Config(_) => "config",
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn alignment(msg: impl Into<String>) -> Self {
        Self::Alignment(msg.into())
    }

    pub(crate) fn image_quality(msg: impl Into<String>) -> Self {
        Self::ImageQuality(msg.into())
    }
}

/// Failure of one sheet inside a batch, tagged with the caller's sheet identifier.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("sheet '{sheet_id}': {source}")]
pub struct SheetError {
    pub sheet_id: String,
    pub source: EvaluateError,
}
