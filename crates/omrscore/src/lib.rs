//! omrscore: pure-Rust optical mark recognition for bubble answer sheets.
//!
//! Turns a photo or scan of a filled-in answer sheet into a scored,
//! per-question result. The pipeline stages are:
//!
//! 1. **Preprocess** – grayscale, smoothing, contrast gate, adaptive binarization.
//! 2. **Align** – sheet boundary or corner fiducials → DLT homography → warp
//!    into the layout's canonical frame.
//! 3. **Grid** – arithmetic bubble placement with bounded outline-based refinement.
//! 4. **Classify** – background-normalized fill ratios, per-sheet adaptive
//!    threshold, explicit multi-mark policy.
//! 5. **Score** – verdicts against the answer key with configurable weights.
//! 6. **Report** – immutable, serializable [`EvaluationResult`].
//!
//! # Public API
//! - [`Evaluator`], [`evaluate`] and [`evaluate_with_config`] as entry points
//! - [`LayoutConfig`] and [`AnswerKey`] describing the sheet and expected answers
//! - [`EvaluateConfig`] and the per-stage configs for advanced tuning
//!
//! Stage functions are public as well so callers can inspect intermediate
//! products (rectified sheet, bubble regions, fill ratios).

pub mod align;
mod answer_key;
mod api;
pub mod classify;
mod config;
mod error;
pub mod grid;
pub mod homography;
mod layout;
mod pipeline;
pub mod preprocess;
mod report;
pub mod scoring;

#[cfg(test)]
pub(crate) mod test_utils;

pub use align::{align_sheet, AlignConfig, AlignmentMode, CanonicalSheet};
pub use answer_key::{AnswerKey, KeyEntry};
pub use api::{evaluate, evaluate_with_config, Evaluator};
pub use classify::{
    classify_sheet, BubbleReading, Classification, ClassifyConfig, LowConfidencePolicy, Mark,
    MultiMarkPolicy, QuestionAnswer,
};
pub use config::EvaluateConfig;
pub use error::{EvaluateError, SheetError};
pub use grid::{arithmetic_regions, locate_regions, BubbleRegion, GridConfig};
pub use layout::{option_label, parse_option_label, FiducialSpec, LayoutConfig, MAX_OPTIONS};
pub use preprocess::{prepare, to_gray, PreparedImage, PreprocessConfig};
pub use report::{assemble, AlignmentSummary, EvaluationResult, QuestionResult};
pub use scoring::{
    score_answers, MultipleMarkScoring, ScoredQuestion, ScoringPolicy, Verdict, VerdictCounts,
};
