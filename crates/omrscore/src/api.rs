//! High-level evaluation API.
//!
//! [`Evaluator`] is the primary entry point for scoring answer sheets.
//! It bundles a validated layout, answer key and configuration; create it
//! once and evaluate many photos, sequentially or as a parallel batch.

use std::path::Path;

use image::{DynamicImage, GrayImage};
use rayon::prelude::*;

use crate::answer_key::AnswerKey;
use crate::config::EvaluateConfig;
use crate::error::{EvaluateError, SheetError};
use crate::layout::LayoutConfig;
use crate::pipeline;
use crate::preprocess::to_gray;
use crate::report::EvaluationResult;

/// Primary evaluation interface.
///
/// # Examples
///
/// ```no_run
/// use omrscore::{AnswerKey, Evaluator, LayoutConfig};
/// use std::path::Path;
///
/// let layout = LayoutConfig::default();
/// let key = AnswerKey::from_json_file(Path::new("key_100q.json")).unwrap();
/// let evaluator = Evaluator::new(layout, key).unwrap();
/// let photo = image::open("sheet.jpg").unwrap();
/// let result = evaluator.evaluate(&photo).unwrap();
/// println!("{:.1} / {:.1}", result.score, result.max_score);
/// ```
#[derive(Debug, Clone)]
pub struct Evaluator {
    layout: LayoutConfig,
    key: AnswerKey,
    config: EvaluateConfig,
}

impl Evaluator {
    /// Create an evaluator with the default configuration.
    pub fn new(layout: LayoutConfig, key: AnswerKey) -> Result<Self, EvaluateError> {
        Self::with_config(layout, key, EvaluateConfig::default())
    }

    /// Create an evaluator with full config control.
    pub fn with_config(
        layout: LayoutConfig,
        key: AnswerKey,
        config: EvaluateConfig,
    ) -> Result<Self, EvaluateError> {
        pipeline::validate_inputs(&layout, &key, &config)?;
        Ok(Self {
            layout,
            key,
            config,
        })
    }

    /// Load layout and key JSON and create an evaluator in one step.
    pub fn from_json_files(layout_path: &Path, key_path: &Path) -> Result<Self, EvaluateError> {
        Self::new(
            LayoutConfig::from_json_file(layout_path)?,
            AnswerKey::from_json_file(key_path)?,
        )
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn key(&self) -> &AnswerKey {
        &self.key
    }

    pub fn config(&self) -> &EvaluateConfig {
        &self.config
    }

    /// Evaluate one photographed sheet.
    pub fn evaluate(&self, image: &DynamicImage) -> Result<EvaluationResult, EvaluateError> {
        self.evaluate_gray(&to_gray(image))
    }

    /// Evaluate one sheet already converted to grayscale.
    pub fn evaluate_gray(&self, gray: &GrayImage) -> Result<EvaluationResult, EvaluateError> {
        pipeline::run_sheet(gray, &self.layout, &self.key, &self.config)
    }

    /// Evaluate independent sheets in parallel; results keep the input order.
    pub fn evaluate_batch(
        &self,
        sheets: &[(String, DynamicImage)],
    ) -> Vec<Result<EvaluationResult, SheetError>> {
        tracing::info!("Evaluating batch of {} sheets", sheets.len());
        sheets
            .par_iter()
            .map(|(sheet_id, image)| {
                self.evaluate(image).map_err(|source| {
                    tracing::warn!("Sheet '{}' failed: {}", sheet_id, source);
                    SheetError {
                        sheet_id: sheet_id.clone(),
                        source,
                    }
                })
            })
            .collect()
    }
}

/// Evaluate one sheet with the default configuration.
pub fn evaluate(
    image: &DynamicImage,
    layout: &LayoutConfig,
    key: &AnswerKey,
) -> Result<EvaluationResult, EvaluateError> {
    evaluate_with_config(image, layout, key, &EvaluateConfig::default())
}

/// Evaluate one sheet with explicit configuration.
///
/// Inputs are validated before the image is touched.
pub fn evaluate_with_config(
    image: &DynamicImage,
    layout: &LayoutConfig,
    key: &AnswerKey,
    config: &EvaluateConfig,
) -> Result<EvaluationResult, EvaluateError> {
    pipeline::validate_inputs(layout, key, config)?;
    pipeline::run_sheet(&to_gray(image), layout, key, config)
}
