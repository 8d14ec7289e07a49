//! Top-level orchestrator: validate -> preprocess -> align -> grid -> classify -> score -> report.

use image::GrayImage;

use crate::align::align_sheet;
use crate::answer_key::AnswerKey;
use crate::classify::classify_sheet;
use crate::config::EvaluateConfig;
use crate::error::EvaluateError;
use crate::grid::locate_regions;
use crate::layout::LayoutConfig;
use crate::preprocess::prepare;
use crate::report::{assemble, AlignmentSummary, EvaluationResult};
use crate::scoring::score_answers;

/// Check layout, key and configuration before any image work.
pub(crate) fn validate_inputs(
    layout: &LayoutConfig,
    key: &AnswerKey,
    config: &EvaluateConfig,
) -> Result<(), EvaluateError> {
    layout.validate()?;
    key.validate_for(layout)?;
    config.validate_for(layout)
}

/// Evaluate one grayscale sheet with already validated inputs.
pub(crate) fn run_sheet(
    gray: &GrayImage,
    layout: &LayoutConfig,
    key: &AnswerKey,
    config: &EvaluateConfig,
) -> Result<EvaluationResult, EvaluateError> {
    let prepared = prepare(gray, &config.preprocess)?;
    let sheet = align_sheet(&prepared, layout, &config.align, &config.grid)?;
    let regions = locate_regions(&sheet.gray, layout, &config.grid)?;
    let classification = classify_sheet(&sheet.gray, &regions, layout, &config.classify);
    let scored = score_answers(&classification.answers, key, &config.scoring)?;
    let result = assemble(layout, scored, &classification, AlignmentSummary::from(&sheet));

    tracing::info!(
        "Scored sheet '{}': {:.2}/{:.2} ({:.1}%), {} attempted, {} correct, {} incorrect",
        result.layout_name,
        result.score,
        result.max_score,
        result.percentage,
        result.attempted,
        result.counts.correct,
        result.counts.incorrect
    );
    Ok(result)
}
