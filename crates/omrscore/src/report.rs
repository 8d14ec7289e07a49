//! Final per-sheet result.

use crate::align::{AlignmentMode, CanonicalSheet};
use crate::classify::{Classification, Mark};
use crate::homography::matrix3_to_array;
use crate::layout::{option_label, LayoutConfig};
use crate::scoring::{ScoredQuestion, Verdict, VerdictCounts};

/// How the sheet was registered to the canonical frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AlignmentSummary {
    pub mode: AlignmentMode,
    /// Detected reference points in the photo, ordered TL, TR, BR, BL.
    pub corners_px: [[f64; 2]; 4],
    /// Canonical → image homography (3x3, row-major).
    pub homography: [[f64; 3]; 3],
    /// Clockwise quarter turns of the sheet in the photo.
    #[serde(default)]
    pub quarter_turns: u8,
}

impl From<&CanonicalSheet> for AlignmentSummary {
    fn from(sheet: &CanonicalSheet) -> Self {
        Self {
            mode: sheet.mode,
            corners_px: sheet.corners_px,
            homography: matrix3_to_array(&sheet.homography),
            quarter_turns: sheet.quarter_turns,
        }
    }
}

/// Result for one question.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuestionResult {
    /// 0-based question index.
    pub question: usize,
    /// 1-based question number as printed on the sheet.
    pub number: usize,
    pub mark: Mark,
    /// Letter of the selected option when the mark is `Selected`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked: Option<char>,
    /// Letters of all options over the fill threshold.
    pub filled: Vec<char>,
    /// Letters accepted by the key.
    pub accepted: Vec<char>,
    pub verdict: Verdict,
    pub points: f64,
    /// Per-option fill ratios, option order.
    pub fill_ratios: Vec<f32>,
    pub low_confidence: bool,
}

/// Immutable outcome of evaluating one sheet.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvaluationResult {
    pub layout_name: String,
    pub score: f64,
    /// Sum of the weights of all questions.
    pub max_score: f64,
    /// `100 * score / max_score`, or 0 when `max_score` is 0.
    pub percentage: f64,
    /// Questions with any mark (not blank).
    pub attempted: usize,
    pub counts: VerdictCounts,
    pub questions: Vec<QuestionResult>,
    /// Fill threshold applied to this sheet.
    pub fill_threshold: f32,
    pub low_confidence_regions: usize,
    pub alignment: AlignmentSummary,
}

impl EvaluationResult {
    /// 1-based numbers of the questions answered incorrectly.
    pub fn incorrect_questions(&self) -> Vec<usize> {
        self.questions_with(Verdict::Incorrect)
    }

    /// 1-based numbers of the questions with the given verdict.
    pub fn questions_with(&self, verdict: Verdict) -> Vec<usize> {
        self.questions
            .iter()
            .filter(|q| q.verdict == verdict)
            .map(|q| q.number)
            .collect()
    }

    /// Result of the question printed as `number` (1-based).
    pub fn question(&self, number: usize) -> Option<&QuestionResult> {
        number.checked_sub(1).and_then(|i| self.questions.get(i))
    }
}

/// Combine scored questions, classifier readings and alignment into the final result.
pub fn assemble(
    layout: &LayoutConfig,
    scored: Vec<ScoredQuestion>,
    classification: &Classification,
    alignment: AlignmentSummary,
) -> EvaluationResult {
    let k = layout.options_per_question.max(1);
    let ratios: Vec<Vec<f32>> = classification
        .readings
        .chunks(k)
        .map(|c| c.iter().map(|r| r.fill_ratio).collect())
        .collect();

    let max_score: f64 = scored.iter().map(|s| s.weight).sum();
    let letters = |opts: &[usize]| opts.iter().map(|&o| option_label(o)).collect::<Vec<char>>();

    let questions: Vec<QuestionResult> = scored
        .into_iter()
        .map(|s| QuestionResult {
            question: s.answer.question,
            number: s.answer.question + 1,
            mark: s.answer.mark,
            marked: match s.answer.mark {
                Mark::Selected(o) => Some(option_label(o)),
                _ => None,
            },
            filled: letters(&s.answer.filled),
            accepted: letters(&s.accepted),
            verdict: s.verdict,
            points: s.points,
            fill_ratios: ratios.get(s.answer.question).cloned().unwrap_or_default(),
            low_confidence: s.answer.low_confidence,
        })
        .collect();

    let score: f64 = questions.iter().map(|q| q.points).sum();
    let counts = VerdictCounts::tally(questions.iter().map(|q| &q.verdict));
    let attempted = questions.iter().filter(|q| q.mark != Mark::Blank).count();
    let low_confidence_regions = classification
        .readings
        .iter()
        .filter(|r| r.low_confidence)
        .count();
    let percentage = if max_score > 0.0 {
        100.0 * score / max_score
    } else {
        0.0
    };

    EvaluationResult {
        layout_name: layout.name.clone(),
        score,
        max_score,
        percentage,
        attempted,
        counts,
        questions,
        fill_threshold: classification.threshold,
        low_confidence_regions,
        alignment,
    }
}
