//! Comparing interpreted marks against the answer key.

use crate::answer_key::AnswerKey;
use crate::classify::{Mark, QuestionAnswer};
use crate::error::EvaluateError;

/// Outcome category of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Correct,
    Incorrect,
    Blank,
    MultipleMarked,
}

/// Scoring of questions with several filled bubbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipleMarkScoring {
    /// `MULTIPLE_MARKED`, no points.
    #[default]
    ZeroCredit,
    /// `INCORRECT`, scored with the incorrect weight.
    CountAsIncorrect,
}

/// Points awarded per verdict.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Points for a correct answer when the key gives no weight.
    pub default_weight: f64,
    /// Points for an incorrect answer; negative for penalty schemes.
    pub incorrect_weight: f64,
    pub multiple_marked: MultipleMarkScoring,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            default_weight: 1.0,
            incorrect_weight: 0.0,
            multiple_marked: MultipleMarkScoring::ZeroCredit,
        }
    }
}

impl ScoringPolicy {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.default_weight.is_finite() || self.default_weight < 0.0 {
            return Err("scoring.default_weight must be finite and >= 0".to_string());
        }
        if !self.incorrect_weight.is_finite() || self.incorrect_weight > 0.0 {
            return Err("scoring.incorrect_weight must be finite and <= 0".to_string());
        }
        Ok(())
    }
}

/// One question after scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredQuestion {
    pub answer: QuestionAnswer,
    /// Accepted options from the key, ascending.
    pub accepted: Vec<usize>,
    pub verdict: Verdict,
    pub points: f64,
    /// Points this question is worth when answered correctly.
    pub weight: f64,
}

/// Number of questions per verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VerdictCounts {
    pub correct: usize,
    pub incorrect: usize,
    pub blank: usize,
    pub multiple_marked: usize,
}

impl VerdictCounts {
    pub fn tally<'a>(verdicts: impl IntoIterator<Item = &'a Verdict>) -> Self {
        let mut out = Self::default();
        for v in verdicts {
            match v {
                Verdict::Correct => out.correct += 1,
                Verdict::Incorrect => out.incorrect += 1,
                Verdict::Blank => out.blank += 1,
                Verdict::MultipleMarked => out.multiple_marked += 1,
            }
        }
        out
    }
}

/// Score every answer; answers must be covered by `key`.
pub fn score_answers(
    answers: &[QuestionAnswer],
    key: &AnswerKey,
    policy: &ScoringPolicy,
) -> Result<Vec<ScoredQuestion>, EvaluateError> {
    answers
        .iter()
        .map(|answer| {
            let entry = key.get(answer.question).ok_or_else(|| {
                EvaluateError::config(format!(
                    "answer key has no entry for question {}",
                    answer.question + 1
                ))
            })?;
            let weight = entry.weight.unwrap_or(policy.default_weight);

            let (verdict, points) = match answer.mark {
                Mark::Blank => (Verdict::Blank, 0.0),
                Mark::Multiple => match policy.multiple_marked {
                    MultipleMarkScoring::ZeroCredit => (Verdict::MultipleMarked, 0.0),
                    MultipleMarkScoring::CountAsIncorrect => {
                        (Verdict::Incorrect, policy.incorrect_weight)
                    }
                },
                Mark::Selected(option) if entry.accepted.contains(&option) => {
                    (Verdict::Correct, weight)
                }
                Mark::Selected(_) => (Verdict::Incorrect, policy.incorrect_weight),
            };

            Ok(ScoredQuestion {
                answer: answer.clone(),
                accepted: entry.accepted.iter().copied().collect(),
                verdict,
                points,
                weight,
            })
        })
        .collect()
}
