//! Answer key: accepted option(s) and optional weight per question.
//!
//! Key JSON (`omrscore.answer_key.v1`) uses 1-based question numbers and
//! option letters, matching how keys are written by hand:
//!
//! ```json
//! {
//!   "schema": "omrscore.answer_key.v1",
//!   "answers": { "1": "a", "2": ["b", "d"] },
//!   "weights": { "2": 2.0 }
//! }
//! ```
//!
//! In memory questions and options are 0-based indices.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::EvaluateError;
use crate::layout::{parse_option_label, LayoutConfig};

const KEY_SCHEMA_V1: &str = "omrscore.answer_key.v1";

/// Expected answer for one question.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct KeyEntry {
    /// Accepted option indices; any of them scores as correct.
    pub accepted: BTreeSet<usize>,
    /// Points for a correct answer; `None` uses the scoring policy default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Question index -> expected answer.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct AnswerKey {
    entries: BTreeMap<usize, KeyEntry>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
enum AnswerSpec {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct AnswerKeySpecV1 {
    schema: String,
    answers: BTreeMap<usize, AnswerSpec>,
    #[serde(default)]
    weights: BTreeMap<usize, f64>,
}

impl AnswerKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a key with exactly one accepted option per question, in question order.
    pub fn from_options(options: &[usize]) -> Self {
        let mut key = Self::new();
        for (question, &option) in options.iter().enumerate() {
            key.insert(question, [option]);
        }
        key
    }

    /// Set the accepted options of `question`, replacing any previous entry.
    pub fn insert(&mut self, question: usize, accepted: impl IntoIterator<Item = usize>) {
        let weight = self.entries.get(&question).and_then(|e| e.weight);
        self.entries.insert(
            question,
            KeyEntry {
                accepted: accepted.into_iter().collect(),
                weight,
            },
        );
    }

    /// Override the weight of an existing entry.
    pub fn set_weight(&mut self, question: usize, weight: f64) -> Result<(), EvaluateError> {
        let entry = self.entries.get_mut(&question).ok_or_else(|| {
            EvaluateError::config(format!("no key entry for question index {question}"))
        })?;
        entry.weight = Some(weight);
        Ok(())
    }

    pub fn get(&self, question: usize) -> Option<&KeyEntry> {
        self.entries.get(&question)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &KeyEntry)> + '_ {
        self.entries.iter().map(|(&q, e)| (q, e))
    }

    /// Check that the key covers exactly questions `0..Q` with options in `0..K`.
    pub fn validate_for(&self, layout: &LayoutConfig) -> Result<(), EvaluateError> {
        let q = layout.question_count;
        let k = layout.options_per_question;

        let missing: Vec<usize> = (0..q).filter(|i| !self.entries.contains_key(i)).collect();
        if !missing.is_empty() {
            let shown: Vec<String> = missing.iter().take(8).map(|i| (i + 1).to_string()).collect();
            return Err(EvaluateError::config(format!(
                "answer key is missing {} of {q} questions (numbers {}{})",
                missing.len(),
                shown.join(", "),
                if missing.len() > shown.len() { ", ..." } else { "" }
            )));
        }

        if let Some((&extra, _)) = self.entries.range(q..).next() {
            return Err(EvaluateError::config(format!(
                "answer key defines question {} but the layout has only {q} questions",
                extra + 1
            )));
        }

        for (&question, entry) in &self.entries {
            if entry.accepted.is_empty() {
                return Err(EvaluateError::config(format!(
                    "question {} has no accepted option",
                    question + 1
                )));
            }
            if let Some(&bad) = entry.accepted.iter().find(|&&o| o >= k) {
                return Err(EvaluateError::config(format!(
                    "question {} accepts option index {bad} but the layout has {k} options",
                    question + 1
                )));
            }
            if let Some(w) = entry.weight {
                if !w.is_finite() || w < 0.0 {
                    return Err(EvaluateError::config(format!(
                        "question {} weight must be finite and >= 0",
                        question + 1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load a key from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, EvaluateError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            EvaluateError::config(format!("cannot read answer key {}: {e}", path.display()))
        })?;
        Self::from_json_str(&data)
    }

    /// Parse a key from JSON text.
    pub fn from_json_str(data: &str) -> Result<Self, EvaluateError> {
        let spec: AnswerKeySpecV1 = serde_json::from_str(data)
            .map_err(|e| EvaluateError::config(format!("malformed answer key JSON: {e}")))?;
        Self::from_key_spec(spec).map_err(EvaluateError::Config)
    }

    fn from_key_spec(spec: AnswerKeySpecV1) -> Result<Self, String> {
        if spec.schema != KEY_SCHEMA_V1 {
            return Err(format!(
                "unsupported answer key schema '{}' (expected '{}')",
                spec.schema, KEY_SCHEMA_V1
            ));
        }

        let mut key = Self::new();
        for (number, answer) in spec.answers {
            let question = question_index(number)?;
            let labels = match answer {
                AnswerSpec::One(label) => vec![label],
                AnswerSpec::Many(labels) => labels,
            };
            let mut accepted = BTreeSet::new();
            for label in &labels {
                let option = parse_option_label(label).ok_or_else(|| {
                    format!("question {number}: '{label}' is not an option letter")
                })?;
                accepted.insert(option);
            }
            key.entries.insert(
                question,
                KeyEntry {
                    accepted,
                    weight: None,
                },
            );
        }

        for (number, weight) in spec.weights {
            let question = question_index(number)?;
            let entry = key
                .entries
                .get_mut(&question)
                .ok_or_else(|| format!("weight given for question {number} without an answer"))?;
            entry.weight = Some(weight);
        }

        Ok(key)
    }
}

fn question_index(number: usize) -> Result<usize, String> {
    number
        .checked_sub(1)
        .ok_or_else(|| "question numbers start at 1".to_string())
}
