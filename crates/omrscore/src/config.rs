//! Aggregated tuning for every pipeline stage.

use std::path::Path;

use crate::align::{AlignConfig, AlignmentMode};
use crate::classify::ClassifyConfig;
use crate::error::EvaluateError;
use crate::grid::GridConfig;
use crate::layout::LayoutConfig;
use crate::preprocess::PreprocessConfig;
use crate::scoring::ScoringPolicy;

/// Top-level evaluation configuration.
///
/// Every field has a sensible default; JSON files only need to name the
/// values they change.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluateConfig {
    pub preprocess: PreprocessConfig,
    pub align: AlignConfig,
    pub grid: GridConfig,
    pub classify: ClassifyConfig,
    pub scoring: ScoringPolicy,
}

impl EvaluateConfig {
    /// Check every stage's values and their compatibility with `layout`.
    pub fn validate_for(&self, layout: &LayoutConfig) -> Result<(), EvaluateError> {
        self.preprocess.validate().map_err(EvaluateError::Config)?;
        self.align.validate().map_err(EvaluateError::Config)?;
        self.grid.validate().map_err(EvaluateError::Config)?;
        self.classify.validate().map_err(EvaluateError::Config)?;
        self.scoring.validate().map_err(EvaluateError::Config)?;

        if self.align.mode == AlignmentMode::Fiducials && layout.fiducials.is_none() {
            return Err(EvaluateError::config(format!(
                "fiducial alignment requested but layout '{}' defines no fiducials",
                layout.name
            )));
        }
        Ok(())
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, EvaluateError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            EvaluateError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_json_str(&data)
    }

    /// Parse a configuration from JSON text.
    pub fn from_json_str(data: &str) -> Result<Self, EvaluateError> {
        serde_json::from_str(data)
            .map_err(|e| EvaluateError::config(format!("malformed config JSON: {e}")))
    }
}
