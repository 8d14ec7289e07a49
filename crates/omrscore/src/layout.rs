//! Runtime answer-sheet layout specification.
//!
//! Layout JSON follows a parametric schema (`omrscore.layout.v1`): bubble
//! centers are generated at runtime from origin, pitches and counts in the
//! canonical frame. Per-bubble coordinate lists are intentionally not part of
//! the schema.

use std::path::Path;

use crate::error::EvaluateError;

const LAYOUT_SCHEMA_V1: &str = "omrscore.layout.v1";

const DEFAULT_NAME: &str = "omr_100q_4opt";
const DEFAULT_CANONICAL_SIZE_PX: [u32; 2] = [600, 800];
const DEFAULT_QUESTION_COUNT: usize = 100;
const DEFAULT_OPTIONS: usize = 4;
const DEFAULT_QUESTIONS_PER_COLUMN: usize = 20;
const DEFAULT_ORIGIN_PX: [f32; 2] = [60.0, 110.0];
const DEFAULT_OPTION_PITCH_PX: f32 = 22.0;
const DEFAULT_ROW_PITCH_PX: f32 = 34.0;
const DEFAULT_COLUMN_PITCH_PX: f32 = 110.0;
const DEFAULT_BUBBLE_RADIUS_PX: f32 = 8.0;
const DEFAULT_FIDUCIAL_INSET_PX: f32 = 25.0;
const DEFAULT_FIDUCIAL_SIZE_PX: f32 = 28.0;

/// Maximum options per question; options are labelled `A`..`Z`.
pub const MAX_OPTIONS: usize = 26;

/// Four solid square fiducials printed at the sheet corners.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FiducialSpec {
    /// Distance from each canonical frame edge to the fiducial center.
    pub inset_px: f32,
    /// Fiducial side length in canonical pixels.
    pub size_px: f32,
}

/// Geometry of one sheet design in the canonical frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LayoutConfig {
    pub name: String,
    /// Canonical frame `[width, height]` every sheet is rectified into.
    pub canonical_size_px: [u32; 2],
    pub question_count: usize,
    pub options_per_question: usize,
    /// Questions stacked in one column block before wrapping to the next block.
    pub questions_per_column: usize,
    /// Center of question 0, option 0.
    pub origin_px: [f32; 2],
    /// Horizontal distance between neighbouring options of one question.
    pub option_pitch_px: f32,
    /// Vertical distance between consecutive questions of a column block.
    pub row_pitch_px: f32,
    /// Horizontal distance between column blocks.
    pub column_pitch_px: f32,
    pub bubble_radius_px: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiducials: Option<FiducialSpec>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutSpecV1 {
    schema: String,
    name: String,
    canonical_size_px: [u32; 2],
    question_count: usize,
    options_per_question: usize,
    questions_per_column: usize,
    origin_px: [f32; 2],
    option_pitch_px: f32,
    row_pitch_px: f32,
    column_pitch_px: f32,
    bubble_radius_px: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fiducials: Option<FiducialSpec>,
}

impl LayoutConfig {
    /// Number of column blocks needed for all questions.
    pub fn column_count(&self) -> usize {
        if self.questions_per_column == 0 {
            return 0;
        }
        self.question_count.div_ceil(self.questions_per_column)
    }

    /// Total number of bubbles on the sheet (`Q * K`).
    pub fn bubble_count(&self) -> usize {
        self.question_count * self.options_per_question
    }

    /// Canonical center of bubble `(question, option)`.
    pub fn bubble_center(&self, question: usize, option: usize) -> [f32; 2] {
        let rows = self.questions_per_column.max(1);
        let col = question / rows;
        let row = question % rows;
        [
            self.origin_px[0]
                + col as f32 * self.column_pitch_px
                + option as f32 * self.option_pitch_px,
            self.origin_px[1] + row as f32 * self.row_pitch_px,
        ]
    }

    /// Canonical frame aspect ratio (width / height).
    pub fn canonical_aspect(&self) -> f64 {
        self.canonical_size_px[0] as f64 / self.canonical_size_px[1] as f64
    }

    /// Canonical frame corners, ordered TL, TR, BR, BL.
    pub fn sheet_corners(&self) -> [[f64; 2]; 4] {
        let w = (self.canonical_size_px[0] - 1) as f64;
        let h = (self.canonical_size_px[1] - 1) as f64;
        [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
    }

    /// Canonical fiducial centers ordered TL, TR, BR, BL, if the sheet has fiducials.
    pub fn fiducial_centers(&self) -> Option<[[f64; 2]; 4]> {
        let f = self.fiducials?;
        let inset = f.inset_px as f64;
        let w = self.canonical_size_px[0] as f64;
        let h = self.canonical_size_px[1] as f64;
        Some([
            [inset, inset],
            [w - inset, inset],
            [w - inset, h - inset],
            [inset, h - inset],
        ])
    }

    /// Check the layout for internal consistency.
    pub fn validate(&self) -> Result<(), EvaluateError> {
        validate_layout(self).map_err(EvaluateError::Config)
    }

    /// Load a layout from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, EvaluateError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            EvaluateError::config(format!("cannot read layout {}: {e}", path.display()))
        })?;
        Self::from_json_str(&data)
    }

    /// Parse a layout from JSON text.
    pub fn from_json_str(data: &str) -> Result<Self, EvaluateError> {
        let spec: LayoutSpecV1 = serde_json::from_str(data)
            .map_err(|e| EvaluateError::config(format!("malformed layout JSON: {e}")))?;
        Self::from_layout_spec(spec).map_err(EvaluateError::Config)
    }

    /// Serialize the layout as schema-tagged JSON accepted by [`Self::from_json_str`].
    pub fn to_json_string(&self) -> Result<String, EvaluateError> {
        let spec = LayoutSpecV1 {
            schema: LAYOUT_SCHEMA_V1.to_string(),
            name: self.name.clone(),
            canonical_size_px: self.canonical_size_px,
            question_count: self.question_count,
            options_per_question: self.options_per_question,
            questions_per_column: self.questions_per_column,
            origin_px: self.origin_px,
            option_pitch_px: self.option_pitch_px,
            row_pitch_px: self.row_pitch_px,
            column_pitch_px: self.column_pitch_px,
            bubble_radius_px: self.bubble_radius_px,
            fiducials: self.fiducials,
        };
        serde_json::to_string_pretty(&spec)
            .map_err(|e| EvaluateError::config(format!("cannot serialize layout: {e}")))
    }

    fn from_layout_spec(spec: LayoutSpecV1) -> Result<Self, String> {
        if spec.schema != LAYOUT_SCHEMA_V1 {
            return Err(format!(
                "unsupported layout schema '{}' (expected '{}')",
                spec.schema, LAYOUT_SCHEMA_V1
            ));
        }

        let layout = Self {
            name: spec.name,
            canonical_size_px: spec.canonical_size_px,
            question_count: spec.question_count,
            options_per_question: spec.options_per_question,
            questions_per_column: spec.questions_per_column,
            origin_px: spec.origin_px,
            option_pitch_px: spec.option_pitch_px,
            row_pitch_px: spec.row_pitch_px,
            column_pitch_px: spec.column_pitch_px,
            bubble_radius_px: spec.bubble_radius_px,
            fiducials: spec.fiducials,
        };
        validate_layout(&layout)?;
        Ok(layout)
    }
}

impl Default for LayoutConfig {
    /// The 100-question, four-option sheet laid out as five blocks of twenty rows.
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            canonical_size_px: DEFAULT_CANONICAL_SIZE_PX,
            question_count: DEFAULT_QUESTION_COUNT,
            options_per_question: DEFAULT_OPTIONS,
            questions_per_column: DEFAULT_QUESTIONS_PER_COLUMN,
            origin_px: DEFAULT_ORIGIN_PX,
            option_pitch_px: DEFAULT_OPTION_PITCH_PX,
            row_pitch_px: DEFAULT_ROW_PITCH_PX,
            column_pitch_px: DEFAULT_COLUMN_PITCH_PX,
            bubble_radius_px: DEFAULT_BUBBLE_RADIUS_PX,
            fiducials: Some(FiducialSpec {
                inset_px: DEFAULT_FIDUCIAL_INSET_PX,
                size_px: DEFAULT_FIDUCIAL_SIZE_PX,
            }),
        }
    }
}

/// Upper-case letter used for option `index` (`0 -> 'A'`).
pub fn option_label(index: usize) -> char {
    if index < MAX_OPTIONS {
        (b'A' + index as u8) as char
    } else {
        '?'
    }
}

/// Parse a single option letter (case-insensitive) into its index.
pub fn parse_option_label(label: &str) -> Option<usize> {
    let mut chars = label.trim().chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_alphabetic() {
        return None;
    }
    Some((c.to_ascii_uppercase() as u8 - b'A') as usize)
}

fn positive(name: &str, v: f32) -> Result<(), String> {
    if !v.is_finite() || v <= 0.0 {
        return Err(format!("{name} must be finite and > 0"));
    }
    Ok(())
}

fn validate_layout(layout: &LayoutConfig) -> Result<(), String> {
    if layout.name.trim().is_empty() {
        return Err("layout name must not be empty".to_string());
    }

    let [w, h] = layout.canonical_size_px;
    if w < 16 || h < 16 {
        return Err(format!("canonical frame {w}x{h} is too small (min 16x16)"));
    }

    if layout.question_count == 0 {
        return Err("question_count must be >= 1".to_string());
    }

    if layout.options_per_question == 0 {
        return Err("options_per_question must be >= 1".to_string());
    }

    if layout.options_per_question > MAX_OPTIONS {
        return Err(format!(
            "options_per_question must be <= {MAX_OPTIONS}, got {}",
            layout.options_per_question
        ));
    }

    if layout.questions_per_column == 0 {
        return Err("questions_per_column must be >= 1".to_string());
    }

    positive("option_pitch_px", layout.option_pitch_px)?;
    positive("row_pitch_px", layout.row_pitch_px)?;
    positive("column_pitch_px", layout.column_pitch_px)?;
    positive("bubble_radius_px", layout.bubble_radius_px)?;
    if !layout.origin_px.iter().all(|v| v.is_finite()) {
        return Err("origin_px must be finite".to_string());
    }

    let diameter = 2.0 * layout.bubble_radius_px;
    if layout.options_per_question > 1 && layout.option_pitch_px <= diameter {
        return Err(format!(
            "bubble diameter ({diameter:.2}px) must be smaller than option_pitch_px ({:.2}px)",
            layout.option_pitch_px
        ));
    }
    if layout.question_count > 1 && layout.row_pitch_px <= diameter {
        return Err(format!(
            "bubble diameter ({diameter:.2}px) must be smaller than row_pitch_px ({:.2}px)",
            layout.row_pitch_px
        ));
    }
    let block_width =
        (layout.options_per_question - 1) as f32 * layout.option_pitch_px + diameter;
    if layout.column_count() > 1 && layout.column_pitch_px <= block_width {
        return Err(format!(
            "column_pitch_px ({:.2}px) must exceed the width of one column block ({block_width:.2}px)",
            layout.column_pitch_px
        ));
    }

    // Every bubble must lie inside the canonical frame.
    let r = layout.bubble_radius_px;
    let last_row = (layout.questions_per_column.min(layout.question_count) - 1) as f32;
    let min_xy = layout.origin_px;
    let max_x = layout.origin_px[0]
        + (layout.column_count() - 1) as f32 * layout.column_pitch_px
        + (layout.options_per_question - 1) as f32 * layout.option_pitch_px;
    let max_y = layout.origin_px[1] + last_row * layout.row_pitch_px;
    if min_xy[0] - r < 0.0 || min_xy[1] - r < 0.0 || max_x + r > w as f32 || max_y + r > h as f32
    {
        return Err(format!(
            "bubble grid [{:.1}, {:.1}]..[{:.1}, {:.1}] does not fit inside the {w}x{h} canonical frame",
            min_xy[0] - r,
            min_xy[1] - r,
            max_x + r,
            max_y + r
        ));
    }

    if let Some(f) = layout.fiducials {
        positive("fiducials.size_px", f.size_px)?;
        positive("fiducials.inset_px", f.inset_px)?;
        if f.inset_px < 0.5 * f.size_px {
            return Err("fiducials.inset_px must be >= half of fiducials.size_px".to_string());
        }
        if 2.0 * f.inset_px >= w.min(h) as f32 {
            return Err("fiducials.inset_px leaves no room between opposite fiducials".to_string());
        }
    }

    Ok(())
}
