//! Sheet alignment: locate the sheet in the photo and rectify it into the
//! layout's canonical frame.
//!
//! Two reference sources are supported:
//! - the paper boundary (largest bright quadrilateral contour),
//! - four solid corner fiducials printed on the sheet.
//!
//! Both produce four image-space points ordered clockwise from the one nearest
//! the photo's top-left. Each cyclic order passing the plausibility check
//! (convexity, area, aspect ratio) gets a DLT homography from the canonical
//! reference positions and a rectified copy of the smoothed photo; the order
//! under which the printed bubble grid shows up best is kept.

mod boundary;
mod fiducial;
pub(crate) mod quad;
pub mod warp;

use image::GrayImage;
use nalgebra::Matrix3;

use crate::error::EvaluateError;
use crate::grid::{nominal_contrast, GridConfig};
use crate::homography::estimate_homography_dlt;
use crate::layout::LayoutConfig;
use crate::preprocess::PreparedImage;
use quad::Quad;

/// Reference points used to align the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Fiducials when the layout defines them, otherwise the sheet boundary.
    #[default]
    Auto,
    /// Outer contour of the paper.
    SheetBoundary,
    /// Four printed corner squares.
    Fiducials,
}

impl AlignmentMode {
    /// Concrete mode used for `layout` (`Auto` is resolved, never returned).
    pub fn resolve(self, layout: &LayoutConfig) -> Self {
        match self {
            Self::Auto if layout.fiducials.is_some() => Self::Fiducials,
            Self::Auto => Self::SheetBoundary,
            other => other,
        }
    }
}

/// Configuration for the alignment stage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub mode: AlignmentMode,
    /// Minimum reference-quad area as a fraction of the image area.
    pub min_area_frac: f32,
    /// Allowed relative deviation of the measured quad aspect from the expected one.
    pub aspect_tolerance: f32,
    /// Douglas–Peucker tolerance as a fraction of the contour perimeter.
    pub polygon_epsilon_frac: f32,
    /// Minimum fiducial bounding-box side (pixels).
    pub fiducial_min_side_px: u32,
    /// Maximum fiducial bounding-box side as a fraction of the shorter image side.
    pub fiducial_max_side_frac: f32,
    /// Minimum ink fraction of a fiducial's bounding box.
    pub fiducial_min_fill: f32,
    /// Candidates smaller than this fraction of the largest one are discarded.
    pub fiducial_area_ratio: f32,
    /// Grid contrast lead the chosen orientation needs over the next best one.
    pub orientation_margin: f32,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            mode: AlignmentMode::Auto,
            min_area_frac: 0.15,
            aspect_tolerance: 0.15,
            polygon_epsilon_frac: 0.02,
            fiducial_min_side_px: 6,
            fiducial_max_side_frac: 0.2,
            fiducial_min_fill: 0.6,
            fiducial_area_ratio: 0.4,
            orientation_margin: 0.08,
        }
    }
}

impl AlignConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        let unit = |name: &str, v: f32| -> Result<(), String> {
            if !(v > 0.0 && v <= 1.0) {
                return Err(format!("align.{name} must be in (0, 1]"));
            }
            Ok(())
        };
        unit("min_area_frac", self.min_area_frac)?;
        unit("polygon_epsilon_frac", self.polygon_epsilon_frac)?;
        unit("fiducial_max_side_frac", self.fiducial_max_side_frac)?;
        unit("fiducial_min_fill", self.fiducial_min_fill)?;
        unit("fiducial_area_ratio", self.fiducial_area_ratio)?;
        if !self.aspect_tolerance.is_finite() || self.aspect_tolerance < 0.0 {
            return Err("align.aspect_tolerance must be finite and >= 0".to_string());
        }
        if !self.orientation_margin.is_finite() || self.orientation_margin < 0.0 {
            return Err("align.orientation_margin must be finite and >= 0".to_string());
        }
        if self.fiducial_min_side_px == 0 {
            return Err("align.fiducial_min_side_px must be >= 1".to_string());
        }
        Ok(())
    }
}

/// A sheet rectified into the canonical frame.
#[derive(Debug, Clone)]
pub struct CanonicalSheet {
    /// Rectified grayscale image of exactly `canonical_size_px`.
    pub gray: GrayImage,
    /// Canonical → image homography.
    pub homography: Matrix3<f64>,
    /// Detected reference points in the photo, ordered TL, TR, BR, BL.
    pub corners_px: [[f64; 2]; 4],
    /// Mode actually used (never `Auto`).
    pub mode: AlignmentMode,
    /// Clockwise quarter turns of the sheet in the photo: the sheet's top-left
    /// is detected corner `quarter_turns`, counting clockwise from the one
    /// nearest the photo's top-left.
    pub quarter_turns: u8,
}

/// Locate the sheet in `prepared` and warp it into the canonical frame of `layout`.
///
/// The reference points are matched to the layout in every cyclic order that
/// fits the layout's aspect ratio; the order whose rectified sheet shows the
/// printed bubble grid best wins, so sheets photographed sideways or upside
/// down are read the right way up.
pub fn align_sheet(
    prepared: &PreparedImage,
    layout: &LayoutConfig,
    config: &AlignConfig,
    grid: &GridConfig,
) -> Result<CanonicalSheet, EvaluateError> {
    let mode = config.mode.resolve(layout);
    align_with_mode(prepared, layout, config, grid, mode).inspect_err(|e| {
        tracing::warn!("Alignment ({:?}) failed: {}", mode, e);
    })
}

fn align_with_mode(
    prepared: &PreparedImage,
    layout: &LayoutConfig,
    config: &AlignConfig,
    grid: &GridConfig,
    mode: AlignmentMode,
) -> Result<CanonicalSheet, EvaluateError> {
    let (quad, targets) = match mode {
        AlignmentMode::Fiducials => {
            let targets = layout.fiducial_centers().ok_or_else(|| {
                EvaluateError::config(format!("layout '{}' defines no fiducials", layout.name))
            })?;
            (fiducial::find_fiducial_quad(&prepared.ink, config)?, targets)
        }
        AlignmentMode::Auto | AlignmentMode::SheetBoundary => (
            boundary::find_sheet_quad(prepared, config)?,
            layout.sheet_corners(),
        ),
    };

    let (w, h) = prepared.gray.dimensions();
    let image_area = w as f64 * h as f64;
    let aspect = expected_aspect(&targets);

    let mut first_err = None;
    let mut candidates = Vec::with_capacity(4);
    for turns in 0..4u8 {
        let rotated = quad.rotated(turns as usize);
        match check_quad(&rotated, aspect, image_area, config) {
            Ok(()) => candidates.push(rectify(prepared, layout, &targets, rotated, turns, grid)?),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }

    if let (true, Some(e)) = (candidates.is_empty(), first_err) {
        return Err(e);
    }
    let sheet = pick_orientation(candidates, grid.min_ring_contrast, config.orientation_margin)?;
    let corners = sheet.sheet.corners_px;
    tracing::info!(
        "Aligned sheet via {:?}: {} quarter turn(s), corners TL=({:.1},{:.1}) BR=({:.1},{:.1})",
        mode,
        sheet.sheet.quarter_turns,
        corners[0][0],
        corners[0][1],
        corners[2][0],
        corners[2][1]
    );
    Ok(CanonicalSheet { mode, ..sheet.sheet })
}

/// A rectification under one corner order, with its grid evidence.
struct Oriented {
    sheet: CanonicalSheet,
    contrast: Option<f32>,
}

fn rectify(
    prepared: &PreparedImage,
    layout: &LayoutConfig,
    targets: &[[f64; 2]; 4],
    quad: Quad,
    quarter_turns: u8,
    grid: &GridConfig,
) -> Result<Oriented, EvaluateError> {
    let homography = estimate_homography_dlt(targets, &quad.corners)
        .map_err(|e| EvaluateError::alignment(format!("perspective transform: {e}")))?;
    let gray = warp::warp_to_canonical(&prepared.gray, &homography, layout.canonical_size_px)
        .ok_or_else(|| EvaluateError::alignment("perspective transform is not invertible"))?;
    let contrast = nominal_contrast(&gray, layout, grid);
    tracing::debug!(
        "Orientation: {} quarter turn(s) -> grid contrast {:?}",
        quarter_turns,
        contrast
    );
    Ok(Oriented {
        sheet: CanonicalSheet {
            gray,
            homography,
            corners_px: quad.corners,
            mode: AlignmentMode::Auto,
            quarter_turns,
        },
        contrast,
    })
}

/// Choose the orientation whose bubble grid clearly stands out.
///
/// When no orientation shows the grid at all the detector's own corner order
/// is kept and the grid stage reports the mismatch.
fn pick_orientation(
    mut candidates: Vec<Oriented>,
    min_contrast: f32,
    margin: f32,
) -> Result<Oriented, EvaluateError> {
    let score = |o: &Oriented| o.contrast.unwrap_or(f32::NEG_INFINITY);
    candidates.sort_by(|a, b| score(b).total_cmp(&score(a)));

    let best_score = candidates.first().map(score);
    let runner_up = candidates.get(1).map(score);
    match (best_score, runner_up) {
        (None, _) => Err(EvaluateError::alignment(
            "no corner order matches the layout's aspect ratio",
        )),
        (Some(best), _) if best < min_contrast => {
            candidates.sort_by_key(|o| o.sheet.quarter_turns);
            Ok(candidates.swap_remove(0))
        }
        (Some(best), Some(second)) if best - second < margin => {
            Err(EvaluateError::alignment(format!(
                "sheet orientation is ambiguous: grid contrast {best:.3} vs {second:.3}"
            )))
        }
        _ => Ok(candidates.swap_remove(0)),
    }
}

/// Width over height of the canonical reference rectangle (TL, TR, BR, BL).
fn expected_aspect(targets: &[[f64; 2]; 4]) -> f64 {
    let width = targets[1][0] - targets[0][0];
    let height = targets[3][1] - targets[0][1];
    width / height
}

fn check_quad(
    quad: &Quad,
    expected_aspect: f64,
    image_area: f64,
    config: &AlignConfig,
) -> Result<(), EvaluateError> {
    if !quad.is_convex() {
        return Err(EvaluateError::alignment("reference quadrilateral is not convex"));
    }
    let area = quad.area();
    if area < config.min_area_frac as f64 * image_area {
        return Err(EvaluateError::alignment(format!(
            "reference quadrilateral covers {:.1}% of the image (min {:.1}%)",
            100.0 * area / image_area,
            100.0 * config.min_area_frac
        )));
    }
    let aspect = quad.aspect();
    let rel = (aspect - expected_aspect).abs() / expected_aspect;
    tracing::debug!(
        "Quad check: area={:.0}px aspect={:.3} expected={:.3}",
        area,
        aspect,
        expected_aspect
    );
    if rel > config.aspect_tolerance as f64 {
        return Err(EvaluateError::alignment(format!(
            "reference aspect ratio {aspect:.3} deviates from the layout's {expected_aspect:.3}"
        )));
    }
    Ok(())
}
