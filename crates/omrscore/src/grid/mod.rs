//! Bubble grid location in the canonical frame.
//!
//! Regions are first placed arithmetically from the layout. When refinement
//! is enabled each center may move by a few pixels toward the strongest
//! printed-outline response; regions without a convincing outline keep their
//! arithmetic position and are flagged low-confidence.

mod refine;

use image::GrayImage;

use crate::error::EvaluateError;
use crate::layout::LayoutConfig;

/// Configuration for the grid-location stage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Enable local center refinement.
    pub refine: bool,
    /// Maximum center shift per axis (canonical pixels).
    pub search_radius_px: u32,
    /// Radial distance between the outline sample and the paper sample.
    pub ring_offset_px: f32,
    /// Number of angles sampled around each bubble.
    pub angular_samples: usize,
    /// Minimum outline contrast (intensity in [0, 1]) to trust a region.
    pub min_ring_contrast: f32,
    /// Largest tolerated fraction of low-confidence regions per sheet.
    pub max_low_confidence_frac: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            refine: true,
            search_radius_px: 3,
            ring_offset_px: 3.0,
            angular_samples: 32,
            min_ring_contrast: 0.12,
            max_low_confidence_frac: 0.25,
        }
    }
}

impl GridConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.ring_offset_px.is_finite() || self.ring_offset_px <= 0.0 {
            return Err("grid.ring_offset_px must be finite and > 0".to_string());
        }
        if self.angular_samples < 4 {
            return Err("grid.angular_samples must be >= 4".to_string());
        }
        if !self.min_ring_contrast.is_finite() {
            return Err("grid.min_ring_contrast must be finite".to_string());
        }
        if !(0.0..=1.0).contains(&self.max_low_confidence_frac) {
            return Err("grid.max_low_confidence_frac must be in [0, 1]".to_string());
        }
        Ok(())
    }
}

/// Location of one bubble in the canonical frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BubbleRegion {
    pub question: usize,
    pub option: usize,
    /// Center in canonical pixels (after refinement).
    pub center: [f32; 2],
    pub radius: f32,
    /// Integer refinement shift applied to the arithmetic center.
    pub shift_px: [i32; 2],
    /// No convincing printed outline was found around this region.
    pub low_confidence: bool,
}

/// Arithmetic bubble placement, question-major (`index = question * K + option`).
pub fn arithmetic_regions(layout: &LayoutConfig) -> Vec<BubbleRegion> {
    let mut out = Vec::with_capacity(layout.bubble_count());
    for question in 0..layout.question_count {
        for option in 0..layout.options_per_question {
            out.push(BubbleRegion {
                question,
                option,
                center: layout.bubble_center(question, option),
                radius: layout.bubble_radius_px,
                shift_px: [0, 0],
                low_confidence: false,
            });
        }
    }
    out
}

/// Mean printed-outline contrast at the arithmetic bubble centers, without
/// refinement. `None` when no bubble ring could be sampled.
///
/// Used to tell the upright orientation of a rectified sheet from rotated ones.
pub(crate) fn nominal_contrast(
    canonical: &GrayImage,
    layout: &LayoutConfig,
    config: &GridConfig,
) -> Option<f32> {
    let dirs = refine::ring_directions(config.angular_samples);
    let (sum, n) = arithmetic_regions(layout)
        .iter()
        .filter_map(|r| {
            refine::ring_contrast(canonical, r.center, r.radius, config.ring_offset_px, &dirs)
        })
        .fold((0.0f32, 0usize), |(s, n), c| (s + c, n + 1));
    (n > 0).then(|| sum / n as f32)
}

/// Place every bubble of `layout` on the rectified sheet.
pub fn locate_regions(
    canonical: &GrayImage,
    layout: &LayoutConfig,
    config: &GridConfig,
) -> Result<Vec<BubbleRegion>, EvaluateError> {
    let mut regions = arithmetic_regions(layout);
    if !config.refine {
        tracing::debug!("Grid: {} regions placed arithmetically", regions.len());
        return Ok(regions);
    }

    let dirs = refine::ring_directions(config.angular_samples);
    let search = config.search_radius_px as i32;
    let mut shifted = 0usize;
    for region in &mut regions {
        let best = refine::best_shift(
            canonical,
            region.center,
            region.radius,
            config.ring_offset_px,
            search,
            &dirs,
        );
        match best {
            Some((shift, contrast)) if contrast >= config.min_ring_contrast => {
                if shift != [0, 0] {
                    shifted += 1;
                }
                region.center = [
                    region.center[0] + shift[0] as f32,
                    region.center[1] + shift[1] as f32,
                ];
                region.shift_px = shift;
            }
            _ => region.low_confidence = true,
        }
    }

    let total = regions.len();
    let low_confidence = regions.iter().filter(|r| r.low_confidence).count();
    tracing::debug!(
        "Grid: {} regions, {} refined off-nominal, {} low-confidence",
        total,
        shifted,
        low_confidence
    );

    if total > 0 && low_confidence as f32 / total as f32 > config.max_low_confidence_frac {
        tracing::warn!(
            "Grid: {}/{} low-confidence regions exceed the allowed fraction {:.2}",
            low_confidence,
            total,
            config.max_low_confidence_frac
        );
        return Err(EvaluateError::LayoutMismatch {
            low_confidence,
            total,
            max_fraction: config.max_low_confidence_frac,
        });
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render_sheet, test_layout};
    use image::Luma;

    #[test]
    fn arithmetic_regions_are_question_major() {
        let layout = test_layout();
        let regions = arithmetic_regions(&layout);
        assert_eq!(regions.len(), 48);
        let r = regions[5 * 4 + 2];
        assert_eq!((r.question, r.option), (5, 2));
        assert_eq!(r.center, layout.bubble_center(5, 2));
        // Question 6 opens the second column block.
        assert_eq!(regions[6 * 4].center, [180.0, 90.0]);
    }

    #[test]
    fn refinement_follows_shifted_print() {
        let layout = test_layout();
        let printed = LayoutConfig {
            origin_px: [layout.origin_px[0] + 2.0, layout.origin_px[1] - 1.0],
            ..layout.clone()
        };
        let sheet = render_sheet(&printed, &[], &[]);
        let regions = locate_regions(&sheet, &layout, &GridConfig::default()).expect("located");
        assert!(regions.iter().all(|r| !r.low_confidence));
        assert!(regions.iter().all(|r| r.shift_px == [2, -1]));
        assert_eq!(regions[0].center, [52.0, 89.0]);
    }

    #[test]
    fn disabled_refinement_keeps_arithmetic_centers() {
        let layout = test_layout();
        let blank = GrayImage::from_pixel(300, 400, Luma([235]));
        let cfg = GridConfig {
            refine: false,
            ..GridConfig::default()
        };
        let regions = locate_regions(&blank, &layout, &cfg).expect("no refinement, no checks");
        assert_eq!(regions, arithmetic_regions(&layout));
    }

    #[test]
    fn nominal_contrast_prefers_the_upright_sheet() {
        let layout = test_layout();
        let sheet = render_sheet(&layout, &[(0, 1), (7, 3)], &[]);
        let upside_down = image::imageops::rotate180(&sheet);
        let cfg = GridConfig::default();

        let upright = nominal_contrast(&sheet, &layout, &cfg).expect("sampled");
        let flipped = nominal_contrast(&upside_down, &layout, &cfg).expect("sampled");
        assert!(upright > 0.4, "upright {upright}");
        assert!(upright - flipped > 0.2, "upright {upright} flipped {flipped}");

        let blank = GrayImage::from_pixel(300, 400, Luma([235]));
        let flat = nominal_contrast(&blank, &layout, &cfg).expect("sampled");
        assert!(flat.abs() < 1e-6);
    }

    #[test]
    fn sheet_without_printed_bubbles_is_a_layout_mismatch() {
        let layout = test_layout();
        let blank = GrayImage::from_pixel(300, 400, Luma([235]));
        let err = locate_regions(&blank, &layout, &GridConfig::default()).expect_err("no bubbles");
        match err {
            EvaluateError::LayoutMismatch {
                low_confidence,
                total,
                ..
            } => {
                assert_eq!(total, 48);
                assert_eq!(low_confidence, 48);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
