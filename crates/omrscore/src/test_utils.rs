//! Shared test utilities: synthetic answer sheets and simulated photos.

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::align::warp::sample_bilinear;
use crate::layout::{FiducialSpec, LayoutConfig};

pub(crate) const PAPER: u8 = 235;
pub(crate) const OUTLINE: u8 = 90;
pub(crate) const FILL: u8 = 30;
pub(crate) const FIDUCIAL: u8 = 15;

/// Small two-block sheet: 12 questions, 4 options, 6 rows per block.
pub(crate) fn test_layout() -> LayoutConfig {
    LayoutConfig {
        name: "quiz_12q".to_string(),
        canonical_size_px: [300, 400],
        question_count: 12,
        options_per_question: 4,
        questions_per_column: 6,
        origin_px: [50.0, 90.0],
        option_pitch_px: 24.0,
        row_pitch_px: 44.0,
        column_pitch_px: 130.0,
        bubble_radius_px: 8.0,
        fiducials: Some(FiducialSpec {
            inset_px: 24.0,
            size_px: 30.0,
        }),
    }
}

/// Render a canonical sheet.
///
/// Every bubble gets a printed outline; `marks` are fully filled,
/// `half_marks` only have their lower half filled.
pub(crate) fn render_sheet(
    layout: &LayoutConfig,
    marks: &[(usize, usize)],
    half_marks: &[(usize, usize)],
) -> GrayImage {
    let [w, h] = layout.canonical_size_px;
    let mut img = GrayImage::from_pixel(w, h, Luma([PAPER]));
    let r = layout.bubble_radius_px;

    for q in 0..layout.question_count {
        for o in 0..layout.options_per_question {
            let [cx, cy] = layout.bubble_center(q, o);
            let full = marks.contains(&(q, o));
            let half = half_marks.contains(&(q, o));
            let x0 = (cx - r - 2.0).max(0.0) as u32;
            let y0 = (cy - r - 2.0).max(0.0) as u32;
            let x1 = ((cx + r + 2.0) as u32).min(w - 1);
            let y1 = ((cy + r + 2.0) as u32).min(h - 1);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let dx = x as f32 - cx;
                    let dy = y as f32 - cy;
                    let d = (dx * dx + dy * dy).sqrt();
                    if d <= r - 1.0 && (full || (half && dy >= 0.0)) {
                        img.put_pixel(x, y, Luma([FILL]));
                    } else if (d - r).abs() <= 1.5 {
                        img.put_pixel(x, y, Luma([OUTLINE]));
                    }
                }
            }
        }
    }

    if let (Some(spec), Some(centers)) = (layout.fiducials, layout.fiducial_centers()) {
        let half = spec.size_px as f64 / 2.0;
        for [fx, fy] in centers {
            let (x0, x1) = ((fx - half).ceil() as u32, (fx + half).floor() as u32);
            let (y0, y1) = ((fy - half).ceil() as u32, (fy + half).floor() as u32);
            for y in y0..=y1.min(h - 1) {
                for x in x0..=x1.min(w - 1) {
                    img.put_pixel(x, y, Luma([FIDUCIAL]));
                }
            }
        }
    }
    img
}

/// Camera placement and lighting for [`photograph`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct PhotoParams {
    pub size: [u32; 2],
    /// Counter-clockwise sheet rotation in the photo (degrees).
    pub angle_deg: f64,
    /// Photo pixels per canonical pixel.
    pub scale: f64,
    /// Sheet center offset from the photo center (pixels).
    pub offset: [f64; 2],
    pub background: u8,
    /// Brightness lost from the left to the right photo edge, in [0, 1).
    pub falloff: f32,
    /// Uniform noise amplitude (gray levels), seeded.
    pub noise: u8,
    pub seed: u64,
    pub blur_sigma: f32,
}

impl Default for PhotoParams {
    fn default() -> Self {
        Self {
            size: [420, 520],
            angle_deg: 0.0,
            scale: 1.15,
            offset: [0.0, 0.0],
            background: 40,
            falloff: 0.0,
            noise: 0,
            seed: 7,
            blur_sigma: 0.8,
        }
    }
}

/// Place `sheet` on a dark background under a similarity transform, then
/// apply lighting falloff, defocus and noise.
pub(crate) fn photograph(sheet: &GrayImage, params: &PhotoParams) -> GrayImage {
    let [w, h] = params.size;
    let (sw, sh) = sheet.dimensions();
    let theta = params.angle_deg.to_radians();
    let (c, s) = (theta.cos(), theta.sin());
    let pcx = w as f64 / 2.0 + params.offset[0];
    let pcy = h as f64 / 2.0 + params.offset[1];
    let scx = (sw - 1) as f64 / 2.0;
    let scy = (sh - 1) as f64 / 2.0;

    let mut img = GrayImage::from_fn(w, h, |x, y| {
        // Inverse similarity: photo -> sheet.
        let dx = (x as f64 - pcx) / params.scale;
        let dy = (y as f64 - pcy) / params.scale;
        let u = c * dx + s * dy + scx;
        let v = -s * dx + c * dy + scy;
        let value = sample_bilinear(sheet, u as f32, v as f32)
            .map(|p| p * 255.0)
            .unwrap_or(params.background as f32);
        let light = 1.0 - params.falloff * x as f32 / w as f32;
        Luma([(value * light).round().clamp(0.0, 255.0) as u8])
    });

    if params.blur_sigma > 0.0 {
        img = imageproc::filter::gaussian_blur_f32(&img, params.blur_sigma);
    }
    if params.noise > 0 {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let n = params.noise as i16;
        for p in img.pixels_mut() {
            let v = p[0] as i16 + rng.gen_range(-n..=n);
            p[0] = v.clamp(0, 255) as u8;
        }
    }
    img
}

/// Image point where the canonical sheet point `(u, v)` lands in [`photograph`].
pub(crate) fn photo_point(sheet_size: [u32; 2], params: &PhotoParams, u: f64, v: f64) -> [f64; 2] {
    let theta = params.angle_deg.to_radians();
    let (c, s) = (theta.cos(), theta.sin());
    let du = u - (sheet_size[0] - 1) as f64 / 2.0;
    let dv = v - (sheet_size[1] - 1) as f64 / 2.0;
    [
        params.size[0] as f64 / 2.0 + params.offset[0] + params.scale * (c * du - s * dv),
        params.size[1] as f64 / 2.0 + params.offset[1] + params.scale * (s * du + c * dv),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_sheet_has_marks_where_asked() {
        let layout = test_layout();
        let sheet = render_sheet(&layout, &[(0, 1)], &[(3, 2)]);
        let [cx, cy] = layout.bubble_center(0, 1);
        assert_eq!(sheet.get_pixel(cx as u32, cy as u32)[0], FILL);
        let [cx, cy] = layout.bubble_center(0, 0);
        assert_eq!(sheet.get_pixel(cx as u32, cy as u32)[0], PAPER);
        assert_eq!(sheet.get_pixel(cx as u32 + 8, cy as u32)[0], OUTLINE);
        let [cx, cy] = layout.bubble_center(3, 2);
        assert_eq!(sheet.get_pixel(cx as u32, cy as u32 + 3)[0], FILL);
        assert_eq!(sheet.get_pixel(cx as u32, cy as u32 - 3)[0], PAPER);
        assert_eq!(sheet.get_pixel(24, 24)[0], FIDUCIAL);
    }

    #[test]
    fn photo_point_matches_photograph_mapping() {
        let layout = test_layout();
        let sheet = render_sheet(&layout, &[], &[]);
        let params = PhotoParams {
            angle_deg: 3.0,
            blur_sigma: 0.0,
            ..PhotoParams::default()
        };
        let photo = photograph(&sheet, &params);
        // Fiducial center is dark, a point just outside the sheet is background.
        let [x, y] = photo_point([300, 400], &params, 24.0, 24.0);
        assert!(photo.get_pixel(x.round() as u32, y.round() as u32)[0] < 40);
        let [x, y] = photo_point([300, 400], &params, 150.0, -10.0);
        assert_eq!(photo.get_pixel(x.round() as u32, y.round() as u32)[0], 40);
    }
}
