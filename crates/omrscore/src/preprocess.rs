//! Image preprocessing: grayscale conversion, smoothing, contrast gating and
//! adaptive binarization.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::stats::cumulative_histogram;

use crate::error::EvaluateError;

/// Configuration for the preprocessing stage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Minimum accepted image width (pixels).
    pub min_width_px: u32,
    /// Minimum accepted image height (pixels).
    pub min_height_px: u32,
    /// Gaussian smoothing sigma; `0` disables smoothing.
    pub blur_sigma: f32,
    /// Histogram tail fraction ignored on each side when measuring dynamic range.
    pub range_percentile: f32,
    /// Minimum intensity spread between the two quantiles.
    pub min_dynamic_range: u8,
    /// Adaptive-threshold block radius as a fraction of the shorter image side.
    pub block_radius_frac: f32,
    /// Lower bound on the adaptive-threshold block radius (pixels).
    pub min_block_radius_px: u32,
    /// How much darker than the local mean a pixel must be to count as ink.
    pub ink_offset: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_width_px: 200,
            min_height_px: 200,
            blur_sigma: 1.0,
            range_percentile: 0.02,
            min_dynamic_range: 48,
            block_radius_frac: 0.05,
            min_block_radius_px: 7,
            ink_offset: 12,
        }
    }
}

impl PreprocessConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.min_width_px == 0 || self.min_height_px == 0 {
            return Err("preprocess minimum size must be >= 1px".to_string());
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err("preprocess.blur_sigma must be finite and >= 0".to_string());
        }
        if !(0.0..0.5).contains(&self.range_percentile) {
            return Err("preprocess.range_percentile must be in [0, 0.5)".to_string());
        }
        if !self.block_radius_frac.is_finite() || self.block_radius_frac < 0.0 {
            return Err("preprocess.block_radius_frac must be finite and >= 0".to_string());
        }
        if self.min_block_radius_px == 0 {
            return Err("preprocess.min_block_radius_px must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Working form of one photographed sheet.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Smoothed grayscale image.
    pub gray: GrayImage,
    /// Binary ink mask: 255 where a pixel is darker than its surroundings.
    pub ink: GrayImage,
    /// Global Otsu level separating paper from background and ink.
    pub paper_level: u8,
    /// Measured intensity spread between the configured quantiles.
    pub dynamic_range: u8,
}

/// Convert any decoded raster to a single-channel intensity image.
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Run the preprocessing stage.
pub fn prepare(
    gray: &GrayImage,
    config: &PreprocessConfig,
) -> Result<PreparedImage, EvaluateError> {
    let (w, h) = gray.dimensions();
    if w < config.min_width_px || h < config.min_height_px {
        return Err(EvaluateError::image_quality(format!(
            "resolution {w}x{h} is below the minimum {}x{}",
            config.min_width_px, config.min_height_px
        )));
    }

    let smoothed = if config.blur_sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(gray, config.blur_sigma)
    } else {
        gray.clone()
    };

    let (lo, hi) = quantile_range(&smoothed, config.range_percentile);
    let dynamic_range = hi.saturating_sub(lo);
    if dynamic_range < config.min_dynamic_range {
        return Err(EvaluateError::image_quality(format!(
            "contrast too low to binarize: dynamic range {dynamic_range} < {}",
            config.min_dynamic_range
        )));
    }

    let paper_level = imageproc::contrast::otsu_level(&smoothed);
    let block_radius = ((w.min(h) as f32 * config.block_radius_frac).round() as u32)
        .max(config.min_block_radius_px);
    let ink = binarize_adaptive(&smoothed, block_radius, config.ink_offset);

    tracing::debug!(
        "Preprocess: {}x{} range={} (q{:.2}={}, q{:.2}={}) otsu={} block_radius={}",
        w,
        h,
        dynamic_range,
        config.range_percentile,
        lo,
        1.0 - config.range_percentile,
        hi,
        paper_level,
        block_radius
    );

    Ok(PreparedImage {
        gray: smoothed,
        ink,
        paper_level,
        dynamic_range,
    })
}

/// Intensities at the `frac` and `1 - frac` histogram quantiles.
pub(crate) fn quantile_range(gray: &GrayImage, frac: f32) -> (u8, u8) {
    let n = gray.as_raw().len() as u64;
    let Some(cum) = cumulative_histogram(gray).channels.first().copied() else {
        return (0, 0);
    };
    if n == 0 {
        return (0, 0);
    }
    let tail = ((n as f64) * frac as f64).floor() as u64;

    // cum[v] counts pixels <= v.
    let lo = cum.iter().position(|&c| c as u64 > tail).unwrap_or(0);
    let hi = (1..256)
        .rev()
        .find(|&v| n - (cum[v - 1] as u64) > tail)
        .unwrap_or(0);
    (lo as u8, hi as u8)
}

/// Local-mean binarization: ink (255) where `v < mean(block) - offset`.
pub(crate) fn binarize_adaptive(gray: &GrayImage, block_radius: u32, offset: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    // (w + 1) x (h + 1); entry (x, y) holds the sum over [0, x) x [0, y).
    let integral = imageproc::integral_image::integral_image::<_, u64>(gray);
    let at = |x: u32, y: u32| integral.get_pixel(x, y)[0];

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let y0 = y.saturating_sub(block_radius);
        let y1 = (y + block_radius + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(block_radius);
            let x1 = (x + block_radius + 1).min(w);
            let area = ((x1 - x0) * (y1 - y0)) as u64;
            let sum = (at(x1, y1) + at(x0, y0)) - (at(x0, y1) + at(x1, y0));
            let v = gray.get_pixel(x, y)[0] as u64;
            if (v + offset as u64) * area < sum {
                out.put_pixel(x, y, Luma([255]));
            }
        }
    }
    out
}
