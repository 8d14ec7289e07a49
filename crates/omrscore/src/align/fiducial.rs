//! Corner-fiducial detection on the ink mask.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use super::quad::Quad;
use super::AlignConfig;
use crate::error::EvaluateError;

/// Solid blob found on the ink mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Blob {
    pub area: u32,
    pub bbox_min: [u32; 2],
    pub bbox_max: [u32; 2],
    pub centroid: [f64; 2],
}

impl Blob {
    fn width(&self) -> u32 {
        self.bbox_max[0] - self.bbox_min[0] + 1
    }

    fn height(&self) -> u32 {
        self.bbox_max[1] - self.bbox_min[1] + 1
    }

    fn fill(&self) -> f32 {
        self.area as f32 / (self.width() * self.height()) as f32
    }
}

#[derive(Default, Clone, Copy)]
struct Accum {
    area: u32,
    min: [u32; 2],
    max: [u32; 2],
    sum: [f64; 2],
}

/// Label 8-connected ink components and summarize each one.
pub(super) fn ink_blobs(ink: &GrayImage) -> Vec<Blob> {
    let labels = connected_components(ink, Connectivity::Eight, Luma([0u8]));

    let mut acc: Vec<Accum> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let l = label[0] as usize;
        if l == 0 {
            continue;
        }
        if acc.len() < l {
            acc.resize(l, Accum::default());
        }
        let a = &mut acc[l - 1];
        if a.area == 0 {
            a.min = [x, y];
            a.max = [x, y];
        } else {
            a.min = [a.min[0].min(x), a.min[1].min(y)];
            a.max = [a.max[0].max(x), a.max[1].max(y)];
        }
        a.area += 1;
        a.sum[0] += x as f64;
        a.sum[1] += y as f64;
    }

    acc.into_iter()
        .filter(|a| a.area > 0)
        .map(|a| Blob {
            area: a.area,
            bbox_min: a.min,
            bbox_max: a.max,
            centroid: [a.sum[0] / a.area as f64, a.sum[1] / a.area as f64],
        })
        .collect()
}

/// Find the four corner fiducials and return their centroids ordered TL, TR, BR, BL.
pub(super) fn find_fiducial_quad(
    ink: &GrayImage,
    config: &AlignConfig,
) -> Result<Quad, EvaluateError> {
    let (w, h) = ink.dimensions();
    let max_side = config.fiducial_max_side_frac * w.min(h) as f32;

    let blobs = ink_blobs(ink);
    let mut candidates: Vec<Blob> = blobs
        .iter()
        .copied()
        .filter(|b| {
            let (bw, bh) = (b.width(), b.height());
            let aspect = bw as f32 / bh as f32;
            let touches_border = b.bbox_min[0] == 0
                || b.bbox_min[1] == 0
                || b.bbox_max[0] + 1 >= w
                || b.bbox_max[1] + 1 >= h;
            !touches_border
                && bw.min(bh) >= config.fiducial_min_side_px
                && (bw.max(bh) as f32) <= max_side
                && (0.5..=2.0).contains(&aspect)
                && b.fill() >= config.fiducial_min_fill
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.area
            .cmp(&a.area)
            .then(a.bbox_min[1].cmp(&b.bbox_min[1]))
            .then(a.bbox_min[0].cmp(&b.bbox_min[0]))
    });
    if let Some(largest) = candidates.first().map(|b| b.area) {
        let min_area = config.fiducial_area_ratio * largest as f32;
        candidates.retain(|b| b.area as f32 >= min_area);
    }

    tracing::debug!(
        "Fiducials: {} ink components, {} square candidates",
        blobs.len(),
        candidates.len()
    );
    if candidates.len() < 4 {
        return Err(EvaluateError::alignment(format!(
            "found {} fiducial candidates, need 4",
            candidates.len()
        )));
    }

    let pick = |score: fn(&[f64; 2]) -> f64| -> usize {
        let mut best = 0;
        for (i, c) in candidates.iter().enumerate().skip(1) {
            if score(&c.centroid) > score(&candidates[best].centroid) {
                best = i;
            }
        }
        best
    };
    let tl = pick(|p| -(p[0] + p[1]));
    let tr = pick(|p| p[0] - p[1]);
    let br = pick(|p| p[0] + p[1]);
    let bl = pick(|p| p[1] - p[0]);

    let idx = [tl, tr, br, bl];
    for i in 0..4 {
        for j in (i + 1)..4 {
            if idx[i] == idx[j] {
                return Err(EvaluateError::alignment(
                    "fiducial candidates do not span four distinct corners",
                ));
            }
        }
    }

    Ok(Quad {
        corners: idx.map(|i| candidates[i].centroid),
    })
}
