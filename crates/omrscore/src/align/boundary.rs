//! Sheet-boundary detection: the largest quadrilateral paper contour.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;

use super::quad::{dist, polygon_area, Quad};
use super::AlignConfig;
use crate::error::EvaluateError;
use crate::preprocess::PreparedImage;

/// Douglas–Peucker tolerance multipliers tried in order.
const EPSILON_STEPS: [f64; 4] = [1.0, 1.5, 2.0, 3.0];
/// Vertices turning by less than this (sine of the angle) are dropped as collinear.
const MIN_TURN_SIN: f64 = 0.2;

/// Locate the photographed sheet as the largest bright quadrilateral contour.
pub(super) fn find_sheet_quad(
    prepared: &PreparedImage,
    config: &AlignConfig,
) -> Result<Quad, EvaluateError> {
    let mask = paper_mask(&prepared.gray, prepared.paper_level);
    let contours = find_contours::<i32>(&mask);

    let best = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 4)
        .map(|c| (contour_area(&c.points), c))
        .max_by(|a, b| a.0.total_cmp(&b.0));

    let Some((area, contour)) = best else {
        return Err(EvaluateError::alignment("no paper contour found"));
    };

    let (w, h) = prepared.gray.dimensions();
    let image_area = w as f64 * h as f64;
    tracing::debug!(
        "Boundary: {} outer contours, largest area={:.0}px ({:.1}% of image)",
        contours.len(),
        area,
        100.0 * area / image_area
    );
    if area < config.min_area_frac as f64 * image_area {
        return Err(EvaluateError::alignment(format!(
            "largest paper contour covers {:.1}% of the image (min {:.1}%)",
            100.0 * area / image_area,
            100.0 * config.min_area_frac
        )));
    }

    let perimeter = arc_length(&contour.points, true);
    for step in EPSILON_STEPS {
        let epsilon = config.polygon_epsilon_frac as f64 * step * perimeter;
        if epsilon <= 0.0 {
            break;
        }
        let poly = approximate_polygon_dp(&contour.points, epsilon, true);
        let pts: Vec<[f64; 2]> = poly.iter().map(|p| [p.x as f64, p.y as f64]).collect();
        let corners = simplify_polygon(&pts, 0.02 * perimeter);
        tracing::trace!(
            "Boundary: epsilon={:.1}px -> {} vertices ({} after cleanup)",
            epsilon,
            pts.len(),
            corners.len()
        );
        if let [a, b, c, d] = corners[..] {
            return Ok(Quad::from_unordered([a, b, c, d]));
        }
    }

    Err(EvaluateError::alignment(
        "sheet boundary is not quadrilateral-shaped",
    ))
}

/// Paper pixels (brighter than the Otsu level) as foreground.
fn paper_mask(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn contour_area(points: &[Point<i32>]) -> f64 {
    let pts: Vec<[f64; 2]> = points.iter().map(|p| [p.x as f64, p.y as f64]).collect();
    polygon_area(&pts)
}

/// Drop near-duplicate and near-collinear vertices of a closed polygon.
fn simplify_polygon(points: &[[f64; 2]], min_edge: f64) -> Vec<[f64; 2]> {
    let mut pts: Vec<[f64; 2]> = Vec::with_capacity(points.len());
    for &p in points {
        if pts.last().map_or(true, |&q| dist(p, q) >= min_edge) {
            pts.push(p);
        }
    }
    while pts.len() > 1 && dist(pts[0], pts[pts.len() - 1]) < min_edge {
        pts.pop();
    }

    loop {
        let n = pts.len();
        if n < 4 {
            return pts;
        }
        let flat = (0..n).find(|&i| {
            let a = pts[(i + n - 1) % n];
            let b = pts[i];
            let c = pts[(i + 1) % n];
            let (ux, uy) = (b[0] - a[0], b[1] - a[1]);
            let (vx, vy) = (c[0] - b[0], c[1] - b[1]);
            let norm = (ux * ux + uy * uy).sqrt() * (vx * vx + vy * vy).sqrt();
            norm <= 0.0 || ((ux * vy - uy * vx) / norm).abs() < MIN_TURN_SIN
        });
        match flat {
            Some(i) => {
                pts.remove(i);
            }
            None => return pts,
        }
    }
}
