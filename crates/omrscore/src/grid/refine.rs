//! Bounded local refinement of bubble centers by printed-outline contrast.

use image::GrayImage;

use crate::align::warp::sample_bilinear;

/// Contrast differences below this count as ties.
const TIE_EPS: f32 = 1e-6;

/// Unit directions for `n` evenly spaced angles.
pub(super) fn ring_directions(n: usize) -> Vec<[f32; 2]> {
    (0..n)
        .map(|i| {
            let t = i as f32 * std::f32::consts::TAU / n as f32;
            [t.cos(), t.sin()]
        })
        .collect()
}

/// Mean of `I(c + (r + offset) d) - I(c + r d)` over `dirs`, intensities in [0, 1].
///
/// Positive when a dark outline sits at radius `r` on brighter paper.
/// Returns `None` if any sample falls outside the image.
pub(super) fn ring_contrast(
    gray: &GrayImage,
    center: [f32; 2],
    radius: f32,
    offset: f32,
    dirs: &[[f32; 2]],
) -> Option<f32> {
    if dirs.is_empty() {
        return None;
    }
    let outer = radius + offset;
    let mut acc = 0.0f32;
    let at = |r: f32, d: &[f32; 2]| {
        sample_bilinear(gray, center[0] + r * d[0], center[1] + r * d[1])
    };
    for d in dirs {
        acc += at(outer, d)? - at(radius, d)?;
    }
    Some(acc / dirs.len() as f32)
}

/// Best integer shift within `search_radius` (nominal first, ties keep the earlier one)
/// and its contrast. `None` when no candidate could be sampled.
pub(super) fn best_shift(
    gray: &GrayImage,
    nominal: [f32; 2],
    radius: f32,
    offset: f32,
    search_radius: i32,
    dirs: &[[f32; 2]],
) -> Option<([i32; 2], f32)> {
    let mut best: Option<([i32; 2], f32)> =
        ring_contrast(gray, nominal, radius, offset, dirs).map(|c| ([0, 0], c));

    for dy in -search_radius..=search_radius {
        for dx in -search_radius..=search_radius {
            if dx == 0 && dy == 0 {
                continue;
            }
            let c = [nominal[0] + dx as f32, nominal[1] + dy as f32];
            if let Some(score) = ring_contrast(gray, c, radius, offset, dirs) {
                if best.map_or(true, |(_, b)| score > b + TIE_EPS) {
                    best = Some(([dx, dy], score));
                }
            }
        }
    }
    best
}
