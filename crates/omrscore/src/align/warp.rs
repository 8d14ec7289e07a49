//! Sub-pixel sampling and perspective rectification into the canonical frame.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::Matrix3;

/// Intensity written for canonical pixels that map outside the photo.
const OUTSIDE_FILL: u8 = 255;

/// Bilinear intensity at `(x, y)`, scaled to [0, 1].
///
/// `None` outside `[0, w - 1) x [0, h - 1)` and for NaN coordinates.
#[inline]
pub fn sample_bilinear(img: &GrayImage, x: f32, y: f32) -> Option<f32> {
    let (w, h) = img.dimensions();
    let inside = x >= 0.0 && y >= 0.0 && x < w as f32 - 1.0 && y < h as f32 - 1.0;
    if !inside {
        return None;
    }
    let (x0, y0) = (x as u32, y as u32);
    let (tx, ty) = (x - x0 as f32, y - y0 as f32);
    let px = |dx: u32, dy: u32| img.get_pixel(x0 + dx, y0 + dy)[0] as f32;

    let top = px(0, 0) + tx * (px(1, 0) - px(0, 0));
    let bottom = px(0, 1) + tx * (px(1, 1) - px(0, 1));
    Some((top + ty * (bottom - top)) / 255.0)
}

/// Resample `photo` into a `size[0] x size[1]` canonical image.
///
/// `h_canon_to_img` maps canonical pixel coordinates into photo coordinates.
/// Returns `None` when the mapping cannot be inverted.
pub fn warp_to_canonical(
    photo: &GrayImage,
    h_canon_to_img: &Matrix3<f64>,
    size: [u32; 2],
) -> Option<GrayImage> {
    let img_to_canon = h_canon_to_img.try_inverse()?;
    let projection =
        Projection::from_matrix(std::array::from_fn(|i| img_to_canon[(i / 3, i % 3)] as f32))?;

    let mut out = GrayImage::new(size[0], size[1]);
    warp_into(
        photo,
        &projection,
        Interpolation::Bilinear,
        Luma([OUTSIDE_FILL]),
        &mut out,
    );
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_sample_interpolates_and_rejects_edges() {
        let img = GrayImage::from_fn(4, 4, |x, _| Luma([(x * 60) as u8]));
        let v = sample_bilinear(&img, 1.5, 1.0).expect("inside");
        assert!((v - 90.0 / 255.0).abs() < 1e-6);
        assert!(sample_bilinear(&img, 3.0, 1.0).is_none());
        assert!(sample_bilinear(&img, -0.1, 1.0).is_none());
        assert!(sample_bilinear(&img, f32::NAN, 1.0).is_none());
    }

    #[test]
    fn identity_warp_copies_interior() {
        let img = GrayImage::from_fn(40, 30, |x, y| Luma([((x * 5 + y * 3) % 256) as u8]));
        let out = warp_to_canonical(&img, &Matrix3::identity(), [40, 30]).expect("invertible");
        assert_eq!(out.dimensions(), (40, 30));
        for y in 0..29 {
            for x in 0..39 {
                assert_eq!(out.get_pixel(x, y), img.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn translation_warp_fills_outside_with_paper() {
        let img = GrayImage::from_pixel(50, 50, Luma([20]));
        #[rustfmt::skip]
        let shift = Matrix3::new(
            1.0, 0.0, 30.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        );
        let out = warp_to_canonical(&img, &shift, [40, 10]).expect("invertible");
        assert_eq!(out.get_pixel(5, 5)[0], 20);
        assert_eq!(out.get_pixel(25, 5)[0], OUTSIDE_FILL);
    }

    #[test]
    fn singular_mapping_has_no_warp() {
        let flat = Matrix3::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let img = GrayImage::from_pixel(10, 10, Luma([100]));
        assert!(warp_to_canonical(&img, &flat, [10, 10]).is_none());
    }
}
