//! Plane-to-plane homography from point correspondences.
//!
//! Both point sets are conditioned (centroid at the origin, mean distance
//! sqrt(2)), `h33` is fixed to 1 in the conditioned frame and the remaining
//! eight entries are solved in the least-squares sense by SVD. The result is
//! mapped back to pixel coordinates and scaled so that `h33 == 1`.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use thiserror::Error;

/// Singular values below this are treated as zero in the conditioned system.
const RANK_EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HomographyError {
    #[error("need at least 4 correspondences, got {0}")]
    TooFewPoints(usize),
    #[error("point sets differ in length ({src} vs {dst})")]
    LengthMismatch { src: usize, dst: usize },
    #[error("non-finite coordinate in correspondences")]
    NonFinite,
    #[error("degenerate configuration: {0}")]
    Degenerate(&'static str),
}

/// Project `(x, y)` through `h`; NaN when the point maps to infinity.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> [f64; 2] {
    let p = h * Vector3::new(x, y, 1.0);
    if p.z.abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [p.x / p.z, p.y / p.z]
}

/// Distance between `project(h, src)` and `dst`.
pub fn reprojection_error(h: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let [u, v] = project(h, src[0], src[1]);
    (u - dst[0]).hypot(v - dst[1])
}

/// Row-major array form, used in serialized results.
pub fn matrix3_to_array(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [0usize, 1, 2].map(|r| [m[(r, 0)], m[(r, 1)], m[(r, 2)]])
}

/// Similarity moving a point set's centroid to the origin and scaling its
/// mean distance from the centroid to sqrt(2).
#[derive(Debug, Clone, Copy)]
struct Conditioner {
    center: [f64; 2],
    scale: f64,
}

impl Conditioner {
    fn fit(pts: &[[f64; 2]]) -> Option<Self> {
        let n = pts.len() as f64;
        let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
        let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
        let spread = pts.iter().map(|p| (p[0] - cx).hypot(p[1] - cy)).sum::<f64>() / n;
        (spread > 1e-12).then(|| Self {
            center: [cx, cy],
            scale: std::f64::consts::SQRT_2 / spread,
        })
    }

    fn apply(&self, p: &[f64; 2]) -> [f64; 2] {
        [
            self.scale * (p[0] - self.center[0]),
            self.scale * (p[1] - self.center[1]),
        ]
    }

    fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        #[rustfmt::skip]
        let m = Matrix3::new(
            s, 0.0, -s * self.center[0],
            0.0, s, -s * self.center[1],
            0.0, 0.0, 1.0,
        );
        m
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let inv = 1.0 / self.scale;
        #[rustfmt::skip]
        let m = Matrix3::new(
            inv, 0.0, self.center[0],
            0.0, inv, self.center[1],
            0.0, 0.0, 1.0,
        );
        m
    }
}

/// Estimate `H` with `dst ≈ project(H, src)` from four or more correspondences.
///
/// Used with canonical sheet points as `src` and photo points as `dst`.
pub fn estimate_homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<Matrix3<f64>, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < 4 {
        return Err(HomographyError::TooFewPoints(n));
    }
    if src.iter().chain(dst).flatten().any(|v| !v.is_finite()) {
        return Err(HomographyError::NonFinite);
    }

    let cs = Conditioner::fit(src).ok_or(HomographyError::Degenerate("source points coincide"))?;
    let cd =
        Conditioner::fit(dst).ok_or(HomographyError::Degenerate("destination points coincide"))?;

    // u * (h31 x + h32 y + 1) = h11 x + h12 y + h13, likewise for v.
    let mut a = DMatrix::<f64>::zeros(2 * n, 8);
    let mut b = DVector::<f64>::zeros(2 * n);
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let [x, y] = cs.apply(s);
        let [u, v] = cd.apply(d);
        let rows = [
            [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y],
            [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y],
        ];
        for (k, row) in rows.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                a[(2 * i + k, j)] = value;
            }
        }
        b[2 * i] = u;
        b[2 * i + 1] = v;
    }

    let svd = a.svd(true, true);
    if svd.rank(RANK_EPS) < 8 {
        return Err(HomographyError::Degenerate(
            "correspondences do not determine a homography",
        ));
    }
    let x = svd
        .solve(&b, RANK_EPS)
        .map_err(HomographyError::Degenerate)?;

    #[rustfmt::skip]
    let conditioned = Matrix3::new(
        x[0], x[1], x[2],
        x[3], x[4], x[5],
        x[6], x[7], 1.0,
    );
    let h = cd.inverse_matrix() * conditioned * cs.matrix();

    let h33 = h[(2, 2)];
    if h33.abs() < 1e-15 {
        return Err(HomographyError::Degenerate("source centroid maps to infinity"));
    }
    let h = h / h33;
    if h.determinant().abs() < 1e-12 {
        return Err(HomographyError::Degenerate("singular homography"));
    }
    Ok(h)
}
