//! Quadrilateral helpers shared by the boundary and fiducial aligners.

/// Four image points ordered top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Quad {
    pub corners: [[f64; 2]; 4],
}

impl Quad {
    /// Order four arbitrary points clockwise (in image coordinates) starting at
    /// the one nearest the top-left.
    pub fn from_unordered(points: [[f64; 2]; 4]) -> Self {
        let cx = points.iter().map(|p| p[0]).sum::<f64>() / 4.0;
        let cy = points.iter().map(|p| p[1]).sum::<f64>() / 4.0;

        let mut sorted = points;
        sorted.sort_by(|a, b| {
            let ta = (a[1] - cy).atan2(a[0] - cx);
            let tb = (b[1] - cy).atan2(b[0] - cx);
            ta.total_cmp(&tb)
        });

        let start = (0..4)
            .min_by(|&i, &j| {
                let si = sorted[i][0] + sorted[i][1];
                let sj = sorted[j][0] + sorted[j][1];
                si.total_cmp(&sj)
            })
            .unwrap_or(0);

        let mut corners = [[0.0; 2]; 4];
        for (k, c) in corners.iter_mut().enumerate() {
            *c = sorted[(start + k) % 4];
        }
        Self { corners }
    }

    /// Same corners, starting from corner `k` (clockwise).
    pub fn rotated(&self, k: usize) -> Self {
        Self {
            corners: std::array::from_fn(|i| self.corners[(i + k) % 4]),
        }
    }

    /// Polygon area (shoelace).
    pub fn area(&self) -> f64 {
        polygon_area(&self.corners)
    }

    /// True when every turn has the same orientation and no edge is degenerate.
    pub fn is_convex(&self) -> bool {
        let mut sign = 0.0f64;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            let c = self.corners[(i + 2) % 4];
            let cross = (b[0] - a[0]) * (c[1] - b[1]) - (b[1] - a[1]) * (c[0] - b[0]);
            if cross.abs() < 1e-9 {
                return false;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    /// Mean width over mean height.
    pub fn aspect(&self) -> f64 {
        let [tl, tr, br, bl] = self.corners;
        let width = 0.5 * (dist(tl, tr) + dist(bl, br));
        let height = 0.5 * (dist(tl, bl) + dist(tr, br));
        if height <= 0.0 {
            return f64::INFINITY;
        }
        width / height
    }
}

pub(crate) fn dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Absolute polygon area via the shoelace formula.
pub(crate) fn polygon_area(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        twice += a[0] * b[1] - b[0] * a[1];
    }
    0.5 * twice.abs()
}
