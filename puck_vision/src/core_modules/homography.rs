// THEORY:
// The `homography` module owns the two coordinate systems of the engine and the
// projective transform between them.
//
// - Pixel space: image coordinates, x to the right and y down, in pixels.
// - Table space: the rectified playfield, the unit square [0,1] x [0,1] with
//   (0,0) at the table's top-left corner as seen by the camera.
//
// A homography is fully determined by four point correspondences. We solve the
// standard 8x8 linear system (h33 fixed to 1) with an LU decomposition and keep
// both the forward and the inverse 3x3 matrices, so that detections can be
// rectified and predicted table positions can be drawn back onto the frame.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Below this magnitude the homogeneous coordinate is treated as the line at infinity.
const W_EPSILON: f64 = 1e-12;

/// A point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PixelPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A point in rectified table space; `u` runs along the top edge, `v` down the side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TablePoint {
    pub u: f64,
    pub v: f64,
}

impl TablePoint {
    pub const fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    pub fn distance(&self, other: &TablePoint) -> f64 {
        (self.u - other.u).hypot(self.v - other.v)
    }

    /// True when the point lies inside the table expanded by `margin` on every side.
    pub fn is_on_table(&self, margin: f64) -> bool {
        (-margin..=1.0 + margin).contains(&self.u) && (-margin..=1.0 + margin).contains(&self.v)
    }

    pub fn clamped(&self) -> TablePoint {
        TablePoint::new(self.u.clamp(0.0, 1.0), self.v.clamp(0.0, 1.0))
    }
}

/// One of the two table-space axes.
///
/// The goal axis runs between the two goals: the goals sit on the edges where
/// this coordinate is 0 and 1, and the paddles split the table at its midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableAxis {
    U,
    #[default]
    V,
}

impl TableAxis {
    /// The coordinate of `point` along this axis.
    pub fn along(self, point: &TablePoint) -> f64 {
        match self {
            TableAxis::U => point.u,
            TableAxis::V => point.v,
        }
    }

    /// The coordinate of `point` along the other axis.
    pub fn across(self, point: &TablePoint) -> f64 {
        match self {
            TableAxis::U => point.v,
            TableAxis::V => point.u,
        }
    }

    /// Builds a point from its coordinate along and across this axis.
    pub fn point(self, along: f64, across: f64) -> TablePoint {
        match self {
            TableAxis::U => TablePoint::new(along, across),
            TableAxis::V => TablePoint::new(across, along),
        }
    }
}

/// A projective transform from pixel space to table space, with its inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Solves the transform mapping each `source[i]` onto `target[i]`.
    ///
    /// Returns `None` when the correspondences are degenerate (three collinear
    /// points, repeated points) and the system has no unique solution.
    pub fn from_correspondences(
        source: &[(f64, f64); 4],
        target: &[(f64, f64); 4],
    ) -> Option<Self> {
        if !in_general_position(source) || !in_general_position(target) {
            return None;
        }

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (i, (&(x, y), &(u, v))) in source.iter().zip(target.iter()).enumerate() {
            let r = 2 * i;
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -u * x;
            a[(r, 7)] = -u * y;
            b[r] = u;

            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -v * x;
            a[(r + 1, 7)] = -v * y;
            b[r + 1] = v;
        }

        let h = a.lu().solve(&b)?;
        if h.iter().any(|value| !value.is_finite()) {
            return None;
        }

        let forward = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let inverse = forward.try_inverse()?;
        Some(Self { forward, inverse })
    }

    /// Maps a pixel into table space. `None` if the pixel projects to infinity.
    pub fn to_table(&self, pixel: PixelPoint) -> Option<TablePoint> {
        let (u, v) = Self::apply(&self.forward, pixel.x, pixel.y)?;
        Some(TablePoint::new(u, v))
    }

    /// Maps a table-space point back into pixel space.
    pub fn to_pixel(&self, point: TablePoint) -> Option<PixelPoint> {
        let (x, y) = Self::apply(&self.inverse, point.u, point.v)?;
        Some(PixelPoint::new(x, y))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    fn apply(matrix: &Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
        let projected = matrix * Vector3::new(x, y, 1.0);
        if projected.z.abs() < W_EPSILON {
            return None;
        }
        Some((projected.x / projected.z, projected.y / projected.z))
    }
}

/// No three of the four points are collinear (relative to the quad's scale).
fn in_general_position(points: &[(f64, f64); 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

    let scale = points
        .iter()
        .flat_map(|&(x, y)| [x.abs(), y.abs()])
        .fold(1.0_f64, f64::max);
    let tolerance = 1e-9 * scale * scale;

    TRIPLES.iter().all(|&[i, j, k]| {
        let (a, b, c) = (points[i], points[j], points[k]);
        let cross = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
        cross.abs() > tolerance
    })
}
