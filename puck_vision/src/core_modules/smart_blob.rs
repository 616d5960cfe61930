// THEORY:
// The `SmartBlob` module holds the output of the spatial grouping layer: one
// contiguous region of mask pixels found in a single frame.
//
// Key architectural principles:
// 1.  **Stateless Data Container**: A `SmartBlob` represents a detected region
//     within a single frame. It has no memory of its past positions; that is the
//     tracker's job.
// 2.  **Geometry up front**: everything the detector filters on (area, enclosing
//     circle radius, circularity) is computed once when the blob is built, so
//     filters are plain field comparisons.
// 3.  **Boundary kept**: the boundary pixels double as the contour point cloud
//     the calibrator uses to pick the table corners.

use crate::core_modules::homography::PixelPoint;

/// A simple struct to represent an integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// Represents a single, spatially coherent region detected in a frame.
#[derive(Debug, Clone)]
pub struct SmartBlob {
    /// Every mask pixel of the region that touches a background pixel.
    pub boundary: Vec<Point>,
    /// Number of pixels in the region, the analogue of contour area.
    pub area: usize,
    /// The mean position of all region pixels.
    pub centroid: PixelPoint,
    /// Radius of the smallest centroid-centred circle holding every boundary pixel.
    pub enclosing_radius: f64,
}

impl SmartBlob {
    /// Area relative to the enclosing circle: 1.0 for a filled disc, lower for
    /// elongated or ragged regions.
    pub fn circularity(&self) -> f64 {
        let circle_area = std::f64::consts::PI * self.enclosing_radius * self.enclosing_radius;
        if circle_area <= 0.0 {
            return 0.0;
        }
        (self.area as f64 / circle_area).min(1.0)
    }
}
