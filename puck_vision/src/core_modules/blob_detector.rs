// THEORY:
// The `BlobDetector` is the engine of the Spatial Grouping Layer. It takes the
// binary mask produced by a colour or luma band and splits it into spatially
// coherent regions, or "blobs."
//
// Key architectural principles & algorithm steps:
// 1.  **Seeding by scan order**: every set pixel that has not been visited yet
//     seeds a new region. Scanning row-major keeps the blob order stable for a
//     given mask, which makes tests and logs reproducible.
// 2.  **Region Growing**: from the seed, the region grows iteratively through all
//     8 neighbours that are set in the mask. An explicit stack is used instead
//     of recursion so a table-sized region cannot overflow the call stack.
// 3.  **Data Aggregation**: once a region is fully grown, its geometry (area,
//     centroid, boundary pixels, enclosing radius) is computed and
//     packaged into a `SmartBlob`.
// 4.  **Stateless Utility**: `find_blobs` takes one mask and produces the blobs
//     of that mask. It has no memory of previous frames.

use crate::core_modules::color_mask::BinaryMask;
use crate::core_modules::homography::PixelPoint;
use crate::core_modules::smart_blob::{Point, SmartBlob};

pub mod blob_detector {
    use super::*;

    const NEIGHBOURS_8: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];

    const NEIGHBOURS_4: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

    /// Extracts every 8-connected region of `mask` whose pixel count is at least `min_area`.
    ///
    /// Blobs come back in scan order of their first pixel.
    pub fn find_blobs(mask: &BinaryMask, min_area: usize) -> Vec<SmartBlob> {
        let width = mask.width();
        let height = mask.height();
        let mut visited = vec![false; (width as usize) * (height as usize)];
        let mut blobs: Vec<SmartBlob> = Vec::new();

        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                if visited[index] || !mask.get(x as i64, y as i64) {
                    continue;
                }

                let pixels = grow_region(Point { x, y }, mask, &mut visited);
                if pixels.len() < min_area {
                    continue;
                }

                blobs.push(aggregate(&pixels, mask));
            }
        }

        blobs
    }

    /// Iterative flood fill from `seed` over set, unvisited pixels.
    fn grow_region(seed: Point, mask: &BinaryMask, visited: &mut [bool]) -> Vec<Point> {
        let width = mask.width();
        let mut region: Vec<Point> = Vec::new();
        let mut stack: Vec<Point> = vec![seed];
        visited[(seed.y * width + seed.x) as usize] = true;

        while let Some(current) = stack.pop() {
            region.push(current);

            for (dx, dy) in NEIGHBOURS_8 {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if !mask.get(nx, ny) {
                    continue;
                }

                let index = (ny as u32 * width + nx as u32) as usize;
                if !visited[index] {
                    visited[index] = true;
                    stack.push(Point {
                        x: nx as u32,
                        y: ny as u32,
                    });
                }
            }
        }

        region
    }

    fn aggregate(pixels: &[Point], mask: &BinaryMask) -> SmartBlob {
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut boundary = Vec::new();

        for point in pixels {
            sum_x += point.x as f64;
            sum_y += point.y as f64;

            let on_edge = NEIGHBOURS_4
                .iter()
                .any(|(dx, dy)| !mask.get(point.x as i64 + dx, point.y as i64 + dy));
            if on_edge {
                boundary.push(*point);
            }
        }

        let area = pixels.len();
        let centroid = PixelPoint::new(sum_x / area as f64, sum_y / area as f64);

        // +0.5 covers the pixel's own extent, so a single pixel has radius 0.5.
        let enclosing_radius = boundary
            .iter()
            .map(|p| centroid.distance(&PixelPoint::new(p.x as f64, p.y as f64)))
            .fold(0.0_f64, f64::max)
            + 0.5;

        SmartBlob {
            boundary,
            area,
            centroid,
            enclosing_radius,
        }
    }
}
