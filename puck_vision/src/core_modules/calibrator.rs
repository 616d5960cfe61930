// THEORY:
// The `calibrator` module establishes where the table is. Everything downstream
// works in table space, so this runs once, before the first tracked frame, and
// its output is never mutated afterwards.
//
// Key architectural principles:
// 1.  **Segment the surface, not the rails**: the playing surface is the largest
//     bright, unsaturated area in the frame. A narrow luma band isolates it, a
//     closing merges the pieces the centre line and face-off circles cut it
//     into, and small regions (reflections, jerseys) are dropped by area.
// 2.  **Extremal corners**: the four table corners are the extreme boundary
//     points along the two diagonals. With image y pointing down, the top-left
//     corner minimizes x+y, bottom-right maximizes it, top-right minimizes y-x
//     and bottom-left maximizes it. This needs no line fitting and copes with
//     rounded corners, but it trusts the segmentation: several disconnected
//     bright areas will pull the corners outward. That failure is reported by
//     the quadrilateral checks rather than papered over.
// 3.  **Immutable mapping**: a `PlayfieldMapping` is validated on construction
//     (convex, clockwise, invertible) and is replaced wholesale on
//     re-calibration.

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::CalibrationConfig;
use crate::core_modules::blob_detector::blob_detector::find_blobs;
use crate::core_modules::homography::{Homography, PixelPoint, TableAxis, TablePoint};
use crate::error::{CalibrationError, Result};

/// Table-space corners in the same order as `PlayfieldMapping::corners`.
const UNIT_SQUARE: [(f64, f64); 4] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];

/// The calibrated relationship between image pixels and the table.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayfieldMapping {
    /// Top-left, top-right, bottom-right, bottom-left, in pixels.
    corners: [PixelPoint; 4],
    homography: Homography,
}

impl PlayfieldMapping {
    /// Builds a mapping from four ordered pixel corners (TL, TR, BR, BL).
    ///
    /// The corners must form a convex quadrilateral traversed clockwise on screen.
    pub fn from_corners(corners: [PixelPoint; 4]) -> Result<Self> {
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            let c = corners[(i + 2) % 4];
            let turn = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
            if turn <= 0.0 {
                return Err(CalibrationError::Degenerate {
                    reason: format!(
                        "corners are not convex and clockwise (turn at corner {} is {turn:.1})",
                        (i + 1) % 4
                    ),
                });
            }
        }

        let source = corners.map(|p| (p.x, p.y));
        let homography = Homography::from_correspondences(&source, &UNIT_SQUARE)
            .ok_or(CalibrationError::SingularHomography)?;

        Ok(Self { corners, homography })
    }

    pub fn corners(&self) -> &[PixelPoint; 4] {
        &self.corners
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    /// Shoelace area of the corner quadrilateral, in square pixels.
    pub fn area(&self) -> f64 {
        quad_area(&self.corners)
    }

    pub fn to_table(&self, pixel: PixelPoint) -> Option<TablePoint> {
        self.homography.to_table(pixel)
    }

    pub fn to_pixel(&self, point: TablePoint) -> Option<PixelPoint> {
        self.homography.to_pixel(point)
    }

    /// Pixel segments of the two goal mouths: the low edge of `axis` first, then the high edge.
    pub fn goal_mouths(
        &self,
        axis: TableAxis,
        mouth: [f64; 2],
    ) -> Option<[(PixelPoint, PixelPoint); 2]> {
        let segment = |edge: f64| -> Option<(PixelPoint, PixelPoint)> {
            Some((
                self.to_pixel(axis.point(edge, mouth[0]))?,
                self.to_pixel(axis.point(edge, mouth[1]))?,
            ))
        };
        Some([segment(0.0)?, segment(1.0)?])
    }
}

fn quad_area(corners: &[PixelPoint; 4]) -> f64 {
    let twice: f64 = (0..4)
        .map(|i| {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice / 2.0
}

/// Finds the table in a reference frame.
#[derive(Debug, Clone)]
pub struct Calibrator {
    config: CalibrationConfig,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    /// Produces the mapping for `frame`, or the reason it could not.
    ///
    /// Configured manual corners take precedence over segmentation.
    pub fn calibrate(&self, frame: &RgbImage) -> Result<PlayfieldMapping> {
        if let Some(manual) = self.config.manual_corners {
            let corners = manual.map(|[x, y]| PixelPoint::new(x, y));
            let mapping = PlayfieldMapping::from_corners(corners)?;
            info!(?corners, "using configured table corners");
            return Ok(mapping);
        }

        let corners = self.find_corners(frame)?;
        let frame_area = frame.width() as f64 * frame.height() as f64;
        let area = quad_area(&corners);
        if area < self.config.min_table_area_fraction * frame_area {
            return Err(CalibrationError::Degenerate {
                reason: format!(
                    "table quadrilateral covers {:.1}% of the frame, expected at least {:.1}%",
                    100.0 * area / frame_area,
                    100.0 * self.config.min_table_area_fraction
                ),
            });
        }

        let mapping = PlayfieldMapping::from_corners(corners)?;
        info!(
            top_left = ?corners[0],
            top_right = ?corners[1],
            bottom_right = ?corners[2],
            bottom_left = ?corners[3],
            "table calibrated"
        );
        Ok(mapping)
    }

    /// Tries successive frames until one calibrates or `max_attempts` frames were spent.
    ///
    /// Returns the last failure when no frame calibrates, and `NoFrame` if the
    /// source was empty.
    pub fn calibrate_from<I>(&self, frames: I) -> Result<PlayfieldMapping>
    where
        I: IntoIterator<Item = RgbImage>,
    {
        let mut last_error = CalibrationError::NoFrame;
        for (attempt, frame) in frames.into_iter().take(self.config.max_attempts).enumerate() {
            match self.calibrate(&frame) {
                Ok(mapping) => return Ok(mapping),
                Err(error) => {
                    warn!(attempt = attempt + 1, %error, "calibration attempt failed");
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    /// The four extremal surface points, ordered TL, TR, BR, BL.
    pub fn find_corners(&self, frame: &RgbImage) -> Result<[PixelPoint; 4]> {
        let mask = self
            .config
            .luma_band
            .mask(frame)
            .close(self.config.close_kernel);
        let regions = find_blobs(&mask, self.config.min_region_area + 1);
        let points: Vec<PixelPoint> = regions
            .iter()
            .flat_map(|blob| blob.boundary.iter())
            .map(|p| PixelPoint::new(p.x as f64, p.y as f64))
            .collect();
        debug!(
            surface_pixels = mask.count(),
            regions = regions.len(),
            boundary_points = points.len(),
            "segmented table surface"
        );

        if points.len() < 4 {
            return Err(CalibrationError::InsufficientCorners { found: points.len() });
        }

        let extreme = |key: fn(&PixelPoint) -> f64, largest: bool| -> PixelPoint {
            let pick = |a: &&PixelPoint, b: &&PixelPoint| key(a).total_cmp(&key(b));
            let found = if largest {
                points.iter().max_by(pick)
            } else {
                points.iter().min_by(pick)
            };
            // `points` holds at least four entries here.
            found.copied().unwrap_or_default()
        };

        let sum = |p: &PixelPoint| p.x + p.y;
        let diff = |p: &PixelPoint| p.y - p.x;
        Ok([
            extreme(sum, false),
            extreme(diff, false),
            extreme(sum, true),
            extreme(diff, true),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SURFACE: Rgb<u8> = Rgb([197, 197, 197]);
    const BACKGROUND: Rgb<u8> = Rgb([30, 40, 35]);

    /// Frame with a filled convex quad of table surface (clockwise corners).
    fn table_frame(width: u32, height: u32, quad: [(f64, f64); 4]) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let (px, py) = (x as f64, y as f64);
            let inside = (0..4).all(|i| {
                let (ax, ay) = quad[i];
                let (bx, by) = quad[(i + 1) % 4];
                (bx - ax) * (py - ay) - (by - ay) * (px - ax) >= 0.0
            });
            if inside { SURFACE } else { BACKGROUND }
        })
    }

    const QUAD: [(f64, f64); 4] = [(20.0, 15.0), (180.0, 20.0), (185.0, 135.0), (15.0, 130.0)];

    fn near(p: PixelPoint, (x, y): (f64, f64)) -> bool {
        p.distance(&PixelPoint::new(x, y)) <= 3.0
    }

    #[test]
    fn finds_the_corners_of_a_bright_table() {
        let frame = table_frame(200, 150, QUAD);
        let calibrator = Calibrator::new(CalibrationConfig::default());
        let corners = calibrator.find_corners(&frame).unwrap();
        for (found, expected) in corners.iter().zip(QUAD) {
            assert!(near(*found, expected), "{found:?} vs {expected:?}");
        }

        let mapping = calibrator.calibrate(&frame).unwrap();
        let centre = mapping.to_table(PixelPoint::new(100.0, 75.0)).unwrap();
        assert!((centre.u - 0.5).abs() < 0.05 && (centre.v - 0.5).abs() < 0.05);
    }

    #[test]
    fn dark_frame_has_insufficient_corners() {
        let frame = RgbImage::from_pixel(120, 90, BACKGROUND);
        let result = Calibrator::new(CalibrationConfig::default()).calibrate(&frame);
        assert_eq!(result, Err(CalibrationError::InsufficientCorners { found: 0 }));
    }

    #[test]
    fn a_small_bright_patch_is_degenerate() {
        let frame = table_frame(200, 150, [(50.0, 50.0), (80.0, 50.0), (80.0, 70.0), (50.0, 70.0)]);
        let result = Calibrator::new(CalibrationConfig::default()).calibrate(&frame);
        assert!(matches!(result, Err(CalibrationError::Degenerate { .. })), "{result:?}");
    }

    #[test]
    fn counter_clockwise_corners_are_rejected() {
        let corners = [
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(0.0, 100.0),
            PixelPoint::new(100.0, 100.0),
            PixelPoint::new(100.0, 0.0),
        ];
        assert!(matches!(
            PlayfieldMapping::from_corners(corners),
            Err(CalibrationError::Degenerate { .. })
        ));
    }

    #[test]
    fn manual_corners_skip_segmentation() {
        let config = CalibrationConfig {
            manual_corners: Some([[0.0, 0.0], [100.0, 0.0], [100.0, 50.0], [0.0, 50.0]]),
            ..CalibrationConfig::default()
        };
        let frame = RgbImage::from_pixel(10, 10, BACKGROUND);
        let mapping = Calibrator::new(config).calibrate(&frame).unwrap();
        let p = mapping.to_table(PixelPoint::new(50.0, 25.0)).unwrap();
        assert!((p.u - 0.5).abs() < 1e-9 && (p.v - 0.5).abs() < 1e-9);
        assert!((mapping.area() - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn calibrate_from_skips_bad_frames() {
        let frames = vec![
            RgbImage::from_pixel(200, 150, BACKGROUND),
            table_frame(200, 150, QUAD),
        ];
        let calibrator = Calibrator::new(CalibrationConfig::default());
        assert!(calibrator.calibrate_from(frames).is_ok());
        assert_eq!(
            calibrator.calibrate_from(Vec::<RgbImage>::new()),
            Err(CalibrationError::NoFrame)
        );
    }

    #[test]
    fn calibrate_from_gives_up_after_max_attempts() {
        let config = CalibrationConfig {
            max_attempts: 1,
            ..CalibrationConfig::default()
        };
        let frames = vec![
            RgbImage::from_pixel(200, 150, BACKGROUND),
            table_frame(200, 150, QUAD),
        ];
        let result = Calibrator::new(config).calibrate_from(frames);
        assert_eq!(result, Err(CalibrationError::InsufficientCorners { found: 0 }));
    }

    #[test]
    fn goal_mouths_sit_on_the_short_edges() {
        let mapping = PlayfieldMapping::from_corners([
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(100.0, 0.0),
            PixelPoint::new(100.0, 200.0),
            PixelPoint::new(0.0, 200.0),
        ])
        .unwrap();
        let [low, high] = mapping.goal_mouths(TableAxis::V, [0.3, 0.7]).unwrap();
        assert!((low.0.x - 30.0).abs() < 1e-6 && low.0.y.abs() < 1e-6);
        assert!((high.1.x - 70.0).abs() < 1e-6 && (high.1.y - 200.0).abs() < 1e-6);
    }
}
