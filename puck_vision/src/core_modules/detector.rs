// THEORY:
// The `detector` module turns one frame into at most one raw candidate per
// tracked entity. It is stateless: it knows nothing about where things were
// last frame, which is the tracker's job.
//
// Key architectural principles & algorithm steps:
// 1.  **Hands first**: hand skeletons from the external hand tracker are the
//     primary paddle signal. Each surviving hand is assigned to a half of the
//     table by its coordinate along the goal axis (below 0.5 is paddle A).
//     When two hands land in the same half, the one with more landmarks on
//     the table wins.
// 2.  **Colour fallback**: a half without a hand falls back to the largest
//     blob of the paddle colour band in that half.
// 3.  **Puck by elimination**: puck-coloured blobs are filtered by size,
//     enclosing radius and circularity, and anything sitting on a hand-derived
//     paddle is discarded (red paddles and red gloves look like pucks). The
//     largest survivor wins.
// 4.  **On-table only**: a candidate whose centre projects further than
//     `table_margin` outside the table is dropped. Survivors are clamped into
//     the unit square.
//
// Absence is `None`. Nothing here can fail.

use image::RgbImage;
use tracing::debug;

use crate::config::{HandsConfig, PaddleConfig, PuckConfig, TableConfig, TrackerConfig};
use crate::core_modules::blob_detector::blob_detector::find_blobs;
use crate::core_modules::calibrator::PlayfieldMapping;
use crate::core_modules::hand::HandLandmarks;
use crate::core_modules::homography::{PixelPoint, TablePoint};
use crate::core_modules::smart_blob::SmartBlob;
use crate::record::EntityKind;

/// What produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CandidateSource {
    Hand { landmarks_on_table: usize },
    Color { area: usize, radius: f64 },
}

/// One raw, unvalidated observation of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Table-space position, clamped into the unit square.
    pub table: TablePoint,
    pub pixel: PixelPoint,
    pub source: CandidateSource,
}

impl Candidate {
    /// Ranking among competing candidates for the same entity.
    fn strength(&self) -> usize {
        match self.source {
            CandidateSource::Hand { landmarks_on_table } => landmarks_on_table,
            CandidateSource::Color { area, .. } => area,
        }
    }
}

/// The per-frame output of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Detections {
    pub puck: Option<Candidate>,
    pub paddle_a: Option<Candidate>,
    pub paddle_b: Option<Candidate>,
}

impl Detections {
    pub fn get(&self, kind: EntityKind) -> Option<Candidate> {
        match kind {
            EntityKind::Puck => self.puck,
            EntityKind::PaddleA => self.paddle_a,
            EntityKind::PaddleB => self.paddle_b,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Detector {
    puck: PuckConfig,
    paddle: PaddleConfig,
    hands: HandsConfig,
    table: TableConfig,
}

impl Detector {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            puck: config.puck.clone(),
            paddle: config.paddle.clone(),
            hands: config.hands.clone(),
            table: config.table.clone(),
        }
    }

    pub fn detect(
        &self,
        frame: &RgbImage,
        mapping: &PlayfieldMapping,
        hands: &[HandLandmarks],
    ) -> Detections {
        let (mut paddle_a, mut paddle_b) = self.detect_hands(frame, mapping, hands);
        let hand_centres: Vec<PixelPoint> = [paddle_a, paddle_b]
            .iter()
            .flatten()
            .map(|c| c.pixel)
            .collect();

        if paddle_a.is_none() || paddle_b.is_none() {
            let (color_a, color_b) = self.detect_color_paddles(frame, mapping);
            paddle_a = paddle_a.or(color_a);
            paddle_b = paddle_b.or(color_b);
        }

        let puck = self.detect_puck(frame, mapping, &hand_centres);

        debug!(
            puck = puck.is_some(),
            paddle_a = paddle_a.is_some(),
            paddle_b = paddle_b.is_some(),
            "detections"
        );
        Detections {
            puck,
            paddle_a,
            paddle_b,
        }
    }

    fn detect_hands(
        &self,
        frame: &RgbImage,
        mapping: &PlayfieldMapping,
        hands: &[HandLandmarks],
    ) -> (Option<Candidate>, Option<Candidate>) {
        let candidates = hands.iter().filter_map(|hand| {
            let seen = hand.observe(mapping, frame.width(), frame.height(), &self.hands)?;
            self.place(
                seen.pixel,
                seen.table,
                CandidateSource::Hand {
                    landmarks_on_table: seen.landmarks_on_table,
                },
            )
        });
        self.split_halves(candidates)
    }

    fn detect_color_paddles(
        &self,
        frame: &RgbImage,
        mapping: &PlayfieldMapping,
    ) -> (Option<Candidate>, Option<Candidate>) {
        let mask = self.paddle.bands.mask(frame);
        let radii = self.paddle.min_radius..=self.paddle.max_radius;
        let candidates = find_blobs(&mask, self.paddle.min_area)
            .into_iter()
            .filter(|blob| radii.contains(&blob.enclosing_radius))
            .filter_map(|blob| self.place_blob(&blob, mapping));
        self.split_halves(candidates)
    }

    fn detect_puck(
        &self,
        frame: &RgbImage,
        mapping: &PlayfieldMapping,
        hand_centres: &[PixelPoint],
    ) -> Option<Candidate> {
        let mask = self.puck.bands.mask(frame);
        let radii = self.puck.min_radius..=self.puck.max_radius;
        let clearance = self.puck.min_distance_to_paddle_px;
        find_blobs(&mask, self.puck.min_area)
            .into_iter()
            .filter(|blob| radii.contains(&blob.enclosing_radius))
            .filter(|blob| blob.circularity() >= self.puck.min_circularity)
            .filter(|blob| {
                hand_centres
                    .iter()
                    .all(|centre| blob.centroid.distance(centre) >= clearance)
            })
            .filter_map(|blob| self.place_blob(&blob, mapping))
            .max_by_key(Candidate::strength)
    }

    fn place_blob(&self, blob: &SmartBlob, mapping: &PlayfieldMapping) -> Option<Candidate> {
        let table = mapping.to_table(blob.centroid)?;
        self.place(
            blob.centroid,
            table,
            CandidateSource::Color {
                area: blob.area,
                radius: blob.enclosing_radius,
            },
        )
    }

    /// Applies the table margin and clamps.
    fn place(
        &self,
        pixel: PixelPoint,
        table: TablePoint,
        source: CandidateSource,
    ) -> Option<Candidate> {
        if !table.is_on_table(self.table.table_margin) {
            debug!(u = table.u, v = table.v, "discarding off-table candidate");
            return None;
        }
        Some(Candidate {
            table: table.clamped(),
            pixel,
            source,
        })
    }

    /// Strongest candidate in each half of the goal axis.
    fn split_halves(
        &self,
        candidates: impl Iterator<Item = Candidate>,
    ) -> (Option<Candidate>, Option<Candidate>) {
        let mut low: Option<Candidate> = None;
        let mut high: Option<Candidate> = None;
        for candidate in candidates {
            let slot = if self.table.goal_axis.along(&candidate.table) < 0.5 {
                &mut low
            } else {
                &mut high
            };
            if slot.is_none_or(|current| candidate.strength() > current.strength()) {
                *slot = Some(candidate);
            }
        }
        (low, high)
    }
}
