// THEORY:
// Players hold their paddles, so a hand tracker is a far more reliable paddle
// detector than colour alone. The engine does not run a hand model itself; an
// external tracker hands it one skeleton per visible hand, 21 landmarks in
// normalized image coordinates (x and y in 0..1 of the frame size), and this
// module turns each skeleton into a single paddle observation.
//
// Key architectural principles:
// 1.  **On-table gate**: spectators' and resting hands must not become paddles.
//     A hand is only considered when enough of its landmarks project inside
//     the table.
// 2.  **Representative point**: the paddle sits under the fingers, so the
//     paddle position is the centroid of a configurable set of finger
//     landmarks rather than a single, jittery fingertip.

use serde::{Deserialize, Serialize};

use crate::config::HandsConfig;
use crate::core_modules::calibrator::PlayfieldMapping;
use crate::core_modules::homography::{PixelPoint, TablePoint};

/// Landmark indices of the 21-point hand skeleton.
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;

    /// Landmarks per hand.
    pub const COUNT: usize = 21;
}

/// One hand skeleton as delivered by the hand tracker.
///
/// Serialized as a plain list of `[x, y]` pairs in normalized image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandLandmarks {
    pub points: Vec<[f64; 2]>,
}

/// A hand that passed the on-table gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandObservation {
    /// Representative point in pixels.
    pub pixel: PixelPoint,
    /// Representative point in table space (not clamped).
    pub table: TablePoint,
    /// Landmarks of this hand that project inside the table.
    pub landmarks_on_table: usize,
}

impl HandLandmarks {
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self { points }
    }

    /// Landmark `index` in pixels, for a frame of `width` x `height`.
    pub fn pixel(&self, index: usize, width: u32, height: u32) -> Option<PixelPoint> {
        let [x, y] = *self.points.get(index)?;
        Some(PixelPoint::new(x * width as f64, y * height as f64))
    }

    /// Projects the hand onto the table and reduces it to one paddle observation.
    ///
    /// `None` when fewer than `min_landmarks_on_table` landmarks are on the table,
    /// or when none of the configured representative landmarks exist.
    pub fn observe(
        &self,
        mapping: &PlayfieldMapping,
        width: u32,
        height: u32,
        config: &HandsConfig,
    ) -> Option<HandObservation> {
        let landmarks_on_table = (0..self.points.len())
            .filter_map(|i| self.pixel(i, width, height))
            .filter_map(|p| mapping.to_table(p))
            .filter(|t| t.is_on_table(0.0))
            .count();
        if landmarks_on_table < config.min_landmarks_on_table {
            return None;
        }

        let selected: Vec<PixelPoint> = config
            .landmarks
            .iter()
            .filter_map(|&i| self.pixel(i, width, height))
            .collect();
        if selected.is_empty() {
            return None;
        }

        let n = selected.len() as f64;
        let pixel = PixelPoint::new(
            selected.iter().map(|p| p.x).sum::<f64>() / n,
            selected.iter().map(|p| p.y).sum::<f64>() / n,
        );
        let table = mapping.to_table(pixel)?;

        Some(HandObservation {
            pixel,
            table,
            landmarks_on_table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> PlayfieldMapping {
        PlayfieldMapping::from_corners([
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(100.0, 0.0),
            PixelPoint::new(100.0, 100.0),
            PixelPoint::new(0.0, 100.0),
        ])
        .unwrap()
    }

    /// A hand with every landmark at the same normalized position.
    fn hand_at(x: f64, y: f64) -> HandLandmarks {
        HandLandmarks::new(vec![[x, y]; landmark::COUNT])
    }

    #[test]
    fn representative_point_is_the_centroid_of_configured_landmarks() {
        let mut hand = hand_at(0.25, 0.5);
        hand.points[landmark::INDEX_TIP] = [0.3, 0.2];
        hand.points[landmark::MIDDLE_TIP] = [0.2, 0.2];
        let config = HandsConfig {
            landmarks: vec![landmark::INDEX_TIP, landmark::MIDDLE_TIP],
            min_landmarks_on_table: 3,
        };
        let seen = hand.observe(&mapping(), 200, 100, &config).unwrap();
        // The frame is twice as wide as the table quad.
        assert!((seen.pixel.x - 50.0).abs() < 1e-9);
        assert!((seen.pixel.y - 20.0).abs() < 1e-9);
        assert!((seen.table.u - 0.5).abs() < 1e-9);
        assert!((seen.table.v - 0.2).abs() < 1e-9);
        assert_eq!(seen.landmarks_on_table, landmark::COUNT);
    }

    #[test]
    fn hands_off_the_table_are_ignored() {
        let hand = hand_at(0.9, 0.5);
        let seen = hand.observe(&mapping(), 200, 100, &HandsConfig::default());
        assert!(seen.is_none());
    }

    #[test]
    fn a_hand_needs_enough_landmarks_on_the_table() {
        let mut hand = hand_at(0.9, 0.5);
        hand.points[0] = [0.2, 0.5];
        hand.points[1] = [0.2, 0.6];
        let config = HandsConfig::default();
        assert!(hand.observe(&mapping(), 200, 100, &config).is_none());

        hand.points[2] = [0.25, 0.6];
        let seen = hand.observe(&mapping(), 200, 100, &config).unwrap();
        assert_eq!(seen.landmarks_on_table, 3);
    }

    #[test]
    fn sidecar_format_is_a_list_of_pairs() {
        let hand: HandLandmarks = serde_json::from_str("[[0.25, 0.5], [0.5, 0.75]]").unwrap();
        assert_eq!(hand.points.len(), 2);
        assert_eq!(hand.pixel(1, 8, 8), Some(PixelPoint::new(4.0, 6.0)));
        assert_eq!(hand.pixel(2, 8, 8), None);
    }
}
