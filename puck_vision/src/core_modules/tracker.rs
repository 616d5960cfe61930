// THEORY:
// The `tracker` module adds "memory" or "object permanence" to the vision
// system. The detector reports what one frame looks like; the tracker decides
// what each entity is actually doing.
//
// There is no data association problem here: the detector already names its
// candidates (puck, paddle A, paddle B), so each entity gets its own `Tracker`
// and the only questions are whether to believe the candidate and what to
// report when there is none.
//
// Key architectural principles:
// 1.  **Validation**: a candidate that jumps further than `max_displacement`
//     from the previous position (detected or estimated) in one frame is a
//     misdetection. It is logged, counted and treated exactly like a miss.
// 2.  **Smoothing**: accepted positions go into a short history and the
//     reported position is the moving average of the last `smoothing_window`
//     of them, which removes centroid jitter at the cost of a frame of lag.
// 3.  **Lifecycle Management**:
//     - **Birth**: the first accepted candidate starts the track.
//     - **Tracking**: accepted candidates update history and kinematics.
//     - **Occlusion**: a miss is bridged by dead reckoning from the last
//       speed and heading, tagged `Estimated`.
//     - **Death**: after `max_estimated_frames` consecutive misses the
//       estimate is no longer worth anything; the track drops to `Unknown`
//       so a detection anywhere on the table can restart it.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::{KinematicsConfig, TrackingConfig};
use crate::core_modules::calibrator::PlayfieldMapping;
use crate::core_modules::detector::Candidate;
use crate::core_modules::homography::TablePoint;
use crate::core_modules::kinematics::{KinematicsEstimator, dead_reckon};
use crate::record::{Entity, EntityKind, PositionSource};

/// Maintains the state of one entity from frame to frame.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: TrackingConfig,
    kinematics: KinematicsEstimator,
    /// Recent accepted raw positions, newest at the back, for the moving average.
    position_history: VecDeque<TablePoint>,
    /// The state reported for the last processed frame.
    entity: Entity,
    /// Consecutive frames bridged by dead reckoning.
    frames_since_seen: u32,
    /// Candidates rejected by validation over the tracker's lifetime.
    rejections: u64,
}

impl Tracker {
    pub fn new(kind: EntityKind, tracking: &TrackingConfig, kinematics: &KinematicsConfig) -> Self {
        Self {
            config: tracking.clone(),
            kinematics: KinematicsEstimator::new(kinematics),
            position_history: VecDeque::with_capacity(tracking.smoothing_window),
            entity: Entity::unknown(kind),
            frames_since_seen: 0,
            rejections: 0,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn rejections(&self) -> u64 {
        self.rejections
    }

    /// Forgets the track entirely. The rejection count survives.
    pub fn reset(&mut self) {
        self.entity = Entity::unknown(self.entity.kind);
        self.position_history.clear();
        self.kinematics.reset();
        self.frames_since_seen = 0;
    }

    /// Advances the track by one frame, `dt` seconds after the previous one.
    pub fn update(
        &mut self,
        candidate: Option<Candidate>,
        dt: f64,
        mapping: &PlayfieldMapping,
    ) -> &Entity {
        let previous = self.entity.position;

        let (position, source) = match self.validate(candidate) {
            Some(accepted) => {
                self.entity.last_valid_pixel_center = Some(accepted.pixel);
                if self.frames_since_seen > 0 {
                    // Detections from before the gap would drag the average backwards;
                    // restart the window from the last estimate instead.
                    self.position_history.clear();
                    self.position_history.extend(previous);
                    self.frames_since_seen = 0;
                }
                (Some(self.smooth(accepted.table)), PositionSource::Detected)
            }
            None => match previous {
                Some(_) if self.frames_since_seen < self.config.max_estimated_frames => {
                    self.frames_since_seen += 1;
                    (Some(self.predict_next_position(dt)), PositionSource::Estimated)
                }
                Some(_) => {
                    debug!(
                        entity = ?self.entity.kind,
                        frames = self.frames_since_seen,
                        "track lost"
                    );
                    let last_valid = self.entity.last_valid_pixel_center;
                    self.reset();
                    self.entity.last_valid_pixel_center = last_valid;
                    (None, PositionSource::Unknown)
                }
                None => (None, PositionSource::Unknown),
            },
        };

        // A position is only reported together with its pixel centre.
        let pixel_center = position.and_then(|p| mapping.to_pixel(p));
        let position = position.filter(|_| pixel_center.is_some());
        let source = if position.is_some() { source } else { PositionSource::Unknown };

        let motion = self.kinematics.update(previous, position, dt);
        self.entity.position = position;
        self.entity.pixel_center = pixel_center;
        self.entity.source = source;
        self.entity.velocity = motion.velocity;
        self.entity.acceleration = motion.acceleration;
        &self.entity
    }

    /// Drops candidates that jumped too far from the previous position.
    fn validate(&mut self, candidate: Option<Candidate>) -> Option<Candidate> {
        let candidate = candidate?;
        let Some(previous) = self.entity.position else {
            return Some(candidate);
        };

        let displacement = previous.distance(&candidate.table);
        if displacement > self.config.max_displacement {
            self.rejections += 1;
            debug!(
                entity = ?self.entity.kind,
                displacement,
                limit = self.config.max_displacement,
                "rejected implausible jump"
            );
            return None;
        }
        Some(candidate)
    }

    fn smooth(&mut self, raw: TablePoint) -> TablePoint {
        self.position_history.push_back(raw);
        while self.position_history.len() > self.config.smoothing_window.max(1) {
            self.position_history.pop_front();
        }

        let n = self.position_history.len() as f64;
        let (sum_u, sum_v) = self
            .position_history
            .iter()
            .fold((0.0, 0.0), |(u, v), p| (u + p.u, v + p.v));
        TablePoint::new(sum_u / n, sum_v / n)
    }

    /// Dead reckoning from the current state, kept on the table.
    fn predict_next_position(&self, dt: f64) -> TablePoint {
        let from = self.entity.position.unwrap_or_default();
        dead_reckon(from, self.entity.velocity, dt).clamped()
    }
}
