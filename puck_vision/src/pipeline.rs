// THEORY:
// The `pipeline` module is the top-level API for the entire tracking engine.
// It encapsulates the full stack (detector, per-entity trackers, kinematics,
// goal state machine) behind one object, the `TrackingSession`, and one call
// per frame.
//
// Key architectural principles:
// 1.  **One owner for session state**: the mapping, every tracker, the score
//     and the round/game counters live in the session. Two sessions never
//     share anything, and dropping a session forgets the game.
// 2.  **Calibrate first**: a session cannot exist without a
//     `PlayfieldMapping`, so a calibration failure surfaces before the first
//     frame instead of as a stream of empty records.
// 3.  **Publication cannot hurt tracking**: `step` hands records to a sink
//     after the state update is complete. A failing sink is logged and
//     counted, nothing more.

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::core_modules::calibrator::{Calibrator, PlayfieldMapping};
use crate::core_modules::detector::{Detections, Detector};
use crate::core_modules::goal::GoalStateMachine;
use crate::core_modules::hand::HandLandmarks;
use crate::core_modules::tracker::Tracker;
use crate::error::Result;
use crate::record::{Distances, EntityKind, FrameRecord, GoalEvent, Scorer};
use crate::telemetry::TelemetrySink;

/// Frame interval assumed for the first frame, when there is no previous timestamp.
pub const DEFAULT_FRAME_INTERVAL: f64 = 0.033;

/// Everything one frame produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub record: FrameRecord,
    pub goal: Option<GoalEvent>,
    /// The raw detector output the record was built from.
    pub detections: Detections,
}

/// A calibrated tracking session over one camera feed.
pub struct TrackingSession {
    config: TrackerConfig,
    mapping: PlayfieldMapping,
    detector: Detector,
    /// Indexed in `EntityKind::ALL` order.
    trackers: [Tracker; 3],
    goals: GoalStateMachine,
    frame_index: u64,
    last_timestamp: Option<f64>,
    publish_failures: u64,
}

impl TrackingSession {
    pub fn new(config: TrackerConfig, mapping: PlayfieldMapping) -> Self {
        let trackers =
            EntityKind::ALL.map(|kind| Tracker::new(kind, &config.tracker, &config.kinematics));
        Self {
            detector: Detector::new(&config),
            goals: GoalStateMachine::new(&config.goal, config.table.goal_axis),
            trackers,
            mapping,
            config,
            frame_index: 0,
            last_timestamp: None,
            publish_failures: 0,
        }
    }

    /// Calibrates on `reference` and starts a session with the result.
    pub fn calibrate(reference: &RgbImage, config: TrackerConfig) -> Result<Self> {
        let mapping = Calibrator::new(config.calibration.clone()).calibrate(reference)?;
        Ok(Self::new(config, mapping))
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn mapping(&self) -> &PlayfieldMapping {
        &self.mapping
    }

    pub fn goals(&self) -> &GoalStateMachine {
        &self.goals
    }

    /// Frames processed so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_failures
    }

    /// Validation rejections across all entities.
    pub fn rejections(&self) -> u64 {
        self.trackers.iter().map(Tracker::rejections).sum()
    }

    /// Swaps in a new mapping. Tracks are dropped since their pixel centres refer to the old one.
    pub fn recalibrate(&mut self, mapping: PlayfieldMapping) {
        info!(corners = ?mapping.corners(), "table recalibrated");
        self.mapping = mapping;
        for tracker in &mut self.trackers {
            tracker.reset();
        }
    }

    /// Runs detection, tracking, kinematics and goal evaluation for one frame.
    ///
    /// `timestamp` is in monotonic seconds; `hands` are the hand skeletons seen in this frame.
    pub fn process_frame(
        &mut self,
        frame: &RgbImage,
        hands: &[HandLandmarks],
        timestamp: f64,
    ) -> FrameOutput {
        let dt = match self.last_timestamp {
            Some(previous) => timestamp - previous,
            None => DEFAULT_FRAME_INTERVAL,
        };
        self.last_timestamp = Some(timestamp);

        let detections = self.detector.detect(frame, &self.mapping, hands);
        let mapping = &self.mapping;
        let [puck, paddle_a, paddle_b] = self.trackers.each_mut().map(|tracker| {
            let kind = tracker.entity().kind;
            *tracker.update(detections.get(kind), dt, mapping)
        });

        let goal = self.goals.update(&puck, timestamp);
        let record = FrameRecord {
            timestamp,
            frame_index: self.frame_index,
            puck,
            paddle_a,
            paddle_b,
            in_goal: goal.is_some(),
            scorer: goal.map_or(Scorer::None, |event| event.scorer),
            round_id: goal.map_or(self.goals.round_id(), |event| event.round_id),
            game_id: goal.map_or(self.goals.game_id(), |event| event.game_id),
            score: goal.map_or(self.goals.score(), |event| event.score),
            distances: Distances::measure(&puck, &paddle_a, &paddle_b, self.config.table.goal_axis),
        };
        debug!(
            frame = self.frame_index,
            puck = ?record.puck.source,
            paddle_a = ?record.paddle_a.source,
            paddle_b = ?record.paddle_b.source,
            "frame processed"
        );
        self.frame_index += 1;

        FrameOutput {
            record,
            goal,
            detections,
        }
    }

    /// `process_frame`, then publishes the record and any goal to `sink`.
    pub fn step<S: TelemetrySink + ?Sized>(
        &mut self,
        frame: &RgbImage,
        hands: &[HandLandmarks],
        timestamp: f64,
        sink: &mut S,
    ) -> FrameOutput {
        let output = self.process_frame(frame, hands, timestamp);

        if let Err(error) = sink.publish_frame(&output.record) {
            self.publish_failures += 1;
            warn!(%error, frame = output.record.frame_index, "failed to publish frame record");
        }
        if let Some(event) = &output.goal {
            if let Err(error) = sink.publish_goal(event) {
                self.publish_failures += 1;
                warn!(%error, scorer = ?event.scorer, "failed to publish goal event");
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::homography::PixelPoint;
    use crate::record::{PositionSource, ScoreTally};
    use crate::telemetry::{ChannelSink, NullSink, Telemetry};
    use image::Rgb;

    const TABLE: Rgb<u8> = Rgb([197, 197, 197]);
    const PUCK: Rgb<u8> = Rgb([220, 20, 20]);
    const WIDTH: u32 = 200;
    const HEIGHT: u32 = 400;

    fn mapping() -> PlayfieldMapping {
        PlayfieldMapping::from_corners([
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(WIDTH as f64, 0.0),
            PixelPoint::new(WIDTH as f64, HEIGHT as f64),
            PixelPoint::new(0.0, HEIGHT as f64),
        ])
        .unwrap()
    }

    fn frame_with_puck(at: Option<(i64, i64)>) -> RgbImage {
        let mut frame = RgbImage::from_pixel(WIDTH, HEIGHT, TABLE);
        if let Some((cx, cy)) = at {
            for y in cy - 12..=cy + 12 {
                for x in cx - 12..=cx + 12 {
                    let inside = (x - cx).pow(2) + (y - cy).pow(2) <= 144;
                    if inside && x >= 0 && y >= 0 && x < WIDTH as i64 && y < HEIGHT as i64 {
                        frame.put_pixel(x as u32, y as u32, PUCK);
                    }
                }
            }
        }
        frame
    }

    #[test]
    fn a_puck_driven_into_the_top_goal_scores_once_for_b() {
        let mut session = TrackingSession::new(TrackerConfig::default(), mapping());
        let (mut sink, mut receiver) = ChannelSink::new();

        // 8 px per frame toward the top edge, then dwell in the mouth.
        let path: Vec<i64> = (0..25).map(|i| 200 - 8 * i).chain([8; 20]).collect();
        let mut goals = Vec::new();
        for (i, y) in path.iter().enumerate() {
            let frame = frame_with_puck(Some((100, *y)));
            let output = session.step(&frame, &[], i as f64 / 30.0, &mut sink);
            assert_eq!(output.record.puck.source, PositionSource::Detected);
            goals.extend(output.goal);
        }

        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].scorer, Scorer::B);
        assert_eq!(goals[0].score, ScoreTally { a: 0, b: 1 });
        assert_eq!(session.frame_index(), path.len() as u64);
        assert_eq!(session.goals().round_id(), 2);

        let mut frames = 0;
        let mut goal_messages = 0;
        while let Ok(item) = receiver.try_recv() {
            match item {
                Telemetry::Frame(record) => {
                    assert_eq!(record.frame_index, frames);
                    frames += 1;
                }
                Telemetry::Goal(_) => goal_messages += 1,
            }
        }
        assert_eq!((frames, goal_messages), (path.len() as u64, 1));
    }

    #[test]
    fn goal_frame_carries_the_event() {
        let mut session = TrackingSession::new(TrackerConfig::default(), mapping());
        let mut in_goal_frames = 0;
        for (i, y) in (0..25).map(|i| 200 - 8 * i).enumerate() {
            let frame = frame_with_puck(Some((100, y)));
            let output = session.process_frame(&frame, &[], i as f64 / 30.0);
            if output.record.in_goal {
                in_goal_frames += 1;
                assert_eq!(output.record.scorer, Scorer::B);
                assert_eq!(output.record.round_id, 1);
                assert_eq!(output.record.score.b, 1);
            } else {
                assert_eq!(output.record.scorer, Scorer::None);
            }
        }
        assert_eq!(in_goal_frames, 1);
    }

    #[test]
    fn a_lost_puck_is_estimated_then_recovered() {
        let mut session = TrackingSession::new(TrackerConfig::default(), mapping());
        session.process_frame(&frame_with_puck(Some((100, 200))), &[], 0.0);
        session.process_frame(&frame_with_puck(Some((100, 190))), &[], 1.0 / 30.0);

        let missing = session.process_frame(&frame_with_puck(None), &[], 2.0 / 30.0);
        assert_eq!(missing.record.puck.source, PositionSource::Estimated);
        assert!(missing.record.puck.pixel_center.is_some());
        assert!(missing.detections.puck.is_none());
        assert_eq!(missing.record.paddle_a.source, PositionSource::Unknown);
        assert_eq!(missing.record.distances.puck_paddle_a, None);
        let to_goal = missing.record.distances.puck_goal.expect("puck has a position");
        let v = missing.record.puck.position.unwrap().v;
        assert!((to_goal - v.min(1.0 - v)).abs() < 1e-12);

        let back = session.process_frame(&frame_with_puck(Some((100, 170))), &[], 3.0 / 30.0);
        assert_eq!(back.record.puck.source, PositionSource::Detected);
    }

    #[test]
    fn publish_failures_do_not_disturb_tracking() {
        let mut session = TrackingSession::new(TrackerConfig::default(), mapping());
        let (mut sink, receiver) = ChannelSink::new();
        drop(receiver);

        let output = session.step(&frame_with_puck(Some((100, 200))), &[], 0.0, &mut sink);
        assert_eq!(output.record.puck.source, PositionSource::Detected);
        assert_eq!(session.publish_failures(), 1);

        let mut null = NullSink;
        session.step(&frame_with_puck(Some((100, 196))), &[], 0.1, &mut null);
        assert_eq!(session.publish_failures(), 1);
        assert_eq!(session.frame_index(), 2);
    }

    #[test]
    fn recalibration_replaces_the_mapping_and_drops_tracks() {
        let mut session = TrackingSession::new(TrackerConfig::default(), mapping());
        session.process_frame(&frame_with_puck(Some((100, 200))), &[], 0.0);

        let smaller = PlayfieldMapping::from_corners([
            PixelPoint::new(10.0, 10.0),
            PixelPoint::new(190.0, 10.0),
            PixelPoint::new(190.0, 390.0),
            PixelPoint::new(10.0, 390.0),
        ])
        .unwrap();
        session.recalibrate(smaller.clone());
        assert_eq!(session.mapping(), &smaller);

        let output = session.process_frame(&frame_with_puck(None), &[], 0.1);
        assert_eq!(output.record.puck.source, PositionSource::Unknown);
    }

    #[test]
    fn calibration_failure_prevents_a_session() {
        let dark = RgbImage::from_pixel(64, 64, Rgb([10, 10, 10]));
        assert!(TrackingSession::calibrate(&dark, TrackerConfig::default()).is_err());
    }
}
