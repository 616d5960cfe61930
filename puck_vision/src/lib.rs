// THEORY:
// This file is the main entry point for the `puck_vision` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (the `puck_tester` runner and
// the `puck_vision_overlay` renderer).
//
// The primary goal is to export the `TrackingSession` and its associated data
// structures (`TrackerConfig`, `FrameRecord`, `GoalEvent`, etc.) as the clean,
// high-level interface for the entire tracking engine. The building blocks in
// `core_modules` stay public so tools can reuse the calibrator or the detector
// on their own, but a normal consumer never needs to touch them.
//
// Data flows one frame at a time:
//   frame -> Detector (through the calibrated PlayfieldMapping) -> Tracker
//         -> kinematics -> GoalStateMachine -> TelemetrySink

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod telemetry;

pub use config::TrackerConfig;
pub use core_modules::calibrator::{Calibrator, PlayfieldMapping};
pub use core_modules::hand::HandLandmarks;
pub use core_modules::homography::{PixelPoint, TableAxis, TablePoint};
pub use error::{CalibrationError, ConfigError, PublishError};
pub use pipeline::{FrameOutput, TrackingSession};
pub use record::{
    Distances, Entity, EntityKind, FrameRecord, GoalEvent, PositionSource, ScoreTally, Scorer,
    Velocity,
};
pub use telemetry::{ChannelSink, NullSink, Telemetry, TelemetrySink};
