//! Runtime configuration for a tracking session.
//!
//! Every threshold the engine uses lives here, grouped by the component that
//! reads it. All sections are optional in the TOML file; a missing key falls
//! back to the value in [`TrackerConfig::default`], which reproduces the values
//! the rig was tuned with.
//!
//! ```toml
//! [puck]
//! bands = [[[160, 150, 150], [180, 255, 255]], [[0, 150, 150], [10, 255, 255]]]
//! max_radius = 40.0
//!
//! [table]
//! goal_axis = "v"
//!
//! [goal]
//! cooldown_secs = 2.0
//! ```
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core_modules::color_mask::{ColorBand, HsvRange, LumaBand};
use crate::core_modules::hand::landmark;
use crate::core_modules::homography::TableAxis;
use crate::error::ConfigError;

/// Top-level configuration, one field per TOML section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub puck: PuckConfig,
    pub paddle: PaddleConfig,
    pub hands: HandsConfig,
    pub tracker: TrackingConfig,
    pub kinematics: KinematicsConfig,
    pub goal: GoalConfig,
    pub table: TableConfig,
    pub calibration: CalibrationConfig,
}

impl TrackerConfig {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: TrackerConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot drive a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.puck.bands.ranges.is_empty() {
            return Err(invalid("puck.bands", "at least one HSV range is required"));
        }
        if self.paddle.bands.ranges.is_empty() {
            return Err(invalid("paddle.bands", "at least one HSV range is required"));
        }
        for (field, low, high) in [
            ("puck.min_radius", self.puck.min_radius, self.puck.max_radius),
            ("paddle.min_radius", self.paddle.min_radius, self.paddle.max_radius),
        ] {
            if low < 0.0 || low > high {
                return Err(invalid(field, format!("radius range [{low}, {high}] is empty")));
            }
        }
        if !(0.0..=1.0).contains(&self.puck.min_circularity) {
            return Err(invalid("puck.min_circularity", "must be within [0, 1]"));
        }
        if self.hands.landmarks.is_empty() {
            return Err(invalid("hands.landmarks", "at least one landmark index is required"));
        }
        if let Some(&index) = self.hands.landmarks.iter().find(|&&i| i >= landmark::COUNT) {
            return Err(invalid(
                "hands.landmarks",
                format!("index {index} is outside 0..{}", landmark::COUNT),
            ));
        }
        if self.hands.min_landmarks_on_table > landmark::COUNT {
            return Err(invalid("hands.min_landmarks_on_table", "exceeds the landmarks per hand"));
        }
        if self.tracker.max_displacement <= 0.0 {
            return Err(invalid("tracker.max_displacement", "must be positive"));
        }
        if self.tracker.smoothing_window == 0 {
            return Err(invalid("tracker.smoothing_window", "must be at least 1"));
        }
        if self.kinematics.min_motion_speed < 0.0 {
            return Err(invalid("kinematics.min_motion_speed", "must not be negative"));
        }
        let [mouth_low, mouth_high] = self.goal.mouth;
        if !(0.0 <= mouth_low && mouth_low < mouth_high && mouth_high <= 1.0) {
            return Err(invalid("goal.mouth", "expected 0 <= low < high <= 1"));
        }
        if !(0.0..0.5).contains(&self.goal.depth) {
            return Err(invalid("goal.depth", "must be within [0, 0.5)"));
        }
        if self.goal.cooldown_secs < 0.0 {
            return Err(invalid("goal.cooldown_secs", "must not be negative"));
        }
        if self.goal.win_score == 0 {
            return Err(invalid("goal.win_score", "must be at least 1"));
        }
        if self.table.table_margin < 0.0 {
            return Err(invalid("table.table_margin", "must not be negative"));
        }
        let LumaBand { low, high } = self.calibration.luma_band;
        if low > high {
            return Err(invalid("calibration.luma_band", "low bound above high bound"));
        }
        if !(0.0..1.0).contains(&self.calibration.min_table_area_fraction) {
            return Err(invalid("calibration.min_table_area_fraction", "must be within [0, 1)"));
        }
        if self.calibration.max_attempts == 0 {
            return Err(invalid("calibration.max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

/// Puck segmentation and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuckConfig {
    /// HSV ranges the puck colour falls in. Red needs one range either side of hue 0.
    pub bands: ColorBand,
    /// Minimum region size in pixels.
    pub min_area: usize,
    /// Enclosing-circle radius bounds in pixels.
    pub min_radius: f64,
    pub max_radius: f64,
    /// Minimum area / enclosing-circle area.
    pub min_circularity: f64,
    /// Candidates closer than this to a hand-derived paddle are the paddle, not the puck.
    pub min_distance_to_paddle_px: f64,
}

impl Default for PuckConfig {
    fn default() -> Self {
        Self {
            bands: ColorBand::new(vec![
                HsvRange::new([160, 150, 150], [180, 255, 255]),
                HsvRange::new([0, 150, 150], [10, 255, 255]),
            ]),
            min_area: 150,
            min_radius: 10.0,
            max_radius: 40.0,
            min_circularity: 0.5,
            min_distance_to_paddle_px: 40.0,
        }
    }
}

/// Colour fallback for paddles when no hand covers a half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddleConfig {
    pub bands: ColorBand,
    pub min_area: usize,
    pub min_radius: f64,
    pub max_radius: f64,
}

impl Default for PaddleConfig {
    fn default() -> Self {
        Self {
            bands: ColorBand::new(vec![HsvRange::new([14, 24, 172], [34, 255, 255])]),
            min_area: 150,
            min_radius: 10.0,
            max_radius: 100.0,
        }
    }
}

/// How a hand skeleton becomes a paddle position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandsConfig {
    /// Landmark indices averaged into the representative point.
    pub landmarks: Vec<usize>,
    /// Hands with fewer landmarks inside the table are ignored.
    pub min_landmarks_on_table: usize,
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            landmarks: vec![
                landmark::INDEX_MCP,
                landmark::INDEX_TIP,
                landmark::MIDDLE_MCP,
                landmark::MIDDLE_TIP,
            ],
            min_landmarks_on_table: 3,
        }
    }
}

/// Per-entity track maintenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Largest believable move between consecutive frames, in table units.
    pub max_displacement: f64,
    /// Number of accepted detections averaged into the reported position.
    pub smoothing_window: usize,
    /// Consecutive dead-reckoned frames before the track is dropped.
    pub max_estimated_frames: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_displacement: 0.3,
            smoothing_window: 3,
            max_estimated_frames: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Below this speed (table units per second) the heading is reported as 0.
    pub min_motion_speed: f64,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self { min_motion_speed: 0.01 }
    }
}

/// Goal detection and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    /// `[low, high]` stretch of the short edge that is the goal mouth.
    pub mouth: [f64; 2],
    /// Distance from the edge, along the goal axis, that still counts as inside the goal.
    pub depth: f64,
    pub cooldown_secs: f64,
    /// First player to this many goals wins the game.
    pub win_score: u32,
    /// Let dead-reckoned puck positions score.
    pub count_estimated_positions: bool,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            mouth: [0.3, 0.7],
            depth: 0.05,
            cooldown_secs: 2.0,
            win_score: 7,
            count_estimated_positions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Axis running between the goals; also splits the paddles' halves.
    pub goal_axis: TableAxis,
    /// Detections projecting further than this outside the table are discarded.
    pub table_margin: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            goal_axis: TableAxis::V,
            table_margin: 0.05,
        }
    }
}

/// Table surface segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Luma interval of the playing surface.
    pub luma_band: LumaBand,
    /// Side of the square closing kernel.
    pub close_kernel: u32,
    /// Regions smaller than this (pixels) are ignored.
    pub min_region_area: usize,
    /// The corner quadrilateral must cover at least this share of the frame.
    pub min_table_area_fraction: f64,
    /// Frames tried by `Calibrator::calibrate_from` before giving up.
    pub max_attempts: usize,
    /// Fixed pixel corners (TL, TR, BR, BL); skips surface segmentation.
    pub manual_corners: Option<[[f64; 2]; 4]>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            luma_band: LumaBand {
                low: 182.0,
                high: 212.0,
            },
            close_kernel: 5,
            min_region_area: 500,
            min_table_area_fraction: 0.05,
            max_attempts: 30,
            manual_corners: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn defaults_are_valid() {
        TrackerConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = write_config("");
        let config = TrackerConfig::load(file.path()).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn shipped_default_file_matches_defaults() {
        let shipped = include_str!("../../config/default.toml");
        let config: TrackerConfig = toml::from_str(shipped).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let file = write_config(
            r#"
            [table]
            goal_axis = "u"

            [goal]
            cooldown_secs = 1.5
            win_score = 5

            [puck]
            bands = [[[0, 120, 120], [12, 255, 255]]]
            "#,
        );
        let config = TrackerConfig::load(file.path()).unwrap();
        assert_eq!(config.table.goal_axis, TableAxis::U);
        assert_eq!(config.table.table_margin, 0.05);
        assert_eq!(config.goal.cooldown_secs, 1.5);
        assert_eq!(config.goal.win_score, 5);
        assert_eq!(config.goal.mouth, [0.3, 0.7]);
        assert_eq!(
            config.puck.bands,
            ColorBand::new(vec![HsvRange::new([0, 120, 120], [12, 255, 255])])
        );
        assert_eq!(config.puck.min_area, 150);
    }

    #[test]
    fn manual_corners_parse() {
        let file = write_config(
            r#"
            [calibration]
            manual_corners = [[10.0, 12.0], [600.0, 10.0], [610.0, 470.0], [5.0, 465.0]]
            "#,
        );
        let config = TrackerConfig::load(file.path()).unwrap();
        assert_eq!(config.calibration.manual_corners.unwrap()[2], [610.0, 470.0]);
    }

    #[test]
    fn malformed_toml_is_a_deserialize_error() {
        let file = write_config("[goal\ncooldown_secs = ");
        assert!(matches!(
            TrackerConfig::load(file.path()),
            Err(ConfigError::Deserialize(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TrackerConfig::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = TrackerConfig::default();
        config.goal.mouth = [0.7, 0.3];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "goal.mouth", .. })
        ));

        let mut config = TrackerConfig::default();
        config.hands.landmarks = vec![8, 21];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "hands.landmarks", .. })
        ));

        let mut config = TrackerConfig::default();
        config.tracker.smoothing_window = 0;
        assert!(config.validate().is_err());
    }
}
