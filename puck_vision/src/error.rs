//! Result and error types for the engine.
//!
//! Only calibration and configuration can fail in a way the caller must handle.
//! Detection misses and validation rejections are ordinary tracker inputs and
//! never show up here.
use thiserror::Error;

/// Errors raised while establishing the image-to-table mapping.
///
/// Calibration failure is fatal for a tracking session: no core operation can
/// run without a `PlayfieldMapping`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// The segmented table surface produced fewer than four boundary points.
    #[error("insufficient corner candidates: found {found} table boundary points, need at least 4")]
    InsufficientCorners { found: usize },

    /// The four selected corners do not span a usable quadrilateral.
    #[error("degenerate table quadrilateral: {reason}")]
    Degenerate { reason: String },

    /// The corner correspondences do not admit a projective transform.
    #[error("the corner correspondences do not define an invertible homography")]
    SingularHomography,

    /// The frame source ran dry before any frame could be calibrated.
    #[error("no frame available for calibration")]
    NoFrame,
}

/// Configuration error variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error, this wraps a [std::io::Error]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Deserialize error, this wraps a [toml::de::Error]
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// A value parsed fine but is outside its meaningful range.
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// The telemetry sink could not accept a record.
///
/// The session logs and counts these; tracking state is never touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("telemetry channel is closed")]
    Disconnected,

    #[error("telemetry sink rejected the record: {0}")]
    Rejected(String),
}

pub type Result<T, E = CalibrationError> = std::result::Result<T, E>;
