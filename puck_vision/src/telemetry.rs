//! The boundary between the engine and whoever consumes its output.
//!
//! The per-frame loop must never wait on a consumer, so sinks accept records
//! without blocking and report failure instead of retrying.
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PublishError;
use crate::record::{FrameRecord, GoalEvent};

/// Everything that flows out of a session, tagged for line-oriented transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Telemetry {
    Frame(FrameRecord),
    Goal(GoalEvent),
}

/// Receives the session's records.
pub trait TelemetrySink {
    fn publish_frame(&mut self, record: &FrameRecord) -> Result<(), PublishError>;
    fn publish_goal(&mut self, event: &GoalEvent) -> Result<(), PublishError>;
}

/// Fire-and-forget sink over an unbounded tokio channel.
///
/// Sending never awaits, so it can be called from the synchronous frame loop
/// while an async task on the other end drains the receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Telemetry>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Telemetry>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, item: Telemetry) -> Result<(), PublishError> {
        self.sender.send(item).map_err(|_| PublishError::Disconnected)
    }
}

impl TelemetrySink for ChannelSink {
    fn publish_frame(&mut self, record: &FrameRecord) -> Result<(), PublishError> {
        self.send(Telemetry::Frame(record.clone()))
    }

    fn publish_goal(&mut self, event: &GoalEvent) -> Result<(), PublishError> {
        self.send(Telemetry::Goal(*event))
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish_frame(&mut self, _record: &FrameRecord) -> Result<(), PublishError> {
        Ok(())
    }

    fn publish_goal(&mut self, _event: &GoalEvent) -> Result<(), PublishError> {
        Ok(())
    }
}
