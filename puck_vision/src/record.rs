//! The values a tracking session emits.
//!
//! Everything here is a plain, serializable snapshot. The session owns the
//! live state; records are copies handed to the consumer.
use serde::{Deserialize, Serialize};

use crate::core_modules::homography::{PixelPoint, TableAxis, TablePoint};

/// The three tracked objects on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Puck,
    /// Defends the low edge of the goal axis.
    PaddleA,
    /// Defends the high edge of the goal axis.
    PaddleB,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Puck, EntityKind::PaddleA, EntityKind::PaddleB];
}

/// Where an entity's position in a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// A validated detection from this frame, smoothed.
    Detected,
    /// Dead-reckoned from the previous state because detection failed or was rejected.
    Estimated,
    /// No position: never seen, or lost for too long.
    #[default]
    Unknown,
}

/// Speed in table units per second and direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub speed: f64,
    /// Direction in degrees, (-180, 180], 0 along +u, 90 along +v.
    pub heading_degrees: f64,
}

/// Snapshot of one tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    /// Table-space position, inside the unit square when present.
    pub position: Option<TablePoint>,
    /// `position` projected back into the frame. Present exactly when `position` is.
    pub pixel_center: Option<PixelPoint>,
    pub velocity: Velocity,
    /// Change of speed per second; absent until two consecutive speed samples exist.
    pub acceleration: Option<f64>,
    /// Pixel centre of the most recent accepted detection, kept across misses.
    pub last_valid_pixel_center: Option<PixelPoint>,
    pub source: PositionSource,
}

impl Entity {
    pub fn unknown(kind: EntityKind) -> Self {
        Self {
            kind,
            position: None,
            pixel_center: None,
            velocity: Velocity::default(),
            acceleration: None,
            last_valid_pixel_center: None,
            source: PositionSource::Unknown,
        }
    }

    pub fn is_estimated(&self) -> bool {
        self.source == PositionSource::Estimated
    }
}

/// Who scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    #[default]
    None,
    A,
    B,
}

/// Goals per player in the current game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreTally {
    pub a: u32,
    pub b: u32,
}

impl ScoreTally {
    pub fn credit(&mut self, scorer: Scorer) {
        match scorer {
            Scorer::A => self.a += 1,
            Scorer::B => self.b += 1,
            Scorer::None => {}
        }
    }

    pub fn leader_score(&self) -> u32 {
        self.a.max(self.b)
    }
}

/// Table-space distances between the entities of one frame, in table units.
///
/// A distance is `None` when either end has no position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Distances {
    pub puck_paddle_a: Option<f64>,
    pub puck_paddle_b: Option<f64>,
    pub paddle_a_paddle_b: Option<f64>,
    /// From the puck to the nearer goal edge, along the goal axis.
    pub puck_goal: Option<f64>,
}

impl Distances {
    pub fn measure(puck: &Entity, paddle_a: &Entity, paddle_b: &Entity, axis: TableAxis) -> Self {
        let between = |a: &Entity, b: &Entity| Some(a.position?.distance(&b.position?));
        Self {
            puck_paddle_a: between(puck, paddle_a),
            puck_paddle_b: between(puck, paddle_b),
            paddle_a_paddle_b: between(paddle_a, paddle_b),
            puck_goal: puck.position.map(|p| {
                let along = axis.along(&p);
                along.min(1.0 - along)
            }),
        }
    }
}

/// Everything known about one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Monotonic seconds since the session started.
    pub timestamp: f64,
    pub frame_index: u64,
    pub puck: Entity,
    pub paddle_a: Entity,
    pub paddle_b: Entity,
    /// True only on the frame a goal is declared.
    pub in_goal: bool,
    /// The scorer of the goal declared on this frame, `None` otherwise.
    pub scorer: Scorer,
    pub round_id: u32,
    pub game_id: u32,
    /// Tally after this frame's goal, if any.
    pub score: ScoreTally,
    pub distances: Distances,
}

impl FrameRecord {
    pub fn entity(&self, kind: EntityKind) -> &Entity {
        match kind {
            EntityKind::Puck => &self.puck,
            EntityKind::PaddleA => &self.paddle_a,
            EntityKind::PaddleB => &self.paddle_b,
        }
    }

    pub fn entities(&self) -> [&Entity; 3] {
        [&self.puck, &self.paddle_a, &self.paddle_b]
    }
}

/// A declared goal. Emitted once per scoring instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalEvent {
    pub timestamp: f64,
    pub scorer: Scorer,
    /// Tally including this goal. On the winning goal this is the final score.
    pub score: ScoreTally,
    /// Round the goal closed.
    pub round_id: u32,
    pub game_id: u32,
    /// The goal brought the scorer to the winning score.
    pub game_over: bool,
}
