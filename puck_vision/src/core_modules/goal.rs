// THEORY:
// The `goal` module turns a stream of puck positions into discrete scoring
// events and keeps the score.
//
// Key architectural principles:
// 1.  **Two states**: `Idle` evaluates the puck every frame; `Cooldown` ignores
//     it until its deadline passes. The cooldown debounces the burst of frames
//     a puck spends rattling around a goal mouth.
// 2.  **Rising edge**: a goal is declared when the puck *enters* a mouth, not
//     while it sits there. A puck left in the mouth after the cooldown expires
//     does not score again.
// 3.  **Trust detections only**: a dead-reckoned puck can drift into a mouth
//     on its own, so estimated positions are ignored unless the configuration
//     explicitly counts them.
// 4.  **Rounds and games**: every goal closes a round; reaching the winning
//     score closes the game and starts a fresh one at 0-0.

use tracing::{debug, info};

use crate::config::GoalConfig;
use crate::core_modules::homography::{TableAxis, TablePoint};
use crate::record::{Entity, GoalEvent, PositionSource, ScoreTally, Scorer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoalState {
    Idle,
    /// Goals are not evaluated before `expires_at` (session seconds).
    Cooldown { expires_at: f64 },
}

#[derive(Debug, Clone)]
pub struct GoalStateMachine {
    config: GoalConfig,
    axis: TableAxis,
    state: GoalState,
    /// The last eligible puck position was inside a mouth.
    was_in_mouth: bool,
    score: ScoreTally,
    round_id: u32,
    game_id: u32,
}

impl GoalStateMachine {
    pub fn new(config: &GoalConfig, axis: TableAxis) -> Self {
        Self {
            config: config.clone(),
            axis,
            state: GoalState::Idle,
            was_in_mouth: false,
            score: ScoreTally::default(),
            round_id: 1,
            game_id: 1,
        }
    }

    pub fn state(&self) -> GoalState {
        self.state
    }

    pub fn score(&self) -> ScoreTally {
        self.score
    }

    pub fn round_id(&self) -> u32 {
        self.round_id
    }

    pub fn game_id(&self) -> u32 {
        self.game_id
    }

    /// Which player a puck at `point` would score for, if it is in a mouth.
    ///
    /// Paddle A defends the low edge of the goal axis, so the low mouth scores for B.
    pub fn mouth_scorer(&self, point: &TablePoint) -> Option<Scorer> {
        let across = self.axis.across(point);
        let [mouth_low, mouth_high] = self.config.mouth;
        if !(mouth_low..=mouth_high).contains(&across) {
            return None;
        }

        let along = self.axis.along(point);
        if along <= self.config.depth {
            Some(Scorer::B)
        } else if along >= 1.0 - self.config.depth {
            Some(Scorer::A)
        } else {
            None
        }
    }

    /// Evaluates the puck for the frame at `now` (session seconds).
    pub fn update(&mut self, puck: &Entity, now: f64) -> Option<GoalEvent> {
        if let GoalState::Cooldown { expires_at } = self.state {
            if now >= expires_at {
                debug!(now, "goal cooldown expired");
                self.state = GoalState::Idle;
            }
        }

        let eligible = match puck.source {
            PositionSource::Detected => true,
            PositionSource::Estimated => self.config.count_estimated_positions,
            PositionSource::Unknown => false,
        };
        // Frames without a usable position leave the edge detector untouched.
        let position = puck.position.filter(|_| eligible)?;

        let scorer = self.mouth_scorer(&position);
        let entered = scorer.is_some() && !self.was_in_mouth;
        self.was_in_mouth = scorer.is_some();

        match (self.state, scorer) {
            (GoalState::Idle, Some(scorer)) if entered => Some(self.declare(scorer, now)),
            (GoalState::Cooldown { .. }, Some(_)) if entered => {
                debug!(now, "puck entered a mouth during cooldown");
                None
            }
            _ => None,
        }
    }

    fn declare(&mut self, scorer: Scorer, now: f64) -> GoalEvent {
        self.score.credit(scorer);
        let game_over = self.score.leader_score() >= self.config.win_score;
        let event = GoalEvent {
            timestamp: now,
            scorer,
            score: self.score,
            round_id: self.round_id,
            game_id: self.game_id,
            game_over,
        };
        info!(
            ?scorer,
            a = self.score.a,
            b = self.score.b,
            round = self.round_id,
            game = self.game_id,
            "goal"
        );

        self.round_id += 1;
        if game_over {
            info!(game = self.game_id, ?scorer, "game over");
            self.game_id += 1;
            self.round_id = 1;
            self.score = ScoreTally::default();
        }
        self.state = GoalState::Cooldown {
            expires_at: now + self.config.cooldown_secs,
        };
        event
    }
}
