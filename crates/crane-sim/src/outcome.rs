//! Victory and failure detection.
//!
//! The [`OutcomeDetector`] runs once per challenge frame. It moves from
//! [`RunOutcome::Pending`] to exactly one terminal state and then ignores every
//! later call.

use serde::{Deserialize, Serialize};

use crate::config::{SimConfig, VictoryRule};
use crate::geometry::{grounded_tower, Footprint};
use crate::physics::{BodyId, BodyState};

/// How a run ended, or that it has not ended yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Pending,
    Victory,
    Fail,
}

impl RunOutcome {
    pub fn is_decided(self) -> bool {
        self != Self::Pending
    }
}

/// Decides the run's outcome from per-frame body snapshots.
#[derive(Debug, Clone)]
pub struct OutcomeDetector {
    rule: VictoryRule,
    target: f64,
    floor_y: f64,
    floor_tolerance: f64,
    adjacency_margin: f64,
    resting_speed: f64,
    time_limit: f64,
    outcome: RunOutcome,
    finish_time: Option<f64>,
    time_remaining: Option<f64>,
    tower: Vec<BodyId>,
}

impl OutcomeDetector {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            rule: config.victory_rule,
            target: config.spawn_y(),
            floor_y: config.floor_y,
            floor_tolerance: config.floor_tolerance,
            adjacency_margin: config.adjacency_margin,
            resting_speed: config.resting_speed,
            time_limit: config.time_limit,
            outcome: RunOutcome::Pending,
            finish_time: None,
            time_remaining: None,
            tower: Vec::new(),
        }
    }

    /// Evaluate the frame at challenge time `elapsed`. Returns the new outcome
    /// on the frame it is decided and `None` otherwise.
    pub fn check(&mut self, bodies: &[BodyState], elapsed: f64) -> Option<RunOutcome> {
        if self.outcome.is_decided() {
            return None;
        }

        if let Some(tower) = self.find_victory(bodies) {
            let remaining = (self.time_limit - elapsed).max(0.0);
            tracing::info!(
                elapsed,
                time_remaining = remaining,
                tower = tower.len(),
                "victory"
            );
            self.decide(RunOutcome::Victory, elapsed, remaining);
            self.tower = tower;
            return Some(RunOutcome::Victory);
        }

        if elapsed >= self.time_limit {
            tracing::info!(elapsed, "time limit reached, run failed");
            self.decide(RunOutcome::Fail, elapsed, 0.0);
            return Some(RunOutcome::Fail);
        }

        None
    }

    fn decide(&mut self, outcome: RunOutcome, elapsed: f64, remaining: f64) {
        self.outcome = outcome;
        self.finish_time = Some(elapsed);
        self.time_remaining = Some(remaining);
    }

    /// The bodies that win the run this frame, if any. Only resting bodies
    /// that are not falling out take part.
    pub fn find_victory(&self, bodies: &[BodyState]) -> Option<Vec<BodyId>> {
        let resting: Vec<Footprint> = bodies
            .iter()
            .filter(|b| !b.sensor && b.vy.abs() < self.resting_speed)
            .map(|b| Footprint {
                id: b.id,
                aabb: b.aabb(),
            })
            .collect();

        match self.rule {
            VictoryRule::ConnectedTower => grounded_tower(
                &resting,
                self.target,
                self.floor_y,
                self.floor_tolerance,
                self.adjacency_margin,
            ),
            VictoryRule::AnyResting => resting
                .iter()
                .find(|b| b.aabb.top >= self.target)
                .map(|b| vec![b.id]),
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    /// Challenge time at which the outcome was decided.
    pub fn finish_time(&self) -> Option<f64> {
        self.finish_time
    }

    /// Countdown left when the outcome was decided; 0 on failure.
    pub fn time_remaining(&self) -> Option<f64> {
        self.time_remaining
    }

    /// Members of the winning tower; empty unless the run was won.
    pub fn tower(&self) -> &[BodyId] {
        &self.tower
    }
}
