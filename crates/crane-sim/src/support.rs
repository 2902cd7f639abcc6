//! Per-frame support analysis and delayed despawn.
//!
//! After every physics step the [`SupportAnalyzer`] looks at each resting
//! block and decides whether it is supported. A resting block is supported
//! when any of these holds:
//!
//! - another block sits on top of it;
//! - it is the run's first block (the foundation) and lies on the floor;
//! - it is off the floor and not tipped onto a side.
//!
//! Everything else, including any other block lying on the floor, accumulates
//! unsupported time. Once that reaches the despawn delay the block becomes a
//! sensor, is sent downward, and is removed from the world after it drops
//! below the playfield.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::SimConfig;
use crate::geometry::{has_block_on_top, is_on_floor, is_tipped, Footprint, StackRule};
use crate::physics::{BodyId, BodyState, PhysicsWorld};

// ---------------------------------------------------------------------------
// SupportRule
// ---------------------------------------------------------------------------

/// The thresholds of the support test, taken from the config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportRule {
    pub floor_y: f64,
    pub floor_tolerance: f64,
    pub side_angle: f64,
    pub stack: StackRule,
}

impl SupportRule {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            floor_y: config.floor_y,
            floor_tolerance: config.floor_tolerance,
            side_angle: config.side_angle,
            stack: StackRule {
                gap_tolerance: config.stack_gap_tolerance,
                reach: config.block_size.1 / 2.0,
                overlap_margin: config.stack_overlap_margin,
            },
        }
    }

    /// Whether `body` (rotated by `angle`) is supported given the other
    /// solid blocks. `is_foundation` marks the run's first block.
    pub fn is_supported(
        &self,
        body: &Footprint,
        angle: f64,
        is_foundation: bool,
        solid: &[Footprint],
    ) -> bool {
        if has_block_on_top(body, solid, &self.stack) {
            return true;
        }
        let on_floor = is_on_floor(&body.aabb, self.floor_y, self.floor_tolerance);
        if is_foundation && on_floor {
            return true;
        }
        !on_floor && !is_tipped(angle, self.side_angle)
    }
}

// ---------------------------------------------------------------------------
// SupportAnalyzer
// ---------------------------------------------------------------------------

/// What changed during one [`SupportAnalyzer::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupportReport {
    /// Blocks that crossed the despawn delay this frame.
    pub started_falling: Vec<BodyId>,
    /// Blocks removed from the world this frame.
    pub removed: Vec<BodyId>,
}

/// Tracks unsupported time per block and drives despawn.
#[derive(Debug, Clone, Default)]
pub struct SupportAnalyzer {
    foundation: Option<BodyId>,
    unsupported: BTreeMap<BodyId, f64>,
    falling: BTreeSet<BodyId>,
}

impl SupportAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tell the analyzer a block was created. The first one becomes the
    /// protected foundation.
    pub fn register(&mut self, id: BodyId) {
        if self.foundation.is_none() {
            self.foundation = Some(id);
        }
        self.unsupported.insert(id, 0.0);
    }

    /// Classify resting blocks, advance timers by `dt`, start despawns and
    /// remove blocks that have fallen out of view.
    pub fn update(
        &mut self,
        world: &mut PhysicsWorld,
        config: &SimConfig,
        dt: f64,
    ) -> SupportReport {
        let mut report = SupportReport::default();
        let bodies = world.blocks();

        if config.despawn_enabled {
            let rule = SupportRule::from_config(config);
            let solid: Vec<Footprint> = bodies
                .iter()
                .filter(|b| !self.falling.contains(&b.id))
                .map(footprint)
                .collect();

            let resting: Vec<&BodyState> = bodies
                .iter()
                .filter(|b| self.is_resting(b, config))
                .collect();

            for body in resting {
                let supported = rule.is_supported(
                    &footprint(body),
                    body.angle,
                    self.foundation == Some(body.id),
                    &solid,
                );
                let timer = self.unsupported.entry(body.id).or_insert(0.0);
                if supported {
                    *timer = 0.0;
                    continue;
                }
                *timer += dt;
                if *timer >= config.despawn_delay {
                    tracing::debug!(
                        body = %body.id,
                        unsupported_for = *timer,
                        "block unsupported, despawning"
                    );
                    world.start_falling(body.id, config.despawn_fall_speed);
                    self.falling.insert(body.id);
                    report.started_falling.push(body.id);
                }
            }
        }

        let gone: Vec<BodyId> = bodies
            .iter()
            .filter(|b| self.falling.contains(&b.id) && b.y < -b.height)
            .map(|b| b.id)
            .collect();
        for id in gone {
            world.remove_block(id);
            self.falling.remove(&id);
            self.unsupported.remove(&id);
            tracing::debug!(body = %id, "block removed");
            report.removed.push(id);
        }

        report
    }

    fn is_resting(&self, body: &BodyState, config: &SimConfig) -> bool {
        !self.falling.contains(&body.id) && body.vy.abs() < config.resting_speed
    }

    /// The protected first block, if one was registered.
    pub fn foundation(&self) -> Option<BodyId> {
        self.foundation
    }

    /// Accumulated unsupported time of a block.
    pub fn unsupported_time(&self, id: BodyId) -> f64 {
        self.unsupported.get(&id).copied().unwrap_or(0.0)
    }

    /// Whether a block is in its falling-out phase.
    pub fn is_falling(&self, id: BodyId) -> bool {
        self.falling.contains(&id)
    }
}

fn footprint(body: &BodyState) -> Footprint {
    Footprint {
        id: body.id,
        aabb: body.aabb(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
