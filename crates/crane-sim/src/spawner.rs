//! Crane movement and block drops.
//!
//! The [`Crane`] travels along a bounded rail. The [`BlockSpawner`] keeps a
//! next-drop time; when the challenge clock reaches it, a block is dropped
//! under the crane with a little horizontal jitter and a share of the crane's
//! velocity, and the next delay is drawn around the base interval.

use std::f64::consts::TAU;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{CraneMotion, SimConfig};
use crate::rng::{sample, symmetric};

// ---------------------------------------------------------------------------
// Crane
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Rail {
    /// Perfect-stack mode: parked at the centre.
    Parked,
    Linear {
        speed: f64,
        direction: f64,
        min_x: f64,
        max_x: f64,
    },
    Sinusoidal {
        centre: f64,
        amplitude: f64,
        frequency: f64,
        phase: f64,
    },
}

/// The crane hook's horizontal position and velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct Crane {
    rail: Rail,
    x: f64,
    vx: f64,
}

impl Crane {
    /// Draw the crane's motion parameters for a run.
    pub fn new(config: &SimConfig, rng: &mut impl Rng) -> Self {
        let centre = config.width / 2.0;
        let rail = if config.perfect_stack {
            Rail::Parked
        } else {
            match config.crane_motion {
                CraneMotion::Linear => Rail::Linear {
                    speed: sample(rng, config.crane_speed_range),
                    direction: 1.0,
                    min_x: config.crane_movement_bounds,
                    max_x: config.width - config.crane_movement_bounds,
                },
                CraneMotion::Sinusoidal => Rail::Sinusoidal {
                    centre,
                    amplitude: sample(rng, config.crane_osc_amplitude_range),
                    frequency: sample(rng, config.crane_osc_frequency_range),
                    phase: sample(rng, config.crane_osc_phase_range),
                },
            }
        };
        let mut crane = Self {
            rail,
            x: centre,
            vx: 0.0,
        };
        crane.place(0.0);
        crane
    }

    /// Set position and velocity for time `t` without moving along the rail.
    fn place(&mut self, t: f64) {
        match self.rail {
            Rail::Parked => self.vx = 0.0,
            Rail::Linear {
                speed, direction, ..
            } => self.vx = speed * direction,
            Rail::Sinusoidal {
                centre,
                amplitude,
                frequency,
                phase,
            } => {
                let w = TAU * frequency;
                self.x = centre + amplitude * (w * t + phase).sin();
                self.vx = amplitude * w * (w * t + phase).cos();
            }
        }
    }

    /// Move the crane to time `t`, `dt` after the previous call.
    pub fn advance(&mut self, t: f64, dt: f64) {
        if let Rail::Linear {
            speed,
            ref mut direction,
            min_x,
            max_x,
        } = self.rail
        {
            self.x += *direction * speed * dt;
            if self.x > max_x {
                self.x = max_x;
                *direction = -1.0;
            } else if self.x < min_x {
                self.x = min_x;
                *direction = 1.0;
            }
        }
        self.place(t);
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    /// Instantaneous horizontal velocity.
    pub fn velocity(&self) -> f64 {
        self.vx
    }
}

// ---------------------------------------------------------------------------
// Variant choice
// ---------------------------------------------------------------------------

/// Pick a block texture uniformly, never the same one three times in a row.
///
/// `history` holds earlier choices, most recent last. If the last two are
/// equal that variant is excluded from this draw, unless it is the only one
/// available.
pub fn choose_variant(rng: &mut impl Rng, variants: &[String], history: &[String]) -> String {
    assert!(!variants.is_empty(), "choose_variant: no variants");
    let banned = match history {
        [.., a, b] if a == b => Some(b.as_str()),
        _ => None,
    };
    let candidates: Vec<&String> = variants
        .iter()
        .filter(|v| Some(v.as_str()) != banned)
        .collect();
    let pool: Vec<&String> = if candidates.is_empty() {
        variants.iter().collect()
    } else {
        candidates
    };
    pool.choose(rng)
        .map(|v| (*v).clone())
        .unwrap_or_else(|| variants[0].clone())
}

// ---------------------------------------------------------------------------
// BlockSpawner
// ---------------------------------------------------------------------------

/// A block the spawner wants created this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DropPlan {
    pub position: (f64, f64),
    pub velocity: (f64, f64),
    pub variant: String,
}

/// Decides when and where the next block appears.
#[derive(Debug, Clone)]
pub struct BlockSpawner {
    next_drop_time: f64,
    last_drop_time: Option<f64>,
    /// Most recent variants, oldest first; at most two.
    history: Vec<String>,
    /// Maximum number of live blocks for this run.
    budget: usize,
    dropped: u32,
}

impl BlockSpawner {
    /// First drop happens as soon as the challenge starts.
    pub fn new(config: &SimConfig, rng: &mut impl Rng) -> Self {
        let (lo, hi) = config.block_count_range;
        Self {
            next_drop_time: 0.0,
            last_drop_time: None,
            history: Vec::with_capacity(2),
            budget: rng.gen_range(lo..=hi) as usize,
            dropped: 0,
        }
    }

    /// Called once per frame with the challenge clock. Returns a drop when one
    /// is due and the live block budget allows it.
    pub fn poll(
        &mut self,
        elapsed: f64,
        live_blocks: usize,
        crane: &Crane,
        config: &SimConfig,
        variants: &[String],
        rng: &mut impl Rng,
    ) -> Option<DropPlan> {
        if elapsed < self.next_drop_time || live_blocks >= self.budget {
            return None;
        }

        let (jitter, vx) = if config.perfect_stack {
            (0.0, 0.0)
        } else {
            (
                symmetric(rng, config.drop_variation),
                crane.velocity() * config.drop_horizontal_speed_factor,
            )
        };
        let variant = choose_variant(rng, variants, &self.history);
        if self.history.len() == 2 {
            self.history.remove(0);
        }
        self.history.push(variant.clone());

        let delay = config.drop_interval + symmetric(rng, config.drop_jitter);
        self.next_drop_time = elapsed + delay.max(config.min_drop_interval);
        self.last_drop_time = Some(elapsed);
        self.dropped += 1;

        Some(DropPlan {
            position: (crane.x() + jitter, config.spawn_y()),
            velocity: (vx, 0.0),
            variant,
        })
    }

    /// Challenge time at which the next block is due.
    pub fn next_drop_time(&self) -> f64 {
        self.next_drop_time
    }

    /// Whether the next-block preview should be drawn at `elapsed`.
    pub fn preview_visible(&self, elapsed: f64, config: &SimConfig) -> bool {
        match self.last_drop_time {
            Some(t) => elapsed - t >= config.preview_hide_duration,
            None => true,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Blocks dropped so far.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::RunRng;
    use proptest::prelude::*;

    fn variants(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{i}")).collect()
    }

    #[test]
    fn parked_crane_never_moves() {
        let config = SimConfig::perfect_stack();
        let mut rng = RunRng::new(1);
        let mut crane = Crane::new(&config, &mut rng.spawner);
        for i in 1..300 {
            crane.advance(i as f64 / 30.0, 1.0 / 30.0);
            assert_eq!(crane.x(), 540.0);
            assert_eq!(crane.velocity(), 0.0);
        }
    }

    #[test]
    fn linear_crane_stays_within_bounds() {
        let config = SimConfig::default();
        let mut rng = RunRng::new(3);
        let mut crane = Crane::new(&config, &mut rng.spawner);
        let mut saw_left = false;
        for i in 1..3000 {
            crane.advance(i as f64 / 30.0, 1.0 / 30.0);
            assert!((340.0..=740.0).contains(&crane.x()), "x = {}", crane.x());
            saw_left |= crane.velocity() < 0.0;
        }
        assert!(saw_left, "crane should bounce back");
    }

    #[test]
    fn sinusoidal_crane_stays_within_amplitude() {
        let config = SimConfig {
            crane_motion: CraneMotion::Sinusoidal,
            ..SimConfig::default()
        };
        let mut rng = RunRng::new(3);
        let mut crane = Crane::new(&config, &mut rng.spawner);
        for i in 1..600 {
            crane.advance(i as f64 / 30.0, 1.0 / 30.0);
            assert!((crane.x() - 540.0).abs() <= 200.0 + 1e-9);
        }
    }

    #[test]
    fn no_triple_repeat_with_two_variants() {
        let vs = variants(2);
        let mut rng = RunRng::new(11);
        let mut history: Vec<String> = Vec::new();
        for _ in 0..500 {
            let last_two = &history[history.len().saturating_sub(2)..];
            let v = choose_variant(&mut rng.spawner, &vs, last_two);
            history.push(v);
        }
        for w in history.windows(3) {
            assert!(!(w[0] == w[1] && w[1] == w[2]), "triple repeat: {w:?}");
        }
    }

    #[test]
    fn single_variant_still_returns_it() {
        let vs = variants(1);
        let mut rng = RunRng::new(0);
        let h = vec!["v0".to_owned(), "v0".to_owned()];
        assert_eq!(choose_variant(&mut rng.spawner, &vs, &h), "v0");
    }

    #[test]
    fn first_drop_is_immediate_and_next_is_jittered() {
        let config = SimConfig::default();
        let mut rng = RunRng::new(5);
        let crane = Crane::new(&config, &mut rng.spawner);
        let mut spawner = BlockSpawner::new(&config, &mut rng.spawner);
        let vs = config.block_variants.clone();

        let plan = spawner
            .poll(0.0, 0, &crane, &config, &vs, &mut rng.spawner)
            .expect("first block drops at t=0");
        assert_eq!(plan.position.1, 1285.0);
        assert!((plan.position.0 - crane.x()).abs() <= 10.0);
        assert!((plan.velocity.0 - crane.velocity()).abs() < 1e-12);

        let next = spawner.next_drop_time();
        assert!((1.6..=2.4).contains(&next), "next drop at {next}");
        assert!(spawner
            .poll(next - 0.01, 1, &crane, &config, &vs, &mut rng.spawner)
            .is_none());
        assert!(spawner
            .poll(next, 1, &crane, &config, &vs, &mut rng.spawner)
            .is_some());
    }

    #[test]
    fn delay_is_floored() {
        let config = SimConfig {
            drop_interval: 0.1,
            drop_jitter: 0.05,
            ..SimConfig::default()
        };
        let mut rng = RunRng::new(5);
        let crane = Crane::new(&config, &mut rng.spawner);
        let mut spawner = BlockSpawner::new(&config, &mut rng.spawner);
        let vs = config.block_variants.clone();
        spawner.poll(0.0, 0, &crane, &config, &vs, &mut rng.spawner);
        assert_eq!(spawner.next_drop_time(), 0.5);
    }

    #[test]
    fn budget_limits_live_blocks() {
        let config = SimConfig::default();
        let mut rng = RunRng::new(8);
        let crane = Crane::new(&config, &mut rng.spawner);
        let mut spawner = BlockSpawner::new(&config, &mut rng.spawner);
        assert!((10..=20).contains(&spawner.budget()));
        let vs = config.block_variants.clone();
        let full = spawner.budget();
        assert!(spawner
            .poll(0.0, full, &crane, &config, &vs, &mut rng.spawner)
            .is_none());
        assert_eq!(spawner.dropped(), 0);
    }

    #[test]
    fn perfect_stack_drops_straight_under_crane() {
        let config = SimConfig::perfect_stack();
        let mut rng = RunRng::new(2);
        let crane = Crane::new(&config, &mut rng.spawner);
        let mut spawner = BlockSpawner::new(&config, &mut rng.spawner);
        let vs = config.block_variants.clone();
        let plan = spawner
            .poll(0.0, 0, &crane, &config, &vs, &mut rng.spawner)
            .unwrap();
        assert_eq!(plan.position, (540.0, 1285.0));
        assert_eq!(plan.velocity, (0.0, 0.0));
    }

    #[test]
    fn zero_speed_factor_disables_inherited_velocity() {
        let config = SimConfig {
            drop_horizontal_speed_factor: 0.0,
            ..SimConfig::default()
        };
        let mut rng = RunRng::new(2);
        let crane = Crane::new(&config, &mut rng.spawner);
        assert!(crane.velocity() != 0.0);
        let mut spawner = BlockSpawner::new(&config, &mut rng.spawner);
        let vs = config.block_variants.clone();
        let plan = spawner
            .poll(0.0, 0, &crane, &config, &vs, &mut rng.spawner)
            .unwrap();
        assert_eq!(plan.velocity.0, 0.0);
    }

    #[test]
    fn preview_hidden_right_after_drop() {
        let config = SimConfig::default();
        let mut rng = RunRng::new(2);
        let crane = Crane::new(&config, &mut rng.spawner);
        let mut spawner = BlockSpawner::new(&config, &mut rng.spawner);
        assert!(spawner.preview_visible(0.0, &config));
        let vs = config.block_variants.clone();
        spawner.poll(0.0, 0, &crane, &config, &vs, &mut rng.spawner);
        assert!(!spawner.preview_visible(0.5, &config));
        assert!(spawner.preview_visible(1.0, &config));
    }

    proptest! {
        #[test]
        fn never_three_in_a_row(seed in any::<u64>(), n in 2usize..6) {
            let vs = variants(n);
            let mut rng = RunRng::new(seed);
            let mut history: Vec<String> = Vec::new();
            for _ in 0..60 {
                let last_two = &history[history.len().saturating_sub(2)..];
                let v = choose_variant(&mut rng.spawner, &vs, last_two);
                prop_assert!(vs.contains(&v));
                history.push(v);
            }
            for w in history.windows(3) {
                prop_assert!(!(w[0] == w[1] && w[1] == w[2]));
            }
        }
    }
}
