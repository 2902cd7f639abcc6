//! Run configuration.
//!
//! [`SimConfig`] is an immutable value object built once per run and passed by
//! reference into every component. Its [`Default`] reproduces the tuned
//! constants of the game; any field may be overridden from JSON, missing fields
//! keep their defaults.
//!
//! ```
//! use crane_sim::config::SimConfig;
//!
//! let config = SimConfig::from_json_str(r#"{ "time_limit": 45.0 }"#).unwrap();
//! assert_eq!(config.time_limit, 45.0);
//! assert_eq!(config.fps, 30);
//! assert_eq!(config.spawn_y(), 1285.0);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ---------------------------------------------------------------------------
// Sub-types
// ---------------------------------------------------------------------------

/// How the crane travels along its rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CraneMotion {
    /// Constant speed, bouncing between the movement bounds.
    Linear,
    /// Sinusoidal oscillation around the playfield centre.
    Sinusoidal,
}

/// Which victory test the outcome detector applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictoryRule {
    /// A grounded connected tower must reach the target height.
    ConnectedTower,
    /// Any resting block reaching the target height wins.
    ///
    /// Superseded by [`VictoryRule::ConnectedTower`]: a lone block that
    /// bounced up to the target counts as a win under this rule. Kept only to
    /// reproduce old recordings.
    AnyResting,
}

/// A closed `[min, max]` range of floats sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
}

impl FloatRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

/// Every tunable parameter of a run.
///
/// Coordinates are world units with y pointing up; the floor sits near the
/// bottom of the playfield.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // -- playfield & clock --------------------------------------------------
    /// Playfield width.
    pub width: f64,
    /// Playfield height.
    pub height: f64,
    /// Frames per second; one physics step per frame.
    pub fps: u32,
    /// Intro screen before the challenge starts (seconds, no physics).
    pub intro_duration: f64,
    /// Countdown length (seconds).
    pub time_limit: f64,
    /// Wind-down after the outcome is decided (seconds).
    pub outro_duration: f64,

    // -- world --------------------------------------------------------------
    /// Magnitude of the downward gravitational acceleration.
    pub gravity: f64,
    /// Height of the floor surface.
    pub floor_y: f64,
    pub floor_friction: f64,

    // -- blocks -------------------------------------------------------------
    /// Block footprint `(width, height)`.
    pub block_size: (f64, f64),
    pub block_mass: f64,
    pub block_friction: f64,
    pub block_restitution: f64,
    /// Texture variants a block may use.
    pub block_variants: Vec<String>,
    /// Live block budget, drawn once per run.
    pub block_count_range: (u32, u32),

    // -- despawn ------------------------------------------------------------
    pub despawn_enabled: bool,
    /// Unsupported time before a block starts falling out (seconds).
    pub despawn_delay: f64,
    /// Speed given to a block when it starts falling out.
    pub despawn_fall_speed: f64,
    /// Folded rotation (radians) above which a block counts as tipped.
    pub side_angle: f64,
    /// Vertical speed under which a body counts as resting.
    pub resting_speed: f64,
    /// Distance from the floor under which a block counts as on the floor.
    pub floor_tolerance: f64,
    /// Vertical gap tolerated between a block and the one stacked on it.
    pub stack_gap_tolerance: f64,
    /// Horizontal overlap required for a block to count as stacked on top.
    pub stack_overlap_margin: f64,
    /// Margin under which two bounding boxes count as touching.
    pub adjacency_margin: f64,

    // -- force fields -------------------------------------------------------
    /// Random horizontal impulse applied to every block each frame.
    pub side_impulse: f64,
    /// Random angular velocity added to every block each frame.
    pub spin_velocity: f64,
    /// Force pulling vertically adjacent blocks together.
    pub adhesion_force: f64,
    /// Gap under which two stacked blocks attract each other.
    pub adhesion_gap: f64,

    // -- crane & drops ------------------------------------------------------
    pub crane_motion: CraneMotion,
    /// Speed range of the linear crane.
    pub crane_speed_range: FloatRange,
    /// Distance from each side wall the crane never crosses.
    pub crane_movement_bounds: f64,
    pub crane_osc_amplitude_range: FloatRange,
    pub crane_osc_frequency_range: FloatRange,
    pub crane_osc_phase_range: FloatRange,
    /// Drop height measured down from the top of the playfield.
    pub crane_drop_height: f64,
    /// Horizontal jitter added to the drop position.
    pub drop_variation: f64,
    /// Fraction of the crane velocity inherited by a dropped block.
    pub drop_horizontal_speed_factor: f64,
    pub drop_interval: f64,
    pub drop_jitter: f64,
    pub min_drop_interval: f64,
    /// Crane stays centred and drops straight down.
    pub perfect_stack: bool,
    /// How long the next-block preview hides after a drop (seconds).
    pub preview_hide_duration: f64,

    // -- outcome ------------------------------------------------------------
    pub victory_rule: VictoryRule,
    /// Minimum contact impulse for an impact to be logged.
    pub impact_threshold: f64,
    /// Countdown cues fire for the last this-many whole seconds.
    pub countdown_cue_seconds: u32,

    // -- vfx ----------------------------------------------------------------
    pub impact_flash_duration: f64,
    pub camera_effects_enabled: bool,
    pub camera_shake_duration: f64,
    pub camera_shake_intensity: f64,
    pub victory_zoom_factor: f64,
    pub victory_zoom_duration: f64,
    pub camera_osc_amplitude_range: FloatRange,
    pub camera_osc_frequency_range: FloatRange,
    pub glow_duration: f64,
    pub confetti_count: u32,
    pub confetti_lifetime: f64,
    pub confetti_gravity: f64,

    // -- audio --------------------------------------------------------------
    /// Impact sound variants the cue planner picks from.
    pub impact_sounds: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        let width = 1080.0;
        let crane_movement_bounds = 340.0;
        Self {
            width,
            height: 1920.0,
            fps: 30,
            intro_duration: 3.0,
            time_limit: 60.0,
            outro_duration: 2.0,

            gravity: 900.0,
            floor_y: 10.0,
            floor_friction: 1.0,

            block_size: (150.0, 220.0),
            block_mass: 5.0,
            block_friction: 0.7,
            block_restitution: 0.1,
            block_variants: vec![
                "block.png".to_owned(),
                "block_variant1.png".to_owned(),
                "block_variant2.png".to_owned(),
                "block_variant3.png".to_owned(),
            ],
            block_count_range: (10, 20),

            despawn_enabled: true,
            despawn_delay: 4.2,
            despawn_fall_speed: 300.0,
            side_angle: 0.4,
            resting_speed: 1.0,
            floor_tolerance: 5.0,
            stack_gap_tolerance: 5.0,
            stack_overlap_margin: 10.0,
            adjacency_margin: 5.0,

            side_impulse: 0.0,
            spin_velocity: 0.0,
            adhesion_force: 0.0,
            adhesion_gap: 5.0,

            crane_motion: CraneMotion::Linear,
            crane_speed_range: FloatRange::new(80.0, 120.0),
            crane_movement_bounds,
            crane_osc_amplitude_range: FloatRange::new(80.0, width / 2.0 - crane_movement_bounds),
            crane_osc_frequency_range: FloatRange::new(0.4, 0.8),
            crane_osc_phase_range: FloatRange::new(0.0, std::f64::consts::TAU),
            crane_drop_height: 635.0,
            drop_variation: 10.0,
            drop_horizontal_speed_factor: 1.0,
            drop_interval: 2.0,
            drop_jitter: 0.4,
            min_drop_interval: 0.5,
            perfect_stack: false,
            preview_hide_duration: 1.0,

            victory_rule: VictoryRule::ConnectedTower,
            impact_threshold: 300.0,
            countdown_cue_seconds: 5,

            impact_flash_duration: 0.07,
            camera_effects_enabled: true,
            camera_shake_duration: 0.3,
            camera_shake_intensity: 8.0,
            victory_zoom_factor: 0.1,
            victory_zoom_duration: 1.2,
            camera_osc_amplitude_range: FloatRange::new(5.0, 10.0),
            camera_osc_frequency_range: FloatRange::new(0.03, 0.07),
            glow_duration: 1.0,
            confetti_count: 40,
            confetti_lifetime: 1.0,
            confetti_gravity: 400.0,

            impact_sounds: vec![
                "impact_1".to_owned(),
                "impact_2".to_owned(),
                "impact_3".to_owned(),
            ],
        }
    }
}

impl SimConfig {
    /// Configuration for deterministic victory-path runs.
    pub fn perfect_stack() -> Self {
        Self {
            perfect_stack: true,
            ..Self::default()
        }
    }

    /// Parse a (possibly partial) JSON object and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Fixed timestep in seconds.
    pub fn dt(&self) -> f64 {
        1.0 / self.fps as f64
    }

    /// World-space height at which blocks are spawned. Also the height a
    /// tower must reach to win.
    pub fn spawn_y(&self) -> f64 {
        self.height - self.crane_drop_height
    }

    /// Full video length: intro, the whole countdown, and the outro.
    pub fn max_duration(&self) -> f64 {
        self.intro_duration + self.time_limit + self.outro_duration
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::NotPositive { field, value })
            }
        }
        fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value >= 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::Negative { field, value })
            }
        }

        if self.fps == 0 {
            return Err(ConfigError::NotPositive {
                field: "fps",
                value: 0.0,
            });
        }
        positive("width", self.width)?;
        positive("height", self.height)?;
        positive("time_limit", self.time_limit)?;
        positive("block_size.0", self.block_size.0)?;
        positive("block_size.1", self.block_size.1)?;
        positive("block_mass", self.block_mass)?;
        positive("drop_interval", self.drop_interval)?;
        positive("min_drop_interval", self.min_drop_interval)?;
        non_negative("gravity", self.gravity)?;
        non_negative("intro_duration", self.intro_duration)?;
        non_negative("outro_duration", self.outro_duration)?;
        non_negative("despawn_delay", self.despawn_delay)?;
        non_negative("side_angle", self.side_angle)?;
        non_negative("drop_jitter", self.drop_jitter)?;
        non_negative("drop_variation", self.drop_variation)?;
        non_negative("side_impulse", self.side_impulse)?;
        non_negative("spin_velocity", self.spin_velocity)?;
        non_negative("adhesion_force", self.adhesion_force)?;
        non_negative("impact_threshold", self.impact_threshold)?;

        if self.block_variants.is_empty() {
            return Err(ConfigError::Empty {
                field: "block_variants",
            });
        }
        if self.impact_sounds.is_empty() {
            return Err(ConfigError::Empty {
                field: "impact_sounds",
            });
        }
        let (lo, hi) = self.block_count_range;
        if lo == 0 || lo > hi {
            return Err(ConfigError::InvalidRange {
                field: "block_count_range",
                min: lo as f64,
                max: hi as f64,
            });
        }
        for (field, range) in [
            ("crane_speed_range", self.crane_speed_range),
            ("crane_osc_amplitude_range", self.crane_osc_amplitude_range),
            ("crane_osc_frequency_range", self.crane_osc_frequency_range),
            ("crane_osc_phase_range", self.crane_osc_phase_range),
            ("camera_osc_amplitude_range", self.camera_osc_amplitude_range),
            ("camera_osc_frequency_range", self.camera_osc_frequency_range),
        ] {
            if !range.is_valid() {
                return Err(ConfigError::InvalidRange {
                    field,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        if 2.0 * self.crane_movement_bounds > self.width {
            return Err(ConfigError::InvalidRange {
                field: "crane_movement_bounds",
                min: self.crane_movement_bounds,
                max: self.width - self.crane_movement_bounds,
            });
        }
        if self.spawn_y() <= self.floor_y {
            return Err(ConfigError::SpawnBelowFloor {
                spawn_y: self.spawn_y(),
                floor_y: self.floor_y,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
