//! Crane Sim -- deterministic simulation core for "stack the blocks before the
//! timer runs out" videos.
//!
//! A crane drops blocks into a rapier2d world; each frame the driver steps the
//! physics, decides which blocks are still supported, checks whether a
//! grounded tower has reached the target height, and logs time-stamped events
//! for the audio mixer. Rendering, audio mixing, and encoding are downstream
//! consumers of the [`FrameSnapshot`](driver::FrameSnapshot)s and the
//! [`EventTimeline`](timeline::EventTimeline) a run produces.
//!
//! # Quick Start
//!
//! ```no_run
//! use crane_sim::prelude::*;
//!
//! let config = SimConfig::perfect_stack();
//! let assets = StaticAssets::from_config(&config).unwrap();
//! let mut driver = SimulationDriver::new(&config, &assets, 7);
//!
//! let mut frames: Vec<FrameSnapshot> = Vec::new();
//! let report = driver.run(&mut frames);
//! assert_eq!(report.outcome, RunOutcome::Victory);
//! ```

#![deny(unsafe_code)]

pub mod assets;
pub mod audio;
pub mod config;
pub mod driver;
pub mod forces;
pub mod geometry;
pub mod outcome;
pub mod physics;
pub mod rng;
pub mod spawner;
pub mod support;
pub mod timeline;
pub mod vfx;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while reading or validating a [`SimConfig`](config::SimConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for [`SimConfig`](config::SimConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field that must be strictly positive is not.
    #[error("config field '{field}' must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    /// A field that must be non-negative is not.
    #[error("config field '{field}' must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    /// A list that must contain at least one entry is empty.
    #[error("config field '{field}' must not be empty")]
    Empty { field: &'static str },

    /// A `[min, max]` range is inverted or not finite.
    #[error("config field '{field}' has invalid range [{min}, {max}]")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    /// Blocks would spawn at or below the floor.
    #[error("spawn height {spawn_y} is not above the floor at {floor_y}")]
    SpawnBelowFloor { spawn_y: f64, floor_y: f64 },
}

/// Errors produced while resolving assets for a run.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// No block variant is available to draw from.
    #[error("asset store has no block variants")]
    NoVariants,

    /// The block footprint is degenerate.
    #[error("block footprint must be positive, got {width}x{height}")]
    BadFootprint { width: f64, height: f64 },
}

/// Any error that prevents a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Asset(#[from] AssetError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::assets::{AssetStore, StaticAssets};
    pub use crate::audio::{plan_cues, SoundCue};
    pub use crate::config::{CraneMotion, FloatRange, SimConfig, VictoryRule};
    pub use crate::driver::{
        CountingSink, FrameSink, FrameSnapshot, Phase, RunReport, SimulationDriver,
    };
    pub use crate::geometry::Aabb;
    pub use crate::outcome::{OutcomeDetector, RunOutcome};
    pub use crate::physics::{BodyId, BodyState, ContactEvent, PhysicsWorld};
    pub use crate::rng::RunRng;
    pub use crate::spawner::{choose_variant, BlockSpawner, Crane};
    pub use crate::support::SupportAnalyzer;
    pub use crate::timeline::{EventKind, EventTimeline, TimelineEvent};
    pub use crate::{AssetError, ConfigError, SetupError};
}
