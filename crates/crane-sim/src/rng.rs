//! Per-run seeded randomness.
//!
//! Each consumer draws from its own PCG stream derived from the run seed, so
//! toggling a visual effect never shifts the numbers the spawner sees. There
//! is no global generator: two runs with the same seed replay identically and
//! runs on different threads never share state.

use rand::Rng;
use rand_pcg::Pcg32;

use crate::config::FloatRange;

const SPAWNER_STREAM: u64 = 1;
const FORCES_STREAM: u64 = 2;
const CAMERA_STREAM: u64 = 3;
const AUDIO_STREAM: u64 = 4;

/// The random streams of a single run.
#[derive(Debug, Clone)]
pub struct RunRng {
    seed: u64,
    /// Crane parameters, drop jitter, variants, drop delays.
    pub spawner: Pcg32,
    /// Destabilizing impulses.
    pub forces: Pcg32,
    /// Camera shake/sway and confetti.
    pub camera: Pcg32,
    /// Impact sound variant choice.
    pub audio: Pcg32,
}

impl RunRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            spawner: Pcg32::new(seed, SPAWNER_STREAM),
            forces: Pcg32::new(seed, FORCES_STREAM),
            camera: Pcg32::new(seed, CAMERA_STREAM),
            audio: Pcg32::new(seed, AUDIO_STREAM),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Uniform sample from a closed range; a degenerate range returns its bound.
pub fn sample(rng: &mut impl Rng, range: FloatRange) -> f64 {
    if range.max > range.min {
        rng.gen_range(range.min..=range.max)
    } else {
        range.min
    }
}

/// Uniform sample from `[-magnitude, magnitude]`; zero when `magnitude <= 0`.
pub fn symmetric(rng: &mut impl Rng, magnitude: f64) -> f64 {
    if magnitude > 0.0 {
        rng.gen_range(-magnitude..=magnitude)
    } else {
        0.0
    }
}
