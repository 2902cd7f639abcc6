//! Transient visual-effect state handed to the renderer with each frame.
//!
//! None of this feeds back into the physics. Every random draw comes from the
//! run's camera stream, so disabling effects never changes a trajectory.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::physics::BodyId;
use crate::rng::{sample, symmetric};

const CONFETTI_COLORS: [[u8; 3]; 5] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 150, 255],
    [255, 255, 0],
    [255, 0, 200],
];

/// Camera transform for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraHint {
    /// Screen-space offset (shake plus sway).
    pub offset: (f64, f64),
    /// Scale factor; 1 is no zoom.
    pub zoom: f64,
}

impl Default for CameraHint {
    fn default() -> Self {
        Self {
            offset: (0.0, 0.0),
            zoom: 1.0,
        }
    }
}

/// A confetti particle in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub color: [u8; 3],
    /// Seconds left before it disappears.
    pub life: f64,
}

/// Effect timers for a whole run.
#[derive(Debug, Clone)]
pub struct VfxState {
    flashes: BTreeMap<BodyId, f64>,
    shake_left: f64,
    sway_amplitude: f64,
    sway_frequency: f64,
    victory_at: Option<f64>,
    glow: Vec<BodyId>,
    glow_left: f64,
    confetti: Vec<Particle>,
}

impl VfxState {
    /// Draws the camera sway parameters for the run.
    pub fn new(config: &SimConfig, rng: &mut impl Rng) -> Self {
        Self {
            flashes: BTreeMap::new(),
            shake_left: 0.0,
            sway_amplitude: sample(rng, config.camera_osc_amplitude_range),
            sway_frequency: sample(rng, config.camera_osc_frequency_range),
            victory_at: None,
            glow: Vec::new(),
            glow_left: 0.0,
            confetti: Vec::new(),
        }
    }

    /// Flash the bodies involved in a loud contact and shake the camera.
    pub fn on_impact(&mut self, bodies: impl IntoIterator<Item = BodyId>, config: &SimConfig) {
        for id in bodies {
            self.flashes.insert(id, config.impact_flash_duration);
        }
        if config.camera_effects_enabled {
            self.shake_left = config.camera_shake_duration;
        }
    }

    /// Start the zoom, the tower glow and the confetti burst.
    pub fn on_victory(
        &mut self,
        time: f64,
        tower: &[BodyId],
        config: &SimConfig,
        rng: &mut impl Rng,
    ) {
        self.victory_at = Some(time);
        self.glow = tower.to_vec();
        self.glow_left = config.glow_duration;
        let y = config.spawn_y();
        self.confetti.extend((0..config.confetti_count).map(|_| Particle {
            x: rng.gen_range(0.0..=config.width),
            y,
            vx: symmetric(rng, 150.0),
            vy: rng.gen_range(50.0..=250.0),
            color: *CONFETTI_COLORS.choose(rng).unwrap_or(&CONFETTI_COLORS[0]),
            life: config.confetti_lifetime,
        }));
    }

    /// Advance every timer and particle by `dt`.
    pub fn advance(&mut self, dt: f64, config: &SimConfig) {
        self.flashes.retain(|_, left| {
            *left -= dt;
            *left > 0.0
        });
        self.shake_left = (self.shake_left - dt).max(0.0);
        self.glow_left = (self.glow_left - dt).max(0.0);
        if self.glow_left == 0.0 {
            self.glow.clear();
        }
        for p in &mut self.confetti {
            p.vy -= config.confetti_gravity * dt;
            p.x += p.vx * dt;
            p.y += p.vy * dt;
            p.life -= dt;
        }
        self.confetti.retain(|p| p.life > 0.0 && p.y > -20.0);
    }

    /// Flash intensity of a body in `[0, 1]`, decaying linearly.
    pub fn flash(&self, id: BodyId, config: &SimConfig) -> f64 {
        match self.flashes.get(&id) {
            Some(left) if config.impact_flash_duration > 0.0 => {
                (left / config.impact_flash_duration).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// Victory glow intensity of a body in `[0, 1]`.
    pub fn glow(&self, id: BodyId, config: &SimConfig) -> f64 {
        if config.glow_duration > 0.0 && self.glow.contains(&id) {
            (self.glow_left / config.glow_duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Camera transform at video time `time`. Shake draws from `rng` only
    /// while a shake is running.
    pub fn camera(&self, time: f64, config: &SimConfig, rng: &mut impl Rng) -> CameraHint {
        if !config.camera_effects_enabled {
            return CameraHint::default();
        }

        let phase = TAU * self.sway_frequency * time;
        let mut offset = (
            self.sway_amplitude * phase.sin(),
            0.5 * self.sway_amplitude * phase.cos(),
        );
        if self.shake_left > 0.0 && config.camera_shake_duration > 0.0 {
            let strength =
                config.camera_shake_intensity * self.shake_left / config.camera_shake_duration;
            offset.0 += symmetric(rng, strength);
            offset.1 += symmetric(rng, strength);
        }

        let zoom = match self.victory_at {
            Some(start) => {
                let p = if config.victory_zoom_duration > 0.0 {
                    ((time - start) / config.victory_zoom_duration).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                1.0 + config.victory_zoom_factor * p * p * (3.0 - 2.0 * p)
            }
            None => 1.0,
        };

        CameraHint { offset, zoom }
    }

    pub fn confetti(&self) -> &[Particle] {
        &self.confetti
    }

    pub fn is_shaking(&self) -> bool {
        self.shake_left > 0.0
    }
}
