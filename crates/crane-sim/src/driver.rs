//! The per-frame loop of a run.
//!
//! A [`SimulationDriver`] owns every piece of one run. A run goes through
//! these phases:
//!
//! 1. **Intro**: frames are emitted but nothing moves.
//! 2. **Challenge**: each frame drops a block if one is due, steps the
//!    physics, logs loud impacts, applies force fields, runs the support
//!    analysis, checks the outcome, fires countdown cues, and advances the
//!    visual effects.
//! 3. **Outro**: after the outcome, physics keeps stepping for a fixed time
//!    with no spawning or outcome logic.
//! 4. **Done**: [`tick`](SimulationDriver::tick) returns `None`.
//!
//! Clocks are derived from frame counters (`frames / fps`) rather than
//! accumulated, so timestamps are exact multiples of the timestep.
//!
//! # Example
//!
//! ```
//! use crane_sim::prelude::*;
//!
//! let config = SimConfig {
//!     intro_duration: 0.0,
//!     time_limit: 1.0,
//!     outro_duration: 0.0,
//!     ..SimConfig::default()
//! };
//! let assets = StaticAssets::from_config(&config).unwrap();
//! let mut driver = SimulationDriver::new(&config, &assets, 1);
//!
//! let mut sink = CountingSink::default();
//! let report = driver.run(&mut sink);
//! assert_eq!(report.outcome, RunOutcome::Fail);
//! assert_eq!(sink.frames, 30);
//! ```

use serde::{Deserialize, Serialize};

use crate::assets::AssetStore;
use crate::audio::{plan_cues, SoundCue};
use crate::config::SimConfig;
use crate::forces;
use crate::outcome::{OutcomeDetector, RunOutcome};
use crate::physics::{BlockSpec, BodyId, PhysicsWorld};
use crate::rng::RunRng;
use crate::spawner::{BlockSpawner, Crane};
use crate::support::SupportAnalyzer;
use crate::timeline::{Countdown, EventKind, EventTimeline, TimelineEvent};
use crate::vfx::{CameraHint, Particle, VfxState};
use crate::SetupError;

// ---------------------------------------------------------------------------
// Frame output
// ---------------------------------------------------------------------------

/// Which part of the video a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Intro,
    Challenge,
    Outro,
    Done,
}

/// What the renderer needs to draw one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockView {
    pub id: BodyId,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub variant: String,
    /// Falling out after despawn.
    pub falling: bool,
    /// Impact flash intensity in `[0, 1]`.
    pub flash: f64,
    /// Victory glow intensity in `[0, 1]`.
    pub glow: f64,
}

/// Everything a drawing stage needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub frame: u64,
    /// Video time in seconds.
    pub time: f64,
    pub phase: Phase,
    pub outcome: RunOutcome,
    /// Countdown shown on screen.
    pub time_remaining: f64,
    pub crane_x: f64,
    /// Where the next-block preview is drawn, when visible.
    pub preview: Option<(f64, f64)>,
    pub blocks: Vec<BlockView>,
    pub camera: CameraHint,
    pub confetti: Vec<Particle>,
}

/// Receives frames as the driver produces them.
pub trait FrameSink {
    fn push(&mut self, frame: FrameSnapshot);
}

impl FrameSink for Vec<FrameSnapshot> {
    fn push(&mut self, frame: FrameSnapshot) {
        Vec::push(self, frame);
    }
}

/// Discards frames, keeping only a count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountingSink {
    pub frames: u64,
}

impl FrameSink for CountingSink {
    fn push(&mut self, _frame: FrameSnapshot) {
        self.frames += 1;
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub seed: u64,
    pub outcome: RunOutcome,
    /// Video time at which the outcome was decided.
    pub finish_time: Option<f64>,
    /// Countdown left at the finish; 0 on failure.
    pub time_remaining: f64,
    pub frame_count: u64,
    /// Video length in seconds.
    pub duration: f64,
    pub blocks_spawned: u32,
    pub blocks_despawned: u32,
    pub timeline: Vec<TimelineEvent>,
    pub cues: Vec<SoundCue>,
    /// BLAKE3 hex digest of every frame's block poses plus the timeline.
    pub trajectory_hash: String,
}

// ---------------------------------------------------------------------------
// SimulationDriver
// ---------------------------------------------------------------------------

/// Owns and steps one run.
pub struct SimulationDriver {
    config: SimConfig,
    variants: Vec<String>,
    rng: RunRng,
    world: PhysicsWorld,
    crane: Crane,
    spawner: BlockSpawner,
    support: SupportAnalyzer,
    outcome: OutcomeDetector,
    timeline: EventTimeline,
    countdown: Countdown,
    vfx: VfxState,
    phase: Phase,
    intro_frames: u64,
    outro_frames: u64,
    /// Frames emitted so far.
    frame: u64,
    challenge_frames: u64,
    outro_elapsed_frames: u64,
    blocks_despawned: u32,
    hasher: blake3::Hasher,
}

impl SimulationDriver {
    /// Set up a run. The block footprint and variants come from `assets`.
    ///
    /// The configuration is trusted; use [`try_new`](Self::try_new) to
    /// validate it first.
    pub fn new(config: &SimConfig, assets: &impl AssetStore, seed: u64) -> Self {
        let mut config = config.clone();
        config.block_size = assets.block_size();

        let mut rng = RunRng::new(seed);
        let crane = Crane::new(&config, &mut rng.spawner);
        let spawner = BlockSpawner::new(&config, &mut rng.spawner);
        let vfx = VfxState::new(&config, &mut rng.camera);
        let fps = f64::from(config.fps);

        tracing::debug!(
            seed,
            budget = spawner.budget(),
            perfect_stack = config.perfect_stack,
            "run set up"
        );

        Self {
            variants: assets.variants().to_vec(),
            world: PhysicsWorld::new(&config),
            crane,
            spawner,
            support: SupportAnalyzer::new(),
            outcome: OutcomeDetector::new(&config),
            timeline: EventTimeline::new(),
            countdown: Countdown::new(config.countdown_cue_seconds, config.time_limit),
            vfx,
            phase: Phase::Intro,
            intro_frames: (config.intro_duration * fps).round() as u64,
            outro_frames: (config.outro_duration * fps).round() as u64,
            frame: 0,
            challenge_frames: 0,
            outro_elapsed_frames: 0,
            blocks_despawned: 0,
            hasher: blake3::Hasher::new(),
            rng,
            config,
        }
    }

    /// Validate the configuration and assets, then set up a run.
    pub fn try_new(
        config: &SimConfig,
        assets: &impl AssetStore,
        seed: u64,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        crate::assets::check(assets)?;
        Ok(Self::new(config, assets, seed))
    }

    /// Produce the next frame, or `None` once the run is over.
    pub fn tick(&mut self) -> Option<FrameSnapshot> {
        if self.phase == Phase::Intro && self.frame >= self.intro_frames {
            tracing::debug!(frame = self.frame, "challenge started");
            self.phase = Phase::Challenge;
        }
        match self.phase {
            Phase::Intro => {}
            Phase::Challenge => self.challenge_frame(),
            Phase::Outro => {
                if self.outro_elapsed_frames >= self.outro_frames {
                    self.finish();
                    return None;
                }
                self.outro_frame();
            }
            Phase::Done => return None,
        }

        let snapshot = self.snapshot();
        self.hash_frame(&snapshot);
        self.frame += 1;
        Some(snapshot)
    }

    /// Run to completion, feeding every frame to `sink`.
    pub fn run(&mut self, sink: &mut impl FrameSink) -> RunReport {
        while let Some(frame) = self.tick() {
            sink.push(frame);
        }
        self.report()
    }

    fn dt(&self) -> f64 {
        self.config.dt()
    }

    fn challenge_elapsed(&self) -> f64 {
        self.challenge_frames as f64 / f64::from(self.config.fps)
    }

    /// Video time of the current state.
    fn clock(&self) -> f64 {
        let fps = f64::from(self.config.fps);
        match self.phase {
            Phase::Intro => self.frame as f64 / fps,
            Phase::Challenge => self.config.intro_duration + self.challenge_elapsed(),
            Phase::Outro | Phase::Done => {
                self.config.intro_duration
                    + self.challenge_elapsed()
                    + self.outro_elapsed_frames as f64 / fps
            }
        }
    }

    fn challenge_frame(&mut self) {
        let dt = self.dt();

        let before = self.challenge_elapsed();
        if let Some(plan) = self.spawner.poll(
            before,
            self.world.block_count(),
            &self.crane,
            &self.config,
            &self.variants,
            &mut self.rng.spawner,
        ) {
            let id = self.world.add_block(BlockSpec {
                position: plan.position,
                velocity: plan.velocity,
                size: self.config.block_size,
                mass: self.config.block_mass,
                variant: plan.variant,
            });
            self.support.register(id);
            tracing::debug!(
                body = %id,
                x = plan.position.0,
                vx = plan.velocity.0,
                elapsed = before,
                "block dropped"
            );
        }

        self.challenge_frames += 1;
        let elapsed = self.challenge_elapsed();
        self.crane.advance(elapsed, dt);
        self.simulate();

        let time = self.clock();
        let bodies = self.world.blocks();
        match self.outcome.check(&bodies, elapsed) {
            Some(RunOutcome::Victory) => {
                self.timeline.record(time, EventKind::Victory);
                self.vfx
                    .on_victory(time, self.outcome.tower(), &self.config, &mut self.rng.camera);
                self.phase = Phase::Outro;
            }
            Some(RunOutcome::Fail) => {
                self.timeline.record(time, EventKind::Fail);
                self.phase = Phase::Outro;
            }
            Some(RunOutcome::Pending) | None => {
                for second in self.countdown.update(self.config.time_limit - elapsed) {
                    tracing::trace!(second, "countdown");
                    self.timeline.record(time, EventKind::Timer);
                }
            }
        }

        self.vfx.advance(dt, &self.config);
    }

    fn outro_frame(&mut self) {
        self.outro_elapsed_frames += 1;
        self.simulate();
        self.vfx.advance(self.dt(), &self.config);
    }

    /// Step the physics once and run everything that reacts to it.
    fn simulate(&mut self) {
        let dt = self.dt();
        let time = self.clock();

        for contact in self.world.step(dt) {
            if contact.impulse < self.config.impact_threshold {
                continue;
            }
            tracing::trace!(body = %contact.body, impulse = contact.impulse, "impact");
            self.timeline.record(time, EventKind::Impact);
            self.vfx.on_impact(contact.bodies(), &self.config);
        }

        forces::apply_destabilizing(&mut self.world, &self.config, &mut self.rng.forces);
        forces::apply_adhesion(&mut self.world, &self.config);

        let report = self.support.update(&mut self.world, &self.config, dt);
        self.blocks_despawned += report.removed.len() as u32;
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        if self.spawner.dropped() == 0 {
            tracing::warn!(seed = self.rng.seed(), "run ended without dropping a block");
        }
        tracing::info!(
            seed = self.rng.seed(),
            outcome = ?self.outcome.outcome(),
            frames = self.frame,
            spawned = self.spawner.dropped(),
            despawned = self.blocks_despawned,
            "run complete"
        );
    }

    fn snapshot(&mut self) -> FrameSnapshot {
        let time = self.clock();
        let elapsed = self.challenge_elapsed();
        let time_remaining = self
            .outcome
            .time_remaining()
            .unwrap_or((self.config.time_limit - elapsed).max(0.0));

        let preview = (self.phase == Phase::Challenge
            && self.spawner.preview_visible(elapsed, &self.config))
        .then(|| (self.crane.x(), self.config.spawn_y()));

        let blocks = self
            .world
            .blocks()
            .into_iter()
            .map(|b| BlockView {
                flash: self.vfx.flash(b.id, &self.config),
                glow: self.vfx.glow(b.id, &self.config),
                id: b.id,
                x: b.x,
                y: b.y,
                angle: b.angle,
                variant: b.variant,
                falling: b.sensor,
            })
            .collect();

        FrameSnapshot {
            frame: self.frame,
            time,
            phase: self.phase,
            outcome: self.outcome.outcome(),
            time_remaining,
            crane_x: self.crane.x(),
            preview,
            blocks,
            camera: self.vfx.camera(time, &self.config, &mut self.rng.camera),
            confetti: self.vfx.confetti().to_vec(),
        }
    }

    fn hash_frame(&mut self, snapshot: &FrameSnapshot) {
        #[derive(Serialize)]
        struct Pose {
            id: BodyId,
            x: f64,
            y: f64,
            angle: f64,
        }

        let poses: Vec<Pose> = snapshot
            .blocks
            .iter()
            .map(|b| Pose {
                id: b.id,
                x: b.x,
                y: b.y,
                angle: b.angle,
            })
            .collect();
        let bytes =
            serde_json::to_vec(&poses).expect("block poses should always be JSON-serializable");
        self.hasher.update(&bytes);
    }

    /// Summary of the run so far. Complete once [`tick`](Self::tick) has
    /// returned `None`. Repeated calls on a finished run return equal reports.
    pub fn report(&self) -> RunReport {
        let duration = self.frame as f64 / f64::from(self.config.fps);
        // The audio stream is only read here; plan from a copy so it never advances.
        let mut audio = self.rng.audio.clone();
        let cues = plan_cues(&self.timeline, duration, &self.config, &mut audio);

        let mut hasher = self.hasher.clone();
        let bytes = serde_json::to_vec(&self.timeline)
            .expect("event timeline should always be JSON-serializable");
        hasher.update(&bytes);

        RunReport {
            seed: self.rng.seed(),
            outcome: self.outcome.outcome(),
            finish_time: self
                .outcome
                .finish_time()
                .map(|t| self.config.intro_duration + t),
            time_remaining: self.outcome.time_remaining().unwrap_or(0.0),
            frame_count: self.frame,
            duration,
            blocks_spawned: self.spawner.dropped(),
            blocks_despawned: self.blocks_despawned,
            timeline: self.timeline.events().to_vec(),
            cues,
            trajectory_hash: hasher.finalize().to_hex().to_string(),
        }
    }

    // -- accessors -----------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn timeline(&self) -> &EventTimeline {
        &self.timeline
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome.outcome()
    }

    /// Frames emitted so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StaticAssets;

    fn short(config: SimConfig) -> SimConfig {
        SimConfig {
            intro_duration: 1.0,
            time_limit: 2.0,
            outro_duration: 0.5,
            ..config
        }
    }

    fn driver(config: &SimConfig, seed: u64) -> SimulationDriver {
        let assets = StaticAssets::from_config(config).unwrap();
        SimulationDriver::new(config, &assets, seed)
    }

    #[test]
    fn phases_follow_the_clock() {
        let config = short(SimConfig::default());
        let mut d = driver(&config, 1);
        let frames: Vec<FrameSnapshot> = std::iter::from_fn(|| d.tick()).collect();

        let phases: Vec<Phase> = frames.iter().map(|f| f.phase).collect();
        assert_eq!(phases.iter().filter(|&&p| p == Phase::Intro).count(), 30);
        // The deciding frame already belongs to the outro.
        assert_eq!(phases.iter().filter(|&&p| p == Phase::Challenge).count(), 59);
        assert_eq!(phases.iter().filter(|&&p| p == Phase::Outro).count(), 16);
        assert_eq!(frames.len(), 105);
        assert_eq!(d.phase(), Phase::Done);
        assert!(d.tick().is_none());
    }

    #[test]
    fn intro_frames_do_not_move_anything() {
        let config = short(SimConfig::default());
        let mut d = driver(&config, 1);
        for _ in 0..30 {
            let f = d.tick().unwrap();
            assert_eq!(f.phase, Phase::Intro);
            assert!(f.blocks.is_empty());
            assert_eq!(f.time_remaining, 2.0);
        }
        assert_eq!(d.world().block_count(), 0);
    }

    #[test]
    fn first_block_drops_on_first_challenge_frame() {
        let config = short(SimConfig::default());
        let mut d = driver(&config, 1);
        for _ in 0..30 {
            d.tick();
        }
        let f = d.tick().unwrap();
        assert_eq!(f.phase, Phase::Challenge);
        assert_eq!(f.blocks.len(), 1);
        assert!(f.preview.is_none());
    }

    #[test]
    fn failing_run_reports_fail_at_time_limit() {
        let config = short(SimConfig::default());
        let mut d = driver(&config, 4);
        let report = d.run(&mut CountingSink::default());
        assert_eq!(report.outcome, RunOutcome::Fail);
        assert_eq!(report.finish_time, Some(3.0));
        assert_eq!(report.time_remaining, 0.0);
        assert_eq!(report.trajectory_hash.len(), 64);
        let fail: Vec<_> = report
            .timeline
            .iter()
            .filter(|e| e.kind == EventKind::Fail)
            .collect();
        assert_eq!(fail.len(), 1);
        assert_eq!(fail[0].timestamp, 3.0);
    }

    #[test]
    fn report_timestamps_never_decrease() {
        let config = short(SimConfig::default());
        let report = driver(&config, 8).run(&mut CountingSink::default());
        assert!(report
            .timeline
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert!((report.duration - 3.5).abs() < 1e-9);
    }

    #[test]
    fn frames_counted_by_sink_match_report() {
        let config = short(SimConfig::default());
        let mut sink = CountingSink::default();
        let report = driver(&config, 2).run(&mut sink);
        assert_eq!(sink.frames, report.frame_count);
    }

    #[test]
    fn repeated_reports_are_identical() {
        let config = SimConfig::perfect_stack();
        let mut d = driver(&config, 12);
        let first = d.run(&mut CountingSink::default());
        assert!(first.timeline.iter().any(|e| e.kind == EventKind::Impact));
        let second = d.report();
        let third = d.report();
        assert_eq!(first.cues, second.cues);
        assert_eq!(second.cues, third.cues);
        assert_eq!(first.trajectory_hash, third.trajectory_hash);
    }

    #[test]
    fn try_new_rejects_invalid_config() {
        let config = SimConfig {
            fps: 0,
            ..SimConfig::default()
        };
        let assets = StaticAssets::from_config(&SimConfig::default()).unwrap();
        assert!(matches!(
            SimulationDriver::try_new(&config, &assets, 0),
            Err(SetupError::Config(_))
        ));
    }
}
