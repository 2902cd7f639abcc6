//! Physics + support scenarios driven without the full run loop.
//!
//! Each test builds a bare [`PhysicsWorld`], places blocks by hand, and steps
//! it together with the [`SupportAnalyzer`] and [`OutcomeDetector`] the way the
//! driver does.

use crane_sim::physics::BlockSpec;
use crane_sim::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn spawn(
    world: &mut PhysicsWorld,
    support: &mut SupportAnalyzer,
    config: &SimConfig,
    x: f64,
    y: f64,
) -> BodyId {
    let id = world.add_block(BlockSpec {
        position: (x, y),
        velocity: (0.0, 0.0),
        size: config.block_size,
        mass: config.block_mass,
        variant: config.block_variants[0].clone(),
    });
    support.register(id);
    id
}

/// Step physics and support analysis for `seconds` of simulated time.
fn run_for(
    world: &mut PhysicsWorld,
    support: &mut SupportAnalyzer,
    config: &SimConfig,
    seconds: f64,
) {
    let dt = config.dt();
    let frames = (seconds * f64::from(config.fps)).ceil() as u64;
    for _ in 0..frames {
        world.step(dt);
        support.update(world, config, dt);
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn fresh_world_reports_configured_gravity() {
    let world = PhysicsWorld::new(&SimConfig::default());
    assert_eq!(world.gravity(), (0.0, -900.0));
}

#[test]
fn first_block_survives_three_despawn_delays() {
    let config = SimConfig::default();
    let mut world = PhysicsWorld::new(&config);
    let mut support = SupportAnalyzer::new();
    let a = spawn(&mut world, &mut support, &config, 540.0, config.spawn_y());

    run_for(&mut world, &mut support, &config, config.despawn_delay * 3.0);

    assert!(world.contains(a), "foundation block was despawned");
    assert!(!support.is_falling(a));
}

#[test]
fn orphaned_second_block_is_despawned() {
    let config = SimConfig::default();
    let mut world = PhysicsWorld::new(&config);
    let mut support = SupportAnalyzer::new();
    let a = spawn(&mut world, &mut support, &config, 100.0, config.spawn_y());
    let b = spawn(&mut world, &mut support, &config, 400.0, config.spawn_y());

    run_for(&mut world, &mut support, &config, config.despawn_delay + 4.0);

    assert!(world.contains(a), "protected block A was removed");
    assert!(!world.contains(b), "orphaned block B is still present");
}

#[test]
fn block_with_block_on_top_is_never_despawned() {
    let config = SimConfig::default();
    let mut world = PhysicsWorld::new(&config);
    let mut support = SupportAnalyzer::new();
    let (_, h) = config.block_size;
    // The first registered block is the foundation; keep it clear of the pair.
    let ground = config.floor_y + h / 2.0;
    let a = spawn(&mut world, &mut support, &config, 100.0, ground);
    let lower = spawn(&mut world, &mut support, &config, 600.0, ground);
    let upper = spawn(&mut world, &mut support, &config, 600.0, ground + h);

    run_for(&mut world, &mut support, &config, config.despawn_delay * 2.0);

    assert!(world.contains(a));
    assert!(world.contains(lower), "block under another block was despawned");
    assert!(world.contains(upper));
    assert_eq!(support.unsupported_time(lower), 0.0);
}

#[test]
fn disabled_despawn_keeps_orphans() {
    let config = SimConfig {
        despawn_enabled: false,
        ..SimConfig::default()
    };
    let mut world = PhysicsWorld::new(&config);
    let mut support = SupportAnalyzer::new();
    let a = spawn(&mut world, &mut support, &config, 100.0, config.spawn_y());
    let b = spawn(&mut world, &mut support, &config, 400.0, config.spawn_y());

    run_for(&mut world, &mut support, &config, config.despawn_delay + 4.0);

    assert!(world.contains(a) && world.contains(b));
}

#[test]
fn just_spawned_block_at_target_height_does_not_win() {
    let config = SimConfig::default();
    let mut world = PhysicsWorld::new(&config);
    let mut detector = OutcomeDetector::new(&config);
    world.add_block(BlockSpec {
        position: (540.0, config.spawn_y()),
        velocity: (0.0, 0.0),
        size: config.block_size,
        mass: config.block_mass,
        variant: "block.png".to_owned(),
    });

    world.step(config.dt());
    detector.check(&world.blocks(), config.dt());

    assert_eq!(detector.outcome(), RunOutcome::Pending);
}

#[test]
fn blocks_never_sink_through_the_floor() {
    let config = SimConfig::default();
    let mut world = PhysicsWorld::new(&config);
    let mut support = SupportAnalyzer::new();
    for i in 0..4 {
        let x = 200.0 + 200.0 * i as f64;
        let y = config.spawn_y() + 100.0 * i as f64;
        spawn(&mut world, &mut support, &config, x, y);
    }
    let dt = config.dt();
    for _ in 0..240 {
        world.step(dt);
        for body in world.blocks() {
            // Corner penetration is tolerated; the rotated box may not sink.
            assert!(
                body.aabb().bottom >= config.floor_y - 10.0,
                "{} sank to {}",
                body.id,
                body.aabb().bottom
            );
        }
    }
}
