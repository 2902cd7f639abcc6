//! Optional per-frame force fields layered on top of the physics.
//!
//! - **Destabilize**: a random horizontal impulse and a random spin kick on
//!   every block, for runs meant to look shaky.
//! - **Adhesion**: vertically adjacent blocks that overlap horizontally are
//!   pulled toward each other, damping jitter-induced sliding.
//!
//! Both default to magnitude 0, which makes them no-ops that draw no random
//! numbers. Falling (sensor) blocks are left alone.

use rand::Rng;

use crate::config::SimConfig;
use crate::physics::{BodyId, BodyState, PhysicsWorld};
use crate::rng::symmetric;

/// Kick every non-falling block with a random impulse and spin.
pub fn apply_destabilizing(world: &mut PhysicsWorld, config: &SimConfig, rng: &mut impl Rng) {
    if config.side_impulse <= 0.0 && config.spin_velocity <= 0.0 {
        return;
    }
    for body in world.blocks() {
        if body.sensor {
            continue;
        }
        let impulse = symmetric(rng, config.side_impulse);
        let spin = symmetric(rng, config.spin_velocity);
        if impulse != 0.0 {
            world.apply_impulse(body.id, (impulse, 0.0));
        }
        if spin != 0.0 {
            world.add_angular_velocity(body.id, spin);
        }
    }
}

/// Pairs `(lower, upper)` of blocks close enough to attract each other.
pub fn adhesion_pairs(bodies: &[BodyState], config: &SimConfig) -> Vec<(BodyId, BodyId)> {
    let solid: Vec<_> = bodies
        .iter()
        .filter(|b| !b.sensor)
        .map(|b| (b.id, b.aabb()))
        .collect();
    let mut pairs = Vec::new();
    for (i, (lower_id, lower)) in solid.iter().enumerate() {
        for (j, (upper_id, upper)) in solid.iter().enumerate() {
            if i == j {
                continue;
            }
            let gap = upper.bottom - lower.top;
            let overlap = upper.right.min(lower.right) - upper.left.max(lower.left);
            if gap.abs() <= config.adhesion_gap
                && overlap > 0.0
                && upper.bottom > lower.bottom
            {
                pairs.push((*lower_id, *upper_id));
            }
        }
    }
    pairs
}

/// Replace last frame's adhesion forces with this frame's.
pub fn apply_adhesion(world: &mut PhysicsWorld, config: &SimConfig) {
    world.reset_forces();
    if config.adhesion_force <= 0.0 {
        return;
    }
    for (lower, upper) in adhesion_pairs(&world.blocks(), config) {
        world.add_force(lower, (0.0, config.adhesion_force));
        world.add_force(upper, (0.0, -config.adhesion_force));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::BlockSpec;
    use crate::rng::RunRng;

    fn block(world: &mut PhysicsWorld, x: f64, y: f64) -> BodyId {
        world.add_block(BlockSpec {
            position: (x, y),
            velocity: (0.0, 0.0),
            size: (150.0, 220.0),
            mass: 5.0,
            variant: "block.png".to_owned(),
        })
    }

    #[test]
    fn adhesion_pulls_stacked_blocks_together() {
        let config = SimConfig {
            adhesion_force: 100.0,
            ..SimConfig::default()
        };
        let mut world = PhysicsWorld::new(&config);
        let b1 = block(&mut world, 100.0, 100.0);
        let b2 = block(&mut world, 100.0, 100.0 + 220.0);

        apply_adhesion(&mut world, &config);

        assert!(world.force(b1).1 > 0.0, "lower block pulled up");
        assert!(world.force(b2).1 < 0.0, "upper block pulled down");
    }

    #[test]
    fn adhesion_ignores_distant_blocks() {
        let config = SimConfig {
            adhesion_force: 100.0,
            ..SimConfig::default()
        };
        let mut world = PhysicsWorld::new(&config);
        let b1 = block(&mut world, 100.0, 100.0);
        let b2 = block(&mut world, 600.0, 100.0 + 220.0);
        apply_adhesion(&mut world, &config);
        assert_eq!(world.force(b1), (0.0, 0.0));
        assert_eq!(world.force(b2), (0.0, 0.0));
    }

    #[test]
    fn adhesion_forces_do_not_accumulate_across_frames() {
        let config = SimConfig {
            adhesion_force: 100.0,
            ..SimConfig::default()
        };
        let mut world = PhysicsWorld::new(&config);
        let b1 = block(&mut world, 100.0, 100.0);
        block(&mut world, 100.0, 320.0);
        apply_adhesion(&mut world, &config);
        apply_adhesion(&mut world, &config);
        assert_eq!(world.force(b1), (0.0, 100.0));
    }

    #[test]
    fn disabled_adhesion_applies_nothing() {
        let config = SimConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let b1 = block(&mut world, 100.0, 100.0);
        block(&mut world, 100.0, 320.0);
        apply_adhesion(&mut world, &config);
        assert_eq!(world.force(b1), (0.0, 0.0));
    }

    #[test]
    fn destabilize_disabled_draws_no_randomness() {
        let config = SimConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let id = block(&mut world, 540.0, 500.0);
        let mut rng = RunRng::new(4);
        let before = rng.forces.clone();
        apply_destabilizing(&mut world, &config, &mut rng.forces);
        assert_eq!(rng.forces, before);
        assert_eq!(world.block(id).unwrap().vx, 0.0);
    }

    #[test]
    fn destabilize_kicks_blocks() {
        let config = SimConfig {
            side_impulse: 50.0,
            spin_velocity: 0.5,
            ..SimConfig::default()
        };
        let mut world = PhysicsWorld::new(&config);
        let id = block(&mut world, 540.0, 500.0);
        let mut rng = RunRng::new(4);
        apply_destabilizing(&mut world, &config, &mut rng.forces);
        let s = world.block(id).unwrap();
        assert!(s.vx != 0.0 || s.angvel != 0.0);
        assert!(s.vx.abs() <= 10.0 + 1e-3);
        assert!(s.angvel.abs() <= 0.5 + 1e-6);
    }
}
