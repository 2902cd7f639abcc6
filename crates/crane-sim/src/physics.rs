//! rapier2d rigid-body world: a static floor and dynamic rectangular blocks.
//!
//! The [`PhysicsWorld`] owns every rapier structure and hands out stable
//! [`BodyId`]s. Each call to [`PhysicsWorld::step`]:
//!
//! 1. Integrates all dynamic bodies by exactly `dt` seconds.
//! 2. Collects contact-begin events from rapier's channel collector.
//! 3. Reports each begun contact once the solver has pushed the pair apart
//!    for two solver steps, with the peak impulse seen. rapier starts a
//!    contact while it is still speculative, so the begin step carries no
//!    impulse and the first resolved step may only stop part of the approach.
//! 4. Returns the [`ContactEvent`]s sorted by body id.
//!
//! Contacts are pulled by the caller after the step; nothing in the physics
//! callbacks touches simulation state outside this struct.
//!
//! # Determinism
//!
//! rapier2d is compiled with `enhanced-determinism`. Bodies are kept in a
//! `BTreeMap` keyed by id and events are sorted, so identical inputs produce
//! identical trajectories on the same platform.
//!
//! # Preconditions
//!
//! Unknown ids, non-positive sizes or masses, and non-positive timesteps are
//! programmer errors and panic.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::geometry::Aabb;

/// Thickness of the floor slab; its top face is the floor surface.
const FLOOR_THICKNESS: f64 = 100.0;

/// Solver steps with a non-zero impulse before a begun contact is reported.
const RESOLVE_STEPS: u8 = 2;

/// World units per rapier "meter". Tunes rapier's internal tolerances to
/// pixel-scale blocks.
const LENGTH_UNIT: Real = 100.0;

// ---------------------------------------------------------------------------
// BodyId
// ---------------------------------------------------------------------------

/// Identifier of a dynamic block. Ids are never reused within a world.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(u64);

impl BodyId {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BodyId({})", self.0)
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Block descriptors
// ---------------------------------------------------------------------------

/// Everything needed to create a block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpec {
    /// Centre position.
    pub position: (f64, f64),
    /// Initial linear velocity.
    pub velocity: (f64, f64),
    /// Footprint `(width, height)`.
    pub size: (f64, f64),
    pub mass: f64,
    /// Texture tag; cosmetic only.
    pub variant: String,
}

/// Read-only view of a block after the latest step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub id: BodyId,
    pub x: f64,
    pub y: f64,
    /// Rotation in radians.
    pub angle: f64,
    pub vx: f64,
    pub vy: f64,
    pub angvel: f64,
    pub width: f64,
    pub height: f64,
    pub mass: f64,
    pub variant: String,
    /// Non-colliding (falling out after despawn).
    pub sensor: bool,
}

impl BodyState {
    pub fn aabb(&self) -> Aabb {
        Aabb::of_rotated_rect(self.x, self.y, self.angle, self.width, self.height)
    }
}

/// What a block touched when a contact began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContactTarget {
    Floor,
    Block(BodyId),
}

/// A contact reported by [`PhysicsWorld::step`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    /// The block (lower id when both sides are blocks).
    pub body: BodyId,
    /// What it touched.
    pub other: ContactTarget,
    /// Magnitude of the impulse resolved for the pair during this step.
    pub impulse: f64,
    /// True when reported by [`PhysicsWorld::step`] for a contact that just
    /// began, false for continued contact from
    /// [`PhysicsWorld::touching`].
    pub first_contact: bool,
}

impl ContactEvent {
    /// Blocks involved in the contact.
    pub fn bodies(&self) -> impl Iterator<Item = BodyId> {
        let other = match self.other {
            ContactTarget::Block(id) => Some(id),
            ContactTarget::Floor => None,
        };
        std::iter::once(self.body).chain(other)
    }
}

/// A begun contact still waiting for its impulse.
#[derive(Debug, Clone, Copy)]
struct PendingContact {
    colliders: (ColliderHandle, ColliderHandle),
    peak: f64,
    resolved_steps: u8,
}

impl PendingContact {
    fn report(&self, (body, other): (BodyId, ContactTarget)) -> ContactEvent {
        ContactEvent {
            body,
            other,
            impulse: self.peak,
            first_contact: true,
        }
    }
}

#[derive(Debug)]
struct BlockEntry {
    body: RigidBodyHandle,
    collider: ColliderHandle,
    size: (f64, f64),
    mass: f64,
    variant: String,
}

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

/// Owns the rapier2d simulation: gravity, the floor, and all blocks.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    gravity_exact: (f64, f64),
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    floor_y: f64,
    floor_collider: ColliderHandle,
    block_friction: f64,
    block_restitution: f64,
    /// Blocks by id, iterated in creation order.
    blocks: BTreeMap<BodyId, BlockEntry>,
    /// Maps rapier ColliderHandle -> block id for contact lookup.
    collider_to_block: HashMap<ColliderHandle, BodyId>,
    /// Begun contacts whose impulse has not been resolved yet.
    pending: BTreeMap<(BodyId, ContactTarget), PendingContact>,
    next_id: u64,
}

impl PhysicsWorld {
    /// Build a world with the configured gravity and a floor spanning the
    /// playfield width at `floor_y`.
    pub fn new(config: &SimConfig) -> Self {
        let mut integration_params = IntegrationParameters::default();
        integration_params.length_unit = LENGTH_UNIT;
        integration_params.dt = config.dt() as Real;

        let mut rigid_body_set = RigidBodySet::new();
        let mut collider_set = ColliderSet::new();

        // Static slab whose top face is the floor surface.
        let floor_body = rigid_body_set.insert(
            RigidBodyBuilder::fixed()
                .translation(vector![
                    (config.width / 2.0) as Real,
                    (config.floor_y - FLOOR_THICKNESS / 2.0) as Real
                ])
                .build(),
        );
        let floor_collider = collider_set.insert_with_parent(
            ColliderBuilder::cuboid(
                (config.width / 2.0) as Real,
                (FLOOR_THICKNESS / 2.0) as Real,
            )
            .friction(config.floor_friction as Real)
            .friction_combine_rule(CoefficientCombineRule::Multiply)
            .restitution(0.0)
            .restitution_combine_rule(CoefficientCombineRule::Multiply)
            .build(),
            floor_body,
            &mut rigid_body_set,
        );

        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![0.0, -(config.gravity as Real)],
            gravity_exact: (0.0, -config.gravity),
            integration_params,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set,
            collider_set,
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            floor_y: config.floor_y,
            floor_collider,
            block_friction: config.block_friction,
            block_restitution: config.block_restitution,
            blocks: BTreeMap::new(),
            collider_to_block: HashMap::new(),
            pending: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Create a dynamic block with a single rectangular collider matching its
    /// footprint.
    ///
    /// # Panics
    ///
    /// Panics if the size or mass is not strictly positive.
    pub fn add_block(&mut self, block: BlockSpec) -> BodyId {
        let (width, height) = block.size;
        assert!(
            width > 0.0 && height > 0.0,
            "block size must be positive, got {width}x{height}"
        );
        assert!(block.mass > 0.0, "block mass must be positive, got {}", block.mass);

        let id = BodyId(self.next_id);
        self.next_id += 1;

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![block.position.0 as Real, block.position.1 as Real])
            .linvel(vector![block.velocity.0 as Real, block.velocity.1 as Real])
            .ccd_enabled(true)
            .build();
        let body = self.rigid_body_set.insert(rb);

        let collider = ColliderBuilder::cuboid((width / 2.0) as Real, (height / 2.0) as Real)
            .mass(block.mass as Real)
            .friction(self.block_friction as Real)
            .friction_combine_rule(CoefficientCombineRule::Multiply)
            .restitution(self.block_restitution as Real)
            .restitution_combine_rule(CoefficientCombineRule::Multiply)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider =
            self.collider_set
                .insert_with_parent(collider, body, &mut self.rigid_body_set);

        self.collider_to_block.insert(collider, id);
        self.blocks.insert(
            id,
            BlockEntry {
                body,
                collider,
                size: block.size,
                mass: block.mass,
                variant: block.variant,
            },
        );
        id
    }

    /// Delete a block and its collider. The id is dead afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live block.
    pub fn remove_block(&mut self, id: BodyId) {
        let entry = self
            .blocks
            .remove(&id)
            .unwrap_or_else(|| panic!("remove_block: unknown body {id}"));
        self.collider_to_block.remove(&entry.collider);
        self.pending
            .retain(|&(body, other), _| body != id && other != ContactTarget::Block(id));
        self.rigid_body_set.remove(
            entry.body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true, // remove attached colliders
        );
    }

    /// Advance the simulation by `dt` seconds and return the contacts that
    /// began during the step.
    ///
    /// # Panics
    ///
    /// Panics if `dt` is not positive and finite.
    pub fn step(&mut self, dt: f64) -> Vec<ContactEvent> {
        assert!(
            dt > 0.0 && dt.is_finite(),
            "dt must be positive and finite, got {dt}"
        );
        self.integration_params.dt = dt as Real;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None, // query pipeline (unused)
            &(),  // physics hooks
            &event_handler,
        );

        let mut contacts = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            match event {
                CollisionEvent::Started(h1, h2, flags) => {
                    if flags.contains(CollisionEventFlags::SENSOR) {
                        continue;
                    }
                    if let Some(key) = self.pair_key(h1, h2) {
                        self.pending.insert(
                            key,
                            PendingContact {
                                colliders: (h1, h2),
                                peak: 0.0,
                                resolved_steps: 0,
                            },
                        );
                    }
                }
                CollisionEvent::Stopped(h1, h2, _) => {
                    // Separated early: still one report per begin.
                    let Some(key) = self.pair_key(h1, h2) else {
                        continue;
                    };
                    if let Some(pending) = self.pending.remove(&key) {
                        contacts.push(pending.report(key));
                    }
                }
            }
        }

        let impulses: Vec<_> = self
            .pending
            .iter()
            .map(|(&key, p)| (key, self.pair_impulse(p.colliders.0, p.colliders.1)))
            .collect();
        for (key, impulse) in impulses {
            let Some(pending) = self.pending.get_mut(&key) else {
                continue;
            };
            if impulse <= 0.0 {
                continue;
            }
            pending.peak = pending.peak.max(impulse);
            pending.resolved_steps += 1;
            if pending.resolved_steps >= RESOLVE_STEPS {
                let event = pending.report(key);
                self.pending.remove(&key);
                tracing::trace!(
                    body = %event.body,
                    other = ?event.other,
                    impulse = event.impulse,
                    "contact began"
                );
                contacts.push(event);
            }
        }

        // Channel delivery order is not guaranteed; sort for reproducible runs.
        contacts.sort_by(|a, b| (a.body, a.other).cmp(&(b.body, b.other)));
        contacts
    }

    /// Contacts currently carrying load, with the impulse of the last step.
    /// These are continued contacts, so `first_contact` is false.
    pub fn touching(&self) -> Vec<ContactEvent> {
        let mut contacts: Vec<_> = self
            .narrow_phase
            .contact_pairs()
            .filter(|pair| pair.has_any_active_contact)
            .filter_map(|pair| {
                let (body, other) = self.pair_key(pair.collider1, pair.collider2)?;
                if self.pending.contains_key(&(body, other)) {
                    return None;
                }
                Some(ContactEvent {
                    body,
                    other,
                    impulse: pair.total_impulse_magnitude() as f64,
                    first_contact: false,
                })
            })
            .collect();
        contacts.sort_by(|a, b| (a.body, a.other).cmp(&(b.body, b.other)));
        contacts
    }

    /// Normalized (block, other) key of a collider pair; `None` unless at
    /// least one side is a live block.
    fn pair_key(&self, h1: ColliderHandle, h2: ColliderHandle) -> Option<(BodyId, ContactTarget)> {
        let target = |h: ColliderHandle| -> Option<ContactTarget> {
            if h == self.floor_collider {
                Some(ContactTarget::Floor)
            } else {
                self.collider_to_block.get(&h).copied().map(ContactTarget::Block)
            }
        };
        match (target(h1)?, target(h2)?) {
            (ContactTarget::Block(a), ContactTarget::Block(b)) => {
                Some((a.min(b), ContactTarget::Block(a.max(b))))
            }
            (ContactTarget::Block(a), ContactTarget::Floor)
            | (ContactTarget::Floor, ContactTarget::Block(a)) => Some((a, ContactTarget::Floor)),
            (ContactTarget::Floor, ContactTarget::Floor) => None,
        }
    }

    fn pair_impulse(&self, h1: ColliderHandle, h2: ColliderHandle) -> f64 {
        self.narrow_phase
            .contact_pair(h1, h2)
            .map(|pair| pair.total_impulse_magnitude() as f64)
            .unwrap_or(0.0)
    }

    // -- body manipulation ---------------------------------------------------

    fn rigid_body_mut(&mut self, id: BodyId) -> &mut RigidBody {
        let handle = self
            .blocks
            .get(&id)
            .unwrap_or_else(|| panic!("unknown body {id}"))
            .body;
        &mut self.rigid_body_set[handle]
    }

    /// Make a block non-colliding and send it downward at `speed`.
    pub fn start_falling(&mut self, id: BodyId, speed: f64) {
        let collider = self
            .blocks
            .get(&id)
            .unwrap_or_else(|| panic!("start_falling: unknown body {id}"))
            .collider;
        self.collider_set[collider].set_sensor(true);
        self.rigid_body_mut(id)
            .set_linvel(vector![0.0, -(speed as Real)], true);
    }

    /// Apply an instantaneous impulse at the centre of mass.
    pub fn apply_impulse(&mut self, id: BodyId, impulse: (f64, f64)) {
        self.rigid_body_mut(id)
            .apply_impulse(vector![impulse.0 as Real, impulse.1 as Real], true);
    }

    /// Add to the angular velocity.
    pub fn add_angular_velocity(&mut self, id: BodyId, delta: f64) {
        let rb = self.rigid_body_mut(id);
        let w = rb.angvel() + delta as Real;
        rb.set_angvel(w, true);
    }

    /// Add a persistent force, applied on every step until
    /// [`reset_forces`](Self::reset_forces).
    pub fn add_force(&mut self, id: BodyId, force: (f64, f64)) {
        self.rigid_body_mut(id)
            .add_force(vector![force.0 as Real, force.1 as Real], true);
    }

    /// Clear the user forces of every block.
    pub fn reset_forces(&mut self) {
        for entry in self.blocks.values() {
            self.rigid_body_set[entry.body].reset_forces(false);
        }
    }

    /// Force currently accumulated on a block.
    pub fn force(&self, id: BodyId) -> (f64, f64) {
        let entry = self
            .blocks
            .get(&id)
            .unwrap_or_else(|| panic!("force: unknown body {id}"));
        let f = self.rigid_body_set[entry.body].user_force();
        (f.x as f64, f.y as f64)
    }

    // -- queries -------------------------------------------------------------

    /// State of one block, or `None` if it was removed.
    pub fn block(&self, id: BodyId) -> Option<BodyState> {
        self.blocks.get(&id).map(|entry| self.state_of(id, entry))
    }

    /// All blocks in id order.
    pub fn blocks(&self) -> Vec<BodyState> {
        self.blocks
            .iter()
            .map(|(&id, entry)| self.state_of(id, entry))
            .collect()
    }

    fn state_of(&self, id: BodyId, entry: &BlockEntry) -> BodyState {
        let rb = &self.rigid_body_set[entry.body];
        let t = rb.translation();
        let v = rb.linvel();
        BodyState {
            id,
            x: t.x as f64,
            y: t.y as f64,
            angle: rb.rotation().angle() as f64,
            vx: v.x as f64,
            vy: v.y as f64,
            angvel: rb.angvel() as f64,
            width: entry.size.0,
            height: entry.size.1,
            mass: entry.mass,
            variant: entry.variant.clone(),
            sensor: self.collider_set[entry.collider].is_sensor(),
        }
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Number of live blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Gravity exactly as configured, y up.
    pub fn gravity(&self) -> (f64, f64) {
        self.gravity_exact
    }

    pub fn floor_y(&self) -> f64 {
        self.floor_y
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
