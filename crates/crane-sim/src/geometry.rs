//! Bounding-box queries over a snapshot of the blocks.
//!
//! Everything here is a pure function of axis-aligned boxes so that the
//! support and victory rules can be tested without a physics world. Scans are
//! O(n²); a run holds a few dozen blocks at most.

use std::collections::BTreeSet;
use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::physics::BodyId;

// ---------------------------------------------------------------------------
// Aabb
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box, y up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Aabb {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Bounding box of a `width` x `height` rectangle centred on `(x, y)` and
    /// rotated by `angle` radians.
    pub fn of_rotated_rect(x: f64, y: f64, angle: f64, width: f64, height: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        let (hw, hh) = (width / 2.0, height / 2.0);
        let ex = cos.abs() * hw + sin.abs() * hh;
        let ey = sin.abs() * hw + cos.abs() * hh;
        Self::new(x - ex, y - ey, x + ex, y + ey)
    }

    /// Whether the two boxes overlap once each is grown by `margin`.
    pub fn touches(&self, other: &Aabb, margin: f64) -> bool {
        self.left - margin <= other.right
            && other.left - margin <= self.right
            && self.bottom - margin <= other.top
            && other.bottom - margin <= self.top
    }
}

/// A block's id together with its bounding box for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub id: BodyId,
    pub aabb: Aabb,
}

// ---------------------------------------------------------------------------
// Single-body tests
// ---------------------------------------------------------------------------

/// Fold a rotation into `[0, π/2]`: 0 is upright, π/2 is lying on a side.
pub fn fold_tilt(angle: f64) -> f64 {
    let a = angle.abs() % PI;
    if a > FRAC_PI_2 {
        PI - a
    } else {
        a
    }
}

/// A block counts as tipped strictly above the threshold.
pub fn is_tipped(angle: f64, side_angle: f64) -> bool {
    fold_tilt(angle) > side_angle
}

/// Lower edge within `tolerance` of the floor.
pub fn is_on_floor(aabb: &Aabb, floor_y: f64, tolerance: f64) -> bool {
    aabb.bottom <= floor_y + tolerance
}

// ---------------------------------------------------------------------------
// Stacking
// ---------------------------------------------------------------------------

/// Tolerances for "another block sits on this one".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackRule {
    /// How far below the top edge the upper block's bottom may sink.
    pub gap_tolerance: f64,
    /// How far above the top edge the upper block's bottom may float.
    pub reach: f64,
    /// Horizontal overlap required on each side.
    pub overlap_margin: f64,
}

impl StackRule {
    pub fn is_on_top(&self, lower: &Aabb, upper: &Aabb) -> bool {
        upper.bottom > lower.top - self.gap_tolerance
            && upper.bottom < lower.top + self.reach
            && upper.right > lower.left + self.overlap_margin
            && upper.left < lower.right - self.overlap_margin
    }
}

/// Whether any other footprint sits on top of `body`.
pub fn has_block_on_top(body: &Footprint, others: &[Footprint], rule: &StackRule) -> bool {
    others
        .iter()
        .filter(|o| o.id != body.id)
        .any(|o| rule.is_on_top(&body.aabb, &o.aabb))
}

// ---------------------------------------------------------------------------
// Towers
// ---------------------------------------------------------------------------

/// Partition footprints into groups of mutually touching boxes.
///
/// Components are listed in order of their smallest member; members keep the
/// input order.
pub fn connected_components(bodies: &[Footprint], margin: f64) -> Vec<Vec<BodyId>> {
    let n = bodies.len();
    let mut component_of = vec![usize::MAX; n];
    let mut components: Vec<Vec<usize>> = Vec::new();

    for start in 0..n {
        if component_of[start] != usize::MAX {
            continue;
        }
        let label = components.len();
        component_of[start] = label;
        let mut members = vec![start];
        let mut cursor = 0;
        while cursor < members.len() {
            let current = members[cursor];
            cursor += 1;
            for next in 0..n {
                if component_of[next] == usize::MAX
                    && bodies[current].aabb.touches(&bodies[next].aabb, margin)
                {
                    component_of[next] = label;
                    members.push(next);
                }
            }
        }
        members.sort_unstable();
        components.push(members);
    }

    components
        .into_iter()
        .map(|members| members.into_iter().map(|i| bodies[i].id).collect())
        .collect()
}

/// Find a tower: a touching group that stands on the floor and has a block
/// whose top reaches `target`. Returns its members, or `None`.
pub fn grounded_tower(
    bodies: &[Footprint],
    target: f64,
    floor_y: f64,
    floor_tolerance: f64,
    margin: f64,
) -> Option<Vec<BodyId>> {
    let tallest = bodies.iter().map(|b| b.aabb.top).fold(f64::NEG_INFINITY, f64::max);
    if tallest < target {
        return None;
    }

    let reaching: BTreeSet<BodyId> = bodies
        .iter()
        .filter(|b| b.aabb.top >= target)
        .map(|b| b.id)
        .collect();
    let grounded: BTreeSet<BodyId> = bodies
        .iter()
        .filter(|b| is_on_floor(&b.aabb, floor_y, floor_tolerance))
        .map(|b| b.id)
        .collect();

    connected_components(bodies, margin).into_iter().find(|component| {
        component.iter().any(|id| reaching.contains(id))
            && component.iter().any(|id| grounded.contains(id))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const W: f64 = 150.0;
    const H: f64 = 220.0;

    fn block(id: u64, x: f64, bottom: f64) -> Footprint {
        Footprint {
            id: BodyId::from_raw(id),
            aabb: Aabb::new(x - W / 2.0, bottom, x + W / 2.0, bottom + H),
        }
    }

    fn rule() -> StackRule {
        StackRule {
            gap_tolerance: 5.0,
            reach: H / 2.0,
            overlap_margin: 10.0,
        }
    }

    #[test]
    fn upright_rect_aabb_matches_extents() {
        let bb = Aabb::of_rotated_rect(100.0, 200.0, 0.0, W, H);
        assert_eq!(bb, Aabb::new(25.0, 90.0, 175.0, 310.0));
    }

    #[test]
    fn quarter_turn_swaps_extents() {
        let bb = Aabb::of_rotated_rect(0.0, 0.0, FRAC_PI_2, W, H);
        assert!((bb.right - H / 2.0).abs() < 1e-9);
        assert!((bb.top - W / 2.0).abs() < 1e-9);
    }

    #[test]
    fn fold_tilt_examples() {
        assert_eq!(fold_tilt(0.0), 0.0);
        assert!((fold_tilt(PI) - 0.0).abs() < 1e-12);
        assert!((fold_tilt(PI - 0.3) - 0.3).abs() < 1e-12);
        assert!((fold_tilt(-0.3) - 0.3).abs() < 1e-12);
        assert!((fold_tilt(2.0 * PI + 0.2) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn tilt_threshold_is_exclusive() {
        assert!(!is_tipped(0.4, 0.4));
        assert!(!is_tipped(-0.4, 0.4));
        assert!(is_tipped(0.4 + 1e-9, 0.4));
        assert!(is_tipped(PI - 0.41, 0.4));
    }

    #[test]
    fn on_floor_tolerance() {
        assert!(is_on_floor(&block(0, 0.0, 15.0).aabb, 10.0, 5.0));
        assert!(!is_on_floor(&block(0, 0.0, 15.1).aabb, 10.0, 5.0));
    }

    #[test]
    fn block_directly_above_is_on_top() {
        let lower = block(0, 500.0, 10.0);
        let upper = block(1, 520.0, 230.0);
        assert!(has_block_on_top(&lower, &[lower, upper], &rule()));
        assert!(!has_block_on_top(&upper, &[lower, upper], &rule()));
    }

    #[test]
    fn block_beside_is_not_on_top() {
        let lower = block(0, 500.0, 10.0);
        // Overlaps by less than the horizontal margin.
        let side = block(1, 500.0 + W - 5.0, 230.0);
        assert!(!has_block_on_top(&lower, &[side], &rule()));
    }

    #[test]
    fn block_far_above_is_not_on_top() {
        let lower = block(0, 500.0, 10.0);
        let floating = block(1, 500.0, 230.0 + H);
        assert!(!has_block_on_top(&lower, &[floating], &rule()));
    }

    #[test]
    fn body_is_never_on_top_of_itself() {
        let b = block(0, 0.0, 0.0);
        let shifted = Footprint {
            id: b.id,
            aabb: block(0, 0.0, H).aabb,
        };
        assert!(!has_block_on_top(&b, &[shifted], &rule()));
    }

    #[test]
    fn components_group_touching_boxes() {
        let bodies = [
            block(0, 100.0, 10.0),
            block(1, 100.0, 230.0),
            block(2, 800.0, 10.0),
        ];
        let comps = connected_components(&bodies, 5.0);
        assert_eq!(
            comps,
            vec![
                vec![BodyId::from_raw(0), BodyId::from_raw(1)],
                vec![BodyId::from_raw(2)],
            ]
        );
    }

    #[test]
    fn tower_must_be_grounded() {
        // A lone block hovering at the target is not a tower.
        let bodies = [block(0, 500.0, 1200.0), block(1, 100.0, 10.0)];
        assert!(grounded_tower(&bodies, 1285.0, 10.0, 5.0, 5.0).is_none());
    }

    #[test]
    fn stacked_tower_reaching_target_wins() {
        let bodies: Vec<Footprint> = (0..6)
            .map(|i| block(i, 540.0, 10.0 + i as f64 * H))
            .chain(std::iter::once(block(99, 100.0, 10.0)))
            .collect();
        let tower = grounded_tower(&bodies, 1285.0, 10.0, 5.0, 5.0).unwrap();
        assert_eq!(tower.len(), 6);
        assert!(!tower.contains(&BodyId::from_raw(99)));
    }

    #[test]
    fn tower_short_of_target_is_none() {
        let bodies: Vec<Footprint> = (0..5).map(|i| block(i, 540.0, 10.0 + i as f64 * H)).collect();
        assert!(grounded_tower(&bodies, 1285.0, 10.0, 5.0, 5.0).is_none());
    }

    proptest! {
        #[test]
        fn fold_tilt_in_quarter_turn(angle in -20.0f64..20.0) {
            let a = fold_tilt(angle);
            prop_assert!((0.0..=FRAC_PI_2 + 1e-12).contains(&a));
        }

        #[test]
        fn rotated_aabb_contains_centre(
            x in -1000.0f64..1000.0,
            y in -1000.0f64..1000.0,
            angle in -7.0f64..7.0,
        ) {
            let bb = Aabb::of_rotated_rect(x, y, angle, W, H);
            prop_assert!(bb.left <= x && x <= bb.right);
            prop_assert!(bb.bottom <= y && y <= bb.top);
            prop_assert!(bb.right - bb.left >= W.min(H) - 1e-9);
        }

        #[test]
        fn components_partition_input(xs in proptest::collection::vec(0.0f64..2000.0, 0..12)) {
            let bodies: Vec<Footprint> = xs
                .iter()
                .enumerate()
                .map(|(i, &x)| block(i as u64, x, 10.0))
                .collect();
            let comps = connected_components(&bodies, 5.0);
            let total: usize = comps.iter().map(Vec::len).sum();
            prop_assert_eq!(total, bodies.len());
        }
    }
}
