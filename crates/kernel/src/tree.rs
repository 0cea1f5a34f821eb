//! Tree-node geometry and the accept/open decision.
//!
//! The walk machinery never owns the tree; it sees node geometry through
//! this module's types and asks one question: is this node, possibly
//! shifted by a periodic replica offset, far enough from a bucket to be
//! accepted as a single far-field interaction? The answer is a pure
//! function of geometry and the opening parameter, so decisions are
//! reproducible regardless of the order in which remote data arrives.

use serde::{Deserialize, Serialize};

use crate::interactions::CompactMultipole;

/// Identifier of a tree node within the global tree.
pub type NodeKey = u64;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: [f64; 3],
    /// Maximum corner.
    pub max: [f64; 3],
}

impl Aabb {
    /// Create a box from its corners.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Center point.
    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// Edge lengths.
    pub fn size(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Half the diagonal length; the radius of the bounding sphere.
    pub fn bounding_radius(&self) -> f64 {
        let s = self.size();
        0.5 * (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt()
    }

    /// Squared distance from `point` to the nearest point of the box.
    /// Zero when the point is inside.
    pub fn distance_sq_to(&self, point: [f64; 3]) -> f64 {
        let mut d2 = 0.0;
        for axis in 0..3 {
            let p = point[axis];
            if p < self.min[axis] {
                let d = self.min[axis] - p;
                d2 += d * d;
            } else if p > self.max[axis] {
                let d = p - self.max[axis];
                d2 += d * d;
            }
        }
        d2
    }
}

/// One of the 27 lattice translations used to evaluate interactions across
/// periodic domain boundaries. Encoded as a single id so interaction
/// records stay plain data; id [`ReplicaOffset::CENTER`] is the
/// untranslated domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaOffset(u8);

impl ReplicaOffset {
    /// The untranslated domain, (0, 0, 0).
    pub const CENTER: ReplicaOffset = ReplicaOffset(13);

    /// Number of distinct offsets.
    pub const COUNT: usize = 27;

    /// Encode a lattice translation; each component must be in `-1..=1`.
    pub fn new(ix: i8, iy: i8, iz: i8) -> Self {
        assert!(
            (-1..=1).contains(&ix) && (-1..=1).contains(&iy) && (-1..=1).contains(&iz),
            "replica offset component out of range"
        );
        ReplicaOffset(((ix + 1) + 3 * (iy + 1) + 9 * (iz + 1)) as u8)
    }

    /// Rebuild from a stored id.
    pub fn from_id(id: u8) -> Self {
        assert!((id as usize) < Self::COUNT, "replica offset id out of range");
        ReplicaOffset(id)
    }

    /// The stored id, `0..27`.
    pub fn id(self) -> u8 {
        self.0
    }

    /// The lattice translation components, each in `-1..=1`.
    pub fn components(self) -> (i8, i8, i8) {
        let ix = (self.0 % 3) as i8 - 1;
        let iy = ((self.0 / 3) % 3) as i8 - 1;
        let iz = (self.0 / 9) as i8 - 1;
        (ix, iy, iz)
    }

    /// World-space translation for a domain of the given period.
    pub fn shift(self, period: [f64; 3]) -> [f64; 3] {
        let (ix, iy, iz) = self.components();
        [
            f64::from(ix) * period[0],
            f64::from(iy) * period[1],
            f64::from(iz) * period[2],
        ]
    }

    /// All offsets, center first; non-periodic domains use only the center.
    pub fn all(periodic: bool) -> Vec<ReplicaOffset> {
        if !periodic {
            return vec![Self::CENTER];
        }
        let mut out = Vec::with_capacity(Self::COUNT);
        out.push(Self::CENTER);
        for id in 0..Self::COUNT as u8 {
            if id != Self::CENTER.0 {
                out.push(ReplicaOffset(id));
            }
        }
        out
    }
}

/// Geometry of one tree node as seen by the walk: bounding box plus the
/// compact multipole summary used both for the opening test and for
/// far-field evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeGeometry {
    /// Bounding box of the node's particles.
    pub bounds: Aabb,
    /// Multipole summary; `radius` is the opening radius.
    pub multipole: CompactMultipole,
}

impl NodeGeometry {
    /// Build a node geometry whose opening radius is the bounding radius of
    /// its box.
    pub fn from_bounds(bounds: Aabb, total_mass: f64, soft: f64) -> Self {
        let multipole = CompactMultipole {
            total_mass,
            center_of_mass: bounds.center(),
            soft,
            radius: bounds.bounding_radius(),
        };
        Self { bounds, multipole }
    }
}

/// Outcome of the opening-angle test for a (node, bucket, offset) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDecision {
    /// Far enough: take the node as a single far-field interaction.
    Accept,
    /// Too close: descend into the node's children (or its particles,
    /// for a leaf).
    Open,
}

/// The geometric opening criterion.
///
/// A node is accepted when `size / distance < theta`, where `size` is the
/// node's opening radius and `distance` separates the shifted node center
/// of mass from the bucket's bounding box. Evaluated in squared form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpeningCriterion {
    /// Opening angle parameter; smaller opens more nodes.
    pub theta: f64,
    /// Domain period for periodic replicas; `None` for isolated domains.
    pub period: Option<[f64; 3]>,
}

impl OpeningCriterion {
    /// Criterion for an isolated (non-periodic) domain.
    pub fn isolated(theta: f64) -> Self {
        Self { theta, period: None }
    }

    /// Pure accept/open decision. Depends only on the node geometry, the
    /// bucket bounds, the replica offset, and `theta` — never on traversal
    /// history, so remote-data arrival order cannot change the outcome.
    pub fn evaluate(
        &self,
        node: &NodeGeometry,
        bucket: &Aabb,
        offset: ReplicaOffset,
    ) -> WalkDecision {
        let shift = match self.period {
            Some(period) => offset.shift(period),
            None => [0.0; 3],
        };
        let cm = node.multipole.center_of_mass;
        let shifted = [cm[0] + shift[0], cm[1] + shift[1], cm[2] + shift[2]];
        let dist_sq = bucket.distance_sq_to(shifted);
        let radius = node.multipole.radius;
        // A bucket inside the node's opening radius always opens it.
        if radius * radius >= self.theta * self.theta * dist_sq {
            WalkDecision::Open
        } else {
            WalkDecision::Accept
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_node_at(x: f64) -> NodeGeometry {
        NodeGeometry::from_bounds(
            Aabb::new([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0]),
            1.0,
            0.01,
        )
    }

    #[test]
    fn aabb_distance_inside_is_zero() {
        let b = Aabb::new([0.0; 3], [1.0; 3]);
        assert_eq!(b.distance_sq_to([0.5, 0.5, 0.5]), 0.0);
        assert_eq!(b.distance_sq_to([2.0, 0.5, 0.5]), 1.0);
    }

    #[test]
    fn offset_encoding_round_trips() {
        for ix in -1i8..=1 {
            for iy in -1i8..=1 {
                for iz in -1i8..=1 {
                    let off = ReplicaOffset::new(ix, iy, iz);
                    assert_eq!(off.components(), (ix, iy, iz));
                    assert_eq!(ReplicaOffset::from_id(off.id()), off);
                }
            }
        }
        assert_eq!(ReplicaOffset::new(0, 0, 0), ReplicaOffset::CENTER);
    }

    #[test]
    fn far_node_accepted_near_node_opened() {
        let crit = OpeningCriterion::isolated(0.7);
        let bucket = Aabb::new([0.0; 3], [1.0; 3]);

        // Node 100 units away: size/distance well under theta.
        let far = unit_node_at(100.0);
        assert_eq!(crit.evaluate(&far, &bucket, ReplicaOffset::CENTER), WalkDecision::Accept);

        // Adjacent node: distance comparable to size.
        let near = unit_node_at(1.5);
        assert_eq!(crit.evaluate(&near, &bucket, ReplicaOffset::CENTER), WalkDecision::Open);
    }

    #[test]
    fn replica_shift_changes_decision() {
        let crit = OpeningCriterion {
            theta: 0.7,
            period: Some([200.0, 200.0, 200.0]),
        };
        let bucket = Aabb::new([0.0; 3], [1.0; 3]);
        let near = unit_node_at(1.5);

        // Untranslated: opened. Shifted a full period away: accepted.
        assert_eq!(crit.evaluate(&near, &bucket, ReplicaOffset::CENTER), WalkDecision::Open);
        let shifted = ReplicaOffset::new(1, 0, 0);
        assert_eq!(crit.evaluate(&near, &bucket, shifted), WalkDecision::Accept);
    }

    #[test]
    fn decision_is_pure() {
        let crit = OpeningCriterion::isolated(0.5);
        let bucket = Aabb::new([0.0; 3], [1.0; 3]);
        let node = unit_node_at(4.0);
        let first = crit.evaluate(&node, &bucket, ReplicaOffset::CENTER);
        for _ in 0..10 {
            assert_eq!(crit.evaluate(&node, &bucket, ReplicaOffset::CENTER), first);
        }
    }
}
