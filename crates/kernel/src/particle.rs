//! Particle records and their physics-type-dependent auxiliary data.
//!
//! A [`Particle`] is a value type: everything it owns is inline, including
//! the optional auxiliary block for gas and star particles. The auxiliary
//! block is a tagged variant rather than an untyped side allocation, so a
//! mismatched access is a `None` (or a panic at the exchange boundary), not
//! a read of garbage memory.

use serde::{Deserialize, Serialize};

/// Space-filling-curve key. Provides the total order used for
/// spatial-locality sorting and tree-piece partitioning.
pub type SfcKey = u64;

/// Bitmask classifying a particle as one or more physics types.
///
/// The mask gates which auxiliary fields are valid: the gas block of a
/// particle may only be consulted when [`TypeMask::GAS`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeMask(u32);

impl TypeMask {
    /// Gas (SPH) particle.
    pub const GAS: TypeMask = TypeMask(1 << 0);
    /// Dark-matter particle.
    pub const DARK: TypeMask = TypeMask(1 << 1);
    /// Star particle.
    pub const STAR: TypeMask = TypeMask(1 << 2);
    /// Marked for image output.
    pub const PHOTOGENIC: TypeMask = TypeMask(1 << 3);
    /// Neighbor of an active particle, pulled into inactive-side updates.
    pub const NEIGHBOR_OF_ACTIVE: TypeMask = TypeMask(1 << 4);

    /// Mask with no bits set.
    pub fn empty() -> Self {
        TypeMask(0)
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(self, other: TypeMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn set(&mut self, other: TypeMask) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`.
    pub fn clear(&mut self, other: TypeMask) {
        self.0 &= !other.0;
    }

    /// Raw bit value.
    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Auxiliary state owned by gas (SPH) particles.
///
/// Mutated only by the SPH pipeline; the walk machinery treats it as an
/// opaque block that must survive cross-unit mirroring bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GasExtra {
    /// Specific internal energy.
    pub internal_energy: f64,
    /// Metal mass fraction.
    pub metals: f64,
    /// Predicted velocity for velocity-dependent forces.
    pub v_pred: [f64; 3],
    /// Predicted internal energy.
    pub u_pred: f64,
    /// Velocity divergence.
    pub div_v: f64,
    /// Velocity curl.
    pub curl_v: [f64; 3],
    /// Maximum viscous signal over neighbors.
    pub mu_max: f64,
    /// PdV work rate.
    pub pdv: f64,
    /// Sound speed.
    pub sound_speed: f64,
    /// Pressure over density squared.
    pub p_over_rho2: f64,
    /// Balsara shear-flow viscosity switch.
    pub balsara_switch: f64,
    /// Maximum interaction radius, for inverse neighbor search.
    pub ball_max: f64,
}

/// Auxiliary state owned by star particles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StarExtra {
    /// Formation time.
    pub time_form: f64,
    /// Mass at formation.
    pub mass_form: f64,
    /// Metal mass fraction.
    pub metals: f64,
}

/// Tagged auxiliary block. Owned exclusively by the particle that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ParticleExtra {
    /// No auxiliary data (dark matter and markers).
    #[default]
    None,
    /// Gas auxiliary data; valid only with [`TypeMask::GAS`] set.
    Gas(GasExtra),
    /// Star auxiliary data; valid only with [`TypeMask::STAR`] set.
    Star(StarExtra),
}

/// Full in-memory particle record.
///
/// `key` orders particles for spatial-locality sorting; `order` is the input
/// order index, stable under any reordering triggered by sorting or load
/// rebalancing. Sort collections with `sort_by_key(|p| p.key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Space-filling-curve key.
    pub key: SfcKey,
    /// Input order index, stable identity across reordering.
    pub order: u32,
    /// Mass.
    pub mass: f64,
    /// Gravitational softening length.
    pub soft: f64,
    /// Position.
    pub position: [f64; 3],
    /// Velocity.
    pub velocity: [f64; 3],
    /// Acceleration accumulated by the tree walk.
    pub tree_acceleration: [f64; 3],
    /// Gravitational potential.
    pub potential: f64,
    /// Gravitational timestep bound.
    pub dt_grav: f64,
    /// Smoothing / interaction radius.
    pub ball: f64,
    /// Local density estimate.
    pub density: f64,
    /// Time-step class; greater means a shorter, faster step.
    pub rung: u8,
    /// Physics-type bitmask.
    pub types: TypeMask,
    /// Auxiliary block, present exactly when owned.
    pub extra: ParticleExtra,
}

impl Particle {
    /// Create a particle at rest with the given key and input order.
    pub fn new(key: SfcKey, order: u32) -> Self {
        Self {
            key,
            order,
            mass: 0.0,
            soft: 0.0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            tree_acceleration: [0.0; 3],
            potential: 0.0,
            dt_grav: 0.0,
            ball: 0.0,
            density: 0.0,
            rung: 0,
            types: TypeMask::empty(),
            extra: ParticleExtra::None,
        }
    }

    /// True if the gas bit is set.
    pub fn is_gas(&self) -> bool {
        self.types.contains(TypeMask::GAS)
    }

    /// True if the star bit is set.
    pub fn is_star(&self) -> bool {
        self.types.contains(TypeMask::STAR)
    }

    /// Gas auxiliary block, if this particle owns one.
    pub fn gas(&self) -> Option<&GasExtra> {
        match &self.extra {
            ParticleExtra::Gas(g) => Some(g),
            _ => None,
        }
    }

    /// Mutable gas auxiliary block, if this particle owns one.
    pub fn gas_mut(&mut self) -> Option<&mut GasExtra> {
        match &mut self.extra {
            ParticleExtra::Gas(g) => Some(g),
            _ => None,
        }
    }

    /// Star auxiliary block, if this particle owns one.
    pub fn star(&self) -> Option<&StarExtra> {
        match &self.extra {
            ParticleExtra::Star(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_set_test_clear() {
        let mut m = TypeMask::empty();
        assert!(!m.contains(TypeMask::GAS));
        m.set(TypeMask::GAS);
        m.set(TypeMask::NEIGHBOR_OF_ACTIVE);
        assert!(m.contains(TypeMask::GAS));
        assert!(m.contains(TypeMask::NEIGHBOR_OF_ACTIVE));
        assert!(!m.contains(TypeMask::STAR));
        m.clear(TypeMask::GAS);
        assert!(!m.contains(TypeMask::GAS));
        assert!(m.contains(TypeMask::NEIGHBOR_OF_ACTIVE));
    }

    #[test]
    fn gas_accessor_gated_by_variant() {
        let mut p = Particle::new(42, 0);
        assert!(p.gas().is_none());

        p.types.set(TypeMask::GAS);
        p.extra = ParticleExtra::Gas(GasExtra {
            internal_energy: 1.5,
            ..GasExtra::default()
        });
        assert_eq!(p.gas().unwrap().internal_energy, 1.5);
        assert!(p.star().is_none());
    }

    #[test]
    fn key_orders_particles() {
        let mut ps = vec![
            Particle::new(30, 0),
            Particle::new(10, 1),
            Particle::new(20, 2),
        ];
        ps.sort_by_key(|p| p.key);
        let keys: Vec<_> = ps.iter().map(|p| p.key).collect();
        assert_eq!(keys, vec![10, 20, 30]);
        // input order survives the sort untouched
        let orders: Vec<_> = ps.iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![1, 2, 0]);
    }

    #[test]
    fn serde_includes_extra_only_when_owned() {
        let mut p = Particle::new(7, 3);
        let bare = serde_json::to_string(&p).unwrap();
        assert!(bare.contains("\"None\""));

        p.extra = ParticleExtra::Gas(GasExtra::default());
        let with_gas = serde_json::to_string(&p).unwrap();
        assert!(with_gas.contains("Gas"));

        let back: Particle = serde_json::from_str(&with_gas).unwrap();
        assert_eq!(back, p);
    }
}
