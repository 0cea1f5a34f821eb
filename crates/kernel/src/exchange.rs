//! Reduced particle views for cross-unit mirroring.
//!
//! When a compute unit needs another unit's particle it never ships the full
//! record. Far-field gravity needs only [`GravityExchange`]; SPH neighbor
//! exchange needs [`SmoothExchange`], which carries the gas block exactly
//! when the source particle is gas-typed. Projection and merge are plain
//! functions with a guarded branch, so the gas block round-trips
//! bit-for-bit and is never touched for non-gas particles.

use serde::{Deserialize, Serialize};

use crate::particle::{Particle, TypeMask};

/// Minimal gravity-only mirror of a particle: just what a far-field force
/// evaluation needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GravityExchange {
    /// Mass.
    pub mass: f64,
    /// Gravitational softening length.
    pub soft: f64,
    /// Position.
    pub position: [f64; 3],
}

impl GravityExchange {
    /// Project the gravity-relevant fields out of a full particle.
    pub fn from_particle(p: &Particle) -> Self {
        Self {
            mass: p.mass,
            soft: p.soft,
            position: p.position,
        }
    }
}

/// Cross-unit mirror for smoothing operations.
///
/// The trailing block (from `v_pred` down) is meaningful only when `types`
/// has the gas bit set; it is zeroed otherwise and never copied back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothExchange {
    /// Mass.
    pub mass: f64,
    /// Smoothing / interaction radius.
    pub ball: f64,
    /// Local density estimate.
    pub density: f64,
    /// Position.
    pub position: [f64; 3],
    /// Physics-type bitmask.
    pub types: TypeMask,
    /// Time-step class.
    pub rung: u8,
    /// Tree-computed acceleration.
    pub tree_acceleration: [f64; 3],
    /// Predicted velocity (gas only).
    pub v_pred: [f64; 3],
    /// Maximum viscous signal (gas only).
    pub mu_max: f64,
    /// PdV work rate (gas only).
    pub pdv: f64,
    /// Sound speed (gas only).
    pub sound_speed: f64,
    /// Pressure over density squared (gas only).
    pub p_over_rho2: f64,
    /// Balsara viscosity switch (gas only).
    pub balsara_switch: f64,
    /// Maximum interaction radius (gas only).
    pub ball_max: f64,
}

impl SmoothExchange {
    /// Project a full particle into a smoothing mirror.
    ///
    /// The gas block is copied only when the gas bit is set. A gas-typed
    /// particle without an attached gas block is a caller bug and panics.
    pub fn from_particle(p: &Particle) -> Self {
        let mut view = Self {
            mass: p.mass,
            ball: p.ball,
            density: p.density,
            position: p.position,
            types: p.types,
            rung: p.rung,
            tree_acceleration: p.tree_acceleration,
            v_pred: [0.0; 3],
            mu_max: 0.0,
            pdv: 0.0,
            sound_speed: 0.0,
            p_over_rho2: 0.0,
            balsara_switch: 0.0,
            ball_max: 0.0,
        };
        if p.types.contains(TypeMask::GAS) {
            let gas = p
                .gas()
                .expect("gas-typed particle without an attached gas block");
            view.v_pred = gas.v_pred;
            view.mu_max = gas.mu_max;
            view.pdv = gas.pdv;
            view.sound_speed = gas.sound_speed;
            view.p_over_rho2 = gas.p_over_rho2;
            view.balsara_switch = gas.balsara_switch;
            view.ball_max = gas.ball_max;
        }
        view
    }

    /// Write this mirror's fields back onto a full particle.
    ///
    /// The type mask is written first, and the gas branch then keys off the
    /// written mask, mirroring the projection. The target must own a gas
    /// block whenever the incoming mask has the gas bit set.
    pub fn apply_to(&self, p: &mut Particle) {
        p.mass = self.mass;
        p.ball = self.ball;
        p.density = self.density;
        p.position = self.position;
        p.types = self.types;
        p.rung = self.rung;
        p.tree_acceleration = self.tree_acceleration;
        if self.types.contains(TypeMask::GAS) {
            let gas = p
                .gas_mut()
                .expect("smoothing merge onto a particle without a gas block");
            gas.v_pred = self.v_pred;
            gas.mu_max = self.mu_max;
            gas.pdv = self.pdv;
            gas.sound_speed = self.sound_speed;
            gas.p_over_rho2 = self.p_over_rho2;
            gas.balsara_switch = self.balsara_switch;
            gas.ball_max = self.ball_max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{GasExtra, ParticleExtra};

    fn gas_particle() -> Particle {
        let mut p = Particle::new(99, 4);
        p.mass = 0.25;
        p.soft = 0.01;
        p.ball = 0.4;
        p.density = 7.5;
        p.position = [1.0, -2.0, 3.5];
        p.tree_acceleration = [0.1, 0.2, -0.3];
        p.rung = 3;
        p.types.set(TypeMask::GAS);
        p.extra = ParticleExtra::Gas(GasExtra {
            internal_energy: 11.0,
            metals: 0.02,
            v_pred: [4.0, 5.0, 6.0],
            u_pred: 11.5,
            div_v: -0.7,
            curl_v: [0.0, 0.1, 0.2],
            mu_max: 1.25,
            pdv: 0.875,
            sound_speed: 2.5,
            p_over_rho2: 0.0625,
            balsara_switch: 0.5,
            ball_max: 0.8,
        });
        p
    }

    #[test]
    fn gravity_projection_is_minimal() {
        let p = gas_particle();
        let g = GravityExchange::from_particle(&p);
        assert_eq!(g.mass, 0.25);
        assert_eq!(g.soft, 0.01);
        assert_eq!(g.position, [1.0, -2.0, 3.5]);
    }

    #[test]
    fn smooth_round_trip_gas_bit_exact() {
        let src = gas_particle();
        let view = SmoothExchange::from_particle(&src);

        let mut dst = Particle::new(0, 0);
        dst.extra = ParticleExtra::Gas(GasExtra::default());
        view.apply_to(&mut dst);

        let sg = src.gas().unwrap();
        let dg = dst.gas().unwrap();
        assert_eq!(dg.v_pred, sg.v_pred);
        assert_eq!(dg.mu_max.to_bits(), sg.mu_max.to_bits());
        assert_eq!(dg.pdv.to_bits(), sg.pdv.to_bits());
        assert_eq!(dg.sound_speed.to_bits(), sg.sound_speed.to_bits());
        assert_eq!(dg.p_over_rho2.to_bits(), sg.p_over_rho2.to_bits());
        assert_eq!(dg.balsara_switch.to_bits(), sg.balsara_switch.to_bits());
        assert_eq!(dg.ball_max.to_bits(), sg.ball_max.to_bits());
        assert_eq!(dst.mass, src.mass);
        assert_eq!(dst.rung, src.rung);
        assert_eq!(dst.types, src.types);
    }

    #[test]
    fn smooth_round_trip_leaves_non_gas_untouched() {
        let mut src = Particle::new(1, 1);
        src.mass = 2.0;
        src.types.set(TypeMask::DARK);

        let view = SmoothExchange::from_particle(&src);
        assert_eq!(view.v_pred, [0.0; 3]);
        assert_eq!(view.sound_speed, 0.0);

        // Target with a stale gas block: the merge must not touch it because
        // the incoming mask has no gas bit.
        let mut dst = Particle::new(2, 2);
        dst.extra = ParticleExtra::Gas(GasExtra {
            internal_energy: 123.0,
            ..GasExtra::default()
        });
        view.apply_to(&mut dst);
        assert_eq!(dst.mass, 2.0);
        assert_eq!(dst.types, view.types);
        assert_eq!(dst.gas().unwrap().internal_energy, 123.0);
    }

    #[test]
    #[should_panic(expected = "without an attached gas block")]
    fn gas_bit_without_block_panics() {
        let mut p = Particle::new(3, 3);
        p.types.set(TypeMask::GAS);
        let _ = SmoothExchange::from_particle(&p);
    }
}
