//! Particle and tree-geometry data plane for the distributed force walk.
//!
//! This crate is the value-type layer shared by every compute unit: particle
//! records, their cross-unit exchange views, tree-node geometry with the
//! pure accept/open decision, and the plain-old-data interaction records
//! that get flattened into offload buffers. It holds no traversal state —
//! that lives in the `orchestrator` crate.
//!
//! # Modules
//! - [`particle`] -- full particle record, type bitmask, auxiliary variants.
//! - [`exchange`] -- reduced gravity-only and smoothing mirrors.
//! - [`tree`] -- bounding boxes, periodic replica offsets, opening test.
//! - [`interactions`] -- `Pod` interaction and staging records.

#![warn(missing_docs)]

pub mod exchange;
pub mod interactions;
pub mod particle;
pub mod tree;

pub use exchange::{GravityExchange, SmoothExchange};
pub use interactions::{CompactMultipole, CompactParticle, NodeInteraction, PartInteraction};
pub use particle::{GasExtra, Particle, ParticleExtra, SfcKey, StarExtra, TypeMask};
pub use tree::{Aabb, NodeGeometry, NodeKey, OpeningCriterion, ReplicaOffset, WalkDecision};
