//! Plain-old-data interaction records for offload transfer.
//!
//! These are the element types of the flattened request buffers: fixed
//! layout, no padding, viewable as raw bytes with `bytemuck` for direct
//! copy into transfer memory. Node and particle interactions address
//! staging arrays by index rather than carrying tree keys, so the device
//! side never resolves a key.

use bytemuck::{Pod, Zeroable};

/// One accepted far-field (node) interaction for a bucket.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct NodeInteraction {
    /// Index into the staged multipole array.
    pub moments: u32,
    /// Periodic replica offset id (see [`crate::tree::ReplicaOffset`]).
    pub offset: u32,
}

/// One accepted near-field (particle) interaction for a bucket: a run of
/// source particles in the owning or cached particle array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PartInteraction {
    /// First source particle index.
    pub first: u32,
    /// Number of source particles.
    pub count: u32,
    /// Periodic replica offset id.
    pub offset: u32,
}

/// Device-side particle record staged once per cached remote particle.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompactParticle {
    /// Mass.
    pub mass: f64,
    /// Gravitational softening length.
    pub soft: f64,
    /// Position.
    pub position: [f64; 3],
}

/// Device-side multipole record staged once per distinct tree node.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompactMultipole {
    /// Total mass of the node.
    pub total_mass: f64,
    /// Center of mass.
    pub center_of_mass: [f64; 3],
    /// Mass-weighted softening.
    pub soft: f64,
    /// Opening radius of the node.
    pub radius: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_have_fixed_layout() {
        assert_eq!(std::mem::size_of::<NodeInteraction>(), 8);
        assert_eq!(std::mem::size_of::<PartInteraction>(), 12);
        assert_eq!(std::mem::size_of::<CompactParticle>(), 40);
        assert_eq!(std::mem::size_of::<CompactMultipole>(), 48);
    }

    #[test]
    fn records_cast_to_bytes_and_back() {
        let cells = [
            NodeInteraction { moments: 1, offset: 13 },
            NodeInteraction { moments: 2, offset: 13 },
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&cells);
        assert_eq!(bytes.len(), 16);
        let back: &[NodeInteraction] = bytemuck::cast_slice(bytes);
        assert_eq!(back, &cells);
    }
}
