//! Bucket bookkeeping: completion flags and particle-range addressing.
//!
//! A bucket is a leaf group of spatially-close particles walked as a unit.
//! The decomposition layer (external) assigns each bucket its particle
//! range; offload serialization addresses either the full range or, during
//! active-only phases, just the particles marked active.

use kernel::Aabb;

/// Per-bucket completion flag for one walk.
///
/// This is a flag, not a counter: marking an already-finished bucket again
/// is tolerated and has no further effect.
#[derive(Debug, Clone, Default)]
pub struct BucketRequest {
    finished: bool,
}

impl BucketRequest {
    /// A fresh, unfinished tracker.
    pub fn new() -> Self {
        Self { finished: false }
    }

    /// Record that the bucket's walk has finished. Idempotent.
    pub fn mark_finished(&mut self) {
        self.finished = true;
    }

    /// Whether the bucket's walk has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Addressing metadata for one bucket, supplied by the decomposition layer.
#[derive(Debug, Clone, Copy)]
pub struct BucketInfo {
    /// Bounding box of the bucket's particles.
    pub bounds: Aabb,
    /// First particle in the owning particle array.
    pub first_particle: u32,
    /// Number of particles in the bucket.
    pub particle_count: u32,
    /// Start of the bucket's slice in the device-side particle array.
    pub array_index: u32,
    /// First active particle (active-only phases).
    pub active_start: u32,
    /// Number of active particles (active-only phases).
    pub active_count: u32,
}

/// All buckets of one compute unit: addressing info plus completion flags.
#[derive(Debug)]
pub struct BucketTable {
    infos: Vec<BucketInfo>,
    requests: Vec<BucketRequest>,
}

impl BucketTable {
    /// Build a table from decomposition-layer bucket info.
    pub fn new(infos: Vec<BucketInfo>) -> Self {
        let requests = vec![BucketRequest::new(); infos.len()];
        Self { infos, requests }
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// True when the unit has no buckets.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Addressing info for `bucket`.
    pub fn info(&self, bucket: usize) -> &BucketInfo {
        &self.infos[bucket]
    }

    /// Bounding box for `bucket`.
    pub fn bounds(&self, bucket: usize) -> &Aabb {
        &self.infos[bucket].bounds
    }

    /// Completion tracker for `bucket`.
    pub fn request(&self, bucket: usize) -> &BucketRequest {
        &self.requests[bucket]
    }

    /// Mark `bucket` finished. Idempotent.
    pub fn mark_finished(&mut self, bucket: usize) {
        self.requests[bucket].mark_finished();
    }

    /// True once every bucket is finished.
    pub fn all_finished(&self) -> bool {
        self.requests.iter().all(BucketRequest::is_finished)
    }

    /// Clear completion flags for the next phase; addressing info persists.
    pub fn reset(&mut self) {
        for r in &mut self.requests {
            r.finished = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(first: u32, count: u32) -> BucketInfo {
        BucketInfo {
            bounds: Aabb::new([0.0; 3], [1.0; 3]),
            first_particle: first,
            particle_count: count,
            array_index: first,
            active_start: first,
            active_count: count,
        }
    }

    #[test]
    fn test_mark_finished_idempotent() {
        let mut r = BucketRequest::new();
        assert!(!r.is_finished());
        r.mark_finished();
        assert!(r.is_finished());
        r.mark_finished();
        assert!(r.is_finished());
    }

    #[test]
    fn test_table_completion() {
        let mut table = BucketTable::new(vec![info(0, 4), info(4, 4)]);
        assert!(!table.all_finished());
        table.mark_finished(0);
        assert!(!table.all_finished());
        table.mark_finished(1);
        assert!(table.all_finished());

        table.reset();
        assert!(!table.request(0).is_finished());
        assert_eq!(table.info(1).first_particle, 4);
    }
}
