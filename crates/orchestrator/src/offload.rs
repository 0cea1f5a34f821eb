//! Interaction batching and offload-request assembly.
//!
//! Accepted interactions accumulate in per-bucket lists until a volume
//! threshold is reached, then get flattened into one contiguous
//! transfer-ready buffer with per-bucket addressing metadata. The flattened
//! request owns its transfer buffer; dropping the request returns the
//! storage to the pool once the asynchronous computation it backed has
//! consumed it.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use bytemuck::Pod;
use kernel::{CompactMultipole, CompactParticle, NodeInteraction, NodeKey, PartInteraction};

use crate::bucket::BucketTable;
use crate::error::OffloadError;
use crate::state::WalkState;

/// Addressing mode for a flush.
///
/// Large phases ship every particle up front, so requests address a
/// bucket's full slice of the device particle array. Active-only phases
/// ship just the particles active on the current rung and address the
/// per-bucket active range instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Address the bucket's full particle range.
    Large,
    /// Address only the bucket's active particles.
    ActiveOnly,
}

// ---------------------------------------------------------------------------
// Transfer pool
// ---------------------------------------------------------------------------

struct PoolInner {
    free: Vec<Vec<u64>>,
    in_flight: usize,
    cap: usize,
}

/// Pool of reusable transfer buffers.
///
/// Storage is `u64`-backed so flattened records of any alignment up to 8
/// can be viewed in place. Acquisition prefers a pooled buffer and falls
/// back to a fresh allocation; only the in-flight cap makes it fail.
#[derive(Clone)]
pub struct TransferPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl TransferPool {
    /// Pool allowing at most `cap` buffers in flight at once.
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free: Vec::new(),
                in_flight: 0,
                cap,
            })),
        }
    }

    /// Acquire a zeroed buffer of at least `len_bytes` bytes.
    pub fn acquire(&self, len_bytes: usize) -> Result<PooledBuffer, OffloadError> {
        let words = len_bytes.div_ceil(8);
        let mut inner = self.inner.lock().unwrap();
        if inner.in_flight >= inner.cap {
            return Err(OffloadError::TransferExhausted {
                in_flight: inner.in_flight,
                cap: inner.cap,
            });
        }
        // Reuse tier first, fresh allocation second.
        let mut storage = inner.free.pop().unwrap_or_default();
        storage.clear();
        storage.resize(words, 0);
        inner.in_flight += 1;
        Ok(PooledBuffer {
            storage,
            len_bytes,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Buffers currently owned by outstanding requests.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().unwrap().in_flight
    }
}

/// A transfer buffer checked out of a [`TransferPool`].
///
/// Returns its storage to the pool on drop.
pub struct PooledBuffer {
    storage: Vec<u64>,
    len_bytes: usize,
    pool: Arc<Mutex<PoolInner>>,
}

impl PooledBuffer {
    /// Byte view of the buffer.
    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.storage)[..self.len_bytes]
    }

    /// Mutable byte view of the buffer.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.storage);
        &mut bytes[..self.len_bytes]
    }

    /// View the buffer as a slice of `T`. The byte length must be an exact
    /// multiple of `size_of::<T>()`.
    pub fn as_slice<T: Pod>(&self) -> &[T] {
        bytemuck::cast_slice(self.bytes())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        if let Ok(mut pool) = self.pool.lock() {
            pool.in_flight -= 1;
            pool.free.push(storage);
        }
    }
}

// ---------------------------------------------------------------------------
// Per-bucket interaction lists
// ---------------------------------------------------------------------------

/// Per-bucket accumulation lists for one interaction kind.
///
/// The first append to an empty bucket list increments that bucket's
/// outstanding-request counter — one indicator per bucket per flush cycle;
/// `reset` empties the lists so the next cycle re-arms.
#[derive(Debug)]
pub struct InteractionBatch<T> {
    lists: Vec<Vec<T>>,
    total: usize,
    per_bucket_hint: usize,
    threshold: usize,
}

impl<T: Pod> InteractionBatch<T> {
    /// Batch with no bucket lists allocated yet.
    pub fn new(threshold: usize) -> Self {
        Self {
            lists: Vec::new(),
            total: 0,
            per_bucket_hint: 0,
            threshold,
        }
    }

    /// Allocate `num_buckets` lists, each with `per_bucket` reserved slots.
    pub fn init(&mut self, num_buckets: usize, per_bucket: usize) {
        self.per_bucket_hint = per_bucket;
        self.lists.clear();
        self.lists.reserve(num_buckets);
        for _ in 0..num_buckets {
            self.lists.push(Vec::with_capacity(per_bucket));
        }
        self.total = 0;
    }

    /// Append an interaction for `bucket`.
    ///
    /// Amortized O(1). On the empty→non-empty transition of the bucket's
    /// list, the bucket's request counter in `state` is incremented so the
    /// driver can see offload work is outstanding for it.
    pub fn push(&mut self, bucket: usize, record: T, state: &mut WalkState) {
        if self.lists[bucket].is_empty() {
            state.increment_bucket(bucket);
        }
        self.lists[bucket].push(record);
        self.total += 1;
    }

    /// Total interactions accumulated across all buckets.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Interactions accumulated for one bucket.
    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.lists[bucket].len()
    }

    /// True when the accumulated volume has reached the flush threshold.
    /// A backpressure signal, not a hard limit: callers may flush below it
    /// at phase boundaries.
    pub fn ready_to_flush(&self) -> bool {
        self.total >= self.threshold
    }

    /// Flatten all non-empty bucket lists into one contiguous request.
    ///
    /// Within a bucket's slice the append order is preserved. Buckets with
    /// empty lists are skipped entirely; an empty batch yields a
    /// well-formed zero-length request.
    ///
    /// # Panics
    /// A mismatch between the flattened length and the running total is a
    /// fatal accounting violation.
    pub fn serialize(
        &self,
        table: &BucketTable,
        phase: Phase,
        pool: &TransferPool,
    ) -> Result<OffloadRequest<T>, OffloadError> {
        let filled = self.lists.iter().filter(|l| !l.is_empty()).count();

        let mut buffer = pool.acquire(self.total * std::mem::size_of::<T>())?;
        let mut bucket_markers = Vec::with_capacity(filled + 1);
        let mut bucket_starts = Vec::with_capacity(filled);
        let mut bucket_sizes = Vec::with_capacity(filled);
        let mut affected_buckets = Vec::with_capacity(filled);

        let mut pos = 0usize;
        {
            let flat: &mut [u8] = buffer.bytes_mut();
            for (bucket, list) in self.lists.iter().enumerate() {
                if list.is_empty() {
                    continue;
                }
                let bytes: &[u8] = bytemuck::cast_slice(list);
                let start = pos * std::mem::size_of::<T>();
                flat[start..start + bytes.len()].copy_from_slice(bytes);

                bucket_markers.push(pos as u32);
                let info = table.info(bucket);
                let (bstart, bsize) = match phase {
                    Phase::Large => (info.array_index, info.particle_count),
                    Phase::ActiveOnly => (info.active_start, info.active_count),
                };
                bucket_starts.push(bstart);
                bucket_sizes.push(bsize);
                affected_buckets.push(bucket as u32);
                pos += list.len();
            }
        }
        bucket_markers.push(pos as u32);
        assert_eq!(
            pos, self.total,
            "interaction accounting mismatch: flattened {} of {} records",
            pos, self.total
        );

        Ok(OffloadRequest {
            buffer,
            bucket_markers,
            bucket_starts,
            bucket_sizes,
            affected_buckets,
            num_interactions: self.total,
            phase,
            _records: PhantomData,
        })
    }

    /// Clear all bucket lists for the next flush cycle, keeping capacity.
    pub fn reset(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
        self.total = 0;
    }

    /// Free the backing storage entirely.
    pub fn release(&mut self) {
        self.lists = Vec::new();
        self.total = 0;
    }
}

// ---------------------------------------------------------------------------
// Flattened request
// ---------------------------------------------------------------------------

/// A flattened, contiguous offload request. Immutable once built; owns its
/// transfer buffer and releases it when dropped.
pub struct OffloadRequest<T> {
    buffer: PooledBuffer,
    /// Offsets delimiting each bucket's slice of the record buffer, with a
    /// final sentinel equal to the total record count.
    pub bucket_markers: Vec<u32>,
    /// Per-bucket start index into the owning particle array.
    pub bucket_starts: Vec<u32>,
    /// Per-bucket size in the owning particle array.
    pub bucket_sizes: Vec<u32>,
    /// Ids of the buckets represented, in bucket order.
    pub affected_buckets: Vec<u32>,
    /// Total records in the buffer.
    pub num_interactions: usize,
    /// Addressing mode the request was built with.
    pub phase: Phase,
    _records: PhantomData<T>,
}

impl<T: Pod> OffloadRequest<T> {
    /// The concatenated interaction records.
    pub fn records(&self) -> &[T] {
        self.buffer.as_slice()
    }

    /// Raw byte view, ready for device transfer.
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.bytes()
    }

    /// True for the zero-length request an empty batch produces; the
    /// dispatcher skips these.
    pub fn is_empty(&self) -> bool {
        self.num_interactions == 0
    }

    /// Number of buckets with at least one record.
    pub fn num_filled_buckets(&self) -> usize {
        self.affected_buckets.len()
    }
}

// ---------------------------------------------------------------------------
// Staging arrays
// ---------------------------------------------------------------------------

/// Deduplicated staging arrays shipped alongside interaction records.
///
/// A node's multipole (or a remote bucket's particle run) is staged once
/// per phase regardless of how many buckets accepted it; records address
/// the staged copy by index.
#[derive(Debug, Default)]
pub struct Staging {
    multipoles: Vec<CompactMultipole>,
    node_index: HashMap<NodeKey, u32>,
    staged_nodes: Vec<NodeKey>,
    particles: Vec<CompactParticle>,
    part_index: HashMap<NodeKey, u32>,
    part_runs: Vec<(NodeKey, u32, u32)>,
}

impl Staging {
    /// Empty staging arrays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a node's multipole, or return the index it was already staged
    /// at.
    pub fn stage_multipole(&mut self, key: NodeKey, multipole: CompactMultipole) -> u32 {
        if let Some(&idx) = self.node_index.get(&key) {
            return idx;
        }
        let idx = self.multipoles.len() as u32;
        self.multipoles.push(multipole);
        self.node_index.insert(key, idx);
        self.staged_nodes.push(key);
        idx
    }

    /// Stage a remote bucket's particle run, or return the index of the
    /// already-staged run.
    pub fn stage_particles(&mut self, key: NodeKey, run: &[CompactParticle]) -> u32 {
        if let Some(&idx) = self.part_index.get(&key) {
            return idx;
        }
        let idx = self.particles.len() as u32;
        self.particles.extend_from_slice(run);
        self.part_index.insert(key, idx);
        self.part_runs.push((key, idx, run.len() as u32));
        idx
    }

    /// Staged multipoles, indexed by [`kernel::NodeInteraction::moments`].
    pub fn multipoles(&self) -> &[CompactMultipole] {
        &self.multipoles
    }

    /// Staged remote particles, indexed by
    /// [`kernel::PartInteraction::first`].
    pub fn particles(&self) -> &[CompactParticle] {
        &self.particles
    }

    /// The tree node a staged multipole came from. Needed when device
    /// results are applied back onto the host tree.
    pub fn staged_node(&self, index: u32) -> NodeKey {
        self.staged_nodes[index as usize]
    }

    /// Staged particle runs as (source node, start index, length).
    pub fn particle_runs(&self) -> &[(NodeKey, u32, u32)] {
        &self.part_runs
    }

    /// Clear everything for the next phase.
    pub fn reset(&mut self) {
        self.multipoles.clear();
        self.node_index.clear();
        self.staged_nodes.clear();
        self.particles.clear();
        self.part_index.clear();
        self.part_runs.clear();
    }
}

// ---------------------------------------------------------------------------
// Offload queue
// ---------------------------------------------------------------------------

/// The three accumulation lists of one walk context plus the transfer pool
/// and the per-request bucket markings.
pub struct OffloadQueue {
    /// Accepted far-field node interactions.
    pub nodes: InteractionBatch<NodeInteraction>,
    /// Near-field interactions whose sources live in this unit's array.
    pub local_parts: InteractionBatch<PartInteraction>,
    /// Near-field interactions whose sources are cached remote particles.
    pub remote_parts: InteractionBatch<PartInteraction>,
    /// Deduplicated multipole / remote-particle staging.
    pub staging: Staging,
    pool: TransferPool,
    marked_buckets: Vec<u32>,
}

impl OffloadQueue {
    /// Queue sized for `num_buckets` buckets with the given thresholds and
    /// per-bucket capacity hint.
    pub fn new(
        num_buckets: usize,
        node_threshold: usize,
        particle_threshold: usize,
        per_bucket: usize,
        max_in_flight: usize,
    ) -> Self {
        let mut nodes = InteractionBatch::new(node_threshold);
        nodes.init(num_buckets, per_bucket);
        let mut local_parts = InteractionBatch::new(particle_threshold);
        local_parts.init(num_buckets, per_bucket);
        let mut remote_parts = InteractionBatch::new(particle_threshold);
        remote_parts.init(num_buckets, per_bucket);
        Self {
            nodes,
            local_parts,
            remote_parts,
            staging: Staging::new(),
            pool: TransferPool::new(max_in_flight),
            marked_buckets: Vec::new(),
        }
    }

    /// True when accumulated node interactions warrant a flush.
    pub fn node_offload_ready(&self) -> bool {
        self.nodes.ready_to_flush()
    }

    /// True when accumulated particle interactions (both flavors) warrant
    /// a flush.
    pub fn particle_offload_ready(&self) -> bool {
        self.local_parts.total() + self.remote_parts.total()
            >= self.local_parts.threshold.min(self.remote_parts.threshold)
    }

    /// Flatten and clear the node lists.
    pub fn flush_nodes(
        &mut self,
        table: &BucketTable,
        phase: Phase,
    ) -> Result<OffloadRequest<NodeInteraction>, OffloadError> {
        let request = self.nodes.serialize(table, phase, &self.pool)?;
        self.record_markings(&request.affected_buckets, phase);
        self.nodes.reset();
        tracing::debug!(
            "node offload: {} interactions across {} buckets",
            request.num_interactions,
            request.num_filled_buckets()
        );
        Ok(request)
    }

    /// Flatten and clear the local-particle lists.
    pub fn flush_local_particles(
        &mut self,
        table: &BucketTable,
        phase: Phase,
    ) -> Result<OffloadRequest<PartInteraction>, OffloadError> {
        let request = self.local_parts.serialize(table, phase, &self.pool)?;
        self.record_markings(&request.affected_buckets, phase);
        self.local_parts.reset();
        Ok(request)
    }

    /// Flatten and clear the remote-particle lists.
    pub fn flush_remote_particles(
        &mut self,
        table: &BucketTable,
        phase: Phase,
    ) -> Result<OffloadRequest<PartInteraction>, OffloadError> {
        let request = self.remote_parts.serialize(table, phase, &self.pool)?;
        self.record_markings(&request.affected_buckets, phase);
        self.remote_parts.reset();
        Ok(request)
    }

    // Active-only phases ship per-request auxiliary particle slices, so the
    // buckets included in a request are marked until the handoff completes.
    // Large phases ship all particles up front and skip marking.
    fn record_markings(&mut self, affected: &[u32], phase: Phase) {
        if phase == Phase::ActiveOnly {
            self.marked_buckets.extend_from_slice(affected);
        }
    }

    /// Buckets marked during request assembly since the last clear.
    pub fn marked_buckets(&self) -> &[u32] {
        &self.marked_buckets
    }

    /// Clear bucket markings before assembling the next request.
    pub fn clear_markings(&mut self) {
        self.marked_buckets.clear();
    }

    /// Transfer pool handle (for diagnostics and the GPU upload path).
    pub fn pool(&self) -> &TransferPool {
        &self.pool
    }

    /// Clear every list and the staging arrays for the next phase.
    pub fn reset(&mut self) {
        self.nodes.reset();
        self.local_parts.reset();
        self.remote_parts.reset();
        self.staging.reset();
        self.marked_buckets.clear();
    }

    /// Free all backing storage at teardown.
    pub fn release(&mut self) {
        self.nodes.release();
        self.local_parts.release();
        self.remote_parts.release();
        self.staging.reset();
        self.marked_buckets = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{BucketInfo, BucketTable};
    use crate::state::{WalkKind, WalkState};
    use kernel::Aabb;

    fn table(num_buckets: usize) -> BucketTable {
        let infos = (0..num_buckets)
            .map(|b| BucketInfo {
                bounds: Aabb::new([0.0; 3], [1.0; 3]),
                first_particle: (b * 8) as u32,
                particle_count: 8,
                array_index: (b * 8) as u32,
                active_start: (b * 8) as u32,
                active_count: 2,
            })
            .collect();
        BucketTable::new(infos)
    }

    fn cell(moments: u32) -> NodeInteraction {
        NodeInteraction { moments, offset: 13 }
    }

    #[test]
    fn first_append_arms_bucket_counter_once() {
        let mut state = WalkState::new(WalkKind::Local, 4, 0);
        let mut batch = InteractionBatch::new(100);
        batch.init(4, 8);

        batch.push(2, cell(0), &mut state);
        batch.push(2, cell(1), &mut state);
        batch.push(2, cell(2), &mut state);
        assert_eq!(state.bucket_requests(2), 1);

        // reset re-arms the indicator for the next flush cycle
        batch.reset();
        batch.push(2, cell(3), &mut state);
        assert_eq!(state.bucket_requests(2), 2);
    }

    #[test]
    fn threshold_controls_readiness() {
        let mut state = WalkState::new(WalkKind::Local, 16, 0);
        let mut batch = InteractionBatch::new(4);
        batch.init(16, 4);

        for i in 0..3 {
            batch.push(5, cell(i), &mut state);
        }
        assert!(!batch.ready_to_flush());
        batch.push(9, cell(3), &mut state);
        assert!(batch.ready_to_flush());
        batch.push(9, cell(4), &mut state);

        let pool = TransferPool::new(2);
        let req = batch.serialize(&table(16), Phase::Large, &pool).unwrap();
        assert_eq!(req.num_interactions, 5);
        assert_eq!(req.num_filled_buckets(), 2);
        assert_eq!(req.bucket_markers, vec![0, 3, 5]);
        assert_eq!(req.affected_buckets, vec![5, 9]);
        assert_eq!(req.bucket_starts, vec![40, 72]);
        assert_eq!(req.bucket_sizes, vec![8, 8]);
        // append order preserved within each bucket slice
        let recs = req.records();
        assert_eq!(recs[0].moments, 0);
        assert_eq!(recs[2].moments, 2);
        assert_eq!(recs[3].moments, 3);
    }

    #[test]
    fn active_only_mode_uses_active_ranges() {
        let mut state = WalkState::new(WalkKind::Local, 4, 0);
        let mut batch = InteractionBatch::new(64);
        batch.init(4, 4);
        batch.push(1, cell(0), &mut state);

        let pool = TransferPool::new(2);
        let req = batch.serialize(&table(4), Phase::ActiveOnly, &pool).unwrap();
        assert_eq!(req.bucket_starts, vec![8]);
        assert_eq!(req.bucket_sizes, vec![2]);
    }

    #[test]
    fn empty_batch_serializes_to_well_formed_request() {
        let batch: InteractionBatch<NodeInteraction> = {
            let mut b = InteractionBatch::new(4);
            b.init(4, 4);
            b
        };
        let pool = TransferPool::new(1);
        let req = batch.serialize(&table(4), Phase::Large, &pool).unwrap();
        assert!(req.is_empty());
        assert_eq!(req.bucket_markers, vec![0]);
        assert_eq!(req.num_filled_buckets(), 0);
        assert_eq!(req.records().len(), 0);
    }

    #[test]
    fn pool_recycles_and_caps() {
        let pool = TransferPool::new(1);
        let buf = pool.acquire(64).unwrap();
        assert_eq!(pool.in_flight(), 1);
        // cap reached
        assert!(matches!(
            pool.acquire(64),
            Err(OffloadError::TransferExhausted { .. })
        ));
        drop(buf);
        assert_eq!(pool.in_flight(), 0);
        let again = pool.acquire(128).unwrap();
        assert_eq!(again.bytes().len(), 128);
    }

    #[test]
    fn staging_dedups_by_node_key() {
        let mut staging = Staging::new();
        let m = CompactMultipole {
            total_mass: 1.0,
            center_of_mass: [0.0; 3],
            soft: 0.0,
            radius: 1.0,
        };
        let a = staging.stage_multipole(7, m);
        let b = staging.stage_multipole(7, m);
        assert_eq!(a, b);
        assert_eq!(staging.multipoles().len(), 1);

        let run = [CompactParticle { mass: 1.0, soft: 0.0, position: [0.0; 3] }; 3];
        let first = staging.stage_particles(9, &run);
        let second = staging.stage_particles(9, &run);
        assert_eq!(first, second);
        assert_eq!(staging.particles().len(), 3);
    }

    #[test]
    fn queue_marks_buckets_only_in_active_phases() {
        let mut state = WalkState::new(WalkKind::Local, 4, 0);
        let mut queue = OffloadQueue::new(4, 64, 64, 4, 4);
        queue.nodes.push(3, cell(0), &mut state);

        let req = queue.flush_nodes(&table(4), Phase::Large).unwrap();
        assert!(queue.marked_buckets().is_empty());
        drop(req);

        queue.nodes.push(3, cell(1), &mut state);
        let req = queue.flush_nodes(&table(4), Phase::ActiveOnly).unwrap();
        assert_eq!(queue.marked_buckets(), &[3]);
        queue.clear_markings();
        assert!(queue.marked_buckets().is_empty());
        drop(req);
    }

    #[test]
    fn reuse_after_reset_produces_identical_shape() {
        let mut state = WalkState::new(WalkKind::Local, 4, 0);
        let mut queue = OffloadQueue::new(4, 64, 64, 4, 4);
        let tbl = table(4);

        queue.nodes.push(0, cell(0), &mut state);
        queue.nodes.push(2, cell(1), &mut state);
        let first = queue.flush_nodes(&tbl, Phase::Large).unwrap();
        let (m1, a1) = (first.bucket_markers.clone(), first.affected_buckets.clone());
        drop(first);

        queue.nodes.push(0, cell(0), &mut state);
        queue.nodes.push(2, cell(1), &mut state);
        let second = queue.flush_nodes(&tbl, Phase::Large).unwrap();
        assert_eq!(second.bucket_markers, m1);
        assert_eq!(second.affected_buckets, a1);
    }
}
