//! The dual-tree traversal engine.
//!
//! One [`WalkContext`] drives one (compute unit, walk variant) traversal:
//! it pops checklist entries, runs the pure accept/open decision, and routes
//! every entry to exactly one destination — an accepted-interaction list in
//! the batching layer, deeper checklist entries (descending whichever side
//! of the tree is coarser), or the undecided list when the data needed is
//! not yet resident. Blocked entries never stall the rest of the checklist;
//! the per-bucket counters record what is outstanding.
//!
//! The tree and the remote cache stay external behind [`TreeView`]: the walk
//! only ever asks for node data, issues fetches, and gets told later that
//! data arrived.

use kernel::{
    CompactParticle, NodeGeometry, NodeInteraction, NodeKey, OpeningCriterion, PartInteraction,
    ReplicaOffset, WalkDecision,
};

use crate::bucket::BucketTable;
use crate::config::WalkConfig;
use crate::lists::{CheckEntry, WalkLists};
use crate::offload::OffloadQueue;
use crate::state::{WalkKind, WalkState};

/// Structural class of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Interior node with children.
    Internal,
    /// Leaf bucket holding a run of particles.
    Bucket {
        /// First particle of the run in the owning array.
        first: u32,
        /// Length of the run.
        count: u32,
    },
    /// Node with no particles under it.
    Empty,
}

/// Where a node's particle data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// Owned by this compute unit.
    Local,
    /// Owned elsewhere; particle data goes through the cache.
    Remote,
}

/// Everything the walk needs to know about one resident node.
#[derive(Debug, Clone, Copy)]
pub struct TreeNode {
    /// Bounding box and multipole summary.
    pub geometry: NodeGeometry,
    /// Structural class.
    pub class: NodeClass,
    /// Data locality.
    pub locality: Locality,
}

/// The external tree / cache service, as seen by the walk.
///
/// `node` returns `None` for a remote node that is not yet cached; the walk
/// then calls `request_node` and parks the entry on the undecided list. The
/// cache layer later announces arrival through
/// [`WalkContext::node_arrived`] / [`WalkContext::particles_arrived`].
pub trait TreeView {
    /// Resident node data, or `None` if the node is remote and not cached.
    fn node(&self, key: NodeKey) -> Option<TreeNode>;

    /// Children of a resident internal node.
    fn children(&self, key: NodeKey) -> Vec<NodeKey>;

    /// Half-open range of local buckets spanned by a local (sink-side) node.
    fn bucket_range(&self, key: NodeKey) -> (usize, usize);

    /// Compact particle run of a resident remote bucket, or `None` if the
    /// particles have not been fetched yet.
    fn cached_particles(&self, key: NodeKey) -> Option<Vec<CompactParticle>>;

    /// Ask the cache to fetch a remote node. Asynchronous; returns
    /// immediately.
    fn request_node(&mut self, key: NodeKey);

    /// Ask the cache to fetch a remote bucket's particles.
    fn request_particles(&mut self, key: NodeKey);
}

/// Result of draining a chunk's checklist.
#[derive(Debug, Clone, Copy)]
pub struct DrainOutcome {
    /// Entries parked on the undecided list during this drain.
    pub deferred: usize,
    /// Deepest sink group reached, with its bucket range; tells the driver
    /// how many buckets this traversal step worked toward and where to
    /// resume.
    pub lowest: Option<(NodeKey, usize, usize)>,
}

/// All traversal state for one (compute unit, walk variant) pair.
pub struct WalkContext {
    /// Counters and cursor.
    pub state: WalkState,
    /// Checklist / undecided / placed-root bookkeeping.
    pub lists: WalkLists,
    /// Accepted-interaction batching and offload assembly.
    pub queue: OffloadQueue,
    /// Bucket addressing and completion flags.
    pub buckets: BucketTable,
    criterion: OpeningCriterion,
    offsets: Vec<ReplicaOffset>,
}

impl WalkContext {
    /// Assemble a context from a validated configuration.
    pub fn new(
        kind: WalkKind,
        config: &WalkConfig,
        buckets: BucketTable,
        num_chunks: usize,
    ) -> Self {
        let num_buckets = buckets.len();
        tracing::info!(
            "walk context: {:?}, {} buckets, {} chunks, theta {}",
            kind,
            num_buckets,
            num_chunks,
            config.theta
        );
        Self {
            state: WalkState::new(kind, num_buckets, num_chunks),
            lists: WalkLists::new(num_chunks),
            queue: OffloadQueue::new(
                num_buckets,
                config.node_flush_threshold,
                config.particle_flush_threshold,
                config.bucket_capacity_hint,
                config.max_in_flight_buffers,
            ),
            buckets,
            criterion: config.criterion(),
            offsets: ReplicaOffset::all(config.periodic),
        }
    }

    /// The opening criterion in use.
    pub fn criterion(&self) -> &OpeningCriterion {
        &self.criterion
    }

    /// Seed `chunk`'s checklist: every periodic replica of `source_root` is
    /// pushed against `sink_root`, exactly once per chunk.
    pub fn seed_chunk(&mut self, chunk: usize, source_root: NodeKey, sink_root: NodeKey) {
        if !self.lists.chunk_mut(chunk).place_roots_once() {
            return;
        }
        for &offset in &self.offsets {
            self.lists.chunk_mut(chunk).push(CheckEntry {
                node: source_root,
                offset,
                group: sink_root,
            });
        }
        tracing::debug!(
            "chunk {}: placed {} root replicas",
            chunk,
            self.offsets.len()
        );
    }

    /// Process `chunk`'s checklist until it is empty.
    ///
    /// Entries blocked on remote data are deferred (and fetches issued)
    /// without stalling the rest of the checklist.
    pub fn drain_chunk<V: TreeView>(&mut self, view: &mut V, chunk: usize) -> DrainOutcome {
        self.lists.clear_lowest();
        let mut deferred = 0;
        while let Some(entry) = self.lists.chunk_mut(chunk).pop() {
            deferred += self.process_entry(view, chunk, entry);
        }
        DrainOutcome {
            deferred,
            lowest: self.lists.lowest(),
        }
    }

    // Routes one checklist entry to exactly one destination. Returns 1 if
    // the entry was deferred, 0 otherwise.
    fn process_entry<V: TreeView>(
        &mut self,
        view: &mut V,
        chunk: usize,
        entry: CheckEntry,
    ) -> usize {
        let (group_start, group_end) = view.bucket_range(entry.group);
        self.lists.update_lowest(entry.group, group_start, group_end);

        let Some(node) = view.node(entry.node) else {
            // Not resident: park the entry and charge every affected bucket.
            for bucket in group_start..group_end {
                self.state.increment_bucket(bucket);
            }
            view.request_node(entry.node);
            self.lists.chunk_mut(chunk).defer(entry);
            return 1;
        };

        let single_bucket = group_end - group_start == 1;
        let sink_bounds = if single_bucket {
            *self.buckets.bounds(group_start)
        } else {
            view.node(entry.group)
                .expect("sink-side node must be resident")
                .geometry
                .bounds
        };

        match self.criterion.evaluate(&node.geometry, &sink_bounds, entry.offset) {
            WalkDecision::Accept => {
                let moments = self
                    .queue
                    .staging
                    .stage_multipole(entry.node, node.geometry.multipole);
                let record = NodeInteraction {
                    moments,
                    offset: u32::from(entry.offset.id()),
                };
                for bucket in group_start..group_end {
                    self.queue.nodes.push(bucket, record, &mut self.state);
                }
                0
            }
            WalkDecision::Open => match node.class {
                NodeClass::Internal => {
                    let descend_source = single_bucket
                        || node.geometry.multipole.radius >= self.sink_radius(view, entry.group);
                    if descend_source {
                        for child in view.children(entry.node) {
                            self.lists.chunk_mut(chunk).push(CheckEntry {
                                node: child,
                                offset: entry.offset,
                                group: entry.group,
                            });
                        }
                    } else {
                        self.descend_sink(view, chunk, entry);
                    }
                    0
                }
                NodeClass::Bucket { first, count } => {
                    if !single_bucket {
                        // A leaf cannot open further; narrow the sink side
                        // until the pairing is bucket-to-bucket.
                        self.descend_sink(view, chunk, entry);
                        return 0;
                    }
                    let bucket = group_start;
                    match node.locality {
                        Locality::Local => {
                            let record = PartInteraction {
                                first,
                                count,
                                offset: u32::from(entry.offset.id()),
                            };
                            self.queue.local_parts.push(bucket, record, &mut self.state);
                            0
                        }
                        Locality::Remote => match view.cached_particles(entry.node) {
                            Some(run) => {
                                let staged =
                                    self.queue.staging.stage_particles(entry.node, &run);
                                let record = PartInteraction {
                                    first: staged,
                                    count: run.len() as u32,
                                    offset: u32::from(entry.offset.id()),
                                };
                                self.queue
                                    .remote_parts
                                    .push(bucket, record, &mut self.state);
                                0
                            }
                            None => {
                                self.state.increment_bucket(bucket);
                                view.request_particles(entry.node);
                                self.lists.chunk_mut(chunk).defer(entry);
                                1
                            }
                        },
                    }
                }
                NodeClass::Empty => 0,
            },
        }
    }

    fn sink_radius<V: TreeView>(&self, view: &V, group: NodeKey) -> f64 {
        view.node(group)
            .expect("sink-side node must be resident")
            .geometry
            .multipole
            .radius
    }

    fn descend_sink<V: TreeView>(&mut self, view: &V, chunk: usize, entry: CheckEntry) {
        for child_group in view.children(entry.group) {
            self.lists.chunk_mut(chunk).push(CheckEntry {
                node: entry.node,
                offset: entry.offset,
                group: child_group,
            });
        }
    }

    /// A previously missing node became resident: move its undecided
    /// entries back onto the checklist and release the counters charged
    /// when they were deferred. Follow with [`Self::drain_chunk`].
    pub fn node_arrived<V: TreeView>(&mut self, view: &V, chunk: usize, key: NodeKey) {
        let entries = self.lists.chunk_mut(chunk).take_undecided_for(key);
        for entry in entries {
            let (start, end) = view.bucket_range(entry.group);
            for bucket in start..end {
                self.state.decrement_bucket(bucket);
            }
            self.lists.chunk_mut(chunk).push(entry);
        }
    }

    /// A previously missing particle run became resident. Identical
    /// bookkeeping to [`Self::node_arrived`]; kept separate because the
    /// cache resolves node and particle fetches independently.
    pub fn particles_arrived<V: TreeView>(&mut self, view: &V, chunk: usize, key: NodeKey) {
        self.node_arrived(view, chunk, key);
    }

    /// Offload completion callback: the device finished a request, so the
    /// outstanding-work indicator of every affected bucket is released.
    pub fn offload_completed(&mut self, affected_buckets: &[u32]) {
        for &bucket in affected_buckets {
            self.state.decrement_bucket(bucket as usize);
        }
    }

    /// Mark every bucket in `start..end` whose counters have drained as
    /// finished, advance the cursor past the finished prefix, and return
    /// how many buckets this call completed.
    pub fn finish_ready_buckets(&mut self, start: usize, end: usize) -> usize {
        let mut completed = 0;
        for bucket in start..end {
            if self.state.bucket_requests(bucket) == 0
                && !self.buckets.request(bucket).is_finished()
            {
                self.buckets.mark_finished(bucket);
                self.state.mark_bucket_complete();
                completed += 1;
            }
        }
        let mut cursor = self.state.current_bucket;
        while cursor < self.buckets.len() && self.buckets.request(cursor).is_finished() {
            cursor += 1;
        }
        self.state.advance_to(cursor);
        completed
    }
}
