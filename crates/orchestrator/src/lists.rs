//! Checklist, undecided-list, and placed-root bookkeeping for the dual-tree
//! walk.
//!
//! Every (tree node, replica offset) under consideration sits in exactly one
//! place at a time: the checklist (decision pending), the undecided list
//! (decision blocked on remote data), or one of the accepted interaction
//! lists in the batching layer. Entries carry the sink group they were being
//! evaluated against, so a re-walk resumes at the right granularity.

use std::collections::VecDeque;

use kernel::{NodeKey, ReplicaOffset};

/// One checklist entry: a source node (with replica offset) to be evaluated
/// against the bucket group `group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckEntry {
    /// Source tree node.
    pub node: NodeKey,
    /// Periodic replica the node is shifted by.
    pub offset: ReplicaOffset,
    /// Sink group (a local tree node spanning one or more buckets).
    pub group: NodeKey,
}

/// Walk lists for one chunk of remote work.
#[derive(Debug, Default)]
pub struct ChunkLists {
    checklist: VecDeque<CheckEntry>,
    undecided: Vec<CheckEntry>,
    placed_roots: bool,
}

impl ChunkLists {
    /// Push an entry onto the checklist.
    pub fn push(&mut self, entry: CheckEntry) {
        debug_assert!(
            !self.undecided.contains(&entry),
            "checklist push of an entry already on the undecided list"
        );
        self.checklist.push_back(entry);
    }

    /// Pop the next entry awaiting a decision.
    pub fn pop(&mut self) -> Option<CheckEntry> {
        self.checklist.pop_front()
    }

    /// Number of entries awaiting a decision.
    pub fn checklist_len(&self) -> usize {
        self.checklist.len()
    }

    /// Move an entry to the undecided list, to be revisited once the data
    /// it needs becomes resident.
    pub fn defer(&mut self, entry: CheckEntry) {
        debug_assert!(
            !self.undecided.contains(&entry),
            "entry deferred twice"
        );
        debug_assert!(
            !self.checklist.contains(&entry),
            "deferred entry still on the checklist"
        );
        self.undecided.push(entry);
    }

    /// Number of entries blocked on remote data.
    pub fn undecided_len(&self) -> usize {
        self.undecided.len()
    }

    /// Remove and return every undecided entry whose source node is `node`.
    pub fn take_undecided_for(&mut self, node: NodeKey) -> Vec<CheckEntry> {
        let mut taken = Vec::new();
        let mut i = 0;
        while i < self.undecided.len() {
            if self.undecided[i].node == node {
                taken.push(self.undecided.swap_remove(i));
            } else {
                i += 1;
            }
        }
        taken
    }

    /// True when nothing is pending or blocked for this chunk.
    pub fn is_drained(&self) -> bool {
        self.checklist.is_empty() && self.undecided.is_empty()
    }

    /// Record that the chunk root replicas were placed; returns `true` the
    /// first time so the caller seeds exactly once per chunk.
    pub fn place_roots_once(&mut self) -> bool {
        if self.placed_roots {
            return false;
        }
        self.placed_roots = true;
        true
    }
}

/// All per-chunk lists for one walk state, plus the lowest-node bookkeeping
/// shared across a traversal step.
#[derive(Debug)]
pub struct WalkLists {
    chunks: Vec<ChunkLists>,
    /// Deepest sink group reached by the current traversal step, with its
    /// bucket range. Determines how many buckets the step completed and
    /// where computation resumes.
    lowest: Option<(NodeKey, usize, usize)>,
}

impl WalkLists {
    /// Empty lists for `num_chunks` chunks.
    pub fn new(num_chunks: usize) -> Self {
        let mut chunks = Vec::with_capacity(num_chunks);
        chunks.resize_with(num_chunks, ChunkLists::default);
        Self { chunks, lowest: None }
    }

    /// Number of chunks.
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Lists for `chunk`.
    pub fn chunk(&self, chunk: usize) -> &ChunkLists {
        &self.chunks[chunk]
    }

    /// Mutable lists for `chunk`.
    pub fn chunk_mut(&mut self, chunk: usize) -> &mut ChunkLists {
        &mut self.chunks[chunk]
    }

    /// Reset the lowest-node tracking at the start of a traversal step.
    pub fn clear_lowest(&mut self) {
        self.lowest = None;
    }

    /// Narrow the lowest node to `group` if its bucket range is tighter
    /// than what has been seen this step.
    pub fn update_lowest(&mut self, group: NodeKey, start: usize, end: usize) {
        match self.lowest {
            Some((_, s, e)) if e - s <= end - start => {}
            _ => self.lowest = Some((group, start, end)),
        }
    }

    /// Deepest sink group reached this step, with its bucket range.
    pub fn lowest(&self) -> Option<(NodeKey, usize, usize)> {
        self.lowest
    }
}
