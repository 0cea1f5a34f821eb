//! Per-traversal-context walk state.
//!
//! One `WalkState` exists per (compute unit, walk variant) pair for the
//! duration of a force-evaluation phase. Its counters track outstanding
//! asynchronous work without blocking: the bucket-indexed array counts
//! pending requests per bucket, the chunk-indexed array per chunk of remote
//! work. Counters only ever return to zero; going below zero means a remote
//! resolution was lost or duplicated and the walk aborts.

/// Which traversal variant a walk state belongs to.
///
/// One concrete state type serves all three; the tag records which counters
/// are semantically meaningful (chunk counters matter only to
/// [`WalkKind::RemoteNoResume`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkKind {
    /// Walk over this unit's own particles.
    Local,
    /// Walk over remote particles, without resumption.
    RemoteNoResume,
    /// Walk over remote particles, resuming as cache misses fill.
    RemoteResume,
}

/// Counters and cursor for one traversal context.
#[derive(Debug)]
pub struct WalkState {
    kind: WalkKind,
    /// A combiner-cache flush is still pending after the walk finished.
    pub done_pending: bool,
    /// The bucket the walk has advanced to; prefetch-style walks resume
    /// here instead of rescanning from bucket zero.
    pub current_bucket: usize,
    num_buckets: usize,
    pending_buckets: usize,
    pending_chunks: usize,
    bucket_requests: Vec<u32>,
    chunk_requests: Vec<u32>,
}

impl WalkState {
    /// Allocate zero-filled counters for `num_buckets` buckets and
    /// `num_chunks` chunks of remote work. Only the no-resume remote
    /// variant starts with chunks pending; the counter arrays themselves
    /// exist for every variant.
    pub fn new(kind: WalkKind, num_buckets: usize, num_chunks: usize) -> Self {
        let pending_chunks = if kind == WalkKind::RemoteNoResume {
            num_chunks
        } else {
            0
        };
        Self {
            kind,
            done_pending: false,
            current_bucket: 0,
            num_buckets,
            pending_buckets: num_buckets,
            pending_chunks,
            bucket_requests: vec![0; num_buckets],
            chunk_requests: vec![0; num_chunks],
        }
    }

    /// The variant this state serves.
    pub fn kind(&self) -> WalkKind {
        self.kind
    }

    /// Outstanding requests for `bucket`.
    pub fn bucket_requests(&self, bucket: usize) -> u32 {
        self.bucket_requests[bucket]
    }

    /// Outstanding requests for `chunk`.
    pub fn chunk_requests(&self, chunk: usize) -> u32 {
        self.chunk_requests[chunk]
    }

    /// Record an outstanding request on behalf of `bucket`.
    pub fn increment_bucket(&mut self, bucket: usize) {
        self.bucket_requests[bucket] += 1;
    }

    /// Record that a request for `bucket` was satisfied.
    ///
    /// # Panics
    /// Underflow is a fatal invariant violation: it means a remote-data
    /// resolution was lost or delivered twice.
    pub fn decrement_bucket(&mut self, bucket: usize) {
        assert!(
            self.bucket_requests[bucket] > 0,
            "bucket {} request counter underflow",
            bucket
        );
        self.bucket_requests[bucket] -= 1;
    }

    /// Record an outstanding request on behalf of `chunk`. Meaningful only
    /// for the no-resume remote variant.
    pub fn increment_chunk(&mut self, chunk: usize) {
        debug_assert_eq!(self.kind, WalkKind::RemoteNoResume);
        self.chunk_requests[chunk] += 1;
    }

    /// Record that a request for `chunk` was satisfied.
    ///
    /// # Panics
    /// Underflow is a fatal invariant violation.
    pub fn decrement_chunk(&mut self, chunk: usize) {
        debug_assert_eq!(self.kind, WalkKind::RemoteNoResume);
        assert!(
            self.chunk_requests[chunk] > 0,
            "chunk {} request counter underflow",
            chunk
        );
        self.chunk_requests[chunk] -= 1;
    }

    /// Buckets whose walk has not yet completed.
    pub fn pending_buckets(&self) -> usize {
        self.pending_buckets
    }

    /// Chunks of remote work still outstanding.
    pub fn pending_chunks(&self) -> usize {
        self.pending_chunks
    }

    /// Record completion of one bucket's walk.
    ///
    /// # Panics
    /// Completing more buckets than exist is a fatal invariant violation.
    pub fn mark_bucket_complete(&mut self) {
        assert!(self.pending_buckets > 0, "bucket completion underflow");
        self.pending_buckets -= 1;
    }

    /// Record completion of one chunk of remote work.
    ///
    /// # Panics
    /// Completing more chunks than exist is a fatal invariant violation.
    pub fn mark_chunk_complete(&mut self) {
        assert!(self.pending_chunks > 0, "chunk completion underflow");
        self.pending_chunks -= 1;
    }

    /// Advance the bucket cursor; never moves backwards.
    pub fn advance_to(&mut self, bucket: usize) {
        if bucket > self.current_bucket {
            self.current_bucket = bucket;
        }
    }

    /// True once every counter is zero, nothing is pending, and the cursor
    /// has passed the last bucket.
    pub fn is_walk_done(&self) -> bool {
        self.pending_buckets == 0
            && self.pending_chunks == 0
            && self.current_bucket >= self.num_buckets
            && self.bucket_requests.iter().all(|&c| c == 0)
            && self.chunk_requests.iter().all(|&c| c == 0)
    }
}
