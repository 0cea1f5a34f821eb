//! Orchestration Layer
//!
//! This crate provides the control plane of the distributed force walk:
//! - Walk state with per-bucket / per-chunk pending counters
//! - Bucket completion tracking and particle-range addressing
//! - Dual-tree checklist / undecided-list bookkeeping
//! - The traversal engine behind the `TreeView` seam
//! - Interaction batching, offload-request flattening, and the transfer pool
//!
//! The tree itself, the remote cache, the physics kernels, and the device
//! dispatcher are external collaborators reached only through traits and
//! plain request objects.

#![warn(missing_docs)]

pub mod bucket;
pub mod config;
pub mod error;
pub mod lists;
pub mod offload;
pub mod state;
pub mod walk;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use bucket::{BucketInfo, BucketRequest, BucketTable};
pub use config::WalkConfig;
pub use error::OffloadError;
pub use lists::{CheckEntry, ChunkLists, WalkLists};
pub use offload::{InteractionBatch, OffloadQueue, OffloadRequest, Phase, TransferPool};
pub use state::{WalkKind, WalkState};
pub use walk::{DrainOutcome, Locality, NodeClass, TreeNode, TreeView, WalkContext};

/// Build a walk context for one (compute unit, walk variant) pair.
///
/// Validates the configuration, assembles the bucket table from the
/// decomposition layer's addressing info, and sizes every list and counter
/// array.
///
/// # Example
/// ```no_run
/// use orchestrator::{create_walk_context, WalkConfig, WalkKind};
///
/// let config = WalkConfig::load("config/walk.json")?;
/// let mut ctx = create_walk_context(WalkKind::Local, &config, Vec::new(), 1)?;
/// ctx.seed_chunk(0, 1, 1);
/// # Ok::<(), String>(())
/// ```
pub fn create_walk_context(
    kind: WalkKind,
    config: &WalkConfig,
    bucket_infos: Vec<BucketInfo>,
    num_chunks: usize,
) -> Result<WalkContext, String> {
    config.validate()?;
    let buckets = BucketTable::new(bucket_infos);
    tracing::info!(
        "creating {:?} walk over {} buckets ({} chunks)",
        kind,
        buckets.len(),
        num_chunks
    );
    Ok(WalkContext::new(kind, config, buckets, num_chunks))
}
