//! Ground-truth coverage analysis.
//!
//! Independent of the walk's own bookkeeping: expands every accepted node
//! interaction to the particles under that node and adds the direct
//! particle interactions, producing a (bucket x source particle) count
//! matrix. A correct walk covers each pair exactly once per replica offset
//! evaluated.

use kernel::{NodeInteraction, PartInteraction};
use orchestrator::offload::{OffloadRequest, Staging};

use crate::SyntheticTree;

/// Count, for every (bucket, source particle) pair, how many accepted
/// interactions cover it.
pub fn coverage_counts(
    tree: &SyntheticTree,
    staging: &Staging,
    node_req: &OffloadRequest<NodeInteraction>,
    part_req: &OffloadRequest<PartInteraction>,
) -> Vec<Vec<u32>> {
    let total = tree.total_particles() as usize;
    let mut counts = vec![vec![0u32; total]; tree.num_buckets];

    for (slot, &bucket) in node_req.affected_buckets.iter().enumerate() {
        let start = node_req.bucket_markers[slot] as usize;
        let end = node_req.bucket_markers[slot + 1] as usize;
        for record in &node_req.records()[start..end] {
            let key = staging.staged_node(record.moments);
            let (first, last) = tree.particle_range(key);
            for particle in first..last {
                counts[bucket as usize][particle as usize] += 1;
            }
        }
    }

    for (slot, &bucket) in part_req.affected_buckets.iter().enumerate() {
        let start = part_req.bucket_markers[slot] as usize;
        let end = part_req.bucket_markers[slot + 1] as usize;
        for record in &part_req.records()[start..end] {
            for particle in record.first..record.first + record.count {
                counts[bucket as usize][particle as usize] += 1;
            }
        }
    }

    counts
}

/// Verify that every pair was covered exactly `expected` times.
pub fn check_uniform(counts: &[Vec<u32>], expected: u32) -> Result<(), String> {
    let mut mismatches = Vec::new();
    for (bucket, row) in counts.iter().enumerate() {
        for (particle, &count) in row.iter().enumerate() {
            if count != expected {
                mismatches.push((bucket, particle, count));
            }
        }
    }
    if mismatches.is_empty() {
        return Ok(());
    }
    let (bucket, particle, count) = mismatches[0];
    Err(format!(
        "{} pairs miscovered; first: bucket {} x particle {} covered {}x (expected {}x)",
        mismatches.len(),
        bucket,
        particle,
        count,
        expected
    ))
}
