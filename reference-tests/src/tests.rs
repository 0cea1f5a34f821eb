//! Reference walk scenarios run via cargo test.

use crate::{coverage, ReferenceWalk};

fn isolated_walk(name: &str, num_buckets: usize, per_bucket: u32, theta: f64) -> ReferenceWalk {
    ReferenceWalk {
        name: name.to_string(),
        num_buckets,
        particles_per_bucket: per_bucket,
        theta,
        periodic: false,
    }
}

#[test]
fn single_bucket_walk() {
    let result = isolated_walk("Single Bucket", 1, 4, 0.7).run().unwrap();
    result.print_summary();
    assert!(result.passed);
    // One bucket against itself: everything is near-field.
    assert_eq!(result.node_interactions, 0);
    assert_eq!(result.particle_interactions, 1);
}

#[test]
fn eight_bucket_walk() {
    let result = isolated_walk("Eight Buckets", 8, 4, 0.7).run().unwrap();
    result.print_summary();
    assert!(result.passed);
    assert!(result.node_interactions > 0);
    assert!(result.particle_interactions > 0);
}

#[test]
fn tight_theta_opens_everything() {
    // theta -> 0 forces every node open: all interactions are particle runs.
    let result = isolated_walk("Tight Theta", 4, 2, 1e-9).run().unwrap();
    result.print_summary();
    assert!(result.passed);
    assert_eq!(result.node_interactions, 0);
    assert_eq!(result.particle_interactions, 16);
}

#[test]
fn wide_theta_accepts_far_buckets() {
    // A permissive angle turns distant bucket pairs into node interactions.
    let wide = isolated_walk("Wide Theta", 16, 2, 1.5).run().unwrap();
    let tight = isolated_walk("Tight-ish Theta", 16, 2, 0.3).run().unwrap();
    assert!(wide.passed && tight.passed);
    assert!(wide.node_interactions > 0);
    assert!(wide.particle_interactions < tight.particle_interactions);
}

#[test]
fn periodic_walk_covers_every_replica() {
    let result = ReferenceWalk {
        name: "Periodic Replicas".to_string(),
        num_buckets: 2,
        particles_per_bucket: 2,
        theta: 0.7,
        periodic: true,
    }
    .run()
    .unwrap();
    result.print_summary();
    assert!(result.passed);
}

#[test]
fn odd_bucket_counts_are_covered() {
    // Non-power-of-two leaf counts exercise the uneven split.
    for n in [3, 5, 7] {
        let result = isolated_walk("Odd Buckets", n, 2, 0.7).run().unwrap();
        assert!(result.passed, "odd bucket count {} failed", n);
    }
}

#[test]
fn coverage_detects_a_missing_pair() {
    // The checker itself must notice an uncovered pair.
    let counts = vec![vec![1, 1, 1, 0], vec![1; 4]];
    let err = coverage::check_uniform(&counts, 1).unwrap_err();
    assert!(err.contains("bucket 0"));
    assert!(err.contains("particle 3"));
}
