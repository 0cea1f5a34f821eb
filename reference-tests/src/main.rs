//! Reference test binary entry point
//!
//! Runs every reference walk scenario and prints a summary.

use reference_tests::{ReferenceWalk, TestResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn scenarios() -> Vec<ReferenceWalk> {
    vec![
        ReferenceWalk {
            name: "Single Bucket".to_string(),
            num_buckets: 1,
            particles_per_bucket: 8,
            theta: 0.7,
            periodic: false,
        },
        ReferenceWalk {
            name: "Eight Buckets".to_string(),
            num_buckets: 8,
            particles_per_bucket: 8,
            theta: 0.7,
            periodic: false,
        },
        ReferenceWalk {
            name: "Wide Domain".to_string(),
            num_buckets: 64,
            particles_per_bucket: 16,
            theta: 0.5,
            periodic: false,
        },
        ReferenceWalk {
            name: "Periodic Replicas".to_string(),
            num_buckets: 4,
            particles_per_bucket: 4,
            theta: 0.7,
            periodic: true,
        },
    ]
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reference_tests=info,orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting reference walk suite");

    let mut results: Vec<TestResult> = Vec::new();
    for scenario in scenarios() {
        match scenario.run() {
            Ok(result) => {
                result.print_summary();
                results.push(result);
            }
            Err(e) => {
                eprintln!("Scenario setup failed: {e}");
                std::process::exit(1);
            }
        }
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    println!(
        "\n{} scenarios, {} passed, {} failed",
        results.len(),
        results.len() - failed,
        failed
    );
    if failed > 0 {
        std::process::exit(1);
    }
}
