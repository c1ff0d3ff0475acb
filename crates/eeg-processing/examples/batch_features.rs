//! Batch feature extraction over simulated records
//!
//! Generates a short calm session with a few contaminated and truncated
//! records, runs the arousal configuration and prints what survived.

use eeg_core::EegResult;
use eeg_processing::{Pipeline, PipelineConfig, RejectionReason};
use eeg_simulation::{EegSimConfig, EegSimulator, NoiseConfig};

fn main() -> EegResult<()> {
    println!("=== EEG batch feature extraction ===\n");

    let sim_config = EegSimConfig {
        seed: Some(7),
        malformed_every: Some(10),
        noise: NoiseConfig {
            spike_prob: 0.1,
            ..Default::default()
        },
        ..Default::default()
    };
    let records = EegSimulator::new(sim_config)?.generate_records(30);

    let pipeline = Pipeline::new(PipelineConfig::arousal())?;
    let output = pipeline.run(&records)?;

    println!(
        "{} records, {} dropped, {} segments kept",
        output.stats.records_in,
        output.rejected_records.len(),
        output.stats.segments_kept
    );

    for rejected in &output.rejected_segments {
        match &rejected.reason {
            RejectionReason::Artifact { method } => {
                println!("  {} rejected by {}", rejected.segment, method)
            }
            RejectionReason::Computation { message } => {
                println!("  {} failed: {}", rejected.segment, message)
            }
        }
    }

    println!("\n{:>8} {:>10} {:>10} {:>10}", "segment", "alpha", "gamma_fil", "elapsed");
    for row in output.features.rows.iter().take(10) {
        println!(
            "{:>8} {:>10.3} {:>10.3} {:>10.1}",
            row.identity.segment.as_deref().unwrap_or("-"),
            row.get("alpha").unwrap_or(f64::NAN),
            row.get("gamma_fil").unwrap_or(f64::NAN),
            row.get("elapsed_s").unwrap_or(f64::NAN),
        );
    }

    Ok(())
}
