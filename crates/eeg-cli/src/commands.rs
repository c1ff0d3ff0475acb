use crate::cli::{DefaultConfigArgs, RunArgs, SimulateArgs};
use crate::output::{open_output, write_csv};
use anyhow::{Context, Result};
use eeg_core::RawRecord;
use eeg_processing::{Pipeline, PipelineConfig};
use eeg_simulation::{EegSimConfig, EegSimulator, NoiseConfig};
use std::fs;
use std::io::Write;
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let text = fs::read_to_string(&args.records)
        .with_context(|| format!("Failed to read records from {}", args.records.display()))?;
    let records: Vec<RawRecord> =
        serde_json::from_str(&text).context("Records file must hold a JSON array of objects")?;

    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            PipelineConfig::from_json(&json)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(rate) = args.sampling_rate {
        config.sampling_rate = rate;
    }
    if args.parallel {
        config.parallel = true;
    }

    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;
    info!(records = records.len(), "running pipeline");
    let output = pipeline.run(&records)?;

    write_csv(
        open_output(args.output.as_deref())?,
        &output.features.columns(),
        &output.features.rows_as_strings(),
    )
    .context("Failed to write feature table")?;

    if let Some(path) = &args.long {
        write_csv(
            open_output(Some(path))?,
            &output.long.header(),
            &output.long.rows_as_strings(),
        )
        .context("Failed to write long-form table")?;
    }

    let stats = &output.stats;
    eprintln!(
        "{} records in, {} dropped; {} segments, {} kept, {} artifacts, {} failed ({} ms)",
        stats.records_in,
        output.rejected_records.len(),
        stats.segments,
        stats.segments_kept,
        stats.artifacts,
        stats.computation_failures,
        stats.elapsed_us / 1000
    );
    for rejected in &output.rejected_records {
        eprintln!("  record {}: {}", rejected.record_index, rejected.reason);
    }

    Ok(())
}

pub fn simulate(args: SimulateArgs) -> Result<()> {
    let config = EegSimConfig {
        seed: Some(args.seed),
        malformed_every: args.malformed_every,
        noise: NoiseConfig {
            spike_prob: args.spike_prob,
            ..Default::default()
        },
        ..Default::default()
    };

    let records = EegSimulator::new(config)
        .context("Invalid simulation settings")?
        .generate_records(args.count);

    let mut writer = open_output(args.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &records)?;
    writeln!(writer)?;
    writer.flush()?;

    info!(count = records.len(), "records simulated");
    Ok(())
}

pub fn default_config(args: DefaultConfigArgs) -> Result<()> {
    println!("{}", args.preset.config().to_json()?);
    Ok(())
}
