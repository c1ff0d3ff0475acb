use clap::{Args, Parser, Subcommand, ValueEnum};
use eeg_processing::PipelineConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "eeg-features",
    version,
    about = "Batch EEG feature extraction",
    long_about = "Turn raw EEG records (JSON) into per-segment spectral feature tables (CSV).\n\
                  Set RUST_LOG to override the log level."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the feature pipeline over a JSON array of records
    Run(RunArgs),
    /// Write synthetic records
    Simulate(SimulateArgs),
    /// Print a pipeline configuration as JSON
    DefaultConfig(DefaultConfigArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// JSON file holding an array of record objects
    #[arg(long)]
    pub records: PathBuf,

    /// Pipeline configuration JSON; defaults to the built-in configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Feature table CSV path (stdout if omitted)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Also write the long-form sample table to this CSV path
    #[arg(long)]
    pub long: Option<PathBuf>,

    /// Override the configured sampling rate
    #[arg(long)]
    pub sampling_rate: Option<u32>,

    /// Process segments on all cores
    #[arg(long)]
    pub parallel: bool,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of records
    #[arg(long, default_value_t = 60)]
    pub count: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Truncate every n-th waveform
    #[arg(long)]
    pub malformed_every: Option<usize>,

    /// Chance per record of a motion spike
    #[arg(long, default_value_t = 0.0)]
    pub spike_prob: f64,

    /// Output JSON path (stdout if omitted)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DefaultConfigArgs {
    /// Configuration preset
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    pub preset: Preset,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Preset {
    Default,
    Raw,
    Arousal,
}

impl Preset {
    pub fn config(self) -> PipelineConfig {
        match self {
            Preset::Default => PipelineConfig::default(),
            Preset::Raw => PipelineConfig::raw(),
            Preset::Arousal => PipelineConfig::arousal(),
        }
    }
}
