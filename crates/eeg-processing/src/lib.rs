//! EEG-Processing: Segment pipeline from raw records to feature tables
//!
//! Reshaping, zero-phase filtering, artifact gating, spectral features and
//! temporal post-processing.

pub mod artifacts;
pub mod config;
pub mod features;
pub mod filters;
pub mod pipeline;
pub mod postprocess;
pub mod processor;
pub mod reshape;

pub use artifacts::{detect_artifacts, ArtifactMethod, ArtifactSpec};
pub use config::PipelineConfig;
pub use features::{
    bandpower, compute_psd, extract_band_features, welch, FeatureConfig, FeatureExtractor,
    FeatureRow, FeatureTable, FrequencyBand, Psd, SegmentIdentity,
};
pub use filters::{
    bandpass_filter, detrend, notch_filter, preprocess_segment, BandpassFilter, FilterBank,
    FilterConfig, LinearDetrend, NotchFilter,
};
pub use pipeline::*;
pub use postprocess::{ema, normalize, process_features, NormalizationMethod, PostProcessConfig};
pub use processor::SegmentProcessor;
pub use reshape::{
    compact_records, process_records, CompactRow, CompactTable, LongRow, LongTable,
    RecordConfig, RejectedRecord, ReshapeOutput, ReshapedTable, RowContext, Segment, TableForm,
};
