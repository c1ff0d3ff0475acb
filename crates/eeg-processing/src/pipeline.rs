//! Batch pipeline: reshape, clean, gate and extract features per segment

use crate::config::PipelineConfig;
use crate::features::{FeatureExtractor, FeatureRow, FeatureTable, SegmentIdentity};
use crate::filters::FilterBank;
use crate::postprocess::{process_features, ELAPSED_COLUMN};
use crate::processor::SegmentProcessor;
use crate::reshape::{compact_records, LongTable, RejectedRecord, Segment};
use eeg_core::{config_error, EegResult, RawRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Suffix of features computed on the filtered segment
pub const FILTERED_SUFFIX: &str = "_fil";

/// Ratio columns emitted when ratios are enabled
const RATIO_COLUMNS: [&str; 4] = ["theta_beta", "alpha_theta", "beta_alpha", "engagement"];

/// Why a segment produced no feature row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Flagged by the artifact gate
    Artifact { method: String },
    /// Numeric failure scoped to the segment
    Computation { message: String },
}

/// Segment excluded from the feature table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSegment {
    /// Segment label, `seg_<n>`
    pub segment: String,
    pub timestamp: String,
    pub reason: RejectionReason,
}

/// Result of processing one segment
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    Kept(FeatureRow),
    Rejected(RejectedSegment),
}

/// Counts that reconcile input with output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub records_in: usize,
    pub records_retained: usize,
    pub segments: usize,
    pub segments_kept: usize,
    pub artifacts: usize,
    pub computation_failures: usize,
    pub elapsed_us: u64,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub features: FeatureTable,
    /// Long-form table of the retained records
    pub long: LongTable,
    pub rejected_records: Vec<RejectedRecord>,
    pub rejected_segments: Vec<RejectedSegment>,
    pub stats: PipelineStats,
}

/// Feature pipeline bound to one validated configuration
pub struct Pipeline {
    config: PipelineConfig,
    filter_bank: Option<FilterBank>,
    extractor: FeatureExtractor,
}

impl Pipeline {
    /// Validate configuration and build the stages
    pub fn new(config: PipelineConfig) -> EegResult<Self> {
        config.validate()?;

        let filter_bank = config
            .filter
            .as_ref()
            .map(FilterBank::eeg_preprocessing)
            .transpose()?;
        let extractor = FeatureExtractor::new(config.features.clone());

        let pipeline = Self {
            config,
            filter_bank,
            extractor,
        };

        if let Some(postprocess) = &pipeline.config.postprocess {
            let columns = pipeline.feature_columns();
            if let Some(missing) = postprocess
                .normalize_columns
                .iter()
                .find(|c| !columns.contains(c))
            {
                return Err(config_error!(
                    "Column '{}' to normalize is not produced by this configuration",
                    missing
                ));
            }
        }

        if let Some(bank) = &pipeline.filter_bank {
            debug!(stages = ?bank.stage_names(), "filter bank ready");
        }

        Ok(pipeline)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Feature columns every kept row carries, in order
    pub fn feature_columns(&self) -> Vec<String> {
        let features = &self.config.features;
        let mut base: Vec<String> = features.bands.iter().map(|b| b.name.clone()).collect();
        base.push("total_power".to_string());
        if features.ratios {
            base.extend(RATIO_COLUMNS.iter().map(|c| c.to_string()));
        }

        let mut columns = base.clone();
        if self.filter_bank.is_some() {
            columns.extend(base.iter().map(|c| format!("{}{}", c, FILTERED_SUFFIX)));
        }
        if self
            .config
            .postprocess
            .as_ref()
            .is_some_and(|p| p.elapsed_time)
        {
            columns.push(ELAPSED_COLUMN.to_string());
        }
        columns
    }

    /// Run the whole batch
    pub fn run(&self, records: &[RawRecord]) -> EegResult<PipelineOutput> {
        let start = Instant::now();
        let rate = self.config.sampling_rate;

        let (compact, rejected_records) = compact_records(records, rate, &self.config.records)?;
        let long = compact.to_long(rate);
        let segments = long.segments();
        debug!(
            records = records.len(),
            segments = segments.len(),
            long_rows = long.len(),
            "records reshaped to long form"
        );

        let outcomes = self.process_segments(&segments)?;

        let mut rows = Vec::with_capacity(outcomes.len());
        let mut rejected_segments = Vec::new();
        for outcome in outcomes {
            match outcome {
                SegmentOutcome::Kept(row) => rows.push(row),
                SegmentOutcome::Rejected(rejected) => rejected_segments.push(rejected),
            }
        }

        let artifacts = rejected_segments
            .iter()
            .filter(|r| matches!(r.reason, RejectionReason::Artifact { .. }))
            .count();

        let mut features = FeatureTable::new(rows);
        if let Some(postprocess) = &self.config.postprocess {
            features = process_features(&features, postprocess)?;
        }

        let stats = PipelineStats {
            records_in: records.len(),
            records_retained: segments.len(),
            segments: segments.len(),
            segments_kept: features.len(),
            artifacts,
            computation_failures: rejected_segments.len() - artifacts,
            elapsed_us: start.elapsed().as_micros() as u64,
        };

        info!(
            records_in = stats.records_in,
            records_dropped = rejected_records.len(),
            segments_kept = stats.segments_kept,
            artifacts = stats.artifacts,
            failures = stats.computation_failures,
            elapsed_us = stats.elapsed_us,
            "pipeline run complete"
        );

        Ok(PipelineOutput {
            features,
            long,
            rejected_records,
            rejected_segments,
            stats,
        })
    }

    /// Process segments in order, fanning out over rayon when configured
    pub fn process_segments(&self, segments: &[Segment]) -> EegResult<Vec<SegmentOutcome>> {
        if self.config.parallel {
            segments
                .par_iter()
                .map(|segment| self.process_segment(segment))
                .collect()
        } else {
            segments
                .iter()
                .map(|segment| self.process_segment(segment))
                .collect()
        }
    }

    /// Filter, gate and extract one segment
    ///
    /// Only fatal errors are returned as `Err`; degenerate segments become
    /// rejections.
    pub fn process_segment(&self, segment: &Segment) -> EegResult<SegmentOutcome> {
        match self.evaluate(segment) {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(segment = %segment.label(), error = %e, "segment failed");
                Ok(SegmentOutcome::Rejected(RejectedSegment {
                    segment: segment.label(),
                    timestamp: segment.timestamp.clone(),
                    reason: RejectionReason::Computation {
                        message: e.to_string(),
                    },
                }))
            }
        }
    }

    fn evaluate(&self, segment: &Segment) -> EegResult<SegmentOutcome> {
        let fs = self.config.sampling_rate_hz();

        let filtered = match &self.filter_bank {
            Some(bank) => Some(bank.process(&segment.samples, fs)?),
            None => None,
        };

        if let Some(method) = &self.config.artifact {
            // Gate on the cleaned signal when there is one
            let gated = filtered.as_deref().unwrap_or(&segment.samples);
            if method.detect(gated, fs)? {
                debug!(segment = %segment.label(), method = method.name(), "artifact");
                return Ok(SegmentOutcome::Rejected(RejectedSegment {
                    segment: segment.label(),
                    timestamp: segment.timestamp.clone(),
                    reason: RejectionReason::Artifact {
                        method: method.name().to_string(),
                    },
                }));
            }
        }

        let mut row = FeatureRow::new(identity(segment));
        row.features = self.extractor.segment_features(&segment.samples, fs)?;
        if let Some(filtered) = &filtered {
            row.append_suffixed(
                self.extractor.segment_features(filtered, fs)?,
                FILTERED_SUFFIX,
            );
        }

        Ok(SegmentOutcome::Kept(row))
    }
}

fn identity(segment: &Segment) -> SegmentIdentity {
    let mut labels = segment.metadata.clone();
    let document_name = labels.remove("document_name");
    let session_id = labels.remove("session_id");

    SegmentIdentity {
        document_name,
        segment: Some(segment.label()),
        session_id,
        timestamp: Some(segment.timestamp.clone()),
        utc_ts: Some(segment.utc_ts),
        labels,
    }
}

/// Validate `config` and run it over `records`
pub fn run_pipeline(records: &[RawRecord], config: PipelineConfig) -> EegResult<PipelineOutput> {
    Pipeline::new(config)?.run(records)
}
