//! Temporal smoothing and normalization of feature tables
//!
//! Rows are treated as a time series in their given order. Each column is an
//! independent left-to-right scan, so columns may run in parallel but rows
//! never do.

use crate::features::FeatureTable;
use eeg_core::{computation_error, config_error, EegResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Column name of the seconds-since-first-row feature
pub const ELAPSED_COLUMN: &str = "elapsed_s";

/// Per-column rescaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    /// Map to [0, 1]
    #[default]
    MinMax,
    /// Zero mean, unit population standard deviation
    ZScore,
}

/// Post-processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// EMA smoothing factor in (0, 1]
    pub alpha: f64,
    /// Columns rescaled after smoothing
    pub normalize_columns: Vec<String>,
    pub normalization: NormalizationMethod,
    /// Add `elapsed_s` when every row carries a UTC timestamp
    pub elapsed_time: bool,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            alpha: Self::alpha_for_span(15),
            normalize_columns: Vec::new(),
            normalization: NormalizationMethod::MinMax,
            elapsed_time: true,
        }
    }
}

impl PostProcessConfig {
    /// Smoothing factor equivalent to an N-sample window, `2 / (N + 1)`
    pub fn alpha_for_span(span: usize) -> f64 {
        2.0 / (span as f64 + 1.0)
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn normalize(mut self, columns: &[&str], method: NormalizationMethod) -> Self {
        self.normalize_columns = columns.iter().map(|c| c.to_string()).collect();
        self.normalization = method;
        self
    }

    pub fn validate(&self) -> EegResult<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(config_error!(
                "Smoothing factor must lie in (0, 1], got {}",
                self.alpha
            ));
        }
        // elapsed_s is appended after smoothing and normalization
        if self.normalize_columns.iter().any(|c| c == ELAPSED_COLUMN) {
            return Err(config_error!(
                "Column '{}' is derived from timestamps and cannot be normalized",
                ELAPSED_COLUMN
            ));
        }
        Ok(())
    }
}

/// Exponential moving average, seeded with the first value
pub fn ema(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut smoothed = Vec::with_capacity(values.len());
    let mut state: Option<f64> = None;

    for &value in values {
        let next = match state {
            None => value,
            Some(previous) => alpha * value + (1.0 - alpha) * previous,
        };
        smoothed.push(next);
        state = Some(next);
    }

    smoothed
}

/// Rescale one column; a constant column maps to zeros
pub fn normalize(values: &[f64], method: NormalizationMethod) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    match method {
        NormalizationMethod::MinMax => {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            if range <= 0.0 {
                return vec![0.0; values.len()];
            }
            values.iter().map(|v| (v - min) / range).collect()
        }
        NormalizationMethod::ZScore => {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            if std <= 0.0 {
                return vec![0.0; values.len()];
            }
            values.iter().map(|v| (v - mean) / std).collect()
        }
    }
}

/// Smooth every feature column, normalize the configured subset and add elapsed time
pub fn process_features(table: &FeatureTable, config: &PostProcessConfig) -> EegResult<FeatureTable> {
    config.validate()?;

    let mut output = table.clone();
    if table.is_empty() {
        return Ok(output);
    }

    let columns = table.feature_columns();
    if let Some(missing) = config
        .normalize_columns
        .iter()
        .find(|c| !columns.contains(c))
    {
        return Err(config_error!("Column '{}' to normalize does not exist", missing));
    }

    let processed: Vec<(String, Vec<f64>)> = columns
        .par_iter()
        .map(|name| -> EegResult<(String, Vec<f64>)> {
            let values = table
                .column(name)
                .ok_or_else(|| computation_error!("column '{}' is missing on some rows", name))?;

            let mut smoothed = ema(&values, config.alpha);
            if config.normalize_columns.contains(name) {
                smoothed = normalize(&smoothed, config.normalization);
            }
            Ok((name.clone(), smoothed))
        })
        .collect::<EegResult<_>>()?;

    for (name, values) in &processed {
        output.set_column(name, values)?;
    }

    if config.elapsed_time {
        let stamps: Option<Vec<f64>> = table.rows.iter().map(|r| r.identity.utc_ts).collect();
        match stamps {
            Some(stamps) => {
                let start = stamps[0];
                let elapsed: Vec<f64> = stamps.iter().map(|ts| ts - start).collect();
                output.set_column(ELAPSED_COLUMN, &elapsed)?;
            }
            None => debug!("rows without UTC timestamps, skipping elapsed time"),
        }
    }

    debug!(
        rows = output.len(),
        columns = processed.len(),
        alpha = config.alpha,
        "features post-processed"
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureRow, SegmentIdentity};

    fn table(values: &[(f64, f64)], stamps: bool) -> FeatureTable {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, &(gamma, alpha))| {
                let mut row = FeatureRow::new(SegmentIdentity {
                    utc_ts: stamps.then_some(100.0 + i as f64),
                    ..Default::default()
                });
                row.set("gamma", gamma);
                row.set("alpha", alpha);
                row
            })
            .collect();
        FeatureTable::new(rows)
    }

    #[test]
    fn test_ema_recurrence() {
        assert_eq!(ema(&[1.0, 2.0, 3.0], 0.5), vec![1.0, 1.5, 2.25]);
        assert_eq!(ema(&[4.0, -1.0, 7.0], 1.0), vec![4.0, -1.0, 7.0]);
        assert!(ema(&[], 0.5).is_empty());
    }

    #[test]
    fn test_alpha_validation() {
        let input = table(&[(1.0, 1.0)], true);
        for alpha in [0.0, -0.1, 1.5, f64::NAN] {
            let config = PostProcessConfig::default().with_alpha(alpha);
            let err = process_features(&input, &config).unwrap_err();
            assert!(err.is_fatal());
        }
        assert!((PostProcessConfig::default().alpha - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_normalization_ranges() {
        let values = [3.0, 1.0, 5.0, 2.0];

        let scaled = normalize(&values, NormalizationMethod::MinMax);
        assert_eq!(scaled, vec![0.5, 0.0, 1.0, 0.25]);

        let z = normalize(&values, NormalizationMethod::ZScore);
        let mean = z.iter().sum::<f64>() / 4.0;
        let var = z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);

        assert_eq!(normalize(&[2.0; 3], NormalizationMethod::MinMax), vec![0.0; 3]);
        assert_eq!(normalize(&[2.0; 3], NormalizationMethod::ZScore), vec![0.0; 3]);
    }

    #[test]
    fn test_process_features() {
        let input = table(&[(1.0, 10.0), (3.0, 10.0), (5.0, 20.0)], true);
        let config = PostProcessConfig::default()
            .with_alpha(0.5)
            .normalize(&["gamma"], NormalizationMethod::MinMax);

        let output = process_features(&input, &config).unwrap();

        // gamma: ema [1, 2, 3.5] then min-max
        assert_eq!(output.column("gamma"), Some(vec![0.0, 0.4, 1.0]));
        // alpha: smoothed only
        assert_eq!(output.column("alpha"), Some(vec![10.0, 10.0, 15.0]));
        assert_eq!(output.column(ELAPSED_COLUMN), Some(vec![0.0, 1.0, 2.0]));

        // Input is left untouched
        assert_eq!(input.column("gamma"), Some(vec![1.0, 3.0, 5.0]));
    }

    #[test]
    fn test_order_matters() {
        let config = PostProcessConfig::default().with_alpha(0.5);
        let forward = process_features(&table(&[(1.0, 0.0), (5.0, 0.0)], false), &config).unwrap();
        let reversed = process_features(&table(&[(5.0, 0.0), (1.0, 0.0)], false), &config).unwrap();

        assert_eq!(forward.column("gamma"), Some(vec![1.0, 3.0]));
        assert_eq!(reversed.column("gamma"), Some(vec![5.0, 3.0]));
        assert_eq!(forward.column(ELAPSED_COLUMN), None);
    }

    #[test]
    fn test_missing_normalize_column() {
        let config = PostProcessConfig::default().normalize(&["beta_fil"], NormalizationMethod::ZScore);
        let err = process_features(&table(&[(1.0, 2.0)], true), &config).unwrap_err();
        assert!(err.to_string().contains("beta_fil"));
    }

    #[test]
    fn test_elapsed_column_cannot_be_normalized() {
        let config = PostProcessConfig::default()
            .normalize(&[ELAPSED_COLUMN], NormalizationMethod::MinMax);
        assert!(config.validate().unwrap_err().is_fatal());

        let err = process_features(&table(&[(1.0, 2.0)], true), &config).unwrap_err();
        assert!(err.to_string().contains(ELAPSED_COLUMN));
    }

    #[test]
    fn test_empty_table() {
        let output = process_features(&FeatureTable::default(), &PostProcessConfig::default()).unwrap();
        assert!(output.is_empty());
    }
}
