//! Spectral feature extraction for EEG segments

use eeg_core::{computation_error, config_error, EegResult};
use num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

/// Longest Welch window used for one-second segments
pub const DEFAULT_NPERSEG: usize = 256;

/// Frequency band definition for spectral analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub name: String,
    pub low_freq: f64,
    pub high_freq: f64,
}

impl FrequencyBand {
    pub fn new(name: &str, low_freq: f64, high_freq: f64) -> Self {
        Self {
            name: name.to_string(),
            low_freq,
            high_freq,
        }
    }

    /// Clinical EEG bands, gamma also split into a low and a high half
    pub fn eeg_bands() -> Vec<FrequencyBand> {
        vec![
            FrequencyBand::new("delta", 1.0, 4.0),
            FrequencyBand::new("theta", 4.0, 8.0),
            FrequencyBand::new("alpha", 8.0, 13.0),
            FrequencyBand::new("beta", 13.0, 30.0),
            FrequencyBand::new("gamma", 30.0, 45.0),
            FrequencyBand::new("gamma1", 30.0, 37.0),
            FrequencyBand::new("gamma2", 37.0, 45.0),
        ]
    }

    /// Gamma band used by the spectral artifact check
    pub fn gamma() -> Self {
        FrequencyBand::new("gamma", 30.0, 45.0)
    }

    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low_freq && freq <= self.high_freq
    }
}

/// One-sided power spectral density
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psd {
    /// Bin frequencies in Hz, ascending from 0
    pub frequencies: Vec<f64>,
    /// Power density per bin (units²/Hz)
    pub power: Vec<f64>,
}

impl Psd {
    /// Pair frequency and power arrays of equal length
    pub fn new(frequencies: Vec<f64>, power: Vec<f64>) -> EegResult<Self> {
        if frequencies.len() != power.len() {
            return Err(computation_error!(
                "frequency and power arrays differ in length ({} vs {})",
                frequencies.len(),
                power.len()
            ));
        }
        Ok(Self { frequencies, power })
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Integrated power inside a band
    pub fn band_power(&self, band: &FrequencyBand) -> f64 {
        trapezoid(
            self.frequencies
                .iter()
                .copied()
                .zip(self.power.iter().copied())
                .filter(|&(f, _)| band.contains(f)),
        )
    }

    /// Integrated power over the whole spectrum
    pub fn total_power(&self) -> f64 {
        trapezoid(self.frequencies.iter().copied().zip(self.power.iter().copied()))
    }
}

fn periodic_hann(len: usize) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
        .collect()
}

/// Welch PSD with a window of at most `nperseg` samples and 50% overlap
pub fn welch(segment: &[f64], sampling_rate: f64, nperseg: usize) -> EegResult<Psd> {
    if segment.is_empty() {
        return Err(computation_error!("cannot estimate the spectrum of an empty segment"));
    }
    if nperseg == 0 {
        return Err(config_error!("Welch window length must be positive"));
    }

    let nperseg = nperseg.min(segment.len());
    let step = nperseg - nperseg / 2;
    let n_windows = (segment.len() - nperseg) / step + 1;

    let window = periodic_hann(nperseg);
    let window_energy: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sampling_rate * window_energy);

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(nperseg);
    let mut input = r2c.make_input_vec();
    let mut spectrum: Vec<Complex<f64>> = r2c.make_output_vec();

    let n_bins = nperseg / 2 + 1;
    let nyquist_bin = (nperseg % 2 == 0).then_some(n_bins - 1);
    let mut power = vec![0.0; n_bins];

    for w in 0..n_windows {
        let chunk = &segment[w * step..w * step + nperseg];
        let mean = chunk.iter().sum::<f64>() / nperseg as f64;

        for ((slot, &x), &win) in input.iter_mut().zip(chunk).zip(&window) {
            *slot = (x - mean) * win;
        }

        r2c.process(&mut input, &mut spectrum)
            .map_err(|e| computation_error!("FFT failed: {}", e))?;

        for (k, (acc, bin)) in power.iter_mut().zip(&spectrum).enumerate() {
            let mut p = bin.norm_sqr() * scale;
            // Fold negative frequencies in, except for DC and Nyquist
            if k != 0 && Some(k) != nyquist_bin {
                p *= 2.0;
            }
            *acc += p;
        }
    }

    for p in power.iter_mut() {
        *p /= n_windows as f64;
    }

    let frequencies = (0..n_bins)
        .map(|k| k as f64 * sampling_rate / nperseg as f64)
        .collect();

    Psd::new(frequencies, power)
}

/// Welch PSD sized for one-second segments
pub fn compute_psd(segment: &[f64], sampling_rate: f64) -> EegResult<Psd> {
    welch(segment, sampling_rate, DEFAULT_NPERSEG)
}

fn trapezoid(points: impl Iterator<Item = (f64, f64)>) -> f64 {
    let mut area = 0.0;
    let mut previous: Option<(f64, f64)> = None;
    for (f, p) in points {
        if let Some((f0, p0)) = previous {
            area += (f - f0) * (p + p0) / 2.0;
        }
        previous = Some((f, p));
    }
    area
}

/// Trapezoidal integral of `psd` over bins with `low <= f <= high`
///
/// Fewer than two bins in range integrate to zero.
pub fn bandpower(frequencies: &[f64], psd: &[f64], low: f64, high: f64) -> f64 {
    trapezoid(
        frequencies
            .iter()
            .copied()
            .zip(psd.iter().copied())
            .filter(|&(f, _)| f >= low && f <= high),
    )
}

/// Spectral feature configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Bands reported as features, in column order
    pub bands: Vec<FrequencyBand>,
    /// Welch window length cap
    pub nperseg: usize,
    /// Emit theta/beta, alpha/theta, beta/alpha and engagement
    pub ratios: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bands: FrequencyBand::eeg_bands(),
            nperseg: DEFAULT_NPERSEG,
            ratios: true,
        }
    }
}

impl FeatureConfig {
    const RATIO_BANDS: [&'static str; 3] = ["theta", "alpha", "beta"];

    pub fn validate(&self, sampling_rate: f64) -> EegResult<()> {
        if self.nperseg == 0 {
            return Err(config_error!("Welch window length must be positive"));
        }

        let mut seen = BTreeSet::new();
        for band in &self.bands {
            if !seen.insert(band.name.as_str()) {
                return Err(config_error!("Duplicate frequency band '{}'", band.name));
            }
            if !(band.low_freq >= 0.0 && band.low_freq < band.high_freq) {
                return Err(config_error!(
                    "Band '{}' has invalid edges [{}, {}]",
                    band.name,
                    band.low_freq,
                    band.high_freq
                ));
            }
            if band.high_freq > sampling_rate / 2.0 {
                return Err(config_error!(
                    "Band '{}' extends past Nyquist frequency {}Hz",
                    band.name,
                    sampling_rate / 2.0
                ));
            }
        }

        if self.ratios {
            for name in Self::RATIO_BANDS {
                if !seen.contains(name) {
                    return Err(config_error!("Band ratios require a '{}' band", name));
                }
            }
        }

        Ok(())
    }
}

/// Passthrough fields identifying where a feature row came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentIdentity {
    pub document_name: Option<String>,
    /// Segment label such as `seg_3`
    pub segment: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub utc_ts: Option<f64>,
    /// Remaining whitelisted metadata (session type, focus type, ...)
    pub labels: BTreeMap<String, String>,
}

impl SegmentIdentity {
    pub const COLUMNS: [&'static str; 5] =
        ["document_name", "segment", "session_id", "timestamp", "utc_ts"];

    fn values(&self) -> [String; 5] {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        [
            text(&self.document_name),
            text(&self.segment),
            text(&self.session_id),
            text(&self.timestamp),
            self.utc_ts.map(|ts| ts.to_string()).unwrap_or_default(),
        ]
    }
}

/// Features of one surviving segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub identity: SegmentIdentity,
    /// Named values in column order
    pub features: Vec<(String, f64)>,
}

impl FeatureRow {
    pub fn new(identity: SegmentIdentity) -> Self {
        Self {
            identity,
            features: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.features
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }

    /// Set a feature, replacing an existing value of the same name
    pub fn set(&mut self, name: &str, value: f64) {
        match self.features.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.features.push((name.to_string(), value)),
        }
    }

    /// Append features with `suffix` added to each name
    pub fn append_suffixed(&mut self, features: Vec<(String, f64)>, suffix: &str) {
        for (name, value) in features {
            self.set(&format!("{}{}", name, suffix), value);
        }
    }
}

/// Feature rows in segment order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Numeric feature names in first-seen order
    pub fn feature_columns(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut columns = Vec::new();
        for row in &self.rows {
            for (name, _) in &row.features {
                if seen.insert(name.as_str()) {
                    columns.push(name.clone());
                }
            }
        }
        columns
    }

    /// Whitelisted metadata names present on any row
    pub fn label_columns(&self) -> Vec<String> {
        self.rows
            .iter()
            .flat_map(|row| row.identity.labels.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Header: identity, metadata, then feature columns
    pub fn columns(&self) -> Vec<String> {
        SegmentIdentity::COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.label_columns())
            .chain(self.feature_columns())
            .collect()
    }

    /// Rows rendered as text, aligned with `columns()`; missing cells are empty
    pub fn rows_as_strings(&self) -> Vec<Vec<String>> {
        let labels = self.label_columns();
        let features = self.feature_columns();

        self.rows
            .iter()
            .map(|row| {
                let mut cells: Vec<String> = row.identity.values().into_iter().collect();
                cells.extend(
                    labels
                        .iter()
                        .map(|l| row.identity.labels.get(l).cloned().unwrap_or_default()),
                );
                cells.extend(
                    features
                        .iter()
                        .map(|f| row.get(f).map(|v| v.to_string()).unwrap_or_default()),
                );
                cells
            })
            .collect()
    }

    /// Values of one feature column, `None` unless every row carries it
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        self.rows.iter().map(|row| row.get(name)).collect()
    }

    /// Overwrite or add a feature column
    pub fn set_column(&mut self, name: &str, values: &[f64]) -> EegResult<()> {
        if values.len() != self.rows.len() {
            return Err(computation_error!(
                "column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            ));
        }
        for (row, &value) in self.rows.iter_mut().zip(values) {
            row.set(name, value);
        }
        Ok(())
    }
}

/// Computes band powers and ratios for segments
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn psd(&self, segment: &[f64], sampling_rate: f64) -> EegResult<Psd> {
        welch(segment, sampling_rate, self.config.nperseg)
    }

    /// Band powers, total power and ratios of a spectrum
    pub fn spectral_features(&self, psd: &Psd) -> EegResult<Vec<(String, f64)>> {
        let total = psd.total_power();
        if !total.is_finite() {
            return Err(computation_error!("total spectral power is not finite"));
        }
        if total <= 0.0 {
            return Err(computation_error!("total spectral power is zero"));
        }

        let mut features: Vec<(String, f64)> = self
            .config
            .bands
            .iter()
            .map(|band| (band.name.clone(), psd.band_power(band)))
            .collect();
        features.push(("total_power".to_string(), total));

        if self.config.ratios {
            let power = |name: &str| {
                features
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|&(_, v)| v)
                    .ok_or_else(|| computation_error!("band '{}' is not configured", name))
            };
            let theta = power("theta")?;
            let alpha = power("alpha")?;
            let beta = power("beta")?;

            let ratios = [
                ("theta_beta", ratio(theta, beta, "theta_beta")?),
                ("alpha_theta", ratio(alpha, theta, "alpha_theta")?),
                ("beta_alpha", ratio(beta, alpha, "beta_alpha")?),
                ("engagement", ratio(beta, alpha + theta, "engagement")?),
            ];
            features.extend(ratios.iter().map(|&(n, v)| (n.to_string(), v)));
        }

        Ok(features)
    }

    /// Features of a raw segment without identity
    pub fn segment_features(
        &self,
        segment: &[f64],
        sampling_rate: f64,
    ) -> EegResult<Vec<(String, f64)>> {
        let psd = self.psd(segment, sampling_rate)?;
        self.spectral_features(&psd)
    }

    /// Full feature row for a segment
    pub fn extract(
        &self,
        segment: &[f64],
        sampling_rate: f64,
        identity: SegmentIdentity,
    ) -> EegResult<FeatureRow> {
        let mut row = FeatureRow::new(identity);
        row.features = self.segment_features(segment, sampling_rate)?;
        Ok(row)
    }
}

fn ratio(numerator: f64, denominator: f64, name: &str) -> EegResult<f64> {
    if denominator <= 0.0 {
        return Err(computation_error!("{} ratio has a zero denominator", name));
    }
    Ok(numerator / denominator)
}

/// Band features of a precomputed spectrum using the standard EEG bands
pub fn extract_band_features(
    frequencies: &[f64],
    psd: &[f64],
    identity: SegmentIdentity,
) -> EegResult<FeatureRow> {
    let spectrum = Psd::new(frequencies.to_vec(), psd.to_vec())?;
    let mut row = FeatureRow::new(identity);
    row.features = FeatureExtractor::default().spectral_features(&spectrum)?;
    Ok(row)
}
