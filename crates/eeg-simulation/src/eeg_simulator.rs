//! Synthetic EEG record generator
//!
//! Produces raw records shaped like the documents of the record store: one
//! second of samples under the waveform key, a UTC timestamp and session
//! metadata. Seeded runs are reproducible.

use crate::signal_patterns::SignalPattern;
use chrono::{DateTime, Duration, Utc};
use eeg_core::{
    config_error, format_utc, parse_utc, EegError, EegResult, RawRecord, SessionMetadata,
    DEFAULT_WAVEFORM_KEY,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Noise and contamination of simulated records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Gaussian background standard deviation (µV)
    pub gaussian_std: f64,
    /// Slow drift amplitude (µV)
    pub baseline_wander: f64,
    /// Chance per record of a motion spike
    pub spike_prob: f64,
    /// Magnitude of a motion spike (µV)
    pub spike_amplitude: f64,
    /// Power line interference frequency
    pub powerline_freq: Option<f64>,
    /// Power line interference amplitude (µV)
    pub powerline_amplitude: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std: 2.0,
            baseline_wander: 1.0,
            spike_prob: 0.0,
            spike_amplitude: 250.0,
            powerline_freq: Some(60.0),
            powerline_amplitude: 1.0,
        }
    }
}

/// Configuration for EEG record simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EegSimConfig {
    /// Sampling rate in Hz; each record holds this many samples
    pub sampling_rate: u32,
    pub pattern: SignalPattern,
    pub noise: NoiseConfig,
    /// Timestamp of the first record
    pub start_time: String,
    /// Seconds between consecutive records
    pub record_interval_s: f64,
    pub waveform_key: String,
    /// Owner of the records
    pub document_name: String,
    /// Session the records belong to
    pub session: Option<SessionMetadata>,
    /// Truncate every n-th record's waveform
    pub malformed_every: Option<usize>,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for EegSimConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 256,
            pattern: SignalPattern::default(),
            noise: NoiseConfig::default(),
            start_time: "2025-07-01T10:00:00Z".to_string(),
            record_interval_s: 1.0,
            waveform_key: DEFAULT_WAVEFORM_KEY.to_string(),
            document_name: "subject@example.com".to_string(),
            session: Some(SessionMetadata {
                timestamp: Some("2025-07-01T10:00:00Z".to_string()),
                duration_minutes: Some(10.0),
                session_type: Some("calm".to_string()),
                session_id: Some("session-001".to_string()),
                ..Default::default()
            }),
            malformed_every: None,
            seed: None,
        }
    }
}

impl EegSimConfig {
    pub fn validate(&self) -> EegResult<()> {
        if self.sampling_rate == 0 {
            return Err(EegError::InvalidSamplingRate { rate: 0.0 });
        }
        if !(self.noise.gaussian_std.is_finite() && self.noise.gaussian_std >= 0.0) {
            return Err(config_error!(
                "Noise standard deviation must be non-negative, got {}",
                self.noise.gaussian_std
            ));
        }
        if !(0.0..=1.0).contains(&self.noise.spike_prob) {
            return Err(config_error!(
                "Spike probability must lie in [0, 1], got {}",
                self.noise.spike_prob
            ));
        }
        if !(self.record_interval_s.is_finite() && self.record_interval_s > 0.0) {
            return Err(config_error!(
                "Record interval must be positive, got {}",
                self.record_interval_s
            ));
        }
        if self.malformed_every == Some(0) {
            return Err(config_error!("malformed_every must be at least 1"));
        }
        parse_utc(&self.start_time)?;
        Ok(())
    }
}

/// EEG record simulator
pub struct EegSimulator {
    config: EegSimConfig,
    rng: StdRng,
    normal_dist: Normal<f64>,
    start: DateTime<Utc>,
    records_generated: usize,
}

impl EegSimulator {
    /// Create new simulator with configuration
    pub fn new(config: EegSimConfig) -> EegResult<Self> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default()
        });

        let normal_dist = Normal::new(0.0, config.noise.gaussian_std)
            .map_err(|e| config_error!("Failed to create normal distribution: {}", e))?;
        let start = parse_utc(&config.start_time)?;

        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            normal_dist,
            start,
            records_generated: 0,
        })
    }

    /// One second of samples starting at `time_offset` seconds
    pub fn generate_waveform(&mut self, time_offset: f64) -> Vec<f64> {
        let fs = f64::from(self.config.sampling_rate);
        let noise = &self.config.noise;

        let mut samples: Vec<f64> = (0..self.config.sampling_rate)
            .map(|i| {
                let time = time_offset + f64::from(i) / fs;
                let mut value = self.config.pattern.value_at_time(time);

                value += self.normal_dist.sample(&mut self.rng);

                // Slow drift
                value += noise.baseline_wander * (2.0 * std::f64::consts::PI * 0.1 * time).sin();

                if let Some(freq) = noise.powerline_freq {
                    value += noise.powerline_amplitude
                        * (2.0 * std::f64::consts::PI * freq * time).sin();
                }
                value
            })
            .collect();

        if self.rng.gen::<f64>() < noise.spike_prob {
            let at = self.rng.gen_range(0..samples.len());
            let sign = if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
            samples[at] = sign * noise.spike_amplitude;
        }

        samples
    }

    /// Next record in the sequence
    pub fn next_record(&mut self) -> RawRecord {
        let index = self.records_generated;
        let offset = index as f64 * self.config.record_interval_s;
        let timestamp = self.start + Duration::microseconds((offset * 1e6).round() as i64);

        let mut waveform = self.generate_waveform(offset);
        if let Some(every) = self.config.malformed_every {
            if (index + 1) % every == 0 {
                waveform.truncate(waveform.len() / 2);
            }
        }

        let mut record = RawRecord::new()
            .with_field(&self.config.waveform_key, waveform)
            .with_field("timestamp", format_utc(&timestamp));

        match &self.config.session {
            Some(session) => session.annotate(&mut record, &self.config.document_name),
            None => record.insert("document_name", self.config.document_name.as_str()),
        }

        self.records_generated += 1;
        record
    }

    /// Generate `count` consecutive records
    pub fn generate_records(&mut self, count: usize) -> Vec<RawRecord> {
        (0..count).map(|_| self.next_record()).collect()
    }

    /// Restart timestamps from the configured start time
    pub fn reset_time(&mut self) {
        self.records_generated = 0;
    }

    /// Get current configuration
    pub fn config(&self) -> &EegSimConfig {
        &self.config
    }
}

/// Seeded records with default settings
pub fn simulate_records(count: usize, seed: u64) -> EegResult<Vec<RawRecord>> {
    let config = EegSimConfig {
        seed: Some(seed),
        ..Default::default()
    };
    Ok(EegSimulator::new(config)?.generate_records(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_core::string_to_utc_seconds;

    fn seeded(seed: u64) -> EegSimConfig {
        EegSimConfig {
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_records_have_expected_shape() {
        let mut simulator = EegSimulator::new(seeded(1)).unwrap();
        let records = simulator.generate_records(3);

        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.waveform(DEFAULT_WAVEFORM_KEY).unwrap().len(), 256);
            assert_eq!(record.text_field("session_type").as_deref(), Some("calm"));
            assert_eq!(
                record.text_field("document_name").as_deref(),
                Some("subject@example.com")
            );
        }

        let t0 = string_to_utc_seconds(records[0].timestamp().unwrap()).unwrap();
        let t2 = string_to_utc_seconds(records[2].timestamp().unwrap()).unwrap();
        assert!((t2 - t0 - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = simulate_records(2, 42).unwrap();
        let b = simulate_records(2, 42).unwrap();
        let c = simulate_records(2, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_malformed_every() {
        let config = EegSimConfig {
            malformed_every: Some(3),
            ..seeded(5)
        };
        let records = EegSimulator::new(config).unwrap().generate_records(6);
        let lengths: Vec<usize> = records
            .iter()
            .map(|r| r.waveform(DEFAULT_WAVEFORM_KEY).unwrap().len())
            .collect();
        assert_eq!(lengths, vec![256, 256, 128, 256, 256, 128]);
    }

    #[test]
    fn test_spikes() {
        let mut config = seeded(9);
        config.noise.spike_prob = 1.0;
        let record = EegSimulator::new(config).unwrap().next_record();
        let peak = record
            .waveform(DEFAULT_WAVEFORM_KEY)
            .unwrap()
            .iter()
            .fold(0.0f64, |m, x| m.max(x.abs()));
        assert_eq!(peak, 250.0);
    }

    #[test]
    fn test_without_session() {
        let config = EegSimConfig {
            session: None,
            ..seeded(3)
        };
        let record = EegSimulator::new(config).unwrap().next_record();
        assert!(record.get("session_type").is_none());
        assert!(record.get("document_name").is_some());
    }

    #[test]
    fn test_invalid_config() {
        let config = EegSimConfig {
            sampling_rate: 0,
            ..Default::default()
        };
        assert!(EegSimulator::new(config).is_err());

        let config = EegSimConfig {
            start_time: "soon".to_string(),
            ..Default::default()
        };
        assert!(EegSimulator::new(config).is_err());
    }
}
