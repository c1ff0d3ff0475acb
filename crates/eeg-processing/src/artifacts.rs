//! Artifact detection for EEG segments
//!
//! A segment is either contaminated or clean. The criterion is picked by name
//! from configuration, so the mapping from names to detectors is explicit and
//! unknown names are rejected before any data is touched.

use crate::features::{compute_psd, FrequencyBand};
use eeg_core::{computation_error, config_error, EegError, EegResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Share of samples allowed beyond the z-score threshold
pub const ZSCORE_OUTLIER_FRACTION: f64 = 0.05;

/// Artifact detection strategy and its thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArtifactSpec", into = "ArtifactSpec")]
pub enum ArtifactMethod {
    /// Any sample whose magnitude exceeds `amp_thresh`
    Amplitude { amp_thresh: f64 },
    /// Too many samples beyond `z_thresh` standard deviations
    ZScore { z_thresh: f64 },
    /// Gamma share of total power above `gamma_power_thresh`, optionally
    /// also requiring absolute gamma power above `min_gamma_power`
    GammaPower {
        gamma_power_thresh: f64,
        min_gamma_power: Option<f64>,
    },
}

/// Flat serialized form: `{"method": "zscore", "z_thresh": 3.0}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub method: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, f64>,
}

impl ArtifactMethod {
    pub const AMPLITUDE: &'static str = "amplitude";
    pub const ZSCORE: &'static str = "zscore";
    pub const GAMMA_POWER: &'static str = "gamma_power";

    /// Amplitude check with the default 100 µV threshold
    pub fn amplitude() -> Self {
        ArtifactMethod::Amplitude { amp_thresh: 100.0 }
    }

    pub fn zscore() -> Self {
        ArtifactMethod::ZScore { z_thresh: 3.0 }
    }

    pub fn gamma_power() -> Self {
        ArtifactMethod::GammaPower {
            gamma_power_thresh: 0.25,
            min_gamma_power: None,
        }
    }

    /// Resolve a method by name, filling unspecified thresholds with defaults
    pub fn from_name(name: &str, params: &BTreeMap<String, f64>) -> EegResult<Self> {
        let param = |key: &str, default: f64| params.get(key).copied().unwrap_or(default);

        let method = match name {
            Self::AMPLITUDE => {
                check_params(name, params, &["amp_thresh"])?;
                ArtifactMethod::Amplitude {
                    amp_thresh: param("amp_thresh", 100.0),
                }
            }
            Self::ZSCORE => {
                check_params(name, params, &["z_thresh"])?;
                ArtifactMethod::ZScore {
                    z_thresh: param("z_thresh", 3.0),
                }
            }
            Self::GAMMA_POWER => {
                check_params(name, params, &["gamma_power_thresh", "min_gamma_power"])?;
                ArtifactMethod::GammaPower {
                    gamma_power_thresh: param("gamma_power_thresh", 0.25),
                    min_gamma_power: params.get("min_gamma_power").copied(),
                }
            }
            other => {
                return Err(config_error!(
                    "Unknown artifact detection method '{}' (expected one of: {}, {}, {})",
                    other,
                    Self::AMPLITUDE,
                    Self::ZSCORE,
                    Self::GAMMA_POWER
                ))
            }
        };

        method.validate()?;
        Ok(method)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactMethod::Amplitude { .. } => Self::AMPLITUDE,
            ArtifactMethod::ZScore { .. } => Self::ZSCORE,
            ArtifactMethod::GammaPower { .. } => Self::GAMMA_POWER,
        }
    }

    /// Thresholds keyed by parameter name
    pub fn params(&self) -> BTreeMap<String, f64> {
        let mut params = BTreeMap::new();
        match *self {
            ArtifactMethod::Amplitude { amp_thresh } => {
                params.insert("amp_thresh".to_string(), amp_thresh);
            }
            ArtifactMethod::ZScore { z_thresh } => {
                params.insert("z_thresh".to_string(), z_thresh);
            }
            ArtifactMethod::GammaPower {
                gamma_power_thresh,
                min_gamma_power,
            } => {
                params.insert("gamma_power_thresh".to_string(), gamma_power_thresh);
                if let Some(min) = min_gamma_power {
                    params.insert("min_gamma_power".to_string(), min);
                }
            }
        }
        params
    }

    pub fn validate(&self) -> EegResult<()> {
        for (key, value) in self.params() {
            if !value.is_finite() || value < 0.0 {
                return Err(config_error!(
                    "Artifact parameter '{}' must be a finite non-negative number, got {}",
                    key,
                    value
                ));
            }
        }
        Ok(())
    }

    /// Classify a segment; `true` means contaminated
    pub fn detect(&self, segment: &[f64], sampling_rate: f64) -> EegResult<bool> {
        if segment.is_empty() {
            return Err(computation_error!("cannot check an empty segment for artifacts"));
        }

        match *self {
            ArtifactMethod::Amplitude { amp_thresh } => {
                Ok(segment.iter().any(|x| x.abs() > amp_thresh))
            }
            ArtifactMethod::ZScore { z_thresh } => Ok(zscore_outliers(segment, z_thresh)),
            ArtifactMethod::GammaPower {
                gamma_power_thresh,
                min_gamma_power,
            } => {
                let psd = compute_psd(segment, sampling_rate)?;
                let total = psd.total_power();
                if total <= 0.0 {
                    return Ok(false);
                }

                let gamma = psd.band_power(&FrequencyBand::gamma());
                let above_floor = min_gamma_power.map_or(true, |min| gamma > min);
                Ok(gamma / total > gamma_power_thresh && above_floor)
            }
        }
    }
}

fn check_params(name: &str, params: &BTreeMap<String, f64>, allowed: &[&str]) -> EegResult<()> {
    match params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(config_error!(
            "Unknown parameter '{}' for artifact detection method '{}'",
            key,
            name
        )),
        None => Ok(()),
    }
}

/// More than `floor(0.05 * N)` samples beyond the threshold
fn zscore_outliers(segment: &[f64], z_thresh: f64) -> bool {
    let n = segment.len() as f64;
    let mean = segment.iter().sum::<f64>() / n;
    let variance = segment.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    // A constant segment has no outliers
    if std == 0.0 || !std.is_finite() {
        return false;
    }

    let limit = (n * ZSCORE_OUTLIER_FRACTION).floor() as usize;
    let outliers = segment
        .iter()
        .filter(|&&x| ((x - mean) / std).abs() > z_thresh)
        .count();

    outliers > limit
}

/// Classify a segment with the given method
pub fn detect_artifacts(segment: &[f64], sampling_rate: f64, method: &ArtifactMethod) -> EegResult<bool> {
    method.detect(segment, sampling_rate)
}

impl Default for ArtifactMethod {
    fn default() -> Self {
        Self::amplitude()
    }
}

impl fmt::Display for ArtifactMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        for (key, value) in self.params() {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

impl TryFrom<ArtifactSpec> for ArtifactMethod {
    type Error = EegError;

    fn try_from(spec: ArtifactSpec) -> Result<Self, Self::Error> {
        ArtifactMethod::from_name(&spec.method, &spec.params)
    }
}

impl From<ArtifactMethod> for ArtifactSpec {
    fn from(method: ArtifactMethod) -> Self {
        ArtifactSpec {
            method: method.name().to_string(),
            params: method.params(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    const FS: f64 = 256.0;

    fn tone(freq: f64, amplitude: f64) -> Vec<f64> {
        (0..256)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    fn noise(seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..256).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn test_amplitude_detection() {
        let clean: Vec<f64> = (0..256)
            .map(|i| (2.0 * PI * 10.0 * i as f64 / 255.0).sin())
            .collect();
        let mut noisy = clean.clone();
        noisy[100] = 100.0;

        let method = ArtifactMethod::Amplitude { amp_thresh: 50.0 };
        assert!(!method.detect(&clean, FS).unwrap());
        assert!(method.detect(&noisy, FS).unwrap());

        // Strictly greater than the threshold
        noisy[100] = 50.0;
        assert!(!method.detect(&noisy, FS).unwrap());
    }

    #[test]
    fn test_zscore_boundary() {
        let mut segment: Vec<f64> = (0..256)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();

        // floor(0.05 * 256) = 12 outliers are tolerated
        for i in 0..12 {
            segment[i * 20] = 20.0;
        }
        assert!(!detect_artifacts(&segment, FS, &ArtifactMethod::zscore()).unwrap());

        segment[240] = 20.0;
        assert!(detect_artifacts(&segment, FS, &ArtifactMethod::zscore()).unwrap());
    }

    #[test]
    fn test_zscore_constant_segment() {
        assert!(!ArtifactMethod::zscore().detect(&vec![7.0; 256], FS).unwrap());
    }

    #[test]
    fn test_gamma_power_detection() {
        let pure_gamma = tone(40.0, 1.0);
        let eeg_like = noise(42);
        let mixed: Vec<f64> = eeg_like.iter().zip(&pure_gamma).map(|(a, b)| a + b).collect();

        let cases = [
            (&pure_gamma, true, 0.25, Some(0.1)),
            (&eeg_like, false, 0.25, None),
            (&mixed, true, 0.2, Some(0.05)),
        ];

        for (signal, expected, thresh, min) in cases {
            let method = ArtifactMethod::GammaPower {
                gamma_power_thresh: thresh,
                min_gamma_power: min,
            };
            assert_eq!(method.detect(signal, FS).unwrap(), expected, "{}", method);
        }
    }

    #[test]
    fn test_gamma_floor_is_conjunctive() {
        // Ratio near 1, but absolute gamma power only ~0.005
        let faint = tone(40.0, 0.1);
        let ratio_only = ArtifactMethod::gamma_power();
        let with_floor = ArtifactMethod::GammaPower {
            gamma_power_thresh: 0.25,
            min_gamma_power: Some(0.1),
        };

        assert!(ratio_only.detect(&faint, FS).unwrap());
        assert!(!with_floor.detect(&faint, FS).unwrap());
    }

    #[test]
    fn test_empty_segment() {
        for method in [
            ArtifactMethod::amplitude(),
            ArtifactMethod::zscore(),
            ArtifactMethod::gamma_power(),
        ] {
            let err = method.detect(&[], FS).unwrap_err();
            assert!(matches!(err, EegError::Computation { .. }));
        }
    }

    #[test]
    fn test_from_name() {
        let params = BTreeMap::from([("z_thresh".to_string(), 2.5)]);
        assert_eq!(
            ArtifactMethod::from_name("zscore", &params).unwrap(),
            ArtifactMethod::ZScore { z_thresh: 2.5 }
        );
        assert_eq!(
            ArtifactMethod::from_name("amplitude", &BTreeMap::new()).unwrap(),
            ArtifactMethod::amplitude()
        );

        let err = ArtifactMethod::from_name("wavelet", &BTreeMap::new()).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("wavelet"));

        let err = ArtifactMethod::from_name("amplitude", &params).unwrap_err();
        assert!(err.to_string().contains("z_thresh"));

        let negative = BTreeMap::from([("amp_thresh".to_string(), -1.0)]);
        assert!(ArtifactMethod::from_name("amplitude", &negative).is_err());
    }

    #[test]
    fn test_serde_flat_form() {
        let method: ArtifactMethod =
            serde_json::from_str(r#"{"method": "gamma_power", "min_gamma_power": 0.1}"#).unwrap();
        assert_eq!(
            method,
            ArtifactMethod::GammaPower {
                gamma_power_thresh: 0.25,
                min_gamma_power: Some(0.1)
            }
        );

        let json = serde_json::to_value(&ArtifactMethod::zscore()).unwrap();
        assert_eq!(json, serde_json::json!({"method": "zscore", "z_thresh": 3.0}));

        let unknown = serde_json::from_str::<ArtifactMethod>(r#"{"method": "ica"}"#);
        assert!(unknown.unwrap_err().to_string().contains("ica"));
    }
}
