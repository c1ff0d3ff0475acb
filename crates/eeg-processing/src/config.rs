//! Configuration management for the feature pipeline

use crate::artifacts::{ArtifactMethod, ArtifactSpec};
use crate::features::FeatureConfig;
use crate::filters::FilterConfig;
use crate::postprocess::{NormalizationMethod, PostProcessConfig};
use crate::reshape::RecordConfig;
use eeg_core::{config_error, EegError, EegResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything one pipeline run needs, passed explicitly per call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Samples per second; also the required waveform length
    pub sampling_rate: u32,
    /// Record field mapping
    pub records: RecordConfig,
    /// Segment cleaning, `None` keeps raw segments
    pub filter: Option<FilterConfig>,
    /// Artifact gate, `None` keeps every segment
    pub artifact: Option<ArtifactMethod>,
    /// Spectral features
    pub features: FeatureConfig,
    /// Temporal smoothing and normalization, `None` leaves the table as extracted
    pub postprocess: Option<PostProcessConfig>,
    /// Fan per-segment work out over the rayon pool
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 256,
            records: RecordConfig::default(),
            filter: Some(FilterConfig::default()),
            artifact: Some(ArtifactMethod::amplitude()),
            features: FeatureConfig::default(),
            postprocess: None,
            parallel: false,
        }
    }
}

/// Preset configurations for common scenarios
impl PipelineConfig {
    /// Unfiltered features, no gate
    pub fn raw() -> Self {
        Self {
            filter: None,
            artifact: None,
            ..Self::default()
        }
    }

    /// Arousal analysis: strict amplitude gate, smoothed and normalized gamma
    pub fn arousal() -> Self {
        Self {
            artifact: Some(ArtifactMethod::Amplitude { amp_thresh: 20.0 }),
            postprocess: Some(PostProcessConfig::default().normalize(
                &["gamma_fil", "gamma1_fil", "gamma2_fil"],
                NormalizationMethod::MinMax,
            )),
            ..Self::default()
        }
    }

    pub fn with_sampling_rate(mut self, sampling_rate: u32) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    pub fn with_artifact(mut self, method: Option<ArtifactMethod>) -> Self {
        self.artifact = method;
        self
    }

    pub fn with_filter(mut self, filter: Option<FilterConfig>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_postprocess(mut self, postprocess: Option<PostProcessConfig>) -> Self {
        self.postprocess = postprocess;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn sampling_rate_hz(&self) -> f64 {
        f64::from(self.sampling_rate)
    }

    /// Validate the whole configuration before any data is processed
    pub fn validate(&self) -> EegResult<()> {
        if self.sampling_rate == 0 {
            return Err(EegError::InvalidSamplingRate { rate: 0.0 });
        }
        let fs = self.sampling_rate_hz();

        if self.records.waveform_key.is_empty() {
            return Err(config_error!("Waveform key must not be empty"));
        }
        if let Some(filter) = &self.filter {
            filter.validate(fs)?;
        }
        if let Some(artifact) = &self.artifact {
            artifact.validate()?;
        }
        self.features.validate(fs)?;
        if let Some(postprocess) = &self.postprocess {
            postprocess.validate()?;
        }

        Ok(())
    }

    /// Save configuration to JSON
    pub fn to_json(&self) -> EegResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate configuration from JSON
    ///
    /// The artifact method is resolved by name here rather than inside serde,
    /// so an unknown method is a configuration error, not a parse error.
    pub fn from_json(json: &str) -> EegResult<Self> {
        let mut value: Value = serde_json::from_str(json)?;
        let artifact = value.as_object_mut().and_then(|o| o.remove("artifact"));

        let mut config: Self = serde_json::from_value(value)?;
        match artifact {
            None => {}
            Some(Value::Null) => config.artifact = None,
            Some(spec) => {
                let spec: ArtifactSpec = serde_json::from_value(spec)?;
                config.artifact = Some(ArtifactMethod::try_from(spec)?);
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(PipelineConfig::raw().validate().is_ok());

        let arousal = PipelineConfig::arousal();
        assert!(arousal.validate().is_ok());
        assert_eq!(
            arousal.artifact,
            Some(ArtifactMethod::Amplitude { amp_thresh: 20.0 })
        );
    }

    #[test]
    fn test_zero_sampling_rate() {
        let err = PipelineConfig::default()
            .with_sampling_rate(0)
            .validate()
            .unwrap_err();
        assert_eq!(err, EegError::InvalidSamplingRate { rate: 0.0 });
    }

    #[test]
    fn test_low_sampling_rate_rejects_bands() {
        // 45Hz band edge is past Nyquist at 64Hz
        assert!(PipelineConfig::default().with_sampling_rate(64).validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PipelineConfig::arousal().with_parallel(true);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"method\": \"amplitude\""));

        let loaded = PipelineConfig::from_json(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"sampling_rate": 128, "artifact": {"method": "zscore", "z_thresh": 4}}"#,
        )
        .unwrap();

        assert_eq!(config.sampling_rate, 128);
        assert_eq!(config.artifact, Some(ArtifactMethod::ZScore { z_thresh: 4.0 }));
        assert_eq!(config.filter, Some(FilterConfig::default()));
        assert_eq!(config.records.waveform_key, "waveformRIGHT_TEMP");
    }

    #[test]
    fn test_unknown_method_in_json() {
        let err = PipelineConfig::from_json(r#"{"artifact": {"method": "threshold"}}"#).unwrap_err();
        assert!(matches!(err, EegError::Configuration { .. }));
        assert!(err.to_string().contains("threshold"));

        let err =
            PipelineConfig::from_json(r#"{"artifact": {"method": "zscore", "amp_thresh": 5}}"#)
                .unwrap_err();
        assert!(matches!(err, EegError::Configuration { .. }));
    }

    #[test]
    fn test_artifact_null_and_absent() {
        let config = PipelineConfig::from_json(r#"{"artifact": null}"#).unwrap();
        assert_eq!(config.artifact, None);

        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config.artifact, Some(ArtifactMethod::amplitude()));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = PipelineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, EegError::Serialization { .. }));
    }

    #[test]
    fn test_bad_alpha_in_json() {
        let err = PipelineConfig::from_json(r#"{"postprocess": {"alpha": 0}}"#).unwrap_err();
        assert!(matches!(err, EegError::Configuration { .. }));
    }
}
