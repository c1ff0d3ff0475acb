//! Raw records and session metadata handed over by the retrieval layer

use crate::error::{EegError, EegResult};
use crate::timestamp::{format_utc, parse_utc, to_epoch_seconds};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the record timestamp string
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Default key of the waveform array in stored documents
pub const DEFAULT_WAVEFORM_KEY: &str = "waveformRIGHT_TEMP";

/// One stored document: a waveform, a timestamp and free-form metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

impl RawRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already decoded JSON object
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field, replacing any previous value
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Raw access to a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Field names present on the record
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Timestamp string, if present and textual
    pub fn timestamp(&self) -> Option<&str> {
        self.fields.get(TIMESTAMP_KEY).and_then(Value::as_str)
    }

    /// Field rendered as text; numbers and booleans are stringified, null is absent
    pub fn text_field(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Decode the waveform array stored under `key`
    pub fn waveform(&self, key: &str) -> EegResult<Vec<f64>> {
        let values = self
            .fields
            .get(key)
            .ok_or_else(|| EegError::MalformedRecord {
                reason: format!("missing waveform field '{}'", key),
            })?
            .as_array()
            .ok_or_else(|| EegError::MalformedRecord {
                reason: format!("waveform field '{}' is not an array", key),
            })?;

        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_f64().ok_or_else(|| EegError::MalformedRecord {
                    reason: format!("waveform sample {} is not numeric", i),
                })
            })
            .collect()
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}

/// Session annotations owned by the session store
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    /// Session creation timestamp
    pub timestamp: Option<String>,
    /// Explicit session start
    pub start_time: Option<String>,
    /// Explicit session end
    pub end_time: Option<String>,
    /// Declared duration in minutes
    pub duration_minutes: Option<f64>,
    /// Session label (e.g. "calm", "stressed")
    pub session_type: Option<String>,
    /// Older label field used before `session_type`
    pub focus_type: Option<String>,
    /// Store identifier of the session document
    pub session_id: Option<String>,
}

impl SessionMetadata {
    /// Session label, preferring a non-empty `session_type` over `focus_type`
    pub fn kind(&self) -> Option<&str> {
        self.session_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.focus_type.as_deref().filter(|s| !s.is_empty()))
    }

    /// Whether both explicit bounds are recorded
    pub fn is_complete(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.start_time) && present(&self.end_time)
    }

    /// Resolve the UTC window covered by the session
    ///
    /// Explicit start/end win; otherwise the window runs from the session
    /// timestamp for the declared duration.
    pub fn time_range(&self) -> EegResult<(DateTime<Utc>, DateTime<Utc>)> {
        let (start, end) = if self.is_complete() {
            let start = parse_utc(self.start_time.as_deref().unwrap_or_default())?;
            let end = parse_utc(self.end_time.as_deref().unwrap_or_default())?;
            (start, end)
        } else {
            match (self.timestamp.as_deref(), self.duration_minutes) {
                (Some(ts), Some(minutes)) if minutes.is_finite() && minutes >= 0.0 => {
                    let start = parse_utc(ts)?;
                    let millis = (minutes * 60_000.0).round() as i64;
                    let end = Duration::try_milliseconds(millis)
                        .and_then(|d| start.checked_add_signed(d))
                        .ok_or_else(|| EegError::MalformedRecord {
                            reason: format!(
                                "session duration of {} minutes is out of range",
                                minutes
                            ),
                        })?;
                    (start, end)
                }
                _ => {
                    return Err(EegError::MalformedRecord {
                        reason: "session has neither start/end nor timestamp/duration".to_string(),
                    })
                }
            }
        };

        if end < start {
            return Err(EegError::MalformedRecord {
                reason: format!("session ends ({}) before it starts ({})", end, start),
            });
        }

        Ok((start, end))
    }

    /// Query bounds formatted for the record store
    pub fn formatted_range(&self) -> EegResult<(String, String)> {
        let (start, end) = self.time_range()?;
        Ok((format_utc(&start), format_utc(&end)))
    }

    /// Whether an epoch timestamp falls inside the session window (inclusive)
    pub fn contains(&self, utc_seconds: f64) -> EegResult<bool> {
        let (start, end) = self.time_range()?;
        Ok(utc_seconds >= to_epoch_seconds(&start) && utc_seconds <= to_epoch_seconds(&end))
    }

    /// Stamp a record with this session's fields
    pub fn annotate(&self, record: &mut RawRecord, document_name: &str) {
        let text = |v: &Option<String>| v.clone().map(Value::String).unwrap_or(Value::Null);

        record.insert("session_type", self.kind().unwrap_or_default());
        record.insert("document_name", document_name);
        record.insert("session_start", text(&self.start_time));
        record.insert("session_end", text(&self.end_time));
        record.insert(
            "session_duration",
            self.duration_minutes.map(Value::from).unwrap_or(Value::Null),
        );
        record.insert("session_timestamp", text(&self.timestamp));
        if let Some(id) = &self.session_id {
            record.insert("session_id", id.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_waveform_decoding() {
        let record = RawRecord::new()
            .with_field("timestamp", "2025-07-01T00:00:00Z")
            .with_field(DEFAULT_WAVEFORM_KEY, json!([1.0, 2, -3.5]));

        assert_eq!(record.waveform(DEFAULT_WAVEFORM_KEY).unwrap(), vec![1.0, 2.0, -3.5]);
        assert_eq!(record.timestamp(), Some("2025-07-01T00:00:00Z"));
    }

    #[test]
    fn test_malformed_waveform() {
        let missing = RawRecord::new();
        assert!(matches!(
            missing.waveform(DEFAULT_WAVEFORM_KEY),
            Err(EegError::MalformedRecord { .. })
        ));

        let text = RawRecord::new().with_field(DEFAULT_WAVEFORM_KEY, json!([1.0, "x"]));
        assert!(matches!(
            text.waveform(DEFAULT_WAVEFORM_KEY),
            Err(EegError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_text_field() {
        let record = RawRecord::new()
            .with_field("focus_type", "calm")
            .with_field("score", 10.5)
            .with_field("empty", Value::Null);

        assert_eq!(record.text_field("focus_type").as_deref(), Some("calm"));
        assert_eq!(record.text_field("score").as_deref(), Some("10.5"));
        assert_eq!(record.text_field("empty"), None);
        assert_eq!(record.text_field("absent"), None);
    }

    #[test]
    fn test_session_explicit_range() {
        let session = SessionMetadata {
            start_time: Some("2025-07-01T10:00:00Z".into()),
            end_time: Some("2025-07-01T10:30:00Z".into()),
            session_type: Some("calm".into()),
            ..Default::default()
        };

        let (start, end) = session.time_range().unwrap();
        assert_eq!((end - start).num_minutes(), 30);
        assert!(session.contains(to_epoch_seconds(&start) + 60.0).unwrap());
        assert!(!session.contains(to_epoch_seconds(&end) + 1.0).unwrap());
    }

    #[test]
    fn test_session_range_from_duration() {
        let session = SessionMetadata {
            timestamp: Some("2025-07-01T10:00:00Z".into()),
            duration_minutes: Some(15.0),
            focus_type: Some("stressed".into()),
            ..Default::default()
        };

        assert!(!session.is_complete());
        assert_eq!(session.kind(), Some("stressed"));

        let (start_fmt, end_fmt) = session.formatted_range().unwrap();
        assert_eq!(start_fmt, "2025-07-01T10:00:00.000000+00:00");
        assert_eq!(end_fmt, "2025-07-01T10:15:00.000000+00:00");
    }

    #[test]
    fn test_session_duration_out_of_range() {
        // Past the chrono range, then past the i64 millisecond range
        for minutes in [1e12, 1e15, f64::MAX] {
            let session = SessionMetadata {
                timestamp: Some("2025-07-01T10:00:00Z".into()),
                duration_minutes: Some(minutes),
                ..Default::default()
            };
            assert!(matches!(
                session.time_range(),
                Err(EegError::MalformedRecord { .. })
            ));
            assert!(session.contains(0.0).is_err());
        }
    }

    #[test]
    fn test_session_without_bounds() {
        let session = SessionMetadata::default();
        assert!(session.time_range().is_err());
    }

    #[test]
    fn test_session_kind_prefers_session_type() {
        let session = SessionMetadata {
            session_type: Some(String::new()),
            focus_type: Some("distracted".into()),
            ..Default::default()
        };
        assert_eq!(session.kind(), Some("distracted"));
    }

    #[test]
    fn test_annotate() {
        let session = SessionMetadata {
            timestamp: Some("2025-07-01T10:00:00Z".into()),
            start_time: Some("2025-07-01T10:00:00Z".into()),
            end_time: Some("2025-07-01T10:10:00Z".into()),
            duration_minutes: Some(10.0),
            session_type: Some("calm".into()),
            session_id: Some("abc".into()),
            ..Default::default()
        };

        let mut record = RawRecord::new();
        session.annotate(&mut record, "user@example.com");

        assert_eq!(record.text_field("session_type").as_deref(), Some("calm"));
        assert_eq!(record.text_field("document_name").as_deref(), Some("user@example.com"));
        assert_eq!(record.text_field("session_duration").as_deref(), Some("10.0"));
        assert_eq!(record.text_field("session_id").as_deref(), Some("abc"));
    }
}
