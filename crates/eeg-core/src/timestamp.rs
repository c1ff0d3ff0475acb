//! Timestamp conversion for record and session times
//!
//! Record timestamps arrive as ISO-8601 strings in several shapes: with a
//! `Z` suffix, with an explicit offset, or naive. Naive values are taken as
//! UTC. Epoch values are carried as `f64` seconds with microsecond precision.

use crate::error::{EegError, EegResult};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Naive layouts accepted after the RFC 3339 attempt fails
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Offset-carrying layouts that RFC 3339 parsing rejects
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Parse a timestamp string into a UTC datetime
pub fn parse_utc(value: &str) -> EegResult<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(EegError::InvalidTimestamp {
        value: value.to_string(),
    })
}

/// Seconds since the Unix epoch, keeping microseconds
pub fn to_epoch_seconds(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1_000_000.0
}

/// Parse a timestamp string straight to epoch seconds
pub fn string_to_utc_seconds(value: &str) -> EegResult<f64> {
    parse_utc(value).map(|dt| to_epoch_seconds(&dt))
}

/// Format a UTC datetime the way the record store expects query bounds
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Format a naive datetime, treating it as UTC
pub fn format_naive_as_utc(naive: &NaiveDateTime) -> String {
    format_utc(&naive.and_utc())
}
