//! EEG-Core: Foundation types for the EEG feature pipeline
//!
//! Raw records, session metadata, timestamps and the shared error type.

pub mod error;
pub mod record;
pub mod timestamp;

pub use error::{EegError, EegResult};
pub use record::{RawRecord, SessionMetadata, DEFAULT_WAVEFORM_KEY, TIMESTAMP_KEY};
pub use timestamp::{format_utc, parse_utc, string_to_utc_seconds, to_epoch_seconds};
