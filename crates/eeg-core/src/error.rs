//! Error handling for the EEG feature pipeline
//!
//! Three failure families matter to callers: configuration problems (fatal,
//! reported before any processing), malformed records (dropped at reshaping)
//! and numeric degeneracy (scoped to one segment).

use core::fmt;

/// Result type alias for pipeline operations
pub type EegResult<T> = Result<T, EegError>;

/// Error type for all pipeline operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EegError {
    /// Invalid pipeline or stage configuration
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// Sampling rate that cannot drive the pipeline
    InvalidSamplingRate {
        /// Provided sampling rate
        rate: f64,
    },

    /// Record that cannot be turned into a segment
    MalformedRecord {
        /// What was wrong with the record
        reason: String,
    },

    /// Numeric failure while processing one segment
    Computation {
        /// Description of the degenerate input or result
        reason: String,
    },

    /// Timestamp string that could not be parsed
    InvalidTimestamp {
        /// The offending value
        value: String,
    },

    /// Serialization/deserialization error
    Serialization {
        /// Serialization error description
        reason: String,
    },
}

impl EegError {
    /// Whether this error must abort a run instead of dropping one record or segment
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EegError::Configuration { .. }
                | EegError::InvalidSamplingRate { .. }
                | EegError::Serialization { .. }
        )
    }
}

impl fmt::Display for EegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EegError::Configuration { message } => {
                write!(f, "Invalid configuration: {}", message)
            }
            EegError::InvalidSamplingRate { rate } => {
                write!(f, "Invalid sampling rate: {}Hz, must be a positive integer", rate)
            }
            EegError::MalformedRecord { reason } => {
                write!(f, "Malformed record: {}", reason)
            }
            EegError::Computation { reason } => {
                write!(f, "Computation error: {}", reason)
            }
            EegError::InvalidTimestamp { value } => {
                write!(f, "Invalid timestamp: '{}'", value)
            }
            EegError::Serialization { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
        }
    }
}

impl std::error::Error for EegError {}

impl From<serde_json::Error> for EegError {
    fn from(err: serde_json::Error) -> Self {
        EegError::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)+) => {
        $crate::error::EegError::Configuration {
            message: format!($($arg)+),
        }
    };
}

/// Convenience macro for creating computation errors
#[macro_export]
macro_rules! computation_error {
    ($($arg:tt)+) => {
        $crate::error::EegError::Computation {
            reason: format!($($arg)+),
        }
    };
}
