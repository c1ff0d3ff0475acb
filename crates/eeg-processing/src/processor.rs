//! Core segment processor trait

use eeg_core::EegResult;

/// A length-preserving transform applied to one segment
///
/// Processors are stateless between calls so that independent segments can
/// be handled on different threads.
pub trait SegmentProcessor: Send + Sync {
    /// Transform a segment sampled at `sampling_rate` Hz
    fn process(&self, segment: &[f64], sampling_rate: f64) -> EegResult<Vec<f64>>;

    /// Get processor name/identifier
    fn name(&self) -> &str;

    /// Shortest segment the processor can handle
    fn min_length(&self) -> usize {
        1
    }

    /// Check if processor can handle a segment of the given length
    fn can_process(&self, len: usize) -> bool {
        len >= self.min_length()
    }
}
