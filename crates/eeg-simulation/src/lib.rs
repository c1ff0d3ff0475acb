//! EEG-Simulation: Synthetic EEG record generation
//!
//! Seeded raw records for tests, demos and the command-line driver.

pub mod eeg_simulator;
pub mod signal_patterns;

pub use eeg_simulator::*;
pub use signal_patterns::*;
