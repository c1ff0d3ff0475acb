//! Pre-defined EEG rhythm patterns for synthetic recordings

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Dominant rhythm of a simulated recording, amplitudes in µV
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalPattern {
    /// Eyes-closed rest, strong 10Hz alpha
    Resting { alpha_amplitude: f64 },
    /// Alert attention, 20Hz beta over weaker alpha
    Focused { beta_amplitude: f64 },
    /// Drowsiness, 6Hz theta
    Drowsy { theta_amplitude: f64 },
    /// Muscle contamination, broadband 30-45Hz activity over alpha
    Muscle { gamma_amplitude: f64 },
    /// Single sinusoid
    Tone { frequency: f64, amplitude: f64 },
}

impl SignalPattern {
    /// (frequency Hz, amplitude µV) components of the pattern
    pub fn components(&self) -> Vec<(f64, f64)> {
        match *self {
            SignalPattern::Resting { alpha_amplitude } => {
                vec![(10.0, alpha_amplitude), (5.0, alpha_amplitude * 0.2)]
            }
            SignalPattern::Focused { beta_amplitude } => {
                vec![(20.0, beta_amplitude), (10.0, beta_amplitude * 0.3)]
            }
            SignalPattern::Drowsy { theta_amplitude } => {
                vec![(6.0, theta_amplitude), (2.0, theta_amplitude * 0.5)]
            }
            SignalPattern::Muscle { gamma_amplitude } => vec![
                (10.0, gamma_amplitude * 0.3),
                (33.0, gamma_amplitude),
                (38.0, gamma_amplitude),
                (43.0, gamma_amplitude),
            ],
            SignalPattern::Tone {
                frequency,
                amplitude,
            } => vec![(frequency, amplitude)],
        }
    }

    /// Noise-free value at `time` seconds
    pub fn value_at_time(&self, time: f64) -> f64 {
        self.components()
            .iter()
            .map(|&(freq, amp)| amp * (2.0 * PI * freq * time).sin())
            .sum()
    }

    /// Get pattern description
    pub fn description(&self) -> &'static str {
        match self {
            SignalPattern::Resting { .. } => "Resting alpha",
            SignalPattern::Focused { .. } => "Focused beta",
            SignalPattern::Drowsy { .. } => "Drowsy theta",
            SignalPattern::Muscle { .. } => "Muscle artifact",
            SignalPattern::Tone { .. } => "Pure tone",
        }
    }

    /// Create common preset patterns
    pub fn presets() -> Vec<(&'static str, SignalPattern)> {
        vec![
            ("Calm", SignalPattern::Resting { alpha_amplitude: 10.0 }),
            ("Stressed", SignalPattern::Focused { beta_amplitude: 6.0 }),
            ("Tired", SignalPattern::Drowsy { theta_amplitude: 12.0 }),
            ("Jaw Clench", SignalPattern::Muscle { gamma_amplitude: 8.0 }),
        ]
    }
}

impl Default for SignalPattern {
    fn default() -> Self {
        SignalPattern::Resting {
            alpha_amplitude: 10.0,
        }
    }
}
