//! Zero-phase digital filters for EEG segments
//!
//! Filters are designed as cascades of second-order sections and applied
//! forward then backward, so the result has no group delay and stays aligned
//! with record timestamps. Edges are handled with odd-symmetric padding and
//! steady-state initial conditions.

use crate::processor::SegmentProcessor;
use eeg_core::{computation_error, config_error, EegResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::trace;

/// Segment filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Low band edge of the band-pass (Hz)
    pub low_cutoff: f64,
    /// High band edge of the band-pass (Hz)
    pub high_cutoff: f64,
    /// Butterworth order of each band edge (even)
    pub order: usize,
    /// Line-noise frequency to reject (Hz), `None` disables the notch
    pub notch_freq: Option<f64>,
    /// Notch quality factor
    pub notch_q: f64,
    /// Remove the least-squares line after filtering
    pub detrend: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            low_cutoff: 1.0,
            high_cutoff: 45.0,
            order: 4,
            notch_freq: Some(60.0),
            notch_q: 30.0,
            detrend: true,
        }
    }
}

impl FilterConfig {
    /// Create band-pass configuration with the default notch and detrend
    pub fn bandpass(low_cutoff: f64, high_cutoff: f64, order: usize) -> Self {
        Self {
            low_cutoff,
            high_cutoff,
            order,
            ..Self::default()
        }
    }

    /// Replace the notch stage
    pub fn with_notch(mut self, freq: f64, q: f64) -> Self {
        self.notch_freq = Some(freq);
        self.notch_q = q;
        self
    }

    /// Drop the notch stage
    pub fn without_notch(mut self) -> Self {
        self.notch_freq = None;
        self
    }

    /// Validate against the sampling rate the filters will run at
    pub fn validate(&self, sampling_rate: f64) -> EegResult<()> {
        validate_bandpass(self.low_cutoff, self.high_cutoff, self.order, sampling_rate)?;
        if let Some(freq) = self.notch_freq {
            validate_notch(freq, self.notch_q, sampling_rate)?;
        }
        Ok(())
    }
}

fn validate_order(order: usize) -> EegResult<()> {
    if order < 2 || order % 2 != 0 {
        return Err(config_error!(
            "Filter order must be an even number >= 2, got {}",
            order
        ));
    }
    Ok(())
}

fn validate_bandpass(low: f64, high: f64, order: usize, fs: f64) -> EegResult<()> {
    validate_order(order)?;

    if !(low.is_finite() && high.is_finite()) || low <= 0.0 || low >= high {
        return Err(config_error!(
            "Band-pass edges must satisfy 0 < low < high, got [{}, {}]",
            low,
            high
        ));
    }

    if high >= fs / 2.0 {
        return Err(config_error!(
            "High cutoff {}Hz must be less than Nyquist frequency {}Hz",
            high,
            fs / 2.0
        ));
    }

    Ok(())
}

fn validate_notch(freq: f64, q: f64, fs: f64) -> EegResult<()> {
    if !freq.is_finite() || freq <= 0.0 || freq >= fs / 2.0 {
        return Err(config_error!(
            "Notch frequency {}Hz must lie strictly between 0 and Nyquist {}Hz",
            freq,
            fs / 2.0
        ));
    }

    if !q.is_finite() || q <= 0.0 {
        return Err(config_error!("Notch quality factor must be positive, got {}", q));
    }

    Ok(())
}

/// Single biquad section (2nd order), `a0` normalized to 1
#[derive(Debug, Clone, Copy, PartialEq)]
struct Biquad {
    // y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn lowpass(cutoff: f64, fs: f64, q: f64) -> Self {
        let omega = 2.0 * PI * cutoff / fs;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 - cos_omega) / 2.0 / a0,
            b1: (1.0 - cos_omega) / a0,
            b2: (1.0 - cos_omega) / 2.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn highpass(cutoff: f64, fs: f64, q: f64) -> Self {
        let omega = 2.0 * PI * cutoff / fs;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 + cos_omega) / 2.0 / a0,
            b1: -(1.0 + cos_omega) / a0,
            b2: (1.0 + cos_omega) / 2.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Second-order notch whose -3dB bandwidth is `freq / q`
    fn notch(freq: f64, fs: f64, q: f64) -> Self {
        let omega = 2.0 * PI * freq / fs;
        let bandwidth = omega / q;
        let gain = 1.0 / (1.0 + (bandwidth / 2.0).tan());
        let cos_omega = omega.cos();

        Self {
            b0: gain,
            b1: -2.0 * gain * cos_omega,
            b2: gain,
            a1: -2.0 * gain * cos_omega,
            a2: 2.0 * gain - 1.0,
        }
    }

    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Transposed direct form II state after settling on a unit step
    fn step_state(&self) -> [f64; 2] {
        let gain = self.dc_gain();
        let z2 = self.b2 - self.a2 * gain;
        let z1 = self.b1 - self.a1 * gain + z2;
        [z1, z2]
    }
}

/// Series of biquads run as one filter
#[derive(Debug, Clone)]
struct SosCascade {
    sections: Vec<Biquad>,
}

impl SosCascade {
    /// Butterworth high-pass at `low` followed by Butterworth low-pass at `high`
    fn butterworth_bandpass(low: f64, high: f64, order: usize, fs: f64) -> Self {
        let qs = butterworth_qs(order);
        let mut sections = Vec::with_capacity(qs.len() * 2);
        sections.extend(qs.iter().map(|&q| Biquad::highpass(low, fs, q)));
        sections.extend(qs.iter().map(|&q| Biquad::lowpass(high, fs, q)));
        Self { sections }
    }

    fn notch(freq: f64, q: f64, fs: f64) -> Self {
        Self {
            sections: vec![Biquad::notch(freq, fs, q)],
        }
    }

    fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Per-section state for a unit step, scaled by the gain of earlier sections
    fn initial_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|section| {
                let [z1, z2] = section.step_state();
                let state = [z1 * scale, z2 * scale];
                scale *= section.dc_gain();
                state
            })
            .collect()
    }

    fn run(&self, input: &[f64], initial: &[[f64; 2]], level: f64) -> Vec<f64> {
        let mut state: Vec<[f64; 2]> = initial
            .iter()
            .map(|[z1, z2]| [z1 * level, z2 * level])
            .collect();
        let mut output = Vec::with_capacity(input.len());

        for &sample in input {
            let mut value = sample;
            for (section, z) in self.sections.iter().zip(state.iter_mut()) {
                let y = section.b0 * value + z[0];
                z[0] = section.b1 * value - section.a1 * y + z[1];
                z[1] = section.b2 * value - section.a2 * y;
                value = y;
            }
            output.push(value);
        }

        output
    }

    fn filtfilt(&self, input: &[f64]) -> EegResult<Vec<f64>> {
        let n = input.len();
        let pad = self.pad_len();
        if n <= pad {
            return Err(computation_error!(
                "segment of {} samples is too short for zero-phase filtering (needs more than {})",
                n,
                pad
            ));
        }

        let extended = odd_extend(input, pad);
        let initial = self.initial_state();

        let forward = self.run(&extended, &initial, extended[0]);
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let backward = self.run(&reversed, &initial, reversed[0]);

        Ok(backward.into_iter().rev().skip(pad).take(n).collect())
    }
}

/// Pole-pair quality factors of an even-order Butterworth prototype
fn butterworth_qs(order: usize) -> Vec<f64> {
    (0..order / 2)
        .map(|k| {
            let theta = (2 * k + 1) as f64 * PI / (2 * order) as f64;
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

/// Reflect `pad` samples at each end through the end points
fn odd_extend(input: &[f64], pad: usize) -> Vec<f64> {
    let n = input.len();
    let first = input[0];
    let last = input[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    extended.extend_from_slice(input);
    extended.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));
    extended
}

/// Zero-phase Butterworth band-pass filter
pub struct BandpassFilter {
    low_cutoff: f64,
    high_cutoff: f64,
    order: usize,
}

impl BandpassFilter {
    /// Create new band-pass filter; Nyquist is checked when a sampling rate is known
    pub fn new(low_cutoff: f64, high_cutoff: f64, order: usize) -> EegResult<Self> {
        validate_bandpass(low_cutoff, high_cutoff, order, f64::INFINITY)?;
        Ok(Self {
            low_cutoff,
            high_cutoff,
            order,
        })
    }

    /// Standard EEG band (1-45Hz, 4th order)
    pub fn eeg_default() -> Self {
        Self {
            low_cutoff: 1.0,
            high_cutoff: 45.0,
            order: 4,
        }
    }
}

impl SegmentProcessor for BandpassFilter {
    fn process(&self, segment: &[f64], sampling_rate: f64) -> EegResult<Vec<f64>> {
        validate_bandpass(self.low_cutoff, self.high_cutoff, self.order, sampling_rate)?;
        let cascade = SosCascade::butterworth_bandpass(
            self.low_cutoff,
            self.high_cutoff,
            self.order,
            sampling_rate,
        );
        trace!(sections = cascade.sections.len(), "band-pass cascade designed");
        cascade.filtfilt(segment)
    }

    fn name(&self) -> &str {
        "Band-pass Filter"
    }

    fn min_length(&self) -> usize {
        // order/2 sections per band edge, two edges
        3 * (2 * self.order + 1) + 1
    }
}

/// Zero-phase notch filter for power-line interference
pub struct NotchFilter {
    notch_freq: f64,
    q_factor: f64,
}

impl NotchFilter {
    /// Create new notch filter; Nyquist is checked when a sampling rate is known
    pub fn new(notch_freq: f64, q_factor: f64) -> EegResult<Self> {
        validate_notch(notch_freq, q_factor, f64::INFINITY)?;
        Ok(Self {
            notch_freq,
            q_factor,
        })
    }
}

impl SegmentProcessor for NotchFilter {
    fn process(&self, segment: &[f64], sampling_rate: f64) -> EegResult<Vec<f64>> {
        validate_notch(self.notch_freq, self.q_factor, sampling_rate)?;
        SosCascade::notch(self.notch_freq, self.q_factor, sampling_rate).filtfilt(segment)
    }

    fn name(&self) -> &str {
        "Notch Filter"
    }

    fn min_length(&self) -> usize {
        10
    }
}

/// Least-squares linear detrend
pub struct LinearDetrend;

impl SegmentProcessor for LinearDetrend {
    fn process(&self, segment: &[f64], _sampling_rate: f64) -> EegResult<Vec<f64>> {
        detrend(segment)
    }

    fn name(&self) -> &str {
        "Linear Detrend"
    }
}

/// Filter bank for combining multiple stages
pub struct FilterBank {
    stages: Vec<Box<dyn SegmentProcessor>>,
}

impl FilterBank {
    /// Create new empty filter bank
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Add a stage to the bank
    pub fn add_stage(&mut self, stage: Box<dyn SegmentProcessor>) {
        self.stages.push(stage);
    }

    /// Band-pass, notch, detrend chain described by `config`
    pub fn eeg_preprocessing(config: &FilterConfig) -> EegResult<Self> {
        let mut bank = FilterBank::new();

        bank.add_stage(Box::new(BandpassFilter::new(
            config.low_cutoff,
            config.high_cutoff,
            config.order,
        )?));

        if let Some(freq) = config.notch_freq {
            bank.add_stage(Box::new(NotchFilter::new(freq, config.notch_q)?));
        }

        if config.detrend {
            bank.add_stage(Box::new(LinearDetrend));
        }

        Ok(bank)
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentProcessor for FilterBank {
    fn process(&self, segment: &[f64], sampling_rate: f64) -> EegResult<Vec<f64>> {
        let mut current = segment.to_vec();

        // Apply stages sequentially
        for stage in &self.stages {
            if !stage.can_process(current.len()) {
                return Err(computation_error!(
                    "{} needs at least {} samples, segment has {}",
                    stage.name(),
                    stage.min_length(),
                    current.len()
                ));
            }
            current = stage.process(&current, sampling_rate)?;
        }

        Ok(current)
    }

    fn name(&self) -> &str {
        "Filter Bank"
    }

    fn min_length(&self) -> usize {
        self.stages.iter().map(|s| s.min_length()).max().unwrap_or(1)
    }
}

/// Band-pass a segment with a zero-phase Butterworth filter
pub fn bandpass_filter(
    segment: &[f64],
    sampling_rate: f64,
    low_cutoff: f64,
    high_cutoff: f64,
    order: usize,
) -> EegResult<Vec<f64>> {
    BandpassFilter::new(low_cutoff, high_cutoff, order)?.process(segment, sampling_rate)
}

/// Remove a line-noise component with a zero-phase notch
pub fn notch_filter(segment: &[f64], sampling_rate: f64, freq: f64, q: f64) -> EegResult<Vec<f64>> {
    NotchFilter::new(freq, q)?.process(segment, sampling_rate)
}

/// Subtract the least-squares line; the result has zero mean
pub fn detrend(segment: &[f64]) -> EegResult<Vec<f64>> {
    if segment.is_empty() {
        return Err(computation_error!("cannot detrend an empty segment"));
    }

    let n = segment.len() as f64;
    let t_mean = (n - 1.0) / 2.0;
    let x_mean = segment.iter().sum::<f64>() / n;

    let (sxy, sxx) = segment
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, &x)| {
            let dt = i as f64 - t_mean;
            (sxy + dt * (x - x_mean), sxx + dt * dt)
        });
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };

    Ok(segment
        .iter()
        .enumerate()
        .map(|(i, &x)| x - x_mean - slope * (i as f64 - t_mean))
        .collect())
}

/// Full cleaning stage: band-pass, notch, detrend
pub fn preprocess_segment(
    segment: &[f64],
    sampling_rate: f64,
    config: &FilterConfig,
) -> EegResult<Vec<f64>> {
    config.validate(sampling_rate)?;
    FilterBank::eeg_preprocessing(config)?.process(segment, sampling_rate)
}
