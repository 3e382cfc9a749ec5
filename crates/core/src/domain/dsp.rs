//! Digital Signal Processing effects for audio processing
//!
//! This module provides the effect primitives of the engine:
//! - Biquad IIR sections and the standard coefficient designs
//! - Butterworth-designed block filters (lowpass/highpass/bandpass) whose
//!   state carries across chunk boundaries
//! - Peaking EQ and a three-band EQ built from cascaded peaking sections
//! - Gain-stage effects (distortion/overdrive, see [`gain_stage`])
//! - Delay, convolution and noise reduction submodules
//!
//! All effects are designed for:
//! - Zero allocations in the hot path
//! - Mono f32 buffers normalized to [-1.0, 1.0]
//! - Sample-accurate behavior across chunk boundaries

pub mod convolution;
pub mod delay;
pub mod gain_stage;
pub mod noise_reduction;

use crate::domain::audio::AudioError;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

pub use convolution::{ConvolutionEngine, ImpulseResponse};
pub use delay::{Delay, DelayParams};
pub use gain_stage::{Distortion, DistortionParams, Overdrive, OverdriveParams};
pub use noise_reduction::{NoiseReduction, NoiseReductionParams};

pub type Result<T> = std::result::Result<T, AudioError>;

/// Core trait for all audio effects
///
/// All effects process mono audio in-place on f32 buffers normalized to
/// [-1.0, 1.0].
pub trait Effect: Send {
    /// Process a buffer of audio samples in-place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Handle buffers of any size
    /// - State continues across calls (no implicit reset)
    fn process(&mut self, buffer: &mut [f32]) -> Result<()>;

    /// Reset effect state to initial conditions
    ///
    /// Clears internal histories and delay lines. Parameters are kept.
    fn reset(&mut self);

    /// Check if effect is bypassed (zero processing overhead when true)
    fn is_bypassed(&self) -> bool {
        false
    }

    /// Toggle bypass state
    fn set_bypass(&mut self, _bypass: bool) {}

    /// Get effect name for debugging/display
    fn name(&self) -> &str;
}

/// Parameter constraints for DSP effects
///
/// All parameters are clamped to these ranges to prevent invalid states
/// and ensure numerical stability.
pub mod params {
    /// Decibel range for EQ gain parameters
    pub const GAIN_DB_MIN: f32 = -24.0;
    pub const GAIN_DB_MAX: f32 = 24.0;

    /// Q factor range for resonant filters
    pub const Q_MIN: f32 = 0.1;
    pub const Q_MAX: f32 = 10.0;

    /// Butterworth cascade order range
    pub const ORDER_MIN: usize = 1;
    pub const ORDER_MAX: usize = 10;

    /// Normalized cutoff bounds (fraction of Nyquist); designs outside
    /// this window are numerically degenerate
    pub const CUTOFF_NORM_MIN: f32 = 0.001;
    pub const CUTOFF_NORM_MAX: f32 = 0.99;
}

/// Clamp a cutoff frequency to the valid normalized range
///
/// Returns the cutoff as a fraction of Nyquist, in
/// [`params::CUTOFF_NORM_MIN`, `params::CUTOFF_NORM_MAX`].
fn normalized_cutoff(freq_hz: f32, sample_rate: f32) -> f32 {
    let nyquist = 0.5 * sample_rate;
    (freq_hz / nyquist).clamp(params::CUTOFF_NORM_MIN, params::CUTOFF_NORM_MAX)
}

// ============================================================================
// BIQUAD FILTER (Low-level IIR section)
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability. Coefficients are
/// pre-computed from the design parameters; `a0` is always normalized to
/// 1.0 and therefore not stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Second-order lowpass section (RBJ design)
    ///
    /// `q` controls the resonance at the cutoff; a single Butterworth
    /// section uses q = 0.707.
    #[must_use]
    pub fn low_pass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let w0 = std::f32::consts::PI * normalized_cutoff(freq, sample_rate);
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q.clamp(params::Q_MIN, params::Q_MAX));

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Second-order highpass section (RBJ design)
    #[must_use]
    pub fn high_pass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let w0 = std::f32::consts::PI * normalized_cutoff(freq, sample_rate);
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q.clamp(params::Q_MIN, params::Q_MAX));

        let b1 = -(1.0 + cos_w0);
        let b0 = (1.0 + cos_w0) / 2.0;
        let b2 = b0;

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Second-order bandpass section (constant 0 dB peak gain)
    #[must_use]
    pub fn band_pass(sample_rate: f32, center_freq: f32, q: f32) -> Self {
        let w0 = std::f32::consts::PI * normalized_cutoff(center_freq, sample_rate);
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q.clamp(params::Q_MIN, params::Q_MAX));

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Peaking EQ section
    ///
    /// Boosts or cuts frequencies around a center frequency.
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(params::GAIN_DB_MIN, params::GAIN_DB_MAX);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = std::f32::consts::PI * normalized_cutoff(freq, sample_rate);
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q.clamp(params::Q_MIN, params::Q_MAX));

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;

        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// First-order lowpass expressed as a degenerate biquad (b2 = a2 = 0)
    ///
    /// Used as the odd section of odd-order Butterworth cascades.
    #[must_use]
    pub fn first_order_low_pass(sample_rate: f32, freq: f32) -> Self {
        let k = (0.5 * std::f32::consts::PI * normalized_cutoff(freq, sample_rate)).tan();
        let norm = 1.0 / (k + 1.0);

        Self {
            b0: k * norm,
            b1: k * norm,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        }
    }

    /// First-order highpass expressed as a degenerate biquad (b2 = a2 = 0)
    #[must_use]
    pub fn first_order_high_pass(sample_rate: f32, freq: f32) -> Self {
        let k = (0.5 * std::f32::consts::PI * normalized_cutoff(freq, sample_rate)).tan();
        let norm = 1.0 / (k + 1.0);

        Self {
            b0: norm,
            b1: -norm,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        }
    }
}

/// Stateful biquad filter using Direct Form I
///
/// Direct Form I is chosen over Transposed Direct Form II for:
/// - Better numerical stability with low-frequency filters
/// - Easier coefficient updates without artifacts
///
/// The two-sample input/output histories are the filter's `zi` state:
/// they persist across `process` calls so consecutive blocks continue
/// smoothly, and are only cleared by an explicit `reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::default())
    }

    /// Update filter coefficients
    ///
    /// Histories are kept so parameter changes don't click.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x
            + self.coeffs.b1 * self.x1
            + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        // Update state
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a buffer of samples
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// BUTTERWORTH BLOCK FILTERS
// ============================================================================

/// Q values for the second-order sections of an order-n Butterworth cascade
///
/// Returns the per-pair Qs (`1 / (2 cos θ)` from the pole angles) and
/// whether an extra first-order section is required (odd orders).
fn butterworth_qs(order: usize) -> (Vec<f32>, bool) {
    let order = order.clamp(params::ORDER_MIN, params::ORDER_MAX);
    let pairs = order / 2;
    let qs = (0..pairs)
        .map(|k| {
            let theta = std::f32::consts::PI * (2 * k + 1) as f32 / (2 * order) as f32;
            1.0 / (2.0 * theta.cos())
        })
        .collect();
    (qs, order % 2 == 1)
}

/// Cutoff slope direction of a Butterworth cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CascadeKind {
    Low,
    High,
}

/// Cascade of biquad sections realizing an order-n Butterworth response
///
/// Section histories carry from block to block, so repeated `process`
/// calls over consecutive chunks are equivalent to filtering the
/// concatenated signal in one pass.
#[derive(Debug, Clone)]
struct ButterworthCascade {
    kind: CascadeKind,
    sections: Vec<BiquadFilter>,
    sample_rate: f32,
    cutoff_hz: f32,
    order: usize,
}

impl ButterworthCascade {
    fn new(kind: CascadeKind, sample_rate: f32, cutoff_hz: f32, order: usize) -> Self {
        let clamped = order.clamp(params::ORDER_MIN, params::ORDER_MAX);
        if clamped != order {
            warn!(order, clamped, "filter order out of range, clamping");
        }
        let mut cascade = Self {
            kind,
            sections: Vec::new(),
            sample_rate,
            cutoff_hz,
            order: clamped,
        };
        cascade.rebuild();
        cascade
    }

    /// Recompute section coefficients, preserving histories where possible
    fn rebuild(&mut self) {
        let (qs, odd) = butterworth_qs(self.order);
        let mut coeffs: Vec<BiquadCoeffs> = qs
            .iter()
            .map(|&q| match self.kind {
                CascadeKind::Low => BiquadCoeffs::low_pass(self.sample_rate, self.cutoff_hz, q),
                CascadeKind::High => BiquadCoeffs::high_pass(self.sample_rate, self.cutoff_hz, q),
            })
            .collect();
        if odd {
            coeffs.push(match self.kind {
                CascadeKind::Low => {
                    BiquadCoeffs::first_order_low_pass(self.sample_rate, self.cutoff_hz)
                }
                CascadeKind::High => {
                    BiquadCoeffs::first_order_high_pass(self.sample_rate, self.cutoff_hz)
                }
            });
        }

        if self.sections.len() == coeffs.len() {
            for (section, c) in self.sections.iter_mut().zip(coeffs) {
                section.set_coeffs(c);
            }
        } else {
            self.sections = coeffs.into_iter().map(BiquadFilter::new).collect();
        }
    }

    fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff_hz = cutoff_hz;
        self.rebuild();
    }

    fn process(&mut self, buffer: &mut [f32]) {
        for section in &mut self.sections {
            section.process(buffer);
        }
    }

    fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }
}

/// Butterworth lowpass block filter with chunk-spanning state
#[derive(Debug, Clone)]
pub struct LowpassFilter {
    bypass: bool,
    cascade: ButterworthCascade,
}

impl LowpassFilter {
    pub fn new(sample_rate: u32, cutoff_hz: f32, order: usize) -> Self {
        Self {
            bypass: false,
            cascade: ButterworthCascade::new(CascadeKind::Low, sample_rate as f32, cutoff_hz, order),
        }
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cascade.set_cutoff(cutoff_hz);
        trace!(cutoff_hz, "lowpass cutoff updated");
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cascade.cutoff_hz
    }
}

impl Effect for LowpassFilter {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if !self.bypass {
            self.cascade.process(buffer);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.cascade.reset();
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "Lowpass"
    }
}

/// Butterworth highpass block filter with chunk-spanning state
#[derive(Debug, Clone)]
pub struct HighpassFilter {
    bypass: bool,
    cascade: ButterworthCascade,
}

impl HighpassFilter {
    pub fn new(sample_rate: u32, cutoff_hz: f32, order: usize) -> Self {
        Self {
            bypass: false,
            cascade: ButterworthCascade::new(
                CascadeKind::High,
                sample_rate as f32,
                cutoff_hz,
                order,
            ),
        }
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cascade.set_cutoff(cutoff_hz);
        trace!(cutoff_hz, "highpass cutoff updated");
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cascade.cutoff_hz
    }
}

impl Effect for HighpassFilter {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if !self.bypass {
            self.cascade.process(buffer);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.cascade.reset();
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "Highpass"
    }
}

/// Butterworth bandpass block filter
///
/// Realized as a highpass cascade at the low cut followed by a lowpass
/// cascade at the high cut, each of the configured order. State carries
/// across chunks like the other block filters.
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    bypass: bool,
    low_cut: ButterworthCascade,
    high_cut: ButterworthCascade,
}

impl BandpassFilter {
    pub fn new(sample_rate: u32, lowcut_hz: f32, highcut_hz: f32, order: usize) -> Self {
        let sr = sample_rate as f32;
        Self {
            bypass: false,
            low_cut: ButterworthCascade::new(CascadeKind::High, sr, lowcut_hz, order),
            high_cut: ButterworthCascade::new(CascadeKind::Low, sr, highcut_hz, order),
        }
    }

    pub fn set_band(&mut self, lowcut_hz: f32, highcut_hz: f32) {
        self.low_cut.set_cutoff(lowcut_hz);
        self.high_cut.set_cutoff(highcut_hz);
        trace!(lowcut_hz, highcut_hz, "bandpass band updated");
    }
}

impl Effect for BandpassFilter {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if !self.bypass {
            self.low_cut.process(buffer);
            self.high_cut.process(buffer);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.low_cut.reset();
        self.high_cut.reset();
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "Bandpass"
    }
}

// ============================================================================
// PEAKING EQ / THREE-BAND EQ
// ============================================================================

/// Single parametric peaking EQ band, processed sample-by-sample
#[derive(Debug, Clone)]
pub struct PeakingEq {
    bypass: bool,
    sample_rate: f32,
    gain_db: f32,
    center_freq: f32,
    q: f32,
    filter: BiquadFilter,
}

impl PeakingEq {
    pub fn new(sample_rate: u32, center_freq: f32, gain_db: f32, q: f32) -> Self {
        let sr = sample_rate as f32;
        let mut eq = Self {
            bypass: false,
            sample_rate: sr,
            gain_db: gain_db.clamp(params::GAIN_DB_MIN, params::GAIN_DB_MAX),
            center_freq,
            q: q.clamp(params::Q_MIN, params::Q_MAX),
            filter: BiquadFilter::bypass(),
        };
        eq.update_coefficients();
        eq
    }

    /// Update any subset of the shaping parameters
    ///
    /// Coefficients are recomputed once, never partially.
    pub fn set_params(&mut self, gain_db: Option<f32>, center_freq: Option<f32>, q: Option<f32>) {
        if let Some(g) = gain_db {
            self.gain_db = g.clamp(params::GAIN_DB_MIN, params::GAIN_DB_MAX);
        }
        if let Some(f) = center_freq {
            self.center_freq = f;
        }
        if let Some(q) = q {
            self.q = q.clamp(params::Q_MIN, params::Q_MAX);
        }
        self.update_coefficients();
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    fn update_coefficients(&mut self) {
        self.filter.set_coeffs(BiquadCoeffs::peaking(
            self.sample_rate,
            self.center_freq,
            self.gain_db,
            self.q,
        ));
        trace!(
            gain_db = self.gain_db,
            center_freq = self.center_freq,
            q = self.q,
            "peaking EQ updated"
        );
    }
}

impl Effect for PeakingEq {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if !self.bypass {
            self.filter.process(buffer);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.filter.reset();
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "PeakingEq"
    }
}

/// Three-band EQ: three independent peaking sections in series
///
/// Each section keeps its own filter state; the only coupling between
/// bands is the signal flowing from one into the next.
#[derive(Debug, Clone)]
pub struct ThreeBandEq {
    bypass: bool,
    low: PeakingEq,
    mid: PeakingEq,
    high: PeakingEq,
}

impl ThreeBandEq {
    /// Default center frequency for the low band
    pub const DEFAULT_LOW_FREQ: f32 = 120.0;
    /// Default center frequency for the mid band
    pub const DEFAULT_MID_FREQ: f32 = 1000.0;
    /// Default center frequency for the high band
    pub const DEFAULT_HIGH_FREQ: f32 = 8000.0;

    pub fn new(sample_rate: u32) -> Self {
        Self {
            bypass: false,
            low: PeakingEq::new(sample_rate, Self::DEFAULT_LOW_FREQ, 0.0, 1.0),
            mid: PeakingEq::new(sample_rate, Self::DEFAULT_MID_FREQ, 0.0, 1.0),
            high: PeakingEq::new(sample_rate, Self::DEFAULT_HIGH_FREQ, 0.0, 1.0),
        }
    }

    /// Set the gain of all three bands, forcing coefficient recomputation
    pub fn set_gains(&mut self, low_db: f32, mid_db: f32, high_db: f32) {
        self.low.set_params(Some(low_db), None, None);
        self.mid.set_params(Some(mid_db), None, None);
        self.high.set_params(Some(high_db), None, None);
    }

    pub fn gains(&self) -> (f32, f32, f32) {
        (self.low.gain_db(), self.mid.gain_db(), self.high.gain_db())
    }
}

impl Effect for ThreeBandEq {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }
        self.low.process(buffer)?;
        self.mid.process(buffer)?;
        self.high.process(buffer)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "ThreeBandEq"
    }
}

// ============================================================================
// GAIN
// ============================================================================

/// Plain scalar gain stage
#[derive(Debug, Clone)]
pub struct Gain {
    bypass: bool,
    factor: f32,
}

impl Gain {
    pub fn new(factor: f32) -> Self {
        Self {
            bypass: false,
            factor,
        }
    }

    pub fn set_factor(&mut self, factor: f32) {
        self.factor = factor;
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }
}

impl Effect for Gain {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if !self.bypass {
            for sample in buffer.iter_mut() {
                *sample *= self.factor;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    fn name(&self) -> &str {
        "Gain"
    }
}

// ============================================================================
// EFFECTS CHAIN
// ============================================================================

/// Lowpass filter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LowpassParams {
    pub cutoff_hz: f32,
    #[serde(default = "default_order")]
    pub order: usize,
}

/// Highpass filter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HighpassParams {
    pub cutoff_hz: f32,
    #[serde(default = "default_order")]
    pub order: usize,
}

/// Bandpass filter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BandpassParams {
    pub lowcut_hz: f32,
    pub highcut_hz: f32,
    #[serde(default = "default_order")]
    pub order: usize,
}

fn default_order() -> usize {
    5
}

/// Peaking EQ configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeakingEqParams {
    pub center_freq: f32,
    #[serde(default)]
    pub gain_db: f32,
    #[serde(default = "default_q")]
    pub q: f32,
}

fn default_q() -> f32 {
    1.0
}

/// Three-band EQ configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ThreeBandEqParams {
    #[serde(default)]
    pub low_gain_db: f32,
    #[serde(default)]
    pub mid_gain_db: f32,
    #[serde(default)]
    pub high_gain_db: f32,
}

/// Scalar gain configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GainParams {
    pub gain: f32,
}

/// Serializable effect chain entry
///
/// Unknown option keys inside any `params` table are a deserialization
/// error, not silently accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum EffectType {
    Lowpass(LowpassParams),
    Highpass(HighpassParams),
    Bandpass(BandpassParams),
    PeakingEq(PeakingEqParams),
    ThreeBandEq(ThreeBandEqParams),
    Gain(GainParams),
    Distortion(DistortionParams),
    Overdrive(OverdriveParams),
    Delay(DelayParams),
}

impl EffectType {
    /// Get the effect name
    pub fn name(&self) -> &str {
        match self {
            EffectType::Lowpass(_) => "Lowpass",
            EffectType::Highpass(_) => "Highpass",
            EffectType::Bandpass(_) => "Bandpass",
            EffectType::PeakingEq(_) => "PeakingEq",
            EffectType::ThreeBandEq(_) => "ThreeBandEq",
            EffectType::Gain(_) => "Gain",
            EffectType::Distortion(_) => "Distortion",
            EffectType::Overdrive(_) => "Overdrive",
            EffectType::Delay(_) => "Delay",
        }
    }
}

/// Serial effects chain configuration
///
/// Effects are processed in the order they were added. This is the
/// serializable description; `create_processor` instantiates the actual
/// stateful effects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectsChain {
    effects: Vec<EffectType>,
}

impl EffectsChain {
    /// Create a new empty effects chain
    pub fn new() -> Self {
        Self {
            effects: Vec::new(),
        }
    }

    /// Add an effect to the end of the chain
    pub fn add(&mut self, effect: EffectType) {
        self.effects.push(effect);
    }

    /// Remove an effect by index
    pub fn remove(&mut self, index: usize) -> Result<()> {
        if index < self.effects.len() {
            self.effects.remove(index);
            Ok(())
        } else {
            Err(AudioError::InvalidConfiguration(
                "Effect index out of bounds".to_string(),
            ))
        }
    }

    /// Get the number of effects in the chain
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Get all effect configurations
    pub fn effects(&self) -> &[EffectType] {
        &self.effects
    }

    /// Clear all effects
    pub fn clear(&mut self) {
        self.effects.clear();
    }

    /// Create a runtime processor from this chain configuration
    pub fn create_processor(&self, sample_rate: u32) -> EffectsChainProcessor {
        let processors: Vec<Box<dyn Effect>> = self
            .effects
            .iter()
            .map(|effect| match effect {
                EffectType::Lowpass(p) => {
                    Box::new(LowpassFilter::new(sample_rate, p.cutoff_hz, p.order))
                        as Box<dyn Effect>
                }
                EffectType::Highpass(p) => {
                    Box::new(HighpassFilter::new(sample_rate, p.cutoff_hz, p.order))
                        as Box<dyn Effect>
                }
                EffectType::Bandpass(p) => Box::new(BandpassFilter::new(
                    sample_rate,
                    p.lowcut_hz,
                    p.highcut_hz,
                    p.order,
                )) as Box<dyn Effect>,
                EffectType::PeakingEq(p) => {
                    Box::new(PeakingEq::new(sample_rate, p.center_freq, p.gain_db, p.q))
                        as Box<dyn Effect>
                }
                EffectType::ThreeBandEq(p) => {
                    let mut eq = ThreeBandEq::new(sample_rate);
                    eq.set_gains(p.low_gain_db, p.mid_gain_db, p.high_gain_db);
                    Box::new(eq) as Box<dyn Effect>
                }
                EffectType::Gain(p) => Box::new(Gain::new(p.gain)) as Box<dyn Effect>,
                EffectType::Distortion(p) => {
                    let mut fx = Distortion::new(sample_rate);
                    fx.set_params(p);
                    Box::new(fx) as Box<dyn Effect>
                }
                EffectType::Overdrive(p) => {
                    let mut fx = Overdrive::new(sample_rate);
                    fx.set_params(p);
                    Box::new(fx) as Box<dyn Effect>
                }
                EffectType::Delay(p) => {
                    let mut fx = Delay::new(sample_rate);
                    fx.set_params(p);
                    Box::new(fx) as Box<dyn Effect>
                }
            })
            .collect();

        EffectsChainProcessor {
            effects: processors,
        }
    }
}

/// Runtime processor for effects chain
///
/// This holds the actual effect instances with their state.
/// Create from an `EffectsChain` configuration.
pub struct EffectsChainProcessor {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectsChainProcessor {
    /// Process audio through all effects in the chain
    pub fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        for effect in &mut self.effects {
            if !effect.is_bypassed() {
                effect.process(buffer)?;
            }
        }
        Ok(())
    }

    /// Reset all effects in the chain
    pub fn reset(&mut self) {
        for effect in &mut self.effects {
            effect.reset();
        }
    }

    /// Set bypass state for an effect by index
    pub fn set_bypass(&mut self, index: usize, bypass: bool) -> bool {
        if let Some(effect) = self.effects.get_mut(index) {
            effect.set_bypass(bypass);
            true
        } else {
            false
        }
    }

    /// Get the number of effects
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE_RATE: u32 = 48000;

    fn generate_test_signal(samples: usize, frequency: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn peak(buffer: &[f32]) -> f32 {
        buffer.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    // -------------------------------------------------------------------------
    // Biquad Filter Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_biquad_unity() {
        let coeffs = BiquadCoeffs::default();
        let mut filter = BiquadFilter::new(coeffs);

        let input = vec![0.5, 0.3, 0.7];
        let mut output = input.clone();

        filter.process(&mut output);

        for (in_sample, out_sample) in input.iter().zip(output.iter()) {
            assert!((in_sample - out_sample).abs() < 0.01);
        }
    }

    #[test]
    fn test_biquad_reset() {
        let coeffs = BiquadCoeffs::low_pass(48000.0, 200.0, 0.707);
        let mut filter = BiquadFilter::new(coeffs);

        let mut buffer = vec![0.5; 100];
        filter.process(&mut buffer);

        filter.reset();
        let mut silence = vec![0.0; 10];
        filter.process(&mut silence);

        assert!(silence.iter().all(|&s| s.abs() < 0.01));
    }

    #[test]
    fn test_cutoff_clamped_to_valid_range() {
        // Cutoff above Nyquist must still produce a stable design
        let coeffs = BiquadCoeffs::low_pass(48000.0, 100_000.0, 0.707);
        assert!(coeffs.b0.is_finite() && coeffs.a1.is_finite());

        // And near-zero cutoff too
        let coeffs = BiquadCoeffs::high_pass(48000.0, 0.0, 0.707);
        assert!(coeffs.b0.is_finite() && coeffs.a1.is_finite());
    }

    proptest! {
        // Every design must be finite for any valid parameter combination;
        // a0 is implicitly 1 (not stored), so finiteness of the normalized
        // coefficients is the normalization property.
        #[test]
        fn prop_designs_are_finite(
            freq in 1.0f32..24000.0,
            q in 0.1f32..10.0,
            gain_db in -24.0f32..24.0,
        ) {
            for coeffs in [
                BiquadCoeffs::low_pass(48000.0, freq, q),
                BiquadCoeffs::high_pass(48000.0, freq, q),
                BiquadCoeffs::band_pass(48000.0, freq, q),
                BiquadCoeffs::peaking(48000.0, freq, gain_db, q),
                BiquadCoeffs::first_order_low_pass(48000.0, freq),
                BiquadCoeffs::first_order_high_pass(48000.0, freq),
            ] {
                prop_assert!(coeffs.b0.is_finite());
                prop_assert!(coeffs.b1.is_finite());
                prop_assert!(coeffs.b2.is_finite());
                prop_assert!(coeffs.a1.is_finite());
                prop_assert!(coeffs.a2.is_finite());
            }
        }
    }

    // -------------------------------------------------------------------------
    // Butterworth Block Filter Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_butterworth_q_values() {
        // Known Q values for order 2 and 5 cascades
        let (qs, odd) = butterworth_qs(2);
        assert!(!odd);
        assert!((qs[0] - 0.7071).abs() < 1e-3);

        let (qs, odd) = butterworth_qs(5);
        assert!(odd);
        assert!((qs[0] - 0.5257).abs() < 1e-3);
        assert!((qs[1] - 0.8507).abs() < 1e-3);
    }

    #[test]
    fn test_lowpass_attenuates_high_frequency() {
        let mut filter = LowpassFilter::new(SAMPLE_RATE, 1000.0, 5);

        let mut high = generate_test_signal(4096, 10000.0);
        filter.process(&mut high).unwrap();
        // Skip the transient at the head
        assert!(peak(&high[2048..]) < 0.05);

        let mut filter = LowpassFilter::new(SAMPLE_RATE, 1000.0, 5);
        let mut low = generate_test_signal(4096, 100.0);
        filter.process(&mut low).unwrap();
        assert!(peak(&low[2048..]) > 0.8);
    }

    #[test]
    fn test_highpass_attenuates_low_frequency() {
        let mut filter = HighpassFilter::new(SAMPLE_RATE, 1000.0, 5);

        let mut low = generate_test_signal(4096, 100.0);
        filter.process(&mut low).unwrap();
        assert!(peak(&low[2048..]) < 0.05);
    }

    #[test]
    fn test_bandpass_passes_band_rejects_edges() {
        let mut filter = BandpassFilter::new(SAMPLE_RATE, 300.0, 3000.0, 5);
        let mut mid = generate_test_signal(8192, 1000.0);
        filter.process(&mut mid).unwrap();
        assert!(peak(&mid[4096..]) > 0.7);

        let mut filter = BandpassFilter::new(SAMPLE_RATE, 300.0, 3000.0, 5);
        let mut low = generate_test_signal(8192, 50.0);
        filter.process(&mut low).unwrap();
        assert!(peak(&low[4096..]) < 0.1);

        let mut filter = BandpassFilter::new(SAMPLE_RATE, 300.0, 3000.0, 5);
        let mut high = generate_test_signal(8192, 15000.0);
        filter.process(&mut high).unwrap();
        assert!(peak(&high[4096..]) < 0.1);
    }

    #[test]
    fn test_block_filtering_is_continuous_across_chunks() {
        // Processing a signal in chunks must be bit-identical to processing
        // it in one pass: the section histories are the zi state.
        let signal = generate_test_signal(2048, 440.0);

        let mut whole = signal.clone();
        let mut filter_a = BandpassFilter::new(SAMPLE_RATE, 100.0, 12000.0, 5);
        filter_a.process(&mut whole).unwrap();

        let mut chunked = signal;
        let mut filter_b = BandpassFilter::new(SAMPLE_RATE, 100.0, 12000.0, 5);
        for chunk in chunked.chunks_mut(256) {
            filter_b.process(chunk).unwrap();
        }

        for (a, b) in whole.iter().zip(chunked.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    // -------------------------------------------------------------------------
    // Peaking EQ / Three-Band EQ Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_peaking_eq_boosts_center() {
        let mut eq = PeakingEq::new(SAMPLE_RATE, 1000.0, 10.0, 1.0);
        let mut signal = generate_test_signal(8192, 1000.0);
        let before = peak(&signal);
        eq.process(&mut signal).unwrap();
        assert!(peak(&signal[4096..]) > before * 1.5);
    }

    #[test]
    fn test_peaking_eq_unity_at_zero_gain() {
        let mut eq = PeakingEq::new(SAMPLE_RATE, 1000.0, 0.0, 1.0);
        let mut signal = generate_test_signal(1024, 440.0);
        let original = signal.clone();
        eq.process(&mut signal).unwrap();
        for (a, b) in original.iter().zip(signal.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_three_band_eq_gain_clamping() {
        let mut eq = ThreeBandEq::new(SAMPLE_RATE);
        eq.set_gains(100.0, -100.0, 0.0);
        let (low, mid, high) = eq.gains();
        assert_eq!(low, params::GAIN_DB_MAX);
        assert_eq!(mid, params::GAIN_DB_MIN);
        assert_eq!(high, 0.0);
    }

    #[test]
    fn test_three_band_eq_sections_are_independent() {
        let mut eq = ThreeBandEq::new(SAMPLE_RATE);
        eq.set_gains(6.0, 0.0, 0.0);

        // A low-frequency tone is boosted, a mid tone passes ~unchanged
        let mut low = generate_test_signal(8192, 120.0);
        eq.process(&mut low).unwrap();
        assert!(peak(&low[4096..]) > 1.2);

        eq.reset();
        let mut mid = generate_test_signal(8192, 1000.0);
        eq.process(&mut mid).unwrap();
        assert!((peak(&mid[4096..]) - 1.0).abs() < 0.2);
    }

    // -------------------------------------------------------------------------
    // Effects Chain Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_effects_chain_empty() {
        let chain = EffectsChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn test_effects_chain_add_remove() {
        let mut chain = EffectsChain::new();

        chain.add(EffectType::ThreeBandEq(ThreeBandEqParams::default()));
        assert_eq!(chain.len(), 1);

        chain.add(EffectType::Gain(GainParams { gain: 2.0 }));
        assert_eq!(chain.len(), 2);

        chain.remove(0).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.remove(5).is_err());

        chain.clear();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_effects_chain_processor() {
        let mut chain = EffectsChain::new();
        chain.add(EffectType::Gain(GainParams { gain: 0.5 }));
        chain.add(EffectType::Lowpass(LowpassParams {
            cutoff_hz: 1000.0,
            order: 2,
        }));

        let mut processor = chain.create_processor(SAMPLE_RATE);
        assert_eq!(processor.len(), 2);

        let mut signal = vec![0.5; 1024];
        processor.process(&mut signal).unwrap();
        assert_ne!(signal, vec![0.5; 1024]);
    }

    #[test]
    fn test_effects_chain_bypass() {
        let mut chain = EffectsChain::new();
        chain.add(EffectType::Gain(GainParams { gain: 2.0 }));

        let mut processor = chain.create_processor(SAMPLE_RATE);
        processor.set_bypass(0, true);

        let mut signal = vec![0.25; 16];
        processor.process(&mut signal).unwrap();
        assert_eq!(signal, vec![0.25; 16]);
    }

    #[test]
    fn test_effect_type_serialization_rejects_unknown_options() {
        let toml_str = r#"
            type = "Lowpass"
            [params]
            cutoff_hz = 1000.0
            resonance = 2.0
        "#;
        let parsed: std::result::Result<EffectType, _> = toml::from_str(toml_str);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_effect_type_round_trip() {
        let effect = EffectType::Bandpass(BandpassParams {
            lowcut_hz: 100.0,
            highcut_hz: 12000.0,
            order: 5,
        });
        let serialized = toml::to_string(&effect).unwrap();
        let parsed: EffectType = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.name(), "Bandpass");
    }
}
