//! Gain-stage effects: hard-clip distortion and tanh overdrive
//!
//! Both stages apply a pre-gain, a nonlinear clipping shape, and a
//! loudness-compensating output stage derived from the ratio of input RMS to
//! clipped RMS. The compensation factor is capped at 100x so near-silent
//! clipped output cannot explode the level.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Effect, HighpassFilter, Result};
use crate::domain::audio::rms;

/// Upper bound on the RMS compensation factor
const MAX_AUTO_GAIN: f32 = 100.0;

/// Guard against dividing by a numerically silent clipped signal
const RMS_EPSILON: f32 = 1e-9;

/// Distortion parameter update
///
/// Every field is optional; `None` leaves the current value untouched, so a
/// partial update (or a partial `params` table in a preset) only changes
/// what it names.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistortionParams {
    /// Hard-clip threshold, must be positive
    pub threshold: Option<f32>,
    /// Input gain applied before clipping, must be positive
    pub pregain: Option<f32>,
    /// Fixed output gain used when auto-gain is off
    pub postgain: Option<f32>,
    /// Match output loudness to input loudness instead of using `postgain`
    pub auto_gain: Option<bool>,
    /// Post-clip highpass cutoff in Hz; out-of-range values disable the
    /// filter
    pub highpass_cutoff_hz: Option<f32>,
}

/// Hard-clipping distortion with RMS loudness compensation
///
/// Signal path: pre-gain, symmetric clip at the threshold, rescale by
/// `1/pregain`, output stage (auto or fixed), clamp to [-1, 1], then an
/// optional highpass to strip the DC-ish rumble clipping introduces.
pub struct Distortion {
    bypass: bool,
    sample_rate: u32,
    threshold: f32,
    pregain: f32,
    postgain: f32,
    auto_gain: bool,
    highpass: Option<HighpassFilter>,
}

impl Distortion {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;
    pub const DEFAULT_PREGAIN: f32 = 5.0;
    pub const DEFAULT_POSTGAIN: f32 = 3.0;

    pub fn new(sample_rate: u32) -> Self {
        Self {
            bypass: false,
            sample_rate,
            threshold: Self::DEFAULT_THRESHOLD,
            pregain: Self::DEFAULT_PREGAIN,
            postgain: Self::DEFAULT_POSTGAIN,
            auto_gain: true,
            highpass: None,
        }
    }

    /// Apply a parameter update
    ///
    /// Invalid values fall back to the stage defaults with a warning; the
    /// effect never errors out of the processing path over a bad knob.
    pub fn set_params(&mut self, params: &DistortionParams) {
        if let Some(threshold) = params.threshold {
            if threshold > 0.0 {
                self.threshold = threshold;
            } else {
                warn!(threshold, "distortion threshold must be positive, keeping default");
                self.threshold = Self::DEFAULT_THRESHOLD;
            }
        }
        if let Some(pregain) = params.pregain {
            if pregain > 0.0 {
                self.pregain = pregain;
            } else {
                warn!(pregain, "distortion pregain must be positive, keeping default");
                self.pregain = Self::DEFAULT_PREGAIN;
            }
        }
        if let Some(postgain) = params.postgain {
            if postgain > 0.0 {
                self.postgain = postgain;
            } else {
                warn!(postgain, "distortion postgain must be positive, keeping default");
                self.postgain = Self::DEFAULT_POSTGAIN;
            }
        }
        if let Some(auto_gain) = params.auto_gain {
            self.auto_gain = auto_gain;
        }
        if let Some(cutoff) = params.highpass_cutoff_hz {
            let nyquist = self.sample_rate as f32 / 2.0;
            if cutoff > 0.0 && cutoff < nyquist {
                self.highpass = Some(HighpassFilter::new(self.sample_rate, cutoff, 2));
            } else {
                warn!(cutoff, nyquist, "distortion highpass cutoff out of range, filter disabled");
                self.highpass = None;
            }
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn pregain(&self) -> f32 {
        self.pregain
    }
}

impl Effect for Distortion {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass || buffer.is_empty() {
            return Ok(());
        }

        let input_rms = rms(buffer);

        for sample in buffer.iter_mut() {
            let gained = *sample * self.pregain;
            *sample = gained.clamp(-self.threshold, self.threshold);
        }

        let clipped_rms = rms(buffer);
        let factor = if self.auto_gain {
            if clipped_rms > RMS_EPSILON {
                (input_rms * self.pregain / clipped_rms).min(MAX_AUTO_GAIN)
            } else {
                0.0
            }
        } else {
            self.postgain
        };

        // Undo the pre-gain so the clip shape, not the drive level, sets the
        // output, then apply the output stage.
        let scale = factor / self.pregain;
        for sample in buffer.iter_mut() {
            *sample = (*sample * scale).clamp(-1.0, 1.0);
        }

        if let Some(highpass) = &mut self.highpass {
            highpass.process(buffer)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(highpass) = &mut self.highpass {
            highpass.reset();
        }
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
        "Distortion"
    }
}

/// Overdrive parameter update; `None` fields keep the current value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverdriveParams {
    /// Input gain driving the tanh curve, must be positive
    pub pregain: Option<f32>,
    /// Fixed output gain used when auto-gain is off
    pub postgain: Option<f32>,
    /// Match output loudness to input loudness instead of using `postgain`
    pub auto_gain: Option<bool>,
}

/// Soft-saturating overdrive using a tanh transfer curve
pub struct Overdrive {
    bypass: bool,
    pregain: f32,
    postgain: f32,
    auto_gain: bool,
}

impl Overdrive {
    pub const DEFAULT_PREGAIN: f32 = 5.0;
    pub const DEFAULT_POSTGAIN: f32 = 0.5;

    pub fn new(_sample_rate: u32) -> Self {
        Self {
            bypass: false,
            pregain: Self::DEFAULT_PREGAIN,
            postgain: Self::DEFAULT_POSTGAIN,
            auto_gain: true,
        }
    }

    pub fn set_params(&mut self, params: &OverdriveParams) {
        if let Some(pregain) = params.pregain {
            if pregain > 0.0 {
                self.pregain = pregain;
            } else {
                warn!(pregain, "overdrive pregain must be positive, keeping default");
                self.pregain = Self::DEFAULT_PREGAIN;
            }
        }
        if let Some(postgain) = params.postgain {
            if postgain > 0.0 {
                self.postgain = postgain;
            } else {
                warn!(postgain, "overdrive postgain must be positive, keeping default");
                self.postgain = Self::DEFAULT_POSTGAIN;
            }
        }
        if let Some(auto_gain) = params.auto_gain {
            self.auto_gain = auto_gain;
        }
    }

    pub fn pregain(&self) -> f32 {
        self.pregain
    }
}

impl Effect for Overdrive {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass || buffer.is_empty() {
            return Ok(());
        }

        let input_rms = rms(buffer);

        for sample in buffer.iter_mut() {
            *sample = (*sample * self.pregain).tanh();
        }

        let processed_rms = rms(buffer);
        let factor = if self.auto_gain {
            if processed_rms > RMS_EPSILON {
                (input_rms / processed_rms).min(MAX_AUTO_GAIN)
            } else {
                0.0
            }
        } else {
            self.postgain
        };

        for sample in buffer.iter_mut() {
            *sample = (*sample * factor).clamp(-1.0, 1.0);
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
        "Overdrive"
    }
}
