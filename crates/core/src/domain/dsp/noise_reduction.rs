//! Spectral noise reduction with overlap-add synthesis
//!
//! Works on analysis frames twice the chunk size: each call concatenates the
//! previous raw chunk with the current one, windows it with a Hann window,
//! and either accumulates a noise magnitude profile (learning) or applies a
//! Wiener-style gain per bin (suppression). Suppressed frames are stitched
//! with the previous frame's tail using window-sum-normalized overlap-add,
//! so steady-state output has no amplitude ripple at chunk seams.
//!
//! Learning only consumes non-speech chunks. Once the configured number of
//! frames has been learned the profile freezes and suppression is permanent.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Effect, Result};

const WIENER_EPSILON: f32 = 1e-10;
const OLA_EPSILON: f32 = 1e-8;

/// Noise reduction parameter update; `None` fields keep the current value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoiseReductionParams {
    /// Non-speech frames to average into the noise profile before freezing
    pub learning_frames: Option<usize>,
    /// Wiener aggressiveness; larger values suppress harder
    pub alpha: Option<f32>,
}

/// Overlap-add spectral noise suppressor
pub struct NoiseReduction {
    bypass: bool,
    chunk_size: usize,
    fft_size: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Average noise magnitude per bin, 0..=fft_size/2
    profile: Vec<f32>,
    frames_learned: usize,
    learning_frames: usize,
    alpha: f32,
    /// Previous raw chunk, the head of the next analysis frame
    carry: Vec<f32>,
    /// Second half of the previous suppressed frame, awaiting overlap-add
    prev_tail: Vec<f32>,
}

impl NoiseReduction {
    pub const DEFAULT_LEARNING_FRAMES: usize = 10;
    pub const DEFAULT_ALPHA: f32 = 1.0;

    pub fn new(chunk_size: usize) -> Self {
        let fft_size = chunk_size * 2;
        let mut planner = FftPlanner::new();
        Self {
            bypass: false,
            chunk_size,
            fft_size,
            window: hann(fft_size),
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            profile: vec![0.0; fft_size / 2 + 1],
            frames_learned: 0,
            learning_frames: Self::DEFAULT_LEARNING_FRAMES,
            alpha: Self::DEFAULT_ALPHA,
            carry: vec![0.0; chunk_size],
            prev_tail: vec![0.0; chunk_size],
        }
    }

    pub fn set_params(&mut self, params: &NoiseReductionParams) {
        if let Some(frames) = params.learning_frames {
            if frames > 0 {
                self.learning_frames = frames;
            } else {
                warn!("noise reduction learning_frames must be positive, keeping default");
                self.learning_frames = Self::DEFAULT_LEARNING_FRAMES;
            }
        }
        if let Some(alpha) = params.alpha {
            if alpha > 0.0 {
                self.alpha = alpha;
            } else {
                warn!(alpha, "noise reduction alpha must be positive, keeping default");
                self.alpha = Self::DEFAULT_ALPHA;
            }
        }
    }

    /// Whether the noise profile is frozen and suppression active
    pub fn is_learned(&self) -> bool {
        self.frames_learned >= self.learning_frames
    }

    pub fn frames_learned(&self) -> usize {
        self.frames_learned
    }

    /// Process one chunk, with the caller's speech decision
    ///
    /// During learning, speech chunks pass through without touching the
    /// profile; non-speech chunks feed it. After learning, every chunk is
    /// suppressed regardless of the flag. Wrong-length chunks pass through
    /// with a warning.
    pub fn process_chunk(&mut self, buffer: &mut [f32], is_speech: bool) -> Result<()> {
        if self.bypass {
            return Ok(());
        }
        if buffer.len() != self.chunk_size {
            warn!(
                len = buffer.len(),
                expected = self.chunk_size,
                "chunk size mismatch, passing through"
            );
            return Ok(());
        }

        // Analysis frame: previous raw chunk followed by the current one
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = if i < self.chunk_size {
                self.carry[i]
            } else {
                buffer[i - self.chunk_size]
            };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.forward.process(&mut self.scratch);

        if !self.is_learned() {
            if !is_speech {
                self.learn_frame();
            }
            // Raw input carries forward even while learning, so the first
            // suppressed frame sees a fully populated analysis window.
            self.carry.copy_from_slice(buffer);
            return Ok(());
        }

        self.suppress_frame();

        // The next analysis frame starts from the raw input, so snapshot it
        // before the overlap-add writes the suppressed output into place.
        self.carry.copy_from_slice(buffer);

        // Overlap-add the suppressed frame head against the previous tail,
        // normalized by the summed window weight at each position.
        let half = self.chunk_size;
        let inv_n = 1.0 / self.fft_size as f32;
        for i in 0..half {
            let current = self.scratch[i].re * inv_n;
            let wa = self.window[i];
            let wb = self.window[i + half];
            buffer[i] = (current * wa + self.prev_tail[i] * wb) / (wa + wb + OLA_EPSILON);
        }
        for i in 0..half {
            self.prev_tail[i] = self.scratch[i + half].re * inv_n;
        }

        Ok(())
    }

    /// Fold the current frame's magnitudes into the running noise average
    fn learn_frame(&mut self) {
        let n = self.frames_learned as f32;
        for (bin, avg) in self.profile.iter_mut().enumerate() {
            let mag = self.scratch[bin].norm();
            *avg = (*avg * n + mag) / (n + 1.0);
        }
        self.frames_learned += 1;
        debug!(
            frames = self.frames_learned,
            target = self.learning_frames,
            "noise profile frame learned"
        );
        if self.is_learned() {
            info!("noise profile frozen, suppression active");
        }
    }

    /// Apply the Wiener gain per bin and transform back to time domain
    fn suppress_frame(&mut self) {
        let half = self.fft_size / 2;
        for bin in 0..=half {
            let mag = self.scratch[bin].norm();
            let noise = self.profile[bin];
            let snr = (mag * mag) / (noise * noise + WIENER_EPSILON);
            let gain = snr / (snr + self.alpha);
            self.scratch[bin] *= gain;
            // Mirror onto the conjugate bin so the inverse stays real
            if bin > 0 && bin < half {
                self.scratch[self.fft_size - bin] *= gain;
            }
        }
        self.inverse.process(&mut self.scratch);
    }
}

impl Effect for NoiseReduction {
    /// Chain use without a speech decision treats every chunk as non-speech
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.process_chunk(buffer, false)
    }

    fn reset(&mut self) {
        self.profile.fill(0.0);
        self.frames_learned = 0;
        self.carry.fill(0.0);
        self.prev_tail.fill(0.0);
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    fn name(&self) -> &str {
        "NoiseReduction"
    }
}

/// Symmetric Hann window
fn hann(len: usize) -> Vec<f32> {
    if len == 1 {
        return vec![1.0];
    }
    (0..len)
        .map(|n| {
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / (len - 1) as f32).cos()
        })
        .collect()
}
