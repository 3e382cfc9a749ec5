//! FFT-based convolution against a loaded impulse response
//!
//! The engine performs full linear convolution in the frequency domain:
//! both signals are zero-padded to the next power of two covering
//! `input_len + ir_len - 1`, multiplied bin-wise, and transformed back. The
//! impulse response spectrum is cached per FFT size, so a steady chunk size
//! pays for the IR transform once.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{Effect, Result};

/// Mono impulse response at the engine sample rate
///
/// Multichannel material is downmixed by channel averaging; a source rate
/// differing from the engine rate is bridged with a best-effort linear
/// resample. IR material is smooth enough that linear interpolation is
/// adequate for room tails.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    samples: Vec<f32>,
}

impl ImpulseResponse {
    /// Build an impulse response from interleaved frames
    ///
    /// `interleaved.len()` must be a multiple of `channels`; trailing
    /// partial frames are dropped.
    pub fn new(interleaved: &[f32], channels: usize, source_rate: u32, engine_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = interleaved.len() / channels;
        let mut mono: Vec<f32> = (0..frames)
            .map(|f| {
                let frame = &interleaved[f * channels..(f + 1) * channels];
                frame.iter().sum::<f32>() / channels as f32
            })
            .collect();

        if source_rate != engine_rate && !mono.is_empty() {
            mono = linear_resample(&mono, source_rate, engine_rate);
            debug!(source_rate, engine_rate, len = mono.len(), "impulse response resampled");
        }

        Self { samples: mono }
    }

    /// Impulse response already at the engine rate, mono
    pub fn from_mono(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Linear-interpolation resampler
///
/// Index positions map proportionally between rates; each output sample
/// blends the two straddling input samples.
fn linear_resample(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let out_len =
        ((input.len() as u64 * target_rate as u64) / source_rate as u64).max(1) as usize;
    let ratio = source_rate as f64 / target_rate as f64;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let i0 = pos as usize;
            let frac = (pos - i0 as f64) as f32;
            let a = input.get(i0).copied().unwrap_or(0.0);
            let b = input.get(i0 + 1).copied().unwrap_or(a);
            a * (1.0 - frac) + b * frac
        })
        .collect()
}

/// Frequency-domain convolution engine
///
/// An empty impulse response puts the engine in a disabled pass-through
/// state (warned once at construction), never an error.
pub struct ConvolutionEngine {
    bypass: bool,
    ir: ImpulseResponse,
    planner: FftPlanner<f32>,
    // IR spectrum keyed by FFT size; chunk sizes are steady in practice so
    // this holds one or two entries
    ir_spectra: HashMap<usize, Vec<Complex<f32>>>,
    scratch: Vec<Complex<f32>>,
}

impl ConvolutionEngine {
    pub fn new(ir: ImpulseResponse) -> Self {
        if ir.is_empty() {
            warn!("impulse response is empty, convolution disabled");
        }
        Self {
            bypass: false,
            ir,
            planner: FftPlanner::new(),
            ir_spectra: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    pub fn ir_len(&self) -> usize {
        self.ir.len()
    }

    /// Full linear convolution of `input` with the impulse response
    ///
    /// The result has length `input.len() + ir_len - 1`. If the result's
    /// peak exceeds 1.0 it is normalized back to peak 1.0; quieter results
    /// are left untouched.
    pub fn convolve(&mut self, input: &[f32]) -> Vec<f32> {
        if self.ir.is_empty() || input.is_empty() {
            return input.to_vec();
        }

        let out_len = input.len() + self.ir.len() - 1;
        let fft_size = out_len.next_power_of_two();

        let forward = self.planner.plan_fft_forward(fft_size);
        let inverse = self.planner.plan_fft_inverse(fft_size);

        let ir_spectrum = Self::ir_spectrum_for(
            &mut self.ir_spectra,
            &self.ir,
            fft_size,
            forward.as_ref(),
        );

        self.scratch.clear();
        self.scratch
            .extend(input.iter().map(|&s| Complex::new(s, 0.0)));
        self.scratch.resize(fft_size, Complex::new(0.0, 0.0));
        forward.process(&mut self.scratch);

        for (bin, ir_bin) in self.scratch.iter_mut().zip(ir_spectrum.iter()) {
            *bin *= ir_bin;
        }

        inverse.process(&mut self.scratch);

        // rustfft's inverse is unnormalized
        let norm = 1.0 / fft_size as f32;
        let mut output: Vec<f32> = self.scratch[..out_len]
            .iter()
            .map(|c| c.re * norm)
            .collect();

        let peak = output.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);
        if peak > 1.0 {
            let scale = 1.0 / peak;
            for sample in output.iter_mut() {
                *sample *= scale;
            }
        }

        output
    }

    fn ir_spectrum_for<'a>(
        spectra: &'a mut HashMap<usize, Vec<Complex<f32>>>,
        ir: &ImpulseResponse,
        fft_size: usize,
        forward: &dyn Fft<f32>,
    ) -> &'a [Complex<f32>] {
        spectra.entry(fft_size).or_insert_with(|| {
            let mut spectrum: Vec<Complex<f32>> = ir
                .samples()
                .iter()
                .map(|&s| Complex::new(s, 0.0))
                .collect();
            spectrum.resize(fft_size, Complex::new(0.0, 0.0));
            forward.process(&mut spectrum);
            spectrum
        })
    }
}

impl Effect for ConvolutionEngine {
    /// In-place chunk processing keeps the head of the full convolution
    ///
    /// The tail past the chunk boundary is discarded; callers needing the
    /// complete result use [`ConvolutionEngine::convolve`].
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass || self.ir.is_empty() || buffer.is_empty() {
            return Ok(());
        }
        let full = self.convolve(buffer);
        buffer.copy_from_slice(&full[..buffer.len()]);
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
        "Convolution"
    }
}
