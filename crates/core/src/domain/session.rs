//! Per-chunk stream orchestration
//!
//! `StreamSession` owns the full processing pipeline applied to each
//! fixed-size i16 chunk: conversion, bandpass filtering, voice-activity
//! gating, noise reduction, pop muting, output gain and quantization, plus a
//! non-blocking hand-off of the processed chunk to a visualization scope.
//!
//! The session never blocks in `process_chunk`; scratch buffers and FFT
//! plans are prepared at construction, and the only per-chunk allocation is
//! the frame cloned for the scope hand-off.

use crossbeam::channel::{bounded, Receiver, Sender};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::domain::audio::{
    f32_to_i16, i16_to_f32, rms, vad_frame_valid, AudioError, Result, VoiceActivityDetector,
};
use crate::domain::dsp::{BandpassFilter, Effect, NoiseReduction};

/// Stream session configuration
///
/// Defaults reproduce the tuning the engine ships with: 30 ms chunks at
/// 48 kHz, a 100 Hz to 12 kHz order-5 bandpass, and the gate/pop/learning
/// frame counts listed per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub sample_rate: u32,
    /// Chunk duration; must form a valid VAD frame with the sample rate
    pub chunk_ms: u32,
    pub bandpass_low_hz: f32,
    pub bandpass_high_hz: f32,
    pub filter_order: usize,
    /// Output gain applied to emitted speech
    pub gain: f32,
    /// Non-speech frames averaged into the noise profile before freezing
    pub learning_frames: usize,
    /// Consecutive speech frames required to open the gate
    pub speech_frame_threshold: u32,
    /// Chunks muted after a detected pop
    pub pop_silence_frames: u32,
    /// RMS floor a chunk must exceed for pop detection to trigger
    pub pop_rms_floor: f32,
    /// Spectral energy jump over the previous chunk that flags a pop
    pub pop_energy_jump: f32,
    /// Minimum total spectral energy for a pop candidate
    pub pop_min_energy: f32,
    /// Bound of the visualization channel; full means drop, never block
    pub scope_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            chunk_ms: 30,
            bandpass_low_hz: 100.0,
            bandpass_high_hz: 12000.0,
            filter_order: 5,
            gain: 3.0,
            learning_frames: 10,
            speech_frame_threshold: 5,
            pop_silence_frames: 10,
            pop_rms_floor: 0.05,
            pop_energy_jump: 500.0,
            pop_min_energy: 0.01,
            scope_depth: 16,
        }
    }
}

impl SessionConfig {
    /// Samples per chunk at the configured rate
    pub fn chunk_size(&self) -> usize {
        (self.sample_rate as u64 * self.chunk_ms as u64 / 1000) as usize
    }

    /// Validate the configuration
    ///
    /// The chunk geometry must be a frame length the voice-activity
    /// detector accepts, and the band edges must be ordered.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidConfiguration(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if !vad_frame_valid(self.sample_rate, self.chunk_size()) {
            return Err(AudioError::UnsupportedConfiguration(format!(
                "{} ms chunks at {} Hz are not a valid VAD frame",
                self.chunk_ms, self.sample_rate
            )));
        }
        if self.bandpass_low_hz <= 0.0 || self.bandpass_low_hz >= self.bandpass_high_hz {
            return Err(AudioError::InvalidConfiguration(format!(
                "bandpass edges {} and {} Hz are not an increasing positive pair",
                self.bandpass_low_hz, self.bandpass_high_hz
            )));
        }
        if self.scope_depth == 0 {
            return Err(AudioError::InvalidConfiguration(
                "scope capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observable phase of the speech gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechGateState {
    /// No recent speech; output is muted
    Closed,
    /// Speech accumulating but below the open threshold
    Opening,
    /// Gate open; chunks are emitted
    Open,
}

/// Chunk-by-chunk stream processor
///
/// Call [`StreamSession::process_chunk`] once per input chunk. Pipeline
/// order per chunk:
///
/// 1. i16 to f32 conversion
/// 2. Bandpass (filter state continues across chunks)
/// 3. Voice-activity decision on the filtered chunk
/// 4. Speech-gate hysteresis update
/// 5. Noise reduction (learning or suppression)
/// 6. Pop detection against the pre-filter spectrum
/// 7. Output decision: pop mute beats gate, gate beats everything else
///
/// The processed f32 chunk is offered to the scope channel afterwards; a
/// full channel drops the chunk rather than stalling the audio path.
pub struct StreamSession {
    config: SessionConfig,
    chunk_size: usize,
    vad: Box<dyn VoiceActivityDetector>,
    bandpass: BandpassFilter,
    noise_reduction: NoiseReduction,

    // Speech gate
    speech_frame_count: u32,
    gate_open: bool,

    // Pop guard
    pop_silence_counter: u32,
    prev_spectral_energy: f32,
    pop_fft: Arc<dyn Fft<f32>>,
    fft_scratch: Vec<Complex<f32>>,

    // Scratch
    raw: Vec<f32>,
    filtered: Vec<f32>,

    scope_tx: Sender<Vec<f32>>,
    scope_rx: Receiver<Vec<f32>>,
    scope_frames_dropped: u64,
    chunks_processed: u64,
}

impl StreamSession {
    pub fn new(config: SessionConfig, vad: Box<dyn VoiceActivityDetector>) -> Result<Self> {
        config.validate()?;
        let chunk_size = config.chunk_size();

        let bandpass = BandpassFilter::new(
            config.sample_rate,
            config.bandpass_low_hz,
            config.bandpass_high_hz,
            config.filter_order,
        );
        let mut noise_reduction = NoiseReduction::new(chunk_size);
        noise_reduction.set_params(&crate::domain::dsp::NoiseReductionParams {
            learning_frames: Some(config.learning_frames),
            alpha: None,
        });

        let (scope_tx, scope_rx) = bounded(config.scope_depth);
        let mut planner = FftPlanner::new();
        let pop_fft = planner.plan_fft_forward(chunk_size);

        info!(
            sample_rate = config.sample_rate,
            chunk_ms = config.chunk_ms,
            chunk_size,
            "stream session created"
        );

        Ok(Self {
            config,
            chunk_size,
            vad,
            bandpass,
            noise_reduction,
            speech_frame_count: 0,
            gate_open: false,
            pop_silence_counter: 0,
            prev_spectral_energy: 0.0,
            pop_fft,
            fft_scratch: vec![Complex::new(0.0, 0.0); chunk_size],
            raw: vec![0.0; chunk_size],
            filtered: vec![0.0; chunk_size],
            scope_tx,
            scope_rx,
            scope_frames_dropped: 0,
            chunks_processed: 0,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed
    }

    pub fn gate_state(&self) -> SpeechGateState {
        if self.gate_open {
            SpeechGateState::Open
        } else if self.speech_frame_count > 0 {
            SpeechGateState::Opening
        } else {
            SpeechGateState::Closed
        }
    }

    /// Whether the noise profile is frozen and suppression active
    pub fn noise_profile_learned(&self) -> bool {
        self.noise_reduction.is_learned()
    }

    /// Receiver side of the visualization channel
    ///
    /// Clones share the same bounded queue; slow consumers only cost
    /// dropped frames, never audio latency.
    pub fn scope(&self) -> Receiver<Vec<f32>> {
        self.scope_rx.clone()
    }

    /// Frames offered to the scope while its queue was full
    pub fn scope_frames_dropped(&self) -> u64 {
        self.scope_frames_dropped
    }

    /// Process one chunk of input into one chunk of output
    ///
    /// `input` and `output` must both match the session chunk size. A
    /// mis-sized chunk passes through unchanged with a warning; the stream
    /// callback never fails over a glitched capture buffer.
    pub fn process_chunk(&mut self, input: &[i16], output: &mut [i16]) -> Result<()> {
        if input.len() != self.chunk_size || output.len() != self.chunk_size {
            warn!(
                input_len = input.len(),
                output_len = output.len(),
                expected = self.chunk_size,
                "chunk length mismatch, passing through"
            );
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
            output[n..].fill(0);
            return Ok(());
        }

        i16_to_f32(input, &mut self.raw);
        self.filtered.copy_from_slice(&self.raw);
        self.bandpass.process(&mut self.filtered)?;

        let is_speech_frame = self
            .vad
            .is_speech(&self.filtered, self.config.sample_rate);
        self.update_gate(is_speech_frame);

        self.noise_reduction
            .process_chunk(&mut self.filtered, self.gate_open || is_speech_frame)?;

        self.detect_pop();

        // The scope sees the processed chunk before the output decision, so
        // a muted stream still visualizes. Full queue means the consumer is
        // behind; dropping keeps the audio path real-time.
        if self.scope_tx.try_send(self.filtered.clone()).is_err() {
            self.scope_frames_dropped += 1;
            trace!(
                dropped = self.scope_frames_dropped,
                "scope queue full, dropping frame"
            );
        }

        if self.pop_silence_counter > 0 {
            self.pop_silence_counter -= 1;
            output.fill(0);
        } else if self.gate_open {
            for sample in self.filtered.iter_mut() {
                *sample *= self.config.gain;
            }
            f32_to_i16(&self.filtered, output);
        } else {
            output.fill(0);
        }

        self.chunks_processed += 1;
        Ok(())
    }

    /// Speech-gate hysteresis
    ///
    /// Speech frames accumulate toward the open threshold; non-speech
    /// frames bleed the count back down, and the gate closes only when it
    /// reaches zero.
    fn update_gate(&mut self, is_speech_frame: bool) {
        if is_speech_frame {
            self.speech_frame_count = self.speech_frame_count.saturating_add(1);
            if !self.gate_open && self.speech_frame_count >= self.config.speech_frame_threshold {
                self.gate_open = true;
                info!(
                    frames = self.speech_frame_count,
                    "speech gate opened"
                );
            }
        } else {
            self.speech_frame_count = self.speech_frame_count.saturating_sub(1);
            if self.gate_open && self.speech_frame_count == 0 {
                self.gate_open = false;
                info!("speech gate closed");
            }
        }
    }

    /// Pop detection on the pre-filter chunk
    ///
    /// A pop is a large jump in total spectral magnitude over the previous
    /// chunk, gated by an absolute energy floor and a loudness floor on the
    /// filtered signal. Detection arms the mute counter; the energy
    /// baseline updates every chunk either way.
    fn detect_pop(&mut self) {
        for (slot, &sample) in self.fft_scratch.iter_mut().zip(self.raw.iter()) {
            *slot = Complex::new(sample, 0.0);
        }
        self.pop_fft.process(&mut self.fft_scratch);

        let total: f32 = self.fft_scratch.iter().map(|c| c.norm()).sum();
        let jump = total - self.prev_spectral_energy;

        if jump > self.config.pop_energy_jump
            && total >= self.config.pop_min_energy
            && rms(&self.filtered) > self.config.pop_rms_floor
        {
            self.pop_silence_counter = self.config.pop_silence_frames;
            warn!(jump, total, "pop detected, muting");
        } else {
            trace!(total, jump, "pop check");
        }

        self.prev_spectral_energy = total;
    }

    /// Reset all per-stream state, keeping the configuration
    pub fn reset(&mut self) {
        self.bandpass.reset();
        self.noise_reduction.reset();
        self.speech_frame_count = 0;
        self.gate_open = false;
        self.pop_silence_counter = 0;
        self.prev_spectral_energy = 0.0;
        self.scope_frames_dropped = 0;
        self.chunks_processed = 0;
        debug!("stream session reset");
    }
}
