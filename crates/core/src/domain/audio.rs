//! Audio domain types and collaborator seams
//!
//! This module defines the platform-agnostic vocabulary of the engine:
//! errors, sample rates, the source/sink/classifier traits the stream
//! session consumes, and the small conversion helpers shared by every
//! stage. Implementations of the collaborator traits live in the `infra`
//! crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Invalid configuration for an effect or session
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration is valid but not supported (e.g. VAD chunk geometry)
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Error in stream processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// The audio source failed to deliver a chunk
    #[error("Source error: {0}")]
    SourceError(String),

    /// The audio sink rejected a chunk
    #[error("Sink error: {0}")]
    SinkError(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz8000,
    Hz16000,
    Hz32000,
    Hz44100,
    Hz48000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz32000 => 32000,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            8000 => SampleRate::Hz8000,
            16000 => SampleRate::Hz16000,
            32000 => SampleRate::Hz32000,
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            hz => SampleRate::Custom(hz),
        }
    }
}

/// Source of fixed-size signed-16-bit input chunks (capture side)
pub trait AudioSource: Send {
    /// Fill `buf` with the next chunk of samples.
    ///
    /// Returns the number of samples written; 0 signals end of stream.
    fn next_chunk(&mut self, buf: &mut [i16]) -> Result<usize>;
}

/// Sink accepting fixed-size signed-16-bit output chunks (playback side)
pub trait AudioSink: Send {
    fn submit(&mut self, chunk: &[i16]) -> Result<()>;
}

/// Per-chunk speech/non-speech classifier
///
/// Only 10/20/30 ms chunks at 8/16/32/48 kHz are valid inputs, matching
/// the constraints of the telephony-grade classifiers this trait fronts.
pub trait VoiceActivityDetector: Send {
    fn is_speech(&mut self, chunk: &[f32], sample_rate: u32) -> bool;
}

/// Check that a chunk geometry is acceptable to a [`VoiceActivityDetector`]
pub fn vad_frame_valid(sample_rate: u32, chunk_len: usize) -> bool {
    if !matches!(sample_rate, 8000 | 16000 | 32000 | 48000) {
        return false;
    }
    [10, 20, 30]
        .iter()
        .any(|ms| chunk_len as u64 * 1000 == sample_rate as u64 * ms)
}

/// Convert signed-16-bit samples to normalized f32 in [-1.0, 1.0)
pub fn i16_to_f32(input: &[i16], output: &mut [f32]) {
    for (out, &sample) in output.iter_mut().zip(input) {
        *out = sample as f32 / 32768.0;
    }
}

/// Quantize normalized f32 samples to signed 16-bit with clamping
pub fn f32_to_i16(input: &[f32], output: &mut [i16]) {
    for (out, &sample) in output.iter_mut().zip(input) {
        *out = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
    }
}

/// Root-mean-square level of a chunk (0.0 for empty input)
pub fn rms(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = data.iter().map(|s| s * s).sum();
    (sum_sq / data.len() as f32).sqrt()
}
