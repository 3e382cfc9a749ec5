//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod session;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioError, AudioSink, AudioSource, SampleRate, VoiceActivityDetector,
};
pub use config::*;
pub use dsp::*;
pub use session::{SessionConfig, SpeechGateState, StreamSession};
