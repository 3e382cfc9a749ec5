//! Audio collaborator implementations

mod runner;
mod vad;

pub use runner::{BufferSink, BufferSource, RunnerStats, StreamRunner};
pub use vad::{EnergyVad, EnergyVadConfig};
