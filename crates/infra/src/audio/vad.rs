//! Energy-based voice-activity detection
//!
//! A level detector standing behind the engine's classifier seam: a chunk
//! is speech when its RMS level in dBFS clears the threshold, and hangover
//! frames keep the decision alive through short intra-word dips so the
//! downstream gate does not flutter.

use madrigal_core::domain::audio::{rms, VoiceActivityDetector};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Tuning for [`EnergyVad`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnergyVadConfig {
    /// Speech threshold in dBFS; chunks louder than this are speech
    pub threshold_dbfs: f32,
    /// Frames a speech decision persists after the level drops
    pub hangover_frames: u32,
}

impl Default for EnergyVadConfig {
    fn default() -> Self {
        Self {
            threshold_dbfs: -40.0,
            hangover_frames: 2,
        }
    }
}

/// RMS-threshold voice-activity detector with hangover
pub struct EnergyVad {
    config: EnergyVadConfig,
    hangover_remaining: u32,
}

impl EnergyVad {
    pub fn new(config: EnergyVadConfig) -> Self {
        Self {
            config,
            hangover_remaining: 0,
        }
    }

    fn level_dbfs(chunk: &[f32]) -> f32 {
        20.0 * rms(chunk).max(1e-10).log10()
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(EnergyVadConfig::default())
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn is_speech(&mut self, chunk: &[f32], _sample_rate: u32) -> bool {
        let level = Self::level_dbfs(chunk);
        if level > self.config.threshold_dbfs {
            self.hangover_remaining = self.config.hangover_frames;
            trace!(level, "speech");
            return true;
        }
        if self.hangover_remaining > 0 {
            self.hangover_remaining -= 1;
            trace!(level, remaining = self.hangover_remaining, "hangover");
            return true;
        }
        false
    }
}
