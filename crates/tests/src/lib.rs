//! Shared helpers for the integration-test suite

use madrigal_core::domain::audio::VoiceActivityDetector;

/// VAD that replays a scripted decision sequence, then repeats the last
pub struct ScriptedVad {
    script: Vec<bool>,
    pos: usize,
}

impl ScriptedVad {
    pub fn new(script: Vec<bool>) -> Box<Self> {
        Box::new(Self { script, pos: 0 })
    }
}

impl VoiceActivityDetector for ScriptedVad {
    fn is_speech(&mut self, _chunk: &[f32], _sample_rate: u32) -> bool {
        let decision = self
            .script
            .get(self.pos)
            .copied()
            .or_else(|| self.script.last().copied())
            .unwrap_or(false);
        self.pos += 1;
        decision
    }
}

/// Sine burst as i16 samples
pub fn sine_i16(frequency: f32, sample_rate: u32, num_samples: usize, amplitude: f32) -> Vec<i16> {
    (0..num_samples)
        .map(|i| {
            let x = amplitude
                * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin();
            (x * 32767.0) as i16
        })
        .collect()
}

/// Deterministic uniform noise as i16 samples
pub fn noise_i16(seed: u64, num_samples: usize, amplitude: f32) -> Vec<i16> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    (0..num_samples)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = (state >> 33) as f32 / (1u64 << 31) as f32 - 1.0;
            (unit * amplitude * 32767.0) as i16
        })
        .collect()
}
