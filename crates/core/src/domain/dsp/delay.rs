//! Feedback delay with dry/wet mix
//!
//! Classic circular-buffer delay line. Per sample, the tap `delay_samples`
//! behind the write cursor is read, the input plus scaled feedback is
//! written, and the output blends dry and delayed signal by the mix ratio.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Effect, Result};

/// Delay parameter update; `None` fields keep the current value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayParams {
    /// Delay time in seconds, clamped to the line's capacity
    pub delay_secs: Option<f32>,
    /// Feedback amount in [0, 1); 1.0 would self-oscillate forever
    pub feedback: Option<f32>,
    /// Dry/wet mix in [0, 1]
    pub mix: Option<f32>,
}

/// Circular-buffer feedback delay
pub struct Delay {
    bypass: bool,
    sample_rate: u32,
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
    feedback: f32,
    mix: f32,
}

impl Delay {
    pub const DEFAULT_DELAY_SECS: f32 = 0.3;
    pub const DEFAULT_FEEDBACK: f32 = 0.5;
    pub const DEFAULT_MIX: f32 = 0.5;
    /// Longest representable delay; sets the line's capacity
    pub const MAX_DELAY_SECS: f32 = 2.0;

    pub fn new(sample_rate: u32) -> Self {
        let capacity = (Self::MAX_DELAY_SECS * sample_rate as f32) as usize;
        let mut delay = Self {
            bypass: false,
            sample_rate,
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
            delay_samples: 0,
            feedback: Self::DEFAULT_FEEDBACK,
            mix: Self::DEFAULT_MIX,
        };
        delay.set_delay_secs(Self::DEFAULT_DELAY_SECS);
        delay
    }

    /// Set the delay time, clamping requests at or past the line capacity
    pub fn set_delay_secs(&mut self, delay_secs: f32) {
        let requested = (delay_secs.max(0.0) * self.sample_rate as f32) as usize;
        let capacity = self.buffer.len();
        if requested >= capacity {
            warn!(
                delay_secs,
                max_secs = Self::MAX_DELAY_SECS,
                "delay time exceeds line capacity, clamping"
            );
            self.delay_samples = capacity - 1;
        } else {
            self.delay_samples = requested;
        }
    }

    pub fn set_params(&mut self, params: &DelayParams) {
        if let Some(delay_secs) = params.delay_secs {
            self.set_delay_secs(delay_secs);
        }
        if let Some(feedback) = params.feedback {
            if (0.0..1.0).contains(&feedback) {
                self.feedback = feedback;
            } else {
                warn!(feedback, "delay feedback must be in [0, 1), keeping default");
                self.feedback = Self::DEFAULT_FEEDBACK;
            }
        }
        if let Some(mix) = params.mix {
            if (0.0..=1.0).contains(&mix) {
                self.mix = mix;
            } else {
                warn!(mix, "delay mix must be in [0, 1], keeping default");
                self.mix = Self::DEFAULT_MIX;
            }
        }
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }
}

impl Effect for Delay {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        let capacity = self.buffer.len();
        for sample in buffer.iter_mut() {
            let read_pos = (self.write_pos + capacity - self.delay_samples) % capacity;
            let delayed = self.buffer[read_pos];

            self.buffer[self.write_pos] = *sample + delayed * self.feedback;
            self.write_pos = (self.write_pos + 1) % capacity;

            *sample = *sample * (1.0 - self.mix) + delayed * self.mix;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
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
        "Delay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48000;

    #[test]
    fn test_impulse_reappears_after_delay_time() {
        let mut delay = Delay::new(SAMPLE_RATE);
        delay.set_params(&DelayParams {
            delay_secs: Some(0.001), // 48 samples
            feedback: Some(0.0),
            mix: Some(1.0),
        });

        let mut signal = vec![0.0; 200];
        signal[0] = 1.0;
        delay.process(&mut signal).unwrap();

        // Fully wet with zero feedback is a pure time shift
        assert_eq!(signal[0], 0.0);
        assert!((signal[48] - 1.0).abs() < 1e-6);
        assert!(signal[1..48].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_feedback_produces_decaying_echoes() {
        let mut delay = Delay::new(SAMPLE_RATE);
        delay.set_params(&DelayParams {
            delay_secs: Some(0.001),
            feedback: Some(0.5),
            mix: Some(1.0),
        });

        let mut signal = vec![0.0; 200];
        signal[0] = 1.0;
        delay.process(&mut signal).unwrap();

        assert!((signal[48] - 1.0).abs() < 1e-6);
        assert!((signal[96] - 0.5).abs() < 1e-6);
        assert!((signal[144] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_dry_mix_passes_input_through() {
        let mut delay = Delay::new(SAMPLE_RATE);
        delay.set_params(&DelayParams {
            mix: Some(0.0),
            ..Default::default()
        });

        let input: Vec<f32> = (0..100).map(|i| (i as f32 * 0.01).sin()).collect();
        let mut signal = input.clone();
        delay.process(&mut signal).unwrap();

        for (a, b) in input.iter().zip(signal.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_excessive_delay_clamps_to_capacity() {
        let mut delay = Delay::new(SAMPLE_RATE);
        delay.set_delay_secs(60.0);
        let capacity = (Delay::MAX_DELAY_SECS * SAMPLE_RATE as f32) as usize;
        assert_eq!(delay.delay_samples(), capacity - 1);
    }

    #[test]
    fn test_invalid_feedback_and_mix_fall_back() {
        let mut delay = Delay::new(SAMPLE_RATE);
        delay.set_params(&DelayParams {
            feedback: Some(1.5),
            mix: Some(-0.2),
            ..Default::default()
        });
        assert_eq!(delay.feedback, Delay::DEFAULT_FEEDBACK);
        assert_eq!(delay.mix, Delay::DEFAULT_MIX);
    }

    #[test]
    fn test_state_carries_across_chunks() {
        let mut delay = Delay::new(SAMPLE_RATE);
        delay.set_params(&DelayParams {
            delay_secs: Some(0.001),
            feedback: Some(0.0),
            mix: Some(1.0),
        });

        // Impulse in the first chunk shows up in the second
        let mut first = vec![0.0; 30];
        first[0] = 1.0;
        delay.process(&mut first).unwrap();

        let mut second = vec![0.0; 30];
        delay.process(&mut second).unwrap();
        assert!((second[18] - 1.0).abs() < 1e-6);
    }
}
