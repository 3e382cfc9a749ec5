//! Offline stream driving
//!
//! `StreamRunner` pumps fixed-size chunks from an [`AudioSource`] through a
//! [`StreamSession`] into an [`AudioSink`], accounting for how often a
//! chunk's processing time blows its real-time budget. The in-memory
//! `BufferSource` and `BufferSink` back file renders, the CLI demo, and the
//! integration tests.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use madrigal_core::domain::audio::{AudioSink, AudioSource, Result};
use madrigal_core::domain::session::StreamSession;

/// Counters accumulated over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Chunks pushed through the session
    pub chunks: u64,
    /// Chunks whose processing exceeded the chunk's wall-clock duration
    pub deadline_overruns: u64,
}

/// Drives a session between a source and a sink until the source ends
pub struct StreamRunner {
    session: StreamSession,
    chunk_budget: Duration,
}

impl StreamRunner {
    pub fn new(session: StreamSession) -> Self {
        let chunk_budget = Duration::from_millis(session.config().chunk_ms as u64);
        Self {
            session,
            chunk_budget,
        }
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Run until the source reports end of stream
    ///
    /// A source chunk shorter than the session size (the stream's last
    /// chunk) is zero-padded before processing.
    pub fn run(
        &mut self,
        source: &mut dyn AudioSource,
        sink: &mut dyn AudioSink,
    ) -> Result<RunnerStats> {
        let chunk_size = self.session.chunk_size();
        let mut input = vec![0i16; chunk_size];
        let mut output = vec![0i16; chunk_size];
        let mut stats = RunnerStats::default();

        info!(chunk_size, budget_ms = self.chunk_budget.as_millis() as u64, "runner started");

        loop {
            let written = source.next_chunk(&mut input)?;
            if written == 0 {
                break;
            }
            if written < chunk_size {
                input[written..].fill(0);
            }

            let started = Instant::now();
            self.session.process_chunk(&input, &mut output)?;
            let elapsed = started.elapsed();

            if elapsed > self.chunk_budget {
                stats.deadline_overruns += 1;
                warn!(
                    elapsed_us = elapsed.as_micros() as u64,
                    budget_us = self.chunk_budget.as_micros() as u64,
                    "chunk missed its real-time budget"
                );
            }

            sink.submit(&output)?;
            stats.chunks += 1;
        }

        debug!(
            chunks = stats.chunks,
            overruns = stats.deadline_overruns,
            "runner finished"
        );
        Ok(stats)
    }
}

/// Source reading from an in-memory sample buffer
pub struct BufferSource {
    samples: Vec<i16>,
    pos: usize,
}

impl BufferSource {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples, pos: 0 }
    }
}

impl AudioSource for BufferSource {
    fn next_chunk(&mut self, buf: &mut [i16]) -> Result<usize> {
        let remaining = self.samples.len() - self.pos;
        if remaining == 0 {
            return Ok(0);
        }
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Sink appending into an in-memory sample buffer
#[derive(Default)]
pub struct BufferSink {
    samples: Vec<i16>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

impl AudioSink for BufferSink {
    fn submit(&mut self, chunk: &[i16]) -> Result<()> {
        self.samples.extend_from_slice(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{EnergyVad, EnergyVadConfig};
    use madrigal_core::domain::session::SessionConfig;

    fn test_session() -> StreamSession {
        let config = SessionConfig {
            sample_rate: 16000,
            chunk_ms: 20,
            ..Default::default()
        };
        let vad = Box::new(EnergyVad::new(EnergyVadConfig::default()));
        StreamSession::new(config, vad).unwrap()
    }

    #[test]
    fn test_runner_consumes_whole_source() {
        let mut runner = StreamRunner::new(test_session());
        let chunk_size = runner.session().chunk_size();

        let mut source = BufferSource::new(vec![100i16; chunk_size * 7]);
        let mut sink = BufferSink::new();
        let stats = runner.run(&mut source, &mut sink).unwrap();

        assert_eq!(stats.chunks, 7);
        assert_eq!(sink.samples().len(), chunk_size * 7);
    }

    #[test]
    fn test_partial_final_chunk_is_padded() {
        let mut runner = StreamRunner::new(test_session());
        let chunk_size = runner.session().chunk_size();

        let mut source = BufferSource::new(vec![100i16; chunk_size + chunk_size / 2]);
        let mut sink = BufferSink::new();
        let stats = runner.run(&mut source, &mut sink).unwrap();

        // The half chunk still produces a full output chunk
        assert_eq!(stats.chunks, 2);
        assert_eq!(sink.samples().len(), chunk_size * 2);
    }

    #[test]
    fn test_empty_source_produces_nothing() {
        let mut runner = StreamRunner::new(test_session());
        let mut source = BufferSource::new(Vec::new());
        let mut sink = BufferSink::new();
        let stats = runner.run(&mut source, &mut sink).unwrap();

        assert_eq!(stats, RunnerStats::default());
        assert!(sink.samples().is_empty());
    }
}
