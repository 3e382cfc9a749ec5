//! Madrigal CLI Application
//!
//! Loads (or creates) the engine configuration, builds a stream session
//! with the energy voice-activity detector, and runs a synthetic capture
//! through it: background noise for the session to learn, then a tone
//! burst standing in for speech.

use clap::Parser;
use std::path::PathBuf;

use madrigal_core::domain::config::EngineConfig;
use madrigal_core::domain::session::StreamSession;
use madrigal_infra::audio::{BufferSink, BufferSource, EnergyVad, EnergyVadConfig, StreamRunner};

#[derive(Parser)]
#[command(name = "madrigal")]
#[command(about = "A real-time voice effects engine", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "madrigal.toml")]
    config: PathBuf,

    /// Length of the synthetic demo capture in seconds
    #[arg(long, default_value_t = 3.0)]
    duration_secs: f32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    tracing::info!("Madrigal starting");

    let config = EngineConfig::load_or_default(&cli.config).await;
    let vad = Box::new(EnergyVad::new(EnergyVadConfig::default()));
    let session = StreamSession::new(config.session.clone(), vad)?;

    let sample_rate = config.session.sample_rate;
    let capture = synthetic_capture(sample_rate, cli.duration_secs);
    tracing::info!(
        samples = capture.len(),
        duration_secs = cli.duration_secs,
        "running synthetic capture"
    );

    let mut runner = StreamRunner::new(session);
    let scope = runner.session().scope();

    let mut source = BufferSource::new(capture);
    let mut sink = BufferSink::new();
    let stats = runner.run(&mut source, &mut sink)?;

    let emitted = sink
        .samples()
        .iter()
        .filter(|&&s| s != 0)
        .count();
    tracing::info!(
        chunks = stats.chunks,
        overruns = stats.deadline_overruns,
        output_samples = sink.samples().len(),
        nonzero_samples = emitted,
        scope_frames_pending = scope.len(),
        "run complete"
    );

    Ok(())
}

/// Quiet noise for the learning phase, then a loud 440 Hz burst
fn synthetic_capture(sample_rate: u32, duration_secs: f32) -> Vec<i16> {
    let total = (sample_rate as f32 * duration_secs) as usize;
    let noise_len = total / 3;

    let mut state = 0x2545F4914F6CDD1Du64;
    (0..total)
        .map(|i| {
            if i < noise_len {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let unit = (state >> 33) as f32 / (1u64 << 31) as f32 - 1.0;
                (unit * 0.002 * 32767.0) as i16
            } else {
                let t = i as f32 / sample_rate as f32;
                let x = 0.4 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
                (x * 32767.0) as i16
            }
        })
        .collect()
}
