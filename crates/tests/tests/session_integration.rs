//! Integration tests for the stream session and runner
//!
//! These cover the complete per-chunk pipeline end to end: noise-profile
//! learning, the speech gate opening and closing around real signal, pop
//! muting, and the runner's source-to-sink accounting.

use madrigal_core::domain::config::EngineConfig;
use madrigal_core::domain::session::{SessionConfig, SpeechGateState, StreamSession};
use madrigal_infra::audio::{BufferSink, BufferSource, EnergyVad, EnergyVadConfig, StreamRunner};
use madrigal_tests::{noise_i16, sine_i16, ScriptedVad};

fn test_config() -> SessionConfig {
    SessionConfig {
        sample_rate: 16000,
        chunk_ms: 20,
        ..Default::default()
    }
}

// ============================================================================
// LEARNING AND GATING
// ============================================================================

#[test]
fn test_silence_in_silence_out_while_learning() {
    let config = test_config();
    let chunk_size = config.chunk_size();
    let learning = config.learning_frames;
    let mut session = StreamSession::new(config, ScriptedVad::new(vec![false])).unwrap();

    let mut output = vec![0i16; chunk_size];
    for seed in 0..learning as u64 {
        let input = noise_i16(seed, chunk_size, 0.01);
        session.process_chunk(&input, &mut output).unwrap();
        // Gate is closed, so nothing leaves the session
        assert!(output.iter().all(|&s| s == 0));
    }
    assert!(session.noise_profile_learned());
    assert_eq!(session.gate_state(), SpeechGateState::Closed);
}

#[test]
fn test_speech_emerges_after_gate_opens() {
    let config = test_config();
    let chunk_size = config.chunk_size();
    let learning = config.learning_frames;
    let threshold = config.speech_frame_threshold as usize;

    // Non-speech while learning, then sustained speech
    let mut script = vec![false; learning];
    script.extend(vec![true; 50]);
    let mut session = StreamSession::new(config, ScriptedVad::new(script)).unwrap();

    let mut output = vec![0i16; chunk_size];

    for seed in 0..learning as u64 {
        let input = noise_i16(seed, chunk_size, 0.01);
        session.process_chunk(&input, &mut output).unwrap();
    }

    let tone = sine_i16(440.0, 16000, chunk_size, 0.3);
    let mut first_emitted = None;
    for i in 0..threshold + 5 {
        session.process_chunk(&tone, &mut output).unwrap();
        if first_emitted.is_none() && output.iter().any(|&s| s != 0) {
            first_emitted = Some(i);
        }
    }

    // Emission starts only once enough speech frames accumulated
    let first = first_emitted.expect("gate never opened");
    assert!(first >= threshold - 1);
    assert_eq!(session.gate_state(), SpeechGateState::Open);
}

#[test]
fn test_gate_closes_and_silence_resumes() {
    let config = test_config();
    let chunk_size = config.chunk_size();
    let threshold = config.speech_frame_threshold as usize;

    let mut script = vec![true; threshold];
    script.extend(vec![false; 60]);
    let mut session = StreamSession::new(config, ScriptedVad::new(script)).unwrap();

    let tone = sine_i16(440.0, 16000, chunk_size, 0.3);
    let mut output = vec![0i16; chunk_size];

    for _ in 0..threshold {
        session.process_chunk(&tone, &mut output).unwrap();
    }
    assert_eq!(session.gate_state(), SpeechGateState::Open);

    // Bleed the gate shut, then verify the output is muted again
    for _ in 0..threshold + 1 {
        session.process_chunk(&tone, &mut output).unwrap();
    }
    assert_eq!(session.gate_state(), SpeechGateState::Closed);

    session.process_chunk(&tone, &mut output).unwrap();
    assert!(output.iter().all(|&s| s == 0));
}

// ============================================================================
// POP MUTING
// ============================================================================

#[test]
fn test_pop_silences_open_gate() {
    let config = SessionConfig {
        pop_energy_jump: 1.0,
        pop_min_energy: 0.001,
        pop_rms_floor: 0.001,
        ..test_config()
    };
    let chunk_size = config.chunk_size();
    let pop_frames = config.pop_silence_frames;
    let mut session = StreamSession::new(config, ScriptedVad::new(vec![true])).unwrap();

    let quiet = sine_i16(440.0, 16000, chunk_size, 0.01);
    let loud = sine_i16(440.0, 16000, chunk_size, 0.9);
    let mut output = vec![0i16; chunk_size];

    // Open the gate on quiet speech
    for _ in 0..8 {
        session.process_chunk(&quiet, &mut output).unwrap();
    }
    assert_eq!(session.gate_state(), SpeechGateState::Open);

    // The energy step arms the mute window; the window outlasts the step
    let mut muted_chunks = 0;
    for _ in 0..pop_frames + 5 {
        session.process_chunk(&loud, &mut output).unwrap();
        if output.iter().all(|&s| s == 0) {
            muted_chunks += 1;
        }
    }
    assert_eq!(muted_chunks, pop_frames);
}

// ============================================================================
// RUNNER END TO END
// ============================================================================

#[test]
fn test_runner_with_energy_vad_passes_speech_blocks_noise() {
    let config = test_config();
    let chunk_size = config.chunk_size();
    let sample_rate = config.sample_rate;
    let vad = Box::new(EnergyVad::new(EnergyVadConfig::default()));
    let session = StreamSession::new(config, vad).unwrap();
    let mut runner = StreamRunner::new(session);

    // Quiet noise long enough to learn, then a loud tone burst
    let mut capture = noise_i16(7, chunk_size * 15, 0.002);
    capture.extend(sine_i16(440.0, sample_rate, chunk_size * 30, 0.4));

    let mut source = BufferSource::new(capture);
    let mut sink = BufferSink::new();
    let stats = runner.run(&mut source, &mut sink).unwrap();

    assert_eq!(stats.chunks, 45);
    assert_eq!(sink.samples().len(), chunk_size * 45);

    // The noise region stays silent, the burst region carries signal
    let noise_region = &sink.samples()[..chunk_size * 15];
    assert!(noise_region.iter().all(|&s| s == 0));
    let burst_region = &sink.samples()[chunk_size * 25..];
    assert!(burst_region.iter().any(|&s| s != 0));
}

#[test]
fn test_scope_sees_frames_without_blocking_the_run() {
    let config = SessionConfig {
        scope_depth: 4,
        ..test_config()
    };
    let chunk_size = config.chunk_size();
    let session = StreamSession::new(config, ScriptedVad::new(vec![false])).unwrap();
    let mut runner = StreamRunner::new(session);
    let scope = runner.session().scope();

    let mut source = BufferSource::new(noise_i16(3, chunk_size * 50, 0.01));
    let mut sink = BufferSink::new();
    let stats = runner.run(&mut source, &mut sink).unwrap();

    // All 50 chunks processed even though nobody drained the scope
    assert_eq!(stats.chunks, 50);
    assert_eq!(scope.len(), 4);
    assert_eq!(scope.recv().unwrap().len(), chunk_size);
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[tokio::test]
async fn test_session_built_from_saved_config() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("engine.toml");

    let mut config = EngineConfig::factory_default();
    config.session.sample_rate = 16000;
    config.session.chunk_ms = 20;
    config.session.gain = 2.0;
    config.save_to_file(&path).await.unwrap();

    let loaded = EngineConfig::load_from_file(&path).await.unwrap();
    assert_eq!(loaded.session.gain, 2.0);

    let session = StreamSession::new(loaded.session, ScriptedVad::new(vec![false])).unwrap();
    assert_eq!(session.chunk_size(), 320);
}
