//! Example demonstrating the configuration and preset management system
//!
//! Run with: cargo run --package madrigal-core --example preset_demo

use madrigal_core::domain::config::{EngineConfig, PresetManager};
use madrigal_core::domain::dsp::{DelayParams, EffectType};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("madrigal_core=debug,info")
        .init();

    println!("=== Madrigal Configuration Demo ===\n");

    // 1. Create factory default configuration
    println!("1. Creating factory default configuration...");
    let mut config = EngineConfig::factory_default();
    println!(
        "   Session: {} Hz, {} ms chunks, gain {}",
        config.session.sample_rate, config.session.chunk_ms, config.session.gain
    );

    // 2. Extend the effect chain
    println!("\n2. Adding a delay to the effect chain...");
    config.chain.add(EffectType::Delay(DelayParams {
        delay_secs: Some(0.25),
        feedback: Some(0.4),
        mix: Some(0.3),
    }));
    for (i, effect) in config.chain.effects().iter().enumerate() {
        println!("   {}. {}", i + 1, effect.name());
    }

    // 3. Save and reload through the preset manager
    println!("\n3. Preset management:");
    let preset_dir = std::path::PathBuf::from("demo_presets");
    let preset_manager = PresetManager::new(preset_dir.clone());

    println!("   Saving preset 'voice_delay'...");
    preset_manager.save_preset("voice_delay", &config).await?;

    println!("   Listing available presets...");
    for preset in preset_manager.list_presets().await? {
        println!("   - {}", preset);
    }

    println!("   Loading preset 'voice_delay'...");
    let loaded = preset_manager.load_preset("voice_delay").await?;
    println!("   Loaded chain with {} effects", loaded.chain.len());

    // 4. Instantiate the runtime processor
    println!("\n4. Creating a processor from the loaded chain...");
    let mut processor = loaded.chain.create_processor(loaded.session.sample_rate);
    let mut buffer = vec![0.25_f32; loaded.session.chunk_size()];
    processor.process(&mut buffer)?;
    println!("   Processed one {}-sample chunk", buffer.len());

    println!("\n=== Demo Complete ===");

    // Cleanup
    std::fs::remove_dir_all(preset_dir)?;

    Ok(())
}
