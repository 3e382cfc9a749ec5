//! Configuration management for Madrigal
//!
//! This module provides:
//! - The top-level engine configuration (session tuning + effect chain)
//! - TOML load/save with async IO
//! - Preset system storing named configurations as TOML files

use crate::domain::dsp::EffectsChain;
use crate::domain::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Complete Madrigal configuration
///
/// The session section tunes the stream orchestrator; the chain section is
/// the optional post-processing effect chain applied by tooling that runs
/// offline renders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub chain: EffectsChain,
}

impl EngineConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config
            .session
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Factory default: stock session tuning and a voice-friendly chain
    pub fn factory_default() -> Self {
        use crate::domain::dsp::{EffectType, ThreeBandEqParams};

        let mut chain = EffectsChain::new();
        chain.add(EffectType::ThreeBandEq(ThreeBandEqParams {
            low_gain_db: -2.0,
            mid_gain_db: 1.0,
            high_gain_db: 0.0,
        }));

        Self {
            session: SessionConfig::default(),
            chain,
        }
    }

    /// Load from `path` if present, otherwise create the factory default
    ///
    /// A corrupt file is backed up next to the original and replaced by the
    /// factory default rather than aborting startup.
    #[instrument]
    pub async fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, creating factory default"
            );

            let config = Self::factory_default();
            if let Err(e) = config.save_to_file(path).await {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match Self::load_from_file(path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                Self::factory_default()
            }
        }
    }
}

/// Preset manager
///
/// Presets are full `EngineConfig` snapshots stored as `<name>.toml` under
/// one directory.
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>, ConfigError> {
        let mut presets = Vec::new();

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<EngineConfig, ConfigError> {
        let path = self.preset_dir.join(format!("{}.toml", name));

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        EngineConfig::load_from_file(&path).await
    }

    /// Save a preset by name
    #[instrument(skip(self, config))]
    pub async fn save_preset(&self, name: &str, config: &EngineConfig) -> Result<(), ConfigError> {
        let path = self.preset_dir.join(format!("{}.toml", name));
        config.save_to_file(&path).await
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<(), ConfigError> {
        let path = self.preset_dir.join(format!("{}.toml", name));

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, name: &str) -> bool {
        let path = self.preset_dir.join(format!("{}.toml", name));
        path.exists()
    }
}
