//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-live/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LiveConfigFile {
    /// Remote session configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Voice and persona configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Remote session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// API credential for the realtime model
    pub api_key: Option<String>,

    /// Model identifier (e.g. "models/gemini-2.5-flash-native-audio-preview-09-2025")
    pub model: Option<String>,

    /// Websocket endpoint override
    pub endpoint: Option<String>,

    /// Seconds allowed for connect plus setup
    pub connect_timeout_secs: Option<u64>,
}

/// Voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Prebuilt voice name (e.g. "Kore")
    pub name: Option<String>,

    /// System instruction text
    pub persona: Option<String>,

    /// Gain applied to synthesized speech
    pub output_gain: Option<f32>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LiveConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LiveConfigFile {
    config_file_path().map_or_else(LiveConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> LiveConfigFile {
    if !path.exists() {
        return LiveConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                LiveConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LiveConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-live/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-live")
            .join("config.toml")
    })
}
