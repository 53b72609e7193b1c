//! Configuration management for Beacon Live
//!
//! Values are layered env > TOML file > defaults.

pub mod file;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::session::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL, GeminiLiveTransport};
use crate::session::{SessionProfile, Voice};
use crate::{Error, Result};

use self::file::LiveConfigFile;

/// Beacon Live configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote session configuration
    pub session: SessionConfig,

    /// Voice configuration
    pub voice: VoiceConfig,
}

/// Remote session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// API credential (from `GEMINI_API_KEY`, falling back to `API_KEY`)
    pub api_key: Option<SecretString>,

    /// Model identifier
    pub model: String,

    /// Websocket endpoint
    pub endpoint: String,

    /// Time allowed for connect plus setup
    pub connect_timeout: Duration,
}

/// Voice configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Prebuilt voice
    pub voice: Voice,

    /// System instruction text
    pub persona: String,

    /// Gain applied to synthesized speech
    pub output_gain: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            persona: String::new(),
            output_gain: 1.0,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured voice or gain is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured voice or gain is invalid
    pub fn from_sources<F>(fc: LiveConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SessionConfig::default();

        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(fc.session.api_key)
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        let session = SessionConfig {
            api_key,
            model: env("BEACON_LIVE_MODEL")
                .or(fc.session.model)
                .unwrap_or(defaults.model),
            endpoint: env("BEACON_LIVE_ENDPOINT")
                .or(fc.session.endpoint)
                .unwrap_or(defaults.endpoint),
            connect_timeout: fc
                .session
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
        };

        let voice = match env("BEACON_LIVE_VOICE").or(fc.voice.name) {
            Some(name) => name.parse()?,
            None => Voice::default(),
        };

        let output_gain = match env("BEACON_LIVE_OUTPUT_GAIN") {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .map_err(|e| Error::Config(format!("invalid output gain {raw:?}: {e}")))?,
            None => fc.voice.output_gain.unwrap_or(1.0),
        };
        if !output_gain.is_finite() || output_gain < 0.0 {
            return Err(Error::Config(format!("output gain must be non-negative, got {output_gain}")));
        }

        let voice = VoiceConfig {
            voice,
            persona: env("BEACON_LIVE_PERSONA")
                .or(fc.voice.persona)
                .unwrap_or_default(),
            output_gain,
        };

        Ok(Self { session, voice })
    }

    /// Credential text for `connect`; empty when none is configured
    #[must_use]
    pub fn credential(&self) -> String {
        self.session
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().to_string())
            .unwrap_or_default()
    }

    /// Initial persona and voice
    #[must_use]
    pub fn profile(&self) -> SessionProfile {
        SessionProfile {
            persona: self.voice.persona.clone(),
            voice: self.voice.voice,
        }
    }

    /// Transport for the configured endpoint and model
    #[must_use]
    pub fn transport(&self) -> GeminiLiveTransport {
        GeminiLiveTransport::new(&self.session.endpoint, &self.session.model)
            .with_connect_timeout(self.session.connect_timeout)
    }
}
