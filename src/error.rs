//! Error types for Beacon Live

use thiserror::Error;

/// Result type alias for Beacon Live operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Beacon Live
#[derive(Debug, Error)]
pub enum Error {
    /// No API credential was supplied to `connect`
    #[error("missing API credential")]
    MissingCredential,

    /// Microphone access refused or no input device available
    #[error("microphone permission denied: {0}")]
    MicrophonePermissionDenied(String),

    /// Audio payload could not be decoded
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// Opaque failure reported by (or while talking to) the remote session
    #[error("session error: {0}")]
    Session(String),

    /// `connect` called while a session is connecting or open
    #[error("already connected")]
    AlreadyConnected,

    /// Playback requested after the scheduler was torn down
    #[error("playback scheduled after close")]
    ScheduleAfterClose,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl Error {
    /// Human-readable status line shown to the user
    ///
    /// Structured error details stay in the logs; observers only ever see
    /// this string.
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            Self::MissingCredential => "API key is missing.".to_string(),
            Self::MicrophonePermissionDenied(_) => "Microphone access was denied.".to_string(),
            Self::AlreadyConnected => "A session is already active.".to_string(),
            Self::Session(_) | Self::WebSocket(_) => "A connection error occurred.".to_string(),
            Self::Audio(_) => "Audio device unavailable.".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_hides_details() {
        let err = Error::Session("4003 quota exceeded for key AIza...".to_string());
        assert_eq!(err.status_message(), "A connection error occurred.");

        let err = Error::MicrophonePermissionDenied("NotAllowedError".to_string());
        assert!(!err.status_message().contains("NotAllowedError"));
    }

    #[test]
    fn test_status_message_falls_back_to_display() {
        let err = Error::Config("bad voice".to_string());
        assert_eq!(err.status_message(), "configuration error: bad voice");
    }
}
