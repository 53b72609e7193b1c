//! Session lifecycle states and their public projection

use std::fmt;

/// Internal lifecycle of the session bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No session has been attempted
    Idle,
    /// Waiting for the remote session to confirm it is open
    Connecting,
    /// Session open, microphone streaming
    Open,
    /// Session ended normally or was disconnected locally
    Closed,
    /// Session or device failure
    Failed,
}

impl BridgeState {
    /// Whether a session is connecting or open
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// Connection state visible to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl From<BridgeState> for ConnectionState {
    fn from(state: BridgeState) -> Self {
        match state {
            BridgeState::Idle | BridgeState::Closed => Self::Disconnected,
            BridgeState::Connecting => Self::Connecting,
            BridgeState::Open => Self::Connected,
            BridgeState::Failed => Self::Error,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Connection state plus the last user-facing error, if any
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub error: Option<String>,
}

impl ConnectionStatus {
    /// Project a bridge state and error text into the public status
    #[must_use]
    pub fn project(state: BridgeState, error: Option<String>) -> Self {
        Self {
            state: state.into(),
            error,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{} ({error})", self.state),
            None => write!(f, "{}", self.state),
        }
    }
}
