//! Remote session seam
//!
//! A [`Transport`] opens one [`LiveSession`]: a pair of channels carrying
//! encoded microphone frames out and decoded server frames in. Whatever
//! runs the actual connection holds the [`SessionRemote`] end.

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::Result;
use crate::session::profile::SessionProfile;
use crate::voice::AudioFrame;

/// Everything needed to open a session
#[derive(Debug, Clone)]
pub struct SessionSetup {
    /// API credential, never logged
    pub credential: SecretString,
    /// Persona and voice for this session
    pub profile: SessionProfile,
}

impl SessionSetup {
    #[must_use]
    pub fn new(credential: impl Into<String>, profile: SessionProfile) -> Self {
        Self {
            credential: SecretString::from(credential.into()),
            profile,
        }
    }
}

/// One server message as seen by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InboundFrame {
    /// Base64 PCM at the output rate, if this message carries audio
    pub audio_payload: Option<String>,
    /// The user started speaking over playback
    pub interrupted: bool,
}

impl InboundFrame {
    /// Frame carrying only audio
    #[must_use]
    pub fn audio(payload: impl Into<String>) -> Self {
        Self {
            audio_payload: Some(payload.into()),
            interrupted: false,
        }
    }

    /// Frame carrying only an interruption signal
    #[must_use]
    pub const fn interruption() -> Self {
        Self {
            audio_payload: None,
            interrupted: true,
        }
    }
}

/// One encoded microphone window ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Base64 PCM
    pub media_bytes: String,
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

impl From<&AudioFrame> for OutboundFrame {
    fn from(frame: &AudioFrame) -> Self {
        Self {
            media_bytes: frame.to_transport_text(),
            mime_type: frame.mime_type(),
        }
    }
}

/// Message from the bridge to the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(OutboundFrame),
    /// Ask the remote to close; nobody waits for the answer
    Close,
}

/// Message from the connection task to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Frame(InboundFrame),
    Closed { reason: Option<String> },
    Failed(String),
}

/// Cloneable, non-blocking handle for sending microphone frames
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl FrameSender {
    /// Queue a frame for sending
    ///
    /// Returns `false` once the session is gone.
    pub fn send(&self, frame: &AudioFrame) -> bool {
        self.tx.send(Outbound::Frame(frame.into())).is_ok()
    }
}

/// An open remote session, owned by the bridge
#[derive(Debug)]
pub struct LiveSession {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Connection-side end of a [`LiveSession`]
#[derive(Debug)]
pub struct SessionRemote {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub inbound: mpsc::UnboundedSender<SessionEvent>,
}

impl LiveSession {
    /// Create a session and the remote end that drives it
    #[must_use]
    pub fn pair() -> (Self, SessionRemote) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let session = Self {
            id: Uuid::new_v4(),
            outbound: out_tx,
            inbound: in_rx,
        };
        let remote = SessionRemote {
            outbound: out_rx,
            inbound: in_tx,
        };

        (session, remote)
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Sender for microphone frames
    #[must_use]
    pub fn sender(&self) -> FrameSender {
        FrameSender {
            tx: self.outbound.clone(),
        }
    }

    /// Wait for the next event from the remote
    ///
    /// Cancel safe. When the remote end goes away without saying why, this
    /// reports a close with no reason.
    pub async fn next_event(&mut self) -> SessionEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(SessionEvent::Closed { reason: None })
    }

    /// Request a close without waiting for confirmation
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Opens remote streaming sessions
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session and wait until the remote confirms it is ready
    ///
    /// # Errors
    ///
    /// Returns error if the connection or session setup fails
    async fn open(&self, setup: SessionSetup) -> Result<LiveSession>;
}
