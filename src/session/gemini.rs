//! Gemini Live transport over a websocket
//!
//! Opens the `BidiGenerateContent` socket, performs the setup handshake and
//! then hands the socket to two tasks: a writer draining the session's
//! outbound queue and a reader turning server messages into
//! [`SessionEvent`]s.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use crate::session::protocol::{RealtimeInputMessage, ServerMessage, SetupMessage};
use crate::session::transport::{LiveSession, Outbound, SessionEvent, SessionSetup, Transport};
use crate::{Error, Result};

/// Gemini Live websocket endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Native-audio model used when none is configured
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Default time allowed for connect plus setup handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// [`Transport`] speaking the Gemini Live protocol
#[derive(Debug, Clone)]
pub struct GeminiLiveTransport {
    endpoint: String,
    model: String,
    connect_timeout: Duration,
}

impl Default for GeminiLiveTransport {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL)
    }
}

impl GeminiLiveTransport {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set how long connect and setup may take together
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn session_url(&self, setup: &SessionSetup) -> Result<Url> {
        Url::parse_with_params(
            &self.endpoint,
            &[("key", setup.credential.expose_secret())],
        )
        .map_err(|e| Error::Config(format!("invalid session endpoint: {e}")))
    }
}

#[async_trait]
impl Transport for GeminiLiveTransport {
    async fn open(&self, setup: SessionSetup) -> Result<LiveSession> {
        let url = self.session_url(&setup)?;

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            voice = %setup.profile.voice,
            "opening live session"
        );

        let handshake = async {
            let (mut ws, _) = connect_async(url.as_str()).await?;

            let message = serde_json::to_string(&SetupMessage::new(&self.model, &setup))?;
            ws.send(Message::Text(message)).await?;
            await_setup_complete(&mut ws).await?;

            Ok::<_, Error>(ws)
        };

        let ws = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| Error::Session("session setup timed out".to_string()))??;

        let (sink, stream) = ws.split();
        let (session, remote) = LiveSession::pair();

        tokio::spawn(write_loop(sink, remote.outbound));
        tokio::spawn(read_loop(stream, remote.inbound));

        tracing::info!(session_id = %session.id(), "live session open");
        Ok(session)
    }
}

/// Parse a text or binary frame as a server message
///
/// Returns `None` for control frames.
fn parse_server_message(message: &Message) -> Option<Result<ServerMessage>> {
    let parsed = match message {
        Message::Text(text) => serde_json::from_str(text),
        Message::Binary(bytes) => serde_json::from_slice(bytes),
        _ => return None,
    };
    Some(parsed.map_err(Error::from))
}

fn close_event(frame: Option<&CloseFrame<'_>>) -> SessionEvent {
    let Some(frame) = frame else {
        return SessionEvent::Closed { reason: None };
    };
    let reason = (!frame.reason.is_empty()).then(|| frame.reason.to_string());

    match frame.code {
        CloseCode::Normal | CloseCode::Away => SessionEvent::Closed { reason },
        code => SessionEvent::Failed(reason.unwrap_or_else(|| format!("closed with code {code}"))),
    }
}

async fn await_setup_complete<S>(stream: &mut S) -> Result<()>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let message = message?;

        if let Message::Close(frame) = &message {
            return Err(match close_event(frame.as_ref()) {
                SessionEvent::Failed(reason) => Error::Session(reason),
                _ => Error::Session("session closed during setup".to_string()),
            });
        }

        if let Some(parsed) = parse_server_message(&message)
            && parsed?.is_setup_complete()
        {
            return Ok(());
        }
    }

    Err(Error::Session("connection closed during setup".to_string()))
}

/// Forward queued frames to the socket until the session asks to close
pub(crate) async fn write_loop<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<Outbound>)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(item) = outbound.recv().await {
        let frame = match item {
            Outbound::Frame(frame) => frame,
            Outbound::Close => break,
        };

        let text = match serde_json::to_string(&RealtimeInputMessage::from(frame)) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode input frame");
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::debug!(error = %e, "session writer stopped");
            return;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "close request not delivered");
    }
    tracing::debug!("session writer closed");
}

/// Turn socket messages into session events until the socket ends
pub(crate) async fn read_loop<S>(mut stream: S, events: mpsc::UnboundedSender<SessionEvent>)
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    let terminal = loop {
        let message = match stream.next().await {
            None | Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                break SessionEvent::Closed { reason: None };
            }
            Some(Err(e)) => break SessionEvent::Failed(e.to_string()),
            Some(Ok(message)) => message,
        };

        if let Message::Close(frame) = &message {
            break close_event(frame.as_ref());
        }

        let parsed = match parse_server_message(&message) {
            None => continue,
            Some(Ok(parsed)) => parsed,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "dropping unparsable server message");
                continue;
            }
        };

        if let Some(go_away) = &parsed.go_away {
            tracing::warn!(time_left = ?go_away.time_left, "server will end the session soon");
        }

        for frame in parsed.into_frames() {
            if events.send(SessionEvent::Frame(frame)).is_err() {
                return;
            }
        }
    };

    tracing::debug!(event = ?terminal, "session reader finished");
    let _ = events.send(terminal);
}
