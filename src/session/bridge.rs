//! Session bridge
//!
//! Owns the one live session and the audio devices that go with it. All
//! control calls (`connect`, `disconnect`, `interrupt`) are synchronous
//! state transitions; the only place the bridge waits is
//! [`SessionBridge::next_event`], which drives the pending open and the
//! inbound frame stream.
//!
//! ```text
//! mic ─► CaptureHandle ─► FrameSender ─────────────► Transport
//!                                                        │
//! speaker ◄─ PlaybackEngine ◄─ next_event ◄─ LiveSession ◄┘
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::session::profile::SessionProfile;
use crate::session::state::{BridgeState, ConnectionStatus};
use crate::session::transport::{InboundFrame, LiveSession, SessionEvent, SessionSetup, Transport};
use crate::voice::{
    AmplitudeSnapshot, AmplitudeTap, AudioBackend, AudioFrame, CaptureHandle, OUTPUT_SAMPLE_RATE,
    PlaybackEngine, PlaybackHandle, SharedScheduler,
};
use crate::{Error, Result};

type PendingOpen = Pin<Box<dyn Future<Output = Result<LiveSession>> + Send>>;

/// Inputs to a single connect attempt
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    credential: String,
    profile: SessionProfile,
}

impl ConnectRequest {
    #[must_use]
    pub fn new(credential: impl Into<String>, profile: SessionProfile) -> Self {
        Self {
            credential: credential.into(),
            profile,
        }
    }
}

/// Something observable that happened while driving the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Remote confirmed the session; microphone is streaming
    Opened,
    /// An inbound audio frame was placed on the playback timeline
    AudioScheduled(PlaybackHandle),
    /// Playback was cut by a remote interruption
    Interrupted { stopped: usize },
    /// Session ended and local resources were released
    Closed,
    /// Session failed; carries the user-facing status text
    Failed(String),
}

/// Audio devices held for the lifetime of one session
///
/// Dropping this releases both devices.
#[derive(Debug, Default)]
struct AudioContexts {
    playback: Option<PlaybackEngine>,
    capture: Option<CaptureHandle>,
}

/// Bridges local audio devices to one remote streaming session at a time
pub struct SessionBridge<T, A> {
    transport: Arc<T>,
    backend: A,
    output_gain: f32,
    state: BridgeState,
    error: Option<String>,
    status: watch::Sender<ConnectionStatus>,
    pending: Option<PendingOpen>,
    session: Option<LiveSession>,
    audio: Option<AudioContexts>,
    input_tap: AmplitudeTap,
    output_tap: AmplitudeTap,
}

impl<T, A> SessionBridge<T, A>
where
    T: Transport + 'static,
    A: AudioBackend,
{
    /// Create an idle bridge
    #[must_use]
    pub fn new(transport: T, backend: A) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());

        Self {
            transport: Arc::new(transport),
            backend,
            output_gain: 1.0,
            state: BridgeState::Idle,
            error: None,
            status,
            pending: None,
            session: None,
            audio: None,
            input_tap: AmplitudeTap::new(),
            output_tap: AmplitudeTap::new(),
        }
    }

    /// Set the gain applied to synthesized speech
    #[must_use]
    pub const fn with_output_gain(mut self, gain: f32) -> Self {
        self.output_gain = gain;
        self
    }

    /// Start opening a session
    ///
    /// Acquires the speaker immediately; the remote open completes inside
    /// [`next_event`](Self::next_event), which then starts the microphone.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` while connecting or open (state unchanged)
    /// - `MissingCredential` for a blank credential, before any device or
    ///   network access
    /// - any error opening the output device
    pub fn connect(&mut self, request: ConnectRequest) -> Result<()> {
        if self.state.is_active() {
            tracing::debug!(state = ?self.state, "connect rejected");
            return Err(Error::AlreadyConnected);
        }

        self.release();
        self.error = None;

        if request.credential.trim().is_empty() {
            return Err(self.fail(Error::MissingCredential));
        }

        self.set_state(BridgeState::Connecting);

        let playback = match PlaybackEngine::start(&self.backend, self.output_tap.clone(), self.output_gain) {
            Ok(playback) => playback,
            Err(e) => return Err(self.fail(e)),
        };
        self.audio = Some(AudioContexts {
            playback: Some(playback),
            capture: None,
        });

        let transport = Arc::clone(&self.transport);
        let setup = SessionSetup::new(request.credential, request.profile);
        tracing::info!(voice = %setup.profile.voice, "connecting");
        self.pending = Some(Box::pin(async move { transport.open(setup).await }));

        Ok(())
    }

    /// Close the session and release every local resource
    ///
    /// Does not wait for the remote to acknowledge the close. Safe to call
    /// at any time, including while a connect is in flight.
    pub fn disconnect(&mut self) {
        if self.state == BridgeState::Idle {
            return;
        }

        if self.pending.take().is_some() {
            tracing::debug!("pending connect abandoned");
        }
        if let Some(session) = self.session.take() {
            session.close();
            tracing::info!(session_id = %session.id(), "session close requested");
        }

        self.release();
        self.error = None;
        self.set_state(BridgeState::Closed);
    }

    /// Stop all scheduled playback; returns how many segments were cut
    pub fn interrupt(&self) -> usize {
        self.playback().map_or(0, PlaybackEngine::interrupt)
    }

    /// Wait for and handle the next session event
    ///
    /// Cancel safe, so it can sit in a `tokio::select!` next to other
    /// input. Never resolves while there is no session to drive.
    pub async fn next_event(&mut self) -> BridgeEvent {
        loop {
            if let Some(pending) = self.pending.as_mut() {
                let opened = pending.await;
                self.pending = None;

                match opened.and_then(|session| self.on_open(session)) {
                    Ok(()) => return BridgeEvent::Opened,
                    Err(e) => return self.fail_event(e),
                }
            }

            let Some(session) = self.session.as_mut() else {
                return std::future::pending().await;
            };

            let event = session.next_event().await;
            if let Some(event) = self.on_session_event(event) {
                return event;
            }
        }
    }

    fn on_open(&mut self, session: LiveSession) -> Result<()> {
        let sender = session.sender();
        let sink = move |frame: AudioFrame| {
            if !sender.send(&frame) {
                tracing::trace!("input frame dropped, session gone");
            }
        };

        let capture = match CaptureHandle::start(&self.backend, self.input_tap.clone(), sink) {
            Ok(capture) => capture,
            Err(e) => {
                session.close();
                return Err(e);
            }
        };

        if let Some(audio) = self.audio.as_mut() {
            audio.capture = Some(capture);
        }

        tracing::info!(session_id = %session.id(), "session open");
        self.session = Some(session);
        self.set_state(BridgeState::Open);
        Ok(())
    }

    fn on_session_event(&mut self, event: SessionEvent) -> Option<BridgeEvent> {
        match event {
            SessionEvent::Frame(frame) => self.on_frame(frame),
            SessionEvent::Closed { reason } => {
                tracing::info!(reason = reason.as_deref().unwrap_or("none"), "session closed");
                self.session = None;
                self.release();
                self.set_state(BridgeState::Closed);
                Some(BridgeEvent::Closed)
            }
            SessionEvent::Failed(reason) => Some(self.fail_event(Error::Session(reason))),
        }
    }

    fn on_frame(&mut self, frame: InboundFrame) -> Option<BridgeEvent> {
        let mut scheduled = None;

        if let Some(payload) = frame.audio_payload {
            match self.schedule(&payload) {
                Ok(handle) => scheduled = Some(BridgeEvent::AudioScheduled(handle)),
                Err(Error::ScheduleAfterClose) => {
                    tracing::debug!("audio arrived after playback closed, skipped");
                }
                Err(e) => tracing::warn!(error = %e, "dropping inbound audio frame"),
            }
        }

        if frame.interrupted {
            let stopped = self.interrupt();
            tracing::debug!(stopped, "playback interrupted");
            return Some(BridgeEvent::Interrupted { stopped });
        }

        scheduled
    }

    fn schedule(&self, payload: &str) -> Result<PlaybackHandle> {
        let frame = AudioFrame::from_transport_text(payload, OUTPUT_SAMPLE_RATE)?;
        self.playback()
            .ok_or(Error::ScheduleAfterClose)?
            .enqueue(&frame)
    }

    fn fail(&mut self, error: Error) -> Error {
        tracing::warn!(error = %error, "session failed");

        self.pending = None;
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.release();
        self.error = Some(error.status_message());
        self.set_state(BridgeState::Failed);
        error
    }

    fn fail_event(&mut self, error: Error) -> BridgeEvent {
        BridgeEvent::Failed(self.fail(error).status_message())
    }

    /// Drop the audio contexts, stopping capture before playback
    fn release(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            if let Some(mut capture) = audio.capture.take() {
                capture.stop();
            }
            if let Some(mut playback) = audio.playback.take() {
                playback.close();
            }
        }
    }

    fn set_state(&mut self, state: BridgeState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "bridge state changed");
        }
        self.state = state;
        self.status
            .send_replace(ConnectionStatus::project(state, self.error.clone()));
    }

    fn playback(&self) -> Option<&PlaybackEngine> {
        self.audio.as_ref()?.playback.as_ref()
    }

    /// Current public status
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub const fn state(&self) -> BridgeState {
        self.state
    }

    /// Live microphone amplitude
    #[must_use]
    pub fn input_levels(&self) -> watch::Receiver<AmplitudeSnapshot> {
        self.input_tap.subscribe()
    }

    /// Live speaker amplitude
    #[must_use]
    pub fn output_levels(&self) -> watch::Receiver<AmplitudeSnapshot> {
        self.output_tap.subscribe()
    }

    /// Playback scheduler of the current session, if any
    #[must_use]
    pub fn scheduler(&self) -> Option<SharedScheduler> {
        self.playback().map(PlaybackEngine::scheduler)
    }

    /// Check if the microphone is streaming
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.audio
            .as_ref()
            .and_then(|audio| audio.capture.as_ref())
            .is_some_and(CaptureHandle::is_capturing)
    }

    /// Identifier of the open session, if any
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(LiveSession::id)
    }
}

impl<T, A> Drop for SessionBridge<T, A> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }
}

impl<T, A> std::fmt::Debug for SessionBridge<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge")
            .field("state", &self.state)
            .field("error", &self.error)
            .field("session", &self.session.as_ref().map(LiveSession::id))
            .finish_non_exhaustive()
    }
}
