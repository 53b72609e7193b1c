//! Beacon Live - Realtime voice sessions for AI assistants
//!
//! This library provides the streaming audio pipeline between local audio
//! devices and a remote realtime speech model:
//! - PCM encoding and transport text encoding
//! - Microphone capture in fixed windows
//! - Gapless playback scheduling with interruption
//! - Session lifecycle and connection state
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │      CLI REPL  │  status watch  │  level meters      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Session Bridge                       │
//! │   Capture  │  Playback Scheduler  │  PCM Codec      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │            Transport (Gemini Live)                   │
//! │   setup  │  realtime input  │  server content       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{
    BridgeEvent, ConnectRequest, ConnectionState, ConnectionStatus, GeminiLiveTransport,
    SessionBridge, SessionProfile, Transport, Voice,
};
pub use voice::{AudioBackend, AudioFrame, CpalBackend, PlaybackScheduler};
