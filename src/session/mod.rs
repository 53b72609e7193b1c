//! Realtime session layer
//!
//! Connects the voice pipeline to a remote streaming model: the
//! [`SessionBridge`] state machine, the [`Transport`] seam it opens
//! sessions through, and the Gemini Live implementation of that seam.

mod bridge;
pub mod gemini;
mod profile;
pub mod protocol;
mod state;
mod transport;

pub use bridge::{BridgeEvent, ConnectRequest, SessionBridge};
pub use gemini::GeminiLiveTransport;
pub use profile::{ProfileCell, SessionProfile, Voice};
pub use state::{BridgeState, ConnectionState, ConnectionStatus};
pub use transport::{
    FrameSender, InboundFrame, LiveSession, Outbound, OutboundFrame, SessionEvent, SessionRemote,
    SessionSetup, Transport,
};
