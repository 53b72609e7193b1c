//! Session bridge integration tests
//!
//! Drive the bridge end to end with in-memory audio devices and sessions

use std::time::Duration;

use beacon_live::session::{
    BridgeState, InboundFrame, Outbound, SessionEvent, SessionProfile, Voice,
};
use beacon_live::voice::{CAPTURE_WINDOW, OUTPUT_SAMPLE_RATE, encode_pcm16, to_transport_text};
use beacon_live::{BridgeEvent, ConnectRequest, ConnectionState, Error, SessionBridge};
use secrecy::ExposeSecret;
use tokio::sync::mpsc::error::TryRecvError;

mod common;

use common::{FakeBackend, FakeTransport, sine};

type Bridge = SessionBridge<FakeTransport, FakeBackend>;

fn setup() -> (Bridge, FakeTransport, FakeBackend) {
    let transport = FakeTransport::new();
    let backend = FakeBackend::new();
    let bridge = SessionBridge::new(transport.clone(), backend.clone());
    (bridge, transport, backend)
}

fn request() -> ConnectRequest {
    ConnectRequest::new(
        "test-key",
        SessionProfile {
            persona: "You are a helpful assistant.".to_string(),
            voice: Voice::Kore,
        },
    )
}

/// Base64 PCM for `seconds` of output audio
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn speech(seconds: f64) -> String {
    let samples = (f64::from(OUTPUT_SAMPLE_RATE) * seconds) as usize;
    to_transport_text(&encode_pcm16(&sine(220.0, OUTPUT_SAMPLE_RATE, samples, 0.4)))
}

async fn open(bridge: &mut Bridge) {
    bridge.connect(request()).unwrap();
    assert_eq!(bridge.next_event().await, BridgeEvent::Opened);
}

#[tokio::test]
async fn test_end_to_end_session() {
    let (mut bridge, transport, backend) = setup();

    bridge.connect(request()).unwrap();
    assert_eq!(bridge.status().state, ConnectionState::Connecting);
    assert!(backend.is_speaker_open());
    assert!(!backend.is_mic_open());

    assert_eq!(bridge.next_event().await, BridgeEvent::Opened);
    assert_eq!(bridge.status().state, ConnectionState::Connected);
    assert!(bridge.is_capturing());
    let mut remote = transport.take_remote();

    // Ten full capture windows reach the session in order
    assert!(backend.feed(&sine(440.0, 16_000, CAPTURE_WINDOW * 10, 0.5)));
    let mut sent = 0;
    while let Ok(Outbound::Frame(frame)) = remote.outbound.try_recv() {
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        sent += 1;
    }
    assert_eq!(sent, 10);

    // Two inbound frames play back to back
    remote
        .inbound
        .send(SessionEvent::Frame(InboundFrame::audio(speech(1.0))))
        .unwrap();
    remote
        .inbound
        .send(SessionEvent::Frame(InboundFrame::audio(speech(0.5))))
        .unwrap();

    let BridgeEvent::AudioScheduled(first) = bridge.next_event().await else {
        panic!("expected scheduled audio");
    };
    let BridgeEvent::AudioScheduled(second) = bridge.next_event().await else {
        panic!("expected scheduled audio");
    };

    let scheduler = bridge.scheduler().unwrap();
    {
        let scheduler = scheduler.lock().unwrap();
        assert_eq!(scheduler.start_time(first), Some(0.0));
        assert_eq!(scheduler.start_time(second), Some(1.0));
        assert!((scheduler.cursor() - 1.5).abs() < 1e-9);
        assert_eq!(scheduler.active_count(), 2);
    }

    // Speaker pulls the audio out
    let rendered = backend.render(4_800).unwrap();
    assert!(rendered.iter().any(|s| s.abs() > 0.1));
    assert!(bridge.output_levels().borrow().peak > 0.1);

    // Interruption empties playback and resets the cursor
    remote
        .inbound
        .send(SessionEvent::Frame(InboundFrame::interruption()))
        .unwrap();
    assert_eq!(
        bridge.next_event().await,
        BridgeEvent::Interrupted { stopped: 2 }
    );
    {
        let scheduler = scheduler.lock().unwrap();
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.cursor().abs() < f64::EPSILON);
    }

    bridge.disconnect();
    assert_eq!(bridge.status().state, ConnectionState::Disconnected);
    assert_eq!(backend.open_devices(), 0);
    assert!(!bridge.is_capturing());
    assert_eq!(remote.outbound.try_recv(), Ok(Outbound::Close));
    assert!(!backend.feed(&[0.1; 16]));
}

#[tokio::test]
async fn test_connect_while_open_rejected() {
    let (mut bridge, transport, _backend) = setup();
    open(&mut bridge).await;

    let result = bridge.connect(request());

    assert!(matches!(result, Err(Error::AlreadyConnected)));
    assert_eq!(bridge.state(), BridgeState::Open);
    assert_eq!(bridge.status().error, None);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_connect_while_connecting_rejected() {
    let (mut bridge, transport, _backend) = setup();
    bridge.connect(request()).unwrap();

    assert!(matches!(bridge.connect(request()), Err(Error::AlreadyConnected)));
    assert_eq!(bridge.state(), BridgeState::Connecting);

    assert_eq!(bridge.next_event().await, BridgeEvent::Opened);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_missing_credential_fails_fast() {
    let (mut bridge, transport, backend) = setup();

    let result = bridge.connect(ConnectRequest::new("  ", SessionProfile::default()));

    assert!(matches!(result, Err(Error::MissingCredential)));
    assert_eq!(bridge.status().state, ConnectionState::Error);
    assert_eq!(bridge.status().error.as_deref(), Some("API key is missing."));
    assert_eq!(transport.open_count(), 0);
    assert_eq!(backend.input_opens(), 0);
    assert_eq!(backend.output_opens(), 0);
}

#[tokio::test]
async fn test_setup_carries_profile() {
    let (mut bridge, transport, _backend) = setup();
    let profile = SessionProfile {
        persona: "Speak like a pirate.".to_string(),
        voice: Voice::Puck,
    };

    bridge
        .connect(ConnectRequest::new("secret", profile.clone()))
        .unwrap();
    bridge.next_event().await;

    let setup = transport.last_setup().unwrap();
    assert_eq!(setup.profile, profile);
    assert_eq!(setup.credential.expose_secret(), "secret");
}

#[tokio::test]
async fn test_microphone_denied_cleans_up() {
    let (mut bridge, transport, backend) = setup();
    backend.deny_microphone();

    bridge.connect(request()).unwrap();
    let event = bridge.next_event().await;

    assert_eq!(
        event,
        BridgeEvent::Failed("Microphone access was denied.".to_string())
    );
    assert_eq!(bridge.status().state, ConnectionState::Error);
    assert_eq!(backend.open_devices(), 0);

    let mut remote = transport.take_remote();
    assert_eq!(remote.outbound.try_recv(), Ok(Outbound::Close));
}

#[tokio::test]
async fn test_speaker_unavailable_fails_before_connecting() {
    let (mut bridge, transport, backend) = setup();
    backend.deny_speaker();

    let result = bridge.connect(request());

    assert!(matches!(result, Err(Error::Audio(_))));
    assert_eq!(bridge.state(), BridgeState::Failed);
    assert_eq!(bridge.status().state, ConnectionState::Error);
    assert_eq!(bridge.status().error.as_deref(), Some("Audio device unavailable."));
    assert_eq!(backend.output_opens(), 1);
    assert_eq!(backend.open_devices(), 0);
    assert_eq!(transport.open_count(), 0);

    // Nothing is left to drive
    let idle = tokio::time::timeout(Duration::from_millis(20), bridge.next_event()).await;
    assert!(idle.is_err());
    assert_eq!(transport.open_count(), 0);
}

#[tokio::test]
async fn test_session_open_failure_surfaces_opaque_error() {
    let (mut bridge, transport, backend) = setup();
    transport.fail_next("1008 policy violation: quota");

    bridge.connect(request()).unwrap();
    let event = bridge.next_event().await;

    assert_eq!(
        event,
        BridgeEvent::Failed("A connection error occurred.".to_string())
    );
    assert_eq!(bridge.state(), BridgeState::Failed);
    assert_eq!(backend.open_devices(), 0);
}

#[tokio::test]
async fn test_remote_error_cleans_up() {
    let (mut bridge, transport, backend) = setup();
    open(&mut bridge).await;
    let remote = transport.take_remote();

    remote
        .inbound
        .send(SessionEvent::Failed("internal error".to_string()))
        .unwrap();

    assert!(matches!(bridge.next_event().await, BridgeEvent::Failed(_)));
    assert_eq!(bridge.status().state, ConnectionState::Error);
    assert_eq!(backend.open_devices(), 0);
    assert!(bridge.scheduler().is_none());
}

#[tokio::test]
async fn test_remote_close_returns_to_disconnected() {
    let (mut bridge, transport, backend) = setup();
    open(&mut bridge).await;
    let remote = transport.take_remote();

    remote
        .inbound
        .send(SessionEvent::Closed {
            reason: Some("session expired".to_string()),
        })
        .unwrap();

    assert_eq!(bridge.next_event().await, BridgeEvent::Closed);
    assert_eq!(bridge.status().state, ConnectionState::Disconnected);
    assert_eq!(bridge.status().error, None);
    assert_eq!(backend.open_devices(), 0);
}

#[tokio::test]
async fn test_dropped_connection_counts_as_close() {
    let (mut bridge, transport, backend) = setup();
    open(&mut bridge).await;
    drop(transport.take_remote());

    assert_eq!(bridge.next_event().await, BridgeEvent::Closed);
    assert_eq!(backend.open_devices(), 0);
}

#[tokio::test]
async fn test_malformed_frame_dropped_stream_continues() {
    let (mut bridge, transport, _backend) = setup();
    open(&mut bridge).await;
    let remote = transport.take_remote();

    // Odd byte length, then bad base64, then a good frame
    remote
        .inbound
        .send(SessionEvent::Frame(InboundFrame::audio(to_transport_text(&[1, 2, 3]))))
        .unwrap();
    remote
        .inbound
        .send(SessionEvent::Frame(InboundFrame::audio("%%%not base64")))
        .unwrap();
    remote
        .inbound
        .send(SessionEvent::Frame(InboundFrame::audio(speech(0.1))))
        .unwrap();

    assert!(matches!(
        bridge.next_event().await,
        BridgeEvent::AudioScheduled(_)
    ));
    assert_eq!(bridge.state(), BridgeState::Open);
    assert_eq!(bridge.scheduler().unwrap().lock().unwrap().active_count(), 1);
}

#[tokio::test]
async fn test_audio_and_interrupt_in_one_frame() {
    let (mut bridge, transport, _backend) = setup();
    open(&mut bridge).await;
    let remote = transport.take_remote();

    remote
        .inbound
        .send(SessionEvent::Frame(InboundFrame {
            audio_payload: Some(speech(0.2)),
            interrupted: true,
        }))
        .unwrap();

    assert_eq!(
        bridge.next_event().await,
        BridgeEvent::Interrupted { stopped: 1 }
    );
    assert_eq!(bridge.scheduler().unwrap().lock().unwrap().active_count(), 0);
}

#[tokio::test]
async fn test_disconnect_during_connect() {
    let (mut bridge, transport, backend) = setup();
    transport.stall();

    bridge.connect(request()).unwrap();
    let waited = tokio::time::timeout(Duration::from_millis(20), bridge.next_event()).await;
    assert!(waited.is_err());
    assert_eq!(transport.open_count(), 1);

    bridge.disconnect();

    assert_eq!(bridge.status().state, ConnectionState::Disconnected);
    assert_eq!(backend.open_devices(), 0);
    assert_eq!(backend.input_opens(), 0);
}

#[test]
fn test_idle_bridge_has_nothing_to_drive() {
    let (mut bridge, _transport, _backend) = setup();

    let mut next = tokio_test::task::spawn(bridge.next_event());
    tokio_test::assert_pending!(next.poll());
}

#[tokio::test]
async fn test_disconnect_before_connect_is_noop() {
    let (mut bridge, _transport, backend) = setup();

    bridge.disconnect();
    bridge.disconnect();
    assert_eq!(bridge.interrupt(), 0);

    assert_eq!(bridge.state(), BridgeState::Idle);
    assert_eq!(bridge.status().state, ConnectionState::Disconnected);
    assert_eq!(backend.output_opens(), 0);
}

#[tokio::test]
async fn test_reconnect_after_failure() {
    let (mut bridge, transport, backend) = setup();
    transport.fail_next("unavailable");

    bridge.connect(request()).unwrap();
    assert!(matches!(bridge.next_event().await, BridgeEvent::Failed(_)));

    open(&mut bridge).await;
    assert_eq!(bridge.status().state, ConnectionState::Connected);
    assert_eq!(bridge.status().error, None);
    assert_eq!(transport.open_count(), 2);
    assert_eq!(backend.open_devices(), 2);
}

#[tokio::test]
async fn test_each_connect_gets_a_new_session() {
    let (mut bridge, _transport, _backend) = setup();

    open(&mut bridge).await;
    let first = bridge.session_id().unwrap();
    bridge.disconnect();
    assert!(bridge.session_id().is_none());

    open(&mut bridge).await;
    let second = bridge.session_id().unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_status_subscribers_see_transitions() {
    let (mut bridge, _transport, _backend) = setup();
    let mut status = bridge.subscribe();

    bridge.connect(request()).unwrap();
    assert!(status.has_changed().unwrap());
    assert_eq!(status.borrow_and_update().state, ConnectionState::Connecting);

    bridge.next_event().await;
    assert_eq!(status.borrow_and_update().state, ConnectionState::Connected);

    bridge.disconnect();
    assert_eq!(status.borrow_and_update().state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_input_levels_follow_microphone() {
    let (mut bridge, _transport, backend) = setup();
    let levels = bridge.input_levels();
    open(&mut bridge).await;

    backend.feed(&sine(440.0, 16_000, 1_600, 0.8));
    assert!(levels.borrow().peak > 0.7);

    bridge.disconnect();
    assert!(levels.borrow().peak.abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_frames_after_close_not_sent() {
    let (mut bridge, transport, backend) = setup();
    open(&mut bridge).await;
    let mut remote = transport.take_remote();

    bridge.disconnect();
    backend.feed(&vec![0.2; CAPTURE_WINDOW]);

    assert_eq!(remote.outbound.try_recv(), Ok(Outbound::Close));
    assert_eq!(remote.outbound.try_recv(), Err(TryRecvError::Disconnected));
}
