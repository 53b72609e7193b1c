//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use beacon_live::session::{LiveSession, SessionRemote, SessionSetup, Transport};
use beacon_live::voice::{AudioBackend, DeviceStream, InputCallback, RenderCallback};
use beacon_live::{Error, Result};

#[derive(Default)]
struct BackendState {
    input: Option<InputCallback>,
    output: Option<RenderCallback>,
    input_opens: usize,
    output_opens: usize,
    deny_microphone: bool,
    deny_speaker: bool,
}

/// In-memory audio devices driven by the test
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

/// Clears the registered callback when the device stream is dropped
struct Release {
    state: Arc<Mutex<BackendState>>,
    input: bool,
}

impl Drop for Release {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if self.input {
                state.input = None;
            } else {
                state.output = None;
            }
        }
    }
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every microphone open fail
    pub fn deny_microphone(&self) {
        self.state.lock().unwrap().deny_microphone = true;
    }

    /// Make every speaker open fail
    pub fn deny_speaker(&self) {
        self.state.lock().unwrap().deny_speaker = true;
    }

    /// Push samples through the open microphone; false if it is closed
    pub fn feed(&self, samples: &[f32]) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.input.as_mut() {
            Some(callback) => {
                callback(samples);
                true
            }
            None => false,
        }
    }

    /// Pull `frames` samples from the open speaker
    pub fn render(&self, frames: usize) -> Option<Vec<f32>> {
        let mut state = self.state.lock().unwrap();
        let callback = state.output.as_mut()?;
        let mut out = vec![0.0; frames];
        callback(&mut out);
        Some(out)
    }

    pub fn is_mic_open(&self) -> bool {
        self.state.lock().unwrap().input.is_some()
    }

    pub fn is_speaker_open(&self) -> bool {
        self.state.lock().unwrap().output.is_some()
    }

    pub fn input_opens(&self) -> usize {
        self.state.lock().unwrap().input_opens
    }

    pub fn output_opens(&self) -> usize {
        self.state.lock().unwrap().output_opens
    }

    /// Number of devices currently held open
    pub fn open_devices(&self) -> usize {
        usize::from(self.is_mic_open()) + usize::from(self.is_speaker_open())
    }

    fn release(&self, input: bool) -> Release {
        Release {
            state: Arc::clone(&self.state),
            input,
        }
    }
}

impl AudioBackend for FakeBackend {
    fn open_input(&self, _sample_rate: u32, on_samples: InputCallback) -> Result<DeviceStream> {
        let mut state = self.state.lock().unwrap();
        state.input_opens += 1;
        if state.deny_microphone {
            return Err(Error::MicrophonePermissionDenied(
                "permission dismissed".to_string(),
            ));
        }
        state.input = Some(on_samples);
        Ok(DeviceStream::new("fake microphone", self.release(true)))
    }

    fn open_output(&self, _sample_rate: u32, render: RenderCallback) -> Result<DeviceStream> {
        let mut state = self.state.lock().unwrap();
        state.output_opens += 1;
        if state.deny_speaker {
            return Err(Error::Audio("no output device available".to_string()));
        }
        state.output = Some(render);
        Ok(DeviceStream::new("fake speaker", self.release(false)))
    }
}

#[derive(Default)]
struct TransportState {
    opens: usize,
    fail_next: Option<String>,
    stall: bool,
    last_setup: Option<SessionSetup>,
    remotes: Vec<SessionRemote>,
}

/// Transport handing out in-memory sessions
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next open with a session error
    pub fn fail_next(&self, reason: &str) {
        self.state.lock().unwrap().fail_next = Some(reason.to_string());
    }

    /// Make opens hang until cancelled
    pub fn stall(&self) {
        self.state.lock().unwrap().stall = true;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    /// Setup passed to the most recent open
    pub fn last_setup(&self) -> Option<SessionSetup> {
        self.state.lock().unwrap().last_setup.clone()
    }

    /// Remote end of the most recently opened session
    pub fn take_remote(&self) -> SessionRemote {
        self.state
            .lock()
            .unwrap()
            .remotes
            .pop()
            .expect("no session was opened")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, setup: SessionSetup) -> Result<LiveSession> {
        let stall = {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            state.last_setup = Some(setup);
            if let Some(reason) = state.fail_next.take() {
                return Err(Error::Session(reason));
            }
            state.stall
        };

        if stall {
            std::future::pending::<()>().await;
        }

        let (session, remote) = LiveSession::pair();
        self.state.lock().unwrap().remotes.push(remote);
        Ok(session)
    }
}

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss)]
pub fn sine(frequency: f32, sample_rate: u32, samples: usize, amplitude: f32) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
