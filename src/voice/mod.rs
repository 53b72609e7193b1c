//! Voice processing module
//!
//! Handles PCM encoding, microphone capture, playback scheduling, and
//! amplitude metering. The session layer (see `session`) wires these to
//! the remote model.

pub mod backend;
mod capture;
pub mod codec;
mod meter;
mod playback;
mod resample;
mod scheduler;

pub use backend::{AudioBackend, CpalBackend, DeviceStream, InputCallback, RenderCallback};
pub use capture::{CaptureHandle, WindowEncoder, samples_to_wav};
pub use codec::{
    AudioFrame, CAPTURE_WINDOW, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, decode_pcm16,
    encode_pcm16, from_transport_text, to_transport_text,
};
pub use meter::{AmplitudeSnapshot, AmplitudeTap, LevelMeter, calculate_rms};
pub use playback::{PlaybackEngine, SharedScheduler, render_callback};
pub use resample::{RateAdapter, StreamResampler, downmix};
pub use scheduler::{FrameClock, OutputClock, PlaybackHandle, PlaybackScheduler};
