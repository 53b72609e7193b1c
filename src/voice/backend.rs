//! Audio device seam
//!
//! The session only ever needs two things from the hardware: a microphone
//! that pushes mono samples at a fixed rate, and a speaker that pulls mono
//! samples at a fixed rate. Devices stay open for as long as the returned
//! [`DeviceStream`] is alive.

use std::any::Any;

use crate::Result;
use crate::voice::capture::open_cpal_input;
use crate::voice::playback::open_cpal_output;

/// Receives captured mono samples, called from the audio thread
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Fills a block of mono output samples, called from the audio thread
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// An open audio device; dropping it releases the device
pub struct DeviceStream {
    label: &'static str,
    _inner: Box<dyn Any>,
}

impl DeviceStream {
    /// Wrap whatever keeps the device open
    pub fn new(label: &'static str, inner: impl Any) -> Self {
        Self {
            label,
            _inner: Box::new(inner),
        }
    }

    /// Device description for logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        tracing::debug!(device = self.label, "audio device released");
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Source of microphone input and sink for speaker output
pub trait AudioBackend {
    /// Open the default microphone, delivering mono samples at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns `MicrophonePermissionDenied` if access is refused or no
    /// input device is available
    fn open_input(&self, sample_rate: u32, on_samples: InputCallback) -> Result<DeviceStream>;

    /// Open the default speaker, pulling mono samples at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no output device can be opened
    fn open_output(&self, sample_rate: u32, render: RenderCallback) -> Result<DeviceStream>;
}

/// Audio backend using the platform's default `cpal` host
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl CpalBackend {
    /// Create a backend for the default host
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(&self, sample_rate: u32, on_samples: InputCallback) -> Result<DeviceStream> {
        open_cpal_input(sample_rate, on_samples)
    }

    fn open_output(&self, sample_rate: u32, render: RenderCallback) -> Result<DeviceStream> {
        open_cpal_output(sample_rate, render)
    }
}
