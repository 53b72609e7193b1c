//! Microphone capture and windowed PCM encoding

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::voice::backend::{AudioBackend, DeviceStream, InputCallback};
use crate::voice::codec::{AudioFrame, CAPTURE_WINDOW, INPUT_SAMPLE_RATE, quantize};
use crate::voice::meter::{AmplitudeTap, LevelMeter};
use crate::voice::resample::{StreamResampler, downmix};
use crate::{Error, Result};

/// Splits a continuous sample stream into fixed-size encoded windows
///
/// A trailing partial window is held until it fills; if the stream ends
/// first it is dropped, never padded.
#[derive(Debug)]
pub struct WindowEncoder {
    window: usize,
    pending: Vec<f32>,
}

impl WindowEncoder {
    /// Create an encoder emitting windows of `window` samples
    #[must_use]
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            pending: Vec::with_capacity(window),
        }
    }

    /// Feed samples, calling `emit` once per completed window
    ///
    /// Returns the number of windows emitted.
    pub fn push<F>(&mut self, samples: &[f32], mut emit: F) -> usize
    where
        F: FnMut(AudioFrame),
    {
        let mut input = samples;
        let mut emitted = 0;

        while !input.is_empty() {
            let take = (self.window - self.pending.len()).min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];

            if self.pending.len() == self.window {
                emit(AudioFrame::from_samples(&self.pending, INPUT_SAMPLE_RATE));
                self.pending.clear();
                emitted += 1;
            }
        }

        emitted
    }

    /// Samples waiting for the current window to fill
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// A running microphone capture
///
/// Raw input is tapped into a level meter and a [`WindowEncoder`]; every
/// completed window goes to the sink as soon as it is available.
#[derive(Debug)]
pub struct CaptureHandle {
    stream: Option<DeviceStream>,
    live: Arc<AtomicBool>,
    tap: AmplitudeTap,
}

impl CaptureHandle {
    /// Open the microphone and start forwarding encoded windows to `sink`
    ///
    /// # Errors
    ///
    /// Returns `MicrophonePermissionDenied` if the microphone cannot be opened
    pub fn start<B, F>(backend: &B, tap: AmplitudeTap, mut sink: F) -> Result<Self>
    where
        B: AudioBackend + ?Sized,
        F: FnMut(AudioFrame) + Send + 'static,
    {
        let live = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&live);
        let mut meter = LevelMeter::new(tap.clone());
        let mut encoder = WindowEncoder::new(CAPTURE_WINDOW);

        let on_samples: InputCallback = Box::new(move |samples: &[f32]| {
            if !flag.load(Ordering::Acquire) {
                return;
            }
            meter.process(samples);
            encoder.push(samples, &mut sink);
        });

        let stream = backend.open_input(INPUT_SAMPLE_RATE, on_samples)?;
        tracing::info!(window = CAPTURE_WINDOW, "microphone capture started");

        Ok(Self {
            stream: Some(stream),
            live,
            tap,
        })
    }

    /// Release the microphone and disconnect the tap and encoder
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        self.live.store(false, Ordering::Release);
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.tap.reset();
            tracing::info!("microphone capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn denied(e: impl std::fmt::Display) -> Error {
    Error::MicrophonePermissionDenied(e.to_string())
}

/// Open the default `cpal` input device delivering mono `sample_rate` audio
///
/// Prefers a native mono config at the requested rate; otherwise opens the
/// device's default config and downmixes/resamples in the callback.
pub(crate) fn open_cpal_input(sample_rate: u32, mut on_samples: InputCallback) -> Result<DeviceStream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| denied("no input device available"))?;

    let native = device
        .supported_input_configs()
        .map_err(denied)?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        });

    let (config, mut resampler): (StreamConfig, Option<StreamResampler>) = match native {
        Some(supported) => (supported.with_sample_rate(SampleRate(sample_rate)).config(), None),
        None => {
            let config = device.default_input_config().map_err(denied)?.config();
            let resampler = if config.sample_rate.0 == sample_rate {
                None
            } else {
                Some(StreamResampler::new(config.sample_rate.0, sample_rate)?)
            };
            (config, resampler)
        }
    };

    let channels = config.channels as usize;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        device_rate = config.sample_rate.0,
        channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels == 1 && resampler.is_none() {
                    on_samples(data);
                    return;
                }

                let mono = downmix(data, channels);
                match resampler.as_mut() {
                    Some(r) => match r.process(&mono) {
                        Ok(out) if !out.is_empty() => on_samples(&out),
                        Ok(_) => {}
                        // The resampler produces nothing after its first failure
                        Err(e) => {
                            tracing::warn!(error = %e, "input resampler failed, dropping microphone audio");
                        }
                    },
                    None => on_samples(&mono),
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(denied)?;

    stream.play().map_err(denied)?;

    Ok(DeviceStream::new("microphone", stream))
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(quantize(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
