//! Audio playback to speakers
//!
//! The speaker pulls audio through a render callback; what it plays is
//! whatever the [`PlaybackScheduler`] has laid out on the output timeline.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig, SupportedStreamConfigRange};

use crate::voice::backend::{AudioBackend, DeviceStream, RenderCallback};
use crate::voice::codec::{AudioFrame, OUTPUT_SAMPLE_RATE};
use crate::voice::meter::{AmplitudeTap, LevelMeter};
use crate::voice::resample::RateAdapter;
use crate::voice::scheduler::{FrameClock, PlaybackHandle, PlaybackScheduler};
use crate::{Error, Result};

/// Scheduler shared between the control thread and the render callback
pub type SharedScheduler = Arc<Mutex<PlaybackScheduler>>;

/// Speaker output driven by a playback scheduler
#[derive(Debug)]
pub struct PlaybackEngine {
    scheduler: SharedScheduler,
    clock: Arc<FrameClock>,
    stream: Option<DeviceStream>,
    tap: AmplitudeTap,
}

impl PlaybackEngine {
    /// Open the speaker and start rendering scheduled audio
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    pub fn start<B>(backend: &B, tap: AmplitudeTap, gain: f32) -> Result<Self>
    where
        B: AudioBackend + ?Sized,
    {
        let scheduler: SharedScheduler = Arc::new(Mutex::new(
            PlaybackScheduler::new(OUTPUT_SAMPLE_RATE).with_gain(gain),
        ));
        let clock = Arc::new(FrameClock::new(OUTPUT_SAMPLE_RATE));

        let render = render_callback(
            Arc::clone(&scheduler),
            Arc::clone(&clock),
            LevelMeter::new(tap.clone()),
        );
        let stream = backend.open_output(OUTPUT_SAMPLE_RATE, render)?;

        tracing::debug!(sample_rate = OUTPUT_SAMPLE_RATE, gain, "playback started");

        Ok(Self {
            scheduler,
            clock,
            stream: Some(stream),
            tap,
        })
    }

    /// Decode and schedule an inbound frame
    ///
    /// # Errors
    ///
    /// Returns `MalformedAudio` for undecodable frames and
    /// `ScheduleAfterClose` after [`close`](Self::close)
    pub fn enqueue(&self, frame: &AudioFrame) -> Result<PlaybackHandle> {
        let mut scheduler = self.lock()?;
        scheduler.enqueue_frame(frame, self.clock.as_ref())
    }

    /// Stop everything currently playing; returns the number of segments stopped
    pub fn interrupt(&self) -> usize {
        self.lock().map(|mut s| s.interrupt()).unwrap_or(0)
    }

    /// Reset the scheduler and release the output device
    ///
    /// Safe to call more than once.
    pub fn close(&mut self) {
        if let Ok(mut scheduler) = self.scheduler.lock() {
            scheduler.close();
        }
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.tap.reset();
            tracing::debug!("playback stopped");
        }
    }

    /// Shared scheduler, for inspection
    #[must_use]
    pub fn scheduler(&self) -> SharedScheduler {
        Arc::clone(&self.scheduler)
    }

    /// Output clock in seconds
    #[must_use]
    pub fn clock(&self) -> Arc<FrameClock> {
        Arc::clone(&self.clock)
    }

    /// Check if the output device is open
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PlaybackScheduler>> {
        self.scheduler
            .lock()
            .map_err(|_| Error::Audio("playback scheduler poisoned".to_string()))
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Build the render callback feeding the speaker from the scheduler
#[must_use]
pub fn render_callback(
    scheduler: SharedScheduler,
    clock: Arc<FrameClock>,
    mut meter: LevelMeter,
) -> RenderCallback {
    Box::new(move |out: &mut [f32]| {
        match scheduler.lock() {
            Ok(mut s) => s.render(out, &clock),
            Err(_) => out.fill(0.0),
        }
        meter.process(out);
    })
}

fn supports_rate(c: &SupportedStreamConfigRange, channels: u16, sample_rate: u32) -> bool {
    c.channels() == channels
        && c.min_sample_rate() <= SampleRate(sample_rate)
        && c.max_sample_rate() >= SampleRate(sample_rate)
}

/// Open the default `cpal` output device pulling mono `sample_rate` audio
///
/// Prefers a mono or stereo config at the requested rate. Otherwise opens
/// the device's default config and resamples in the callback. Multi-channel
/// devices get the mono signal duplicated per channel.
pub(crate) fn open_cpal_output(sample_rate: u32, render: RenderCallback) -> Result<DeviceStream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let native = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports_rate(c, 1, sample_rate))
        .or_else(|| {
            // Fallback: try stereo
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports_rate(c, 2, sample_rate))
        });

    let (config, mut fill): (StreamConfig, RenderCallback) = match native {
        Some(supported) => (supported.with_sample_rate(SampleRate(sample_rate)).config(), render),
        None => {
            let config = device
                .default_output_config()
                .map_err(|e| Error::Audio(e.to_string()))?
                .config();
            if config.sample_rate.0 == sample_rate {
                (config, render)
            } else {
                let mut adapter = RateAdapter::new(sample_rate, config.sample_rate.0, render)?;
                (config, Box::new(move |out: &mut [f32]| adapter.fill(out)))
            }
        }
    };
    let channels = config.channels as usize;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        device_rate = config.sample_rate.0,
        channels,
        "audio playback initialized"
    );

    let mut mono = Vec::new();
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mono.resize(frames, 0.0);
                fill(&mut mono);

                for (frame, sample) in data.chunks_mut(channels).zip(&mono) {
                    frame.fill(*sample);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(DeviceStream::new("speaker", stream))
}
