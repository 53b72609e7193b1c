//! Streaming sample-rate conversion for audio devices
//!
//! Used when the microphone or speaker cannot run at the session's rate
//! natively.

use std::collections::VecDeque;

use rubato::{FftFixedIn, Resampler};

use crate::voice::backend::RenderCallback;
use crate::{Error, Result};

/// Requested input chunk size; rubato may round it to fit the rate ratio
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks per FFT chunk
const SUB_CHUNKS: usize = 2;

/// Resamples a continuous mono stream in fixed-size chunks
///
/// A failed resampler stays failed: later calls produce no output instead
/// of repeating the error.
pub struct StreamResampler {
    resampler: FftFixedIn<f32>,
    pending: Vec<f32>,
    failed: bool,
}

impl StreamResampler {
    /// Create a resampler converting `from_rate` to `to_rate`
    ///
    /// # Errors
    ///
    /// Returns error if the resampler cannot be constructed for these rates
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let resampler =
            FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, 1)
                .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

        tracing::debug!(from_rate, to_rate, "resampler initialized");

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
            failed: false,
        })
    }

    /// Input samples still missing before the next chunk can be converted
    #[must_use]
    pub fn input_needed(&self) -> usize {
        self.resampler
            .input_frames_next()
            .saturating_sub(self.pending.len())
            .max(1)
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }

    /// Feed samples and return whatever output is ready
    ///
    /// Input that does not fill a whole chunk is held until the next call.
    ///
    /// # Errors
    ///
    /// Returns error the first time resampling fails
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        if self.failed {
            return Ok(Vec::new());
        }
        self.pending.extend_from_slice(samples);

        let mut output = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let result = match self.resampler.process(&[chunk], None) {
                Ok(result) => result,
                Err(e) => {
                    self.failed = true;
                    self.pending.clear();
                    return Err(Error::Audio(format!("resample failed: {e}")));
                }
            };
            if let Some(channel) = result.into_iter().next() {
                output.extend(channel);
            }
        }

        Ok(output)
    }
}

/// Renders audio at one rate and delivers it at another
///
/// Wraps a render callback for output devices that cannot run at the
/// session's output rate. The wrapped callback is always pulled in whole
/// resampler chunks, so its clock keeps advancing even after a failure.
pub struct RateAdapter {
    render: RenderCallback,
    resampler: StreamResampler,
    source: Vec<f32>,
    ready: VecDeque<f32>,
}

impl RateAdapter {
    /// Adapt `render`, producing `from_rate` audio, to a `to_rate` device
    ///
    /// # Errors
    ///
    /// Returns error if the resampler cannot be constructed for these rates
    pub fn new(from_rate: u32, to_rate: u32, render: RenderCallback) -> Result<Self> {
        Ok(Self {
            render,
            resampler: StreamResampler::new(from_rate, to_rate)?,
            source: Vec::with_capacity(CHUNK_SIZE),
            ready: VecDeque::with_capacity(CHUNK_SIZE * 4),
        })
    }

    /// Fill `out` with audio at the device rate; gaps are silence
    pub fn fill(&mut self, out: &mut [f32]) {
        while self.ready.len() < out.len() {
            self.source.clear();
            self.source.resize(self.resampler.input_needed(), 0.0);
            (self.render)(&mut self.source);

            match self.resampler.process(&self.source) {
                // Only a failed resampler returns nothing for a whole chunk
                Ok(converted) if converted.is_empty() => break,
                Ok(converted) => self.ready.extend(converted),
                Err(e) => {
                    tracing::warn!(error = %e, "output resampler failed, playing silence");
                    break;
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = self.ready.pop_front().unwrap_or(0.0);
        }
    }
}

/// Average interleaved multi-channel samples down to mono
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
