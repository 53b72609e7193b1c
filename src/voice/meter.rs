//! Amplitude snapshots for audio-reactive visualization
//!
//! Each meter overwrites a single `watch` cell, so readers always see the
//! most recent block and never a backlog.

use std::sync::Arc;

use tokio::sync::watch;

/// Smoothing time constant applied between consecutive blocks
pub const SMOOTHING: f32 = 0.5;

/// Latest amplitude reading for one audio direction
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AmplitudeSnapshot {
    /// RMS of the most recent block
    pub rms: f32,
    /// Absolute peak of the most recent block
    pub peak: f32,
    /// Exponentially smoothed RMS
    pub level: f32,
}

/// Shared snapshot cell a meter writes into
#[derive(Debug, Clone)]
pub struct AmplitudeTap {
    tx: Arc<watch::Sender<AmplitudeSnapshot>>,
}

impl AmplitudeTap {
    /// Create an empty tap
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AmplitudeSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to snapshot updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AmplitudeSnapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot
    #[must_use]
    pub fn latest(&self) -> AmplitudeSnapshot {
        *self.tx.borrow()
    }

    /// Publish silence
    pub fn reset(&self) {
        self.tx.send_replace(AmplitudeSnapshot::default());
    }

    fn publish(&self, snapshot: AmplitudeSnapshot) {
        self.tx.send_replace(snapshot);
    }
}

impl Default for AmplitudeTap {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes amplitude per block and publishes it to a tap
#[derive(Debug)]
pub struct LevelMeter {
    tap: AmplitudeTap,
    level: f32,
}

impl LevelMeter {
    /// Create a meter writing into `tap`
    #[must_use]
    pub const fn new(tap: AmplitudeTap) -> Self {
        Self { tap, level: 0.0 }
    }

    /// Measure a block of samples and publish the result
    pub fn process(&mut self, samples: &[f32]) -> AmplitudeSnapshot {
        let rms = calculate_rms(samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        self.level = SMOOTHING.mul_add(self.level, (1.0 - SMOOTHING) * rms);

        let snapshot = AmplitudeSnapshot {
            rms,
            peak,
            level: self.level,
        };
        self.tap.publish(snapshot);
        snapshot
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
