//! Gapless playback scheduling against an output clock
//!
//! Inbound speech arrives in bursts, usually faster than real time. The
//! scheduler lays segments back-to-back on the output timeline using a
//! single cursor: the earliest time the next segment may start. A segment
//! that arrives after the cursor has gone stale starts immediately.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::voice::codec::AudioFrame;
use crate::{Error, Result};

/// Monotonic time reference used to schedule playback, in seconds
pub trait OutputClock {
    /// Current output time in seconds
    fn now(&self) -> f64;
}

/// Output clock advanced by the render path, one tick per rendered frame
#[derive(Debug)]
pub struct FrameClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl FrameClock {
    /// Create a clock at time zero
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate,
        }
    }

    /// Frames rendered so far
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Advance by `frames` rendered frames
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    /// Sample rate the clock ticks at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl OutputClock for FrameClock {
    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Identifies one scheduled segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    /// Raw sequence number
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// A decoded segment placed on the output timeline
#[derive(Debug)]
struct Segment {
    samples: Vec<f32>,
    start_at: f64,
    start_frame: u64,
}

impl Segment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Schedules decoded segments back-to-back and tracks active playback
#[derive(Debug)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    cursor: f64,
    active: BTreeMap<PlaybackHandle, Segment>,
    next_id: u64,
    gain: f32,
    closed: bool,
}

impl PlaybackScheduler {
    /// Create a scheduler for audio at `sample_rate`
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            cursor: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
            gain: 1.0,
            closed: false,
        }
    }

    /// Set the gain applied while rendering
    #[must_use]
    pub const fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Schedule decoded samples as the next segment
    ///
    /// The segment starts at `max(cursor, clock.now())` and moves the
    /// cursor to its end. Empty input returns a handle that is already
    /// complete and leaves the cursor untouched.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleAfterClose` once the scheduler has been closed
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn enqueue(&mut self, samples: Vec<f32>, clock: &dyn OutputClock) -> Result<PlaybackHandle> {
        if self.closed {
            return Err(Error::ScheduleAfterClose);
        }

        let handle = PlaybackHandle(self.next_id);
        self.next_id += 1;

        if samples.is_empty() {
            tracing::trace!(handle = handle.0, "empty segment, nothing to schedule");
            return Ok(handle);
        }

        let rate = f64::from(self.sample_rate);
        let start_at = self.cursor.max(clock.now());
        let duration = samples.len() as f64 / rate;
        let start_frame = (start_at * rate).round() as u64;

        self.cursor = start_at + duration;
        self.active.insert(
            handle,
            Segment {
                samples,
                start_at,
                start_frame,
            },
        );

        tracing::trace!(
            handle = handle.0,
            start_at,
            duration,
            cursor = self.cursor,
            "segment scheduled"
        );

        Ok(handle)
    }

    /// Decode a PCM frame and schedule it
    ///
    /// # Errors
    ///
    /// Returns `MalformedAudio` if the frame cannot be decoded or its rate
    /// differs from the scheduler's, and `ScheduleAfterClose` once closed
    pub fn enqueue_frame(&mut self, frame: &AudioFrame, clock: &dyn OutputClock) -> Result<PlaybackHandle> {
        if self.closed {
            return Err(Error::ScheduleAfterClose);
        }
        if frame.sample_rate() != self.sample_rate {
            return Err(Error::MalformedAudio(format!(
                "expected {} Hz audio, got {} Hz",
                self.sample_rate,
                frame.sample_rate()
            )));
        }

        let samples = frame.to_samples()?;
        self.enqueue(samples, clock)
    }

    /// Mark a segment as finished playing
    ///
    /// Returns false if the handle was not active.
    pub fn complete(&mut self, handle: PlaybackHandle) -> bool {
        self.active.remove(&handle).is_some()
    }

    /// Remove every segment that has finished by `now`
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn reap(&mut self, now: f64) -> Vec<PlaybackHandle> {
        let frame = (now.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        self.reap_frames(frame)
    }

    fn reap_frames(&mut self, frame: u64) -> Vec<PlaybackHandle> {
        let finished: Vec<PlaybackHandle> = self
            .active
            .iter()
            .filter(|(_, segment)| segment.end_frame() <= frame)
            .map(|(handle, _)| *handle)
            .collect();

        for handle in &finished {
            self.active.remove(handle);
        }

        finished
    }

    /// Stop all active playback and reset the cursor to the clock origin
    ///
    /// Returns the number of segments stopped. Calling it with nothing
    /// active is a no-op.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        self.active.clear();
        self.cursor = 0.0;

        if stopped > 0 {
            tracing::debug!(stopped, "playback interrupted");
        }

        stopped
    }

    /// Tear down: stop everything and reject further scheduling
    pub fn close(&mut self) {
        self.interrupt();
        self.closed = true;
    }

    /// Render the next block of mono output and advance `clock`
    ///
    /// Frames not covered by any segment are silent. Segments whose last
    /// frame falls inside the block complete naturally.
    #[allow(clippy::cast_possible_truncation)]
    pub fn render(&mut self, out: &mut [f32], clock: &FrameClock) {
        out.fill(0.0);

        let block_start = clock.frames();
        let block_end = block_start + out.len() as u64;

        for segment in self.active.values() {
            let from = segment.start_frame.max(block_start);
            let to = segment.end_frame().min(block_end);
            if from >= to {
                continue;
            }

            let src = (from - segment.start_frame) as usize;
            let dst = (from - block_start) as usize;
            let len = (to - from) as usize;
            for (o, s) in out[dst..dst + len]
                .iter_mut()
                .zip(&segment.samples[src..src + len])
            {
                *o += s * self.gain;
            }
        }

        clock.advance(out.len() as u64);
        let finished = self.reap_frames(block_end);
        if !finished.is_empty() {
            tracing::trace!(finished = finished.len(), "segments completed");
        }
    }

    /// Earliest start time for the next segment
    #[must_use]
    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Scheduled start time of an active segment
    #[must_use]
    pub fn start_time(&self, handle: PlaybackHandle) -> Option<f64> {
        self.active.get(&handle).map(|s| s.start_at)
    }

    /// Whether the handle is still scheduled or playing
    #[must_use]
    pub fn is_active(&self, handle: PlaybackHandle) -> bool {
        self.active.contains_key(&handle)
    }

    /// Number of active segments
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether the scheduler has been torn down
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sample rate of scheduled audio
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct ManualClock(Cell<f64>);

    impl OutputClock for ManualClock {
        fn now(&self) -> f64 {
            self.0.get()
        }
    }

    #[test]
    fn test_zero_length_segment_is_noop() {
        let clock = ManualClock(Cell::new(2.0));
        let mut scheduler = PlaybackScheduler::new(10);

        let handle = scheduler.enqueue(Vec::new(), &clock).unwrap();
        assert!(!scheduler.is_active(handle));
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.cursor().abs() < f64::EPSILON);
    }

    #[test]
    fn test_frame_rate_mismatch_rejected() {
        let clock = ManualClock(Cell::new(0.0));
        let mut scheduler = PlaybackScheduler::new(24000);
        let frame = AudioFrame::from_samples(&[0.1; 16], 16000);

        let err = scheduler.enqueue_frame(&frame, &clock).unwrap_err();
        assert!(matches!(err, Error::MalformedAudio(_)));
    }

    #[test]
    fn test_render_plays_segments_back_to_back() {
        let clock = FrameClock::new(4);
        let mut scheduler = PlaybackScheduler::new(4);

        let first = scheduler.enqueue(vec![0.1, 0.2, 0.3], &clock).unwrap();
        let second = scheduler.enqueue(vec![0.4, 0.5], &clock).unwrap();

        let mut out = [0.0f32; 4];
        scheduler.render(&mut out, &clock);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);
        assert!(!scheduler.is_active(first));
        assert!(scheduler.is_active(second));

        scheduler.render(&mut out, &clock);
        assert_eq!(out, [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(clock.frames(), 8);
    }

    #[test]
    fn test_render_applies_gain() {
        let clock = FrameClock::new(4);
        let mut scheduler = PlaybackScheduler::new(4).with_gain(0.5);
        scheduler.enqueue(vec![0.5, -0.5], &clock).unwrap();

        let mut out = [0.0f32; 2];
        scheduler.render(&mut out, &clock);
        assert_eq!(out, [0.25, -0.25]);
    }

    #[test]
    fn test_late_segment_starts_at_clock() {
        let clock = FrameClock::new(4);
        let mut scheduler = PlaybackScheduler::new(4);

        let mut out = [0.0f32; 8];
        scheduler.render(&mut out, &clock);

        let handle = scheduler.enqueue(vec![0.7], &clock).unwrap();
        assert!((scheduler.start_time(handle).unwrap() - 2.0).abs() < 1e-9);

        let mut out = [0.0f32; 2];
        scheduler.render(&mut out, &clock);
        assert_eq!(out, [0.7, 0.0]);
    }

    #[test]
    fn test_complete_removes_exactly_once() {
        let clock = ManualClock(Cell::new(0.0));
        let mut scheduler = PlaybackScheduler::new(10);
        let handle = scheduler.enqueue(vec![0.0; 10], &clock).unwrap();

        assert!(scheduler.complete(handle));
        assert!(!scheduler.complete(handle));
    }

    #[test]
    fn test_reap_by_time() {
        let clock = ManualClock(Cell::new(0.0));
        let mut scheduler = PlaybackScheduler::new(10);
        let a = scheduler.enqueue(vec![0.0; 10], &clock).unwrap();
        let b = scheduler.enqueue(vec![0.0; 10], &clock).unwrap();

        assert!(scheduler.reap(0.5).is_empty());
        assert_eq!(scheduler.reap(1.0), vec![a]);
        assert_eq!(scheduler.reap(5.0), vec![b]);
    }
}
