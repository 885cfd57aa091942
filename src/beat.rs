use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use crate::math::{positive_modulo, samples_per_beat};
use crate::ring::{RingReader, SampleRing};
use crate::source::ListenMode;

/// Host transport position for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transport {
    pub bpm: f64,
    /// Absolute sample time of the first frame in the block.
    pub time_in_samples: i64,
}

/// Result of one capture step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Captured,
    /// Missing transport or a tempo of zero. Nothing was written.
    NoPlayhead,
    /// The beat would not fit into the allocated storage. Nothing was written.
    TempoOutOfRange,
}

/// Render-side view of the capture state.
///
/// Fields are loaded one by one so they can disagree for one frame; the
/// generation tells the reader when cached positions are meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeatSnapshot {
    pub capacity: usize,
    /// `absolute_time mod capacity` after the last write.
    pub cursor: usize,
    /// Absolute sample time one past the last written frame.
    pub head: i64,
    pub generation: u64,
}

/// One beat of mono audio, tempo-locked.
///
/// The capacity is `ceil(sample_rate * 60 / bpm)` and is recomputed every
/// block. Each sample lives at `absolute_time mod capacity`, so the same beat
/// position always lands in the same slot.
pub struct BeatCaptureBuffer {
    ring: SampleRing,
    cursor: AtomicUsize,
    head: AtomicI64,
    generation: AtomicU64,
}

impl BeatCaptureBuffer {
    /// Allocate storage for at most `max_capacity` samples per beat.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            ring: SampleRing::with_storage(max_capacity),
            cursor: AtomicUsize::new(0),
            head: AtomicI64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Allocate storage for the longest beat at `max_sample_rate` and
    /// `min_bpm`.
    pub fn for_limits(max_sample_rate: u32, min_bpm: f64) -> Self {
        Self::new(samples_per_beat(max_sample_rate as f64, min_bpm))
    }

    pub fn max_capacity(&self) -> usize {
        self.ring.max_capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    pub fn head(&self) -> i64 {
        self.head.load(Ordering::Relaxed)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BeatSnapshot {
        BeatSnapshot {
            capacity: self.capacity(),
            cursor: self.cursor(),
            head: self.head(),
            generation: self.generation(),
        }
    }

    pub fn reader(&self) -> Option<RingReader<'_>> {
        self.ring.reader()
    }

    /// Copy of the captured beat in slot order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.ring.to_vec()
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Recompute the capacity for `bpm` at `sample_rate`.
    ///
    /// A changed capacity clears the buffer, resets the cursor and bumps the
    /// generation. Returns `false` if the beat is longer than the storage;
    /// the buffer is left as it was.
    pub fn reconfigure(&self, bpm: f64, sample_rate: f64) -> bool {
        let capacity = samples_per_beat(sample_rate, bpm);
        if capacity > self.max_capacity() {
            return false;
        }
        if capacity != self.capacity() {
            self.ring.resize(capacity);
            self.cursor.store(0, Ordering::Relaxed);
            self.bump_generation();
        }
        true
    }

    /// Write one block of input starting at absolute time `time_in_samples`.
    ///
    /// `channels` are the block's input channels, all of the same length.
    /// The mono stream is chosen by `mode`; with a single channel every mode
    /// copies it straight. Does nothing while the capacity is zero.
    pub fn write(&self, channels: &[&[f32]], time_in_samples: i64, mode: ListenMode) {
        let capacity = self.capacity();
        let Some(&left) = channels.first() else {
            return;
        };
        if capacity == 0 {
            return;
        }

        let right = channels.get(1).copied();
        let frames = match right {
            Some(right) => left.len().min(right.len()),
            None => left.len(),
        };

        if time_in_samples != self.head() {
            self.bump_generation();
        }

        match (mode, right) {
            (ListenMode::Right, Some(right)) => {
                self.ring.write(time_in_samples, &right[..frames]);
            }
            (ListenMode::Sum, Some(right)) => {
                self.ring
                    .write_with(time_in_samples, frames, |i| 0.5 * left[i] + 0.5 * right[i]);
            }
            _ => self.ring.write(time_in_samples, &left[..frames]),
        }

        let end = time_in_samples + frames as i64;
        self.cursor
            .store(positive_modulo(end, capacity), Ordering::Relaxed);
        self.head.store(end, Ordering::Relaxed);
    }

    /// Reconfigure for the block's tempo and write it, or park the cursor
    /// at 0 if that is not possible.
    pub fn capture(
        &self,
        channels: &[&[f32]],
        transport: Option<Transport>,
        sample_rate: f64,
        mode: ListenMode,
    ) -> CaptureStatus {
        let Some(transport) = transport.filter(|t| t.bpm > 0.0 && t.bpm.is_finite()) else {
            self.park();
            return CaptureStatus::NoPlayhead;
        };
        if !self.reconfigure(transport.bpm, sample_rate) {
            self.park();
            return CaptureStatus::TempoOutOfRange;
        }
        self.write(channels, transport.time_in_samples, mode);
        CaptureStatus::Captured
    }

    /// Force the cursor to 0 after a skipped capture.
    fn park(&self) {
        if self.cursor.swap(0, Ordering::Relaxed) != 0 {
            self.bump_generation();
        }
    }

    /// Drop all captured audio and forget the transport position.
    pub fn reset(&self) {
        self.ring.clear();
        self.cursor.store(0, Ordering::Relaxed);
        self.head.store(0, Ordering::Relaxed);
        self.bump_generation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(block: &[f32]) -> [&[f32]; 1] {
        [block]
    }

    fn ramp(start: f32, len: usize) -> Vec<f32> {
        (0..len).map(|i| start + i as f32).collect()
    }

    #[test]
    fn test_write_splits_across_wrap() {
        let beat = BeatCaptureBuffer::new(48000);
        assert!(beat.reconfigure(120.0, 48000.0));
        assert_eq!(beat.capacity(), 24000);

        let block = ramp(1.0, 512);
        beat.write(&mono(&block), 23800, ListenMode::Left);

        let data = beat.to_vec();
        // 200 samples fill [23800, 24000)
        assert_eq!(data[23800], 1.0);
        assert_eq!(data[23999], 200.0);
        // 312 wrap into [0, 312)
        assert_eq!(data[0], 201.0);
        assert_eq!(data[311], 512.0);
        assert_eq!(data[312], 0.0);
        assert_eq!(beat.cursor(), 312);
        assert_eq!(beat.head(), 24312);
    }

    #[test]
    fn test_listen_modes() {
        let beat = BeatCaptureBuffer::new(1000);
        assert!(beat.reconfigure(60.0, 100.0));
        let left = [1.0, 1.0];
        let right = [0.0, -1.0];
        let channels: [&[f32]; 2] = [&left, &right];

        beat.write(&channels, 0, ListenMode::Left);
        assert_eq!(&beat.to_vec()[..2], &[1.0, 1.0]);
        beat.write(&channels, 0, ListenMode::Right);
        assert_eq!(&beat.to_vec()[..2], &[0.0, -1.0]);
        beat.write(&channels, 0, ListenMode::Sum);
        assert_eq!(&beat.to_vec()[..2], &[0.5, 0.0]);
    }

    #[test]
    fn test_mono_input_is_copied_in_every_mode() {
        let beat = BeatCaptureBuffer::new(1000);
        assert!(beat.reconfigure(60.0, 100.0));
        let samples = [0.25, -0.75];
        for mode in [ListenMode::Left, ListenMode::Right, ListenMode::Sum] {
            beat.write(&mono(&samples), 10, mode);
            assert_eq!(&beat.to_vec()[10..12], &samples);
        }
    }

    #[test]
    fn test_capacity_change_clears_and_bumps_generation() {
        let beat = BeatCaptureBuffer::new(48000);
        assert!(beat.reconfigure(120.0, 48000.0));
        beat.write(&mono(&[1.0; 100]), 0, ListenMode::Left);
        let generation = beat.generation();

        assert!(beat.reconfigure(120.0, 48000.0));
        assert_eq!(beat.generation(), generation);

        assert!(beat.reconfigure(100.0, 48000.0));
        assert_eq!(beat.capacity(), 28800);
        assert_eq!(beat.cursor(), 0);
        assert!(beat.generation() > generation);
        assert!(beat.to_vec().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_missing_transport_parks_cursor() {
        let beat = BeatCaptureBuffer::new(48000);
        let block = [0.5; 64];
        let transport = Transport {
            bpm: 120.0,
            time_in_samples: 100,
        };
        let status = beat.capture(&mono(&block), Some(transport), 48000.0, ListenMode::Sum);
        assert_eq!(status, CaptureStatus::Captured);
        assert_eq!(beat.cursor(), 164);

        let status = beat.capture(&mono(&block), None, 48000.0, ListenMode::Sum);
        assert_eq!(status, CaptureStatus::NoPlayhead);
        assert_eq!(beat.cursor(), 0);

        let zero_tempo = Transport {
            bpm: 0.0,
            time_in_samples: 164,
        };
        let status = beat.capture(&mono(&block), Some(zero_tempo), 48000.0, ListenMode::Sum);
        assert_eq!(status, CaptureStatus::NoPlayhead);
        assert_eq!(beat.cursor(), 0);
    }

    #[test]
    fn test_tempo_out_of_range() {
        let beat = BeatCaptureBuffer::for_limits(48000, 60.0);
        assert_eq!(beat.max_capacity(), 48000);
        let transport = Transport {
            bpm: 30.0,
            time_in_samples: 0,
        };
        let status = beat.capture(&mono(&[1.0; 16]), Some(transport), 48000.0, ListenMode::Left);
        assert_eq!(status, CaptureStatus::TempoOutOfRange);
        assert_eq!(beat.capacity(), 0);
        assert_eq!(beat.cursor(), 0);
    }

    #[test]
    fn test_discontinuity_bumps_generation() {
        let beat = BeatCaptureBuffer::new(1000);
        assert!(beat.reconfigure(60.0, 500.0));
        beat.write(&mono(&[0.0; 10]), 0, ListenMode::Left);
        let generation = beat.generation();

        beat.write(&mono(&[0.0; 10]), 10, ListenMode::Left);
        assert_eq!(beat.generation(), generation);

        beat.write(&mono(&[0.0; 10]), 400, ListenMode::Left);
        assert_eq!(beat.generation(), generation + 1);
    }
}
