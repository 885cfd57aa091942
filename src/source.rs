//! State of one monitored source shared between its audio callback and
//! the render thread.
//!
//! Every field is an individual atomic. The audio thread writes the beat
//! buffer and raises error flags, the UI writes the parameters, and each
//! side reads the other's values opportunistically. A stale read costs at
//! most one frame.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::beat::{BeatCaptureBuffer, CaptureStatus};
use crate::constants::{DEFAULT_MAX_SAMPLE_RATE, DEFAULT_MIN_BPM, MAX_DELAY};

/// Which input channels feed the beat capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum ListenMode {
    #[default]
    Left,
    Right,
    /// `0.5 * left + 0.5 * right`, or a straight copy of a mono input.
    Sum,
}

impl ListenMode {
    fn to_u8(self) -> u8 {
        match self {
            ListenMode::Left => 0,
            ListenMode::Right => 1,
            ListenMode::Sum => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenMode::Left,
            1 => ListenMode::Right,
            _ => ListenMode::Sum,
        }
    }
}

impl fmt::Display for ListenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenMode::Left => "Left",
            ListenMode::Right => "Right",
            ListenMode::Sum => "Sum",
        };
        f.write_str(name)
    }
}

impl FromStr for ListenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(ListenMode::Left),
            "right" => Ok(ListenMode::Right),
            "sum" => Ok(ListenMode::Sum),
            _ => Err(format!("invalid listen mode: {}", s)),
        }
    }
}

bitflags::bitflags! {
    /// Sticky error bits raised by the audio path.
    ///
    /// Bits accumulate until a caller takes them; the audio path never
    /// reports anything synchronously.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ErrorFlags: u32 {
        /// A block arrived with no input channels.
        const NO_INPUT_CHANNELS = 1 << 0;
        /// No transport position, or a tempo of zero.
        const NO_PLAYHEAD_FOUND = 1 << 1;
        /// The tempo needs more beat storage than was allocated.
        const TEMPO_OUT_OF_RANGE = 1 << 2;
    }
}

fn error_label(name: &str) -> &str {
    match name {
        "NO_INPUT_CHANNELS" => "NoInputChannels",
        "NO_PLAYHEAD_FOUND" => "NoPlayheadFound",
        "TEMPO_OUT_OF_RANGE" => "TempoOutOfRange",
        other => other,
    }
}

impl fmt::Display for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, (name, _)) in self.iter_names().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(error_label(name))?;
        }
        Ok(())
    }
}

impl From<CaptureStatus> for ErrorFlags {
    fn from(status: CaptureStatus) -> Self {
        match status {
            CaptureStatus::Captured => ErrorFlags::empty(),
            CaptureStatus::NoPlayhead => ErrorFlags::NO_PLAYHEAD_FOUND,
            CaptureStatus::TempoOutOfRange => ErrorFlags::TEMPO_OUT_OF_RANGE,
        }
    }
}

/// User-controlled parameters of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceParams {
    /// Delay in samples, within `[-MAX_DELAY, MAX_DELAY]`.
    pub delay: i32,
    pub invert_phase: bool,
    pub listen_mode: ListenMode,
}

impl SourceParams {
    /// `-1.0` when the phase is inverted, `1.0` otherwise.
    pub fn sign(&self) -> f32 {
        if self.invert_phase { -1.0 } else { 1.0 }
    }
}

/// Clamp a delay value into the supported range.
pub fn clamp_delay(delay: i32) -> i32 {
    delay.clamp(-MAX_DELAY, MAX_DELAY)
}

/// Everything about one source that both threads touch.
pub struct SourceShared {
    beat: BeatCaptureBuffer,
    delay: AtomicI32,
    invert_phase: AtomicBool,
    listen_mode: AtomicU8,
    errors: AtomicU32,
    sample_rate: AtomicU32,
    bpm: AtomicU64,
}

impl SourceShared {
    /// Create a source whose beat storage covers `max_sample_rate` at
    /// `min_bpm`.
    pub fn new(max_sample_rate: u32, min_bpm: f64) -> Self {
        Self {
            beat: BeatCaptureBuffer::for_limits(max_sample_rate, min_bpm),
            delay: AtomicI32::new(0),
            invert_phase: AtomicBool::new(false),
            listen_mode: AtomicU8::new(ListenMode::default().to_u8()),
            errors: AtomicU32::new(0),
            sample_rate: AtomicU32::new(0),
            bpm: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    pub fn beat(&self) -> &BeatCaptureBuffer {
        &self.beat
    }

    pub fn delay(&self) -> i32 {
        self.delay.load(Ordering::Relaxed)
    }

    /// Set the delay, clamped to `[-MAX_DELAY, MAX_DELAY]`.
    pub fn set_delay(&self, delay: i32) {
        self.delay.store(clamp_delay(delay), Ordering::Relaxed);
    }

    pub fn invert_phase(&self) -> bool {
        self.invert_phase.load(Ordering::Relaxed)
    }

    pub fn set_invert_phase(&self, invert: bool) {
        self.invert_phase.store(invert, Ordering::Relaxed);
    }

    pub fn listen_mode(&self) -> ListenMode {
        ListenMode::from_u8(self.listen_mode.load(Ordering::Relaxed))
    }

    pub fn set_listen_mode(&self, mode: ListenMode) {
        self.listen_mode.store(mode.to_u8(), Ordering::Relaxed);
    }

    pub fn params(&self) -> SourceParams {
        SourceParams {
            delay: self.delay(),
            invert_phase: self.invert_phase(),
            listen_mode: self.listen_mode(),
        }
    }

    pub fn set_params(&self, params: SourceParams) {
        self.set_delay(params.delay);
        self.set_invert_phase(params.invert_phase);
        self.set_listen_mode(params.listen_mode);
    }

    /// Set error bits. They stay set until [`take_errors`](Self::take_errors).
    pub fn raise(&self, flags: ErrorFlags) {
        if !flags.is_empty() {
            self.errors.fetch_or(flags.bits(), Ordering::Relaxed);
        }
    }

    /// Current error bits without clearing them.
    pub fn errors(&self) -> ErrorFlags {
        ErrorFlags::from_bits_retain(self.errors.load(Ordering::Relaxed))
    }

    /// Current error bits, clearing them.
    pub fn take_errors(&self) -> ErrorFlags {
        ErrorFlags::from_bits_retain(self.errors.swap(0, Ordering::Relaxed))
    }

    /// Sample rate of the last processed block, 0 before the first one.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Tempo of the last processed block, 0 when none was available.
    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm.load(Ordering::Relaxed))
    }

    pub(crate) fn record_transport(&self, sample_rate: u32, bpm: f64) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
        self.bpm.store(bpm.to_bits(), Ordering::Relaxed);
    }
}

impl Default for SourceShared {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLE_RATE, DEFAULT_MIN_BPM)
    }
}
