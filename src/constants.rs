//! Fixed sizes shared by the audio and render paths.
//!
//! The delay range and the quad count are baked into persisted parameter
//! ranges and mesh capacities, so they are compile-time constants rather
//! than configuration.

/// Maximum delay magnitude in samples. The delay parameter lives in
/// `[-MAX_DELAY, MAX_DELAY]` and the processor reports this as its latency.
pub const MAX_DELAY: i32 = 2000;

/// Slots per channel in the delay line.
///
/// One more than the full delay span so that `+MAX_DELAY` and `-MAX_DELAY`
/// never resolve to the same slot.
pub const DELAY_LINE_CAPACITY: usize = 2 * MAX_DELAY as usize + 1;

/// Quads per waveform lane.
pub const NUM_QUADS: usize = 500;

/// Tempo used by standalone capture when none is configured.
pub const DEFAULT_BPM: f64 = 100.0;

/// Slowest tempo the beat capture storage is sized for.
pub const DEFAULT_MIN_BPM: f64 = 20.0;

/// Highest sample rate the beat capture storage is sized for.
pub const DEFAULT_MAX_SAMPLE_RATE: u32 = 192_000;

/// Wheel zoom step per unit of wheel delta.
pub const DEFAULT_ZOOM_SPEED: f64 = 0.1;

/// Zoom level bounds. View width is `(1 - zoom)^3`.
pub const MIN_ZOOM_LEVEL: f64 = 0.01;
pub const MAX_ZOOM_LEVEL: f64 = 1.0;

/// Beat division markers drawn inside one bar (at 1/4, 2/4, 3/4).
pub const NUM_BEAT_MARKERS: usize = 3;

/// Depth of waveform quads.
pub const WAVEFORM_DEPTH: f32 = 0.5;

/// Depth of beat markers, in front of the waveforms.
pub const MARKER_DEPTH: f32 = 0.1;
