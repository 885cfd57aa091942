//! Beat-synchronised phase scope.
//!
//! Each monitored source captures one beat of its input into a
//! tempo-locked ring and passes the audio through a bounded delay. The
//! display turns those rings into waveform meshes, rebuilding only the
//! quads whose samples changed since the last frame.

pub mod audio;
pub mod beat;
pub mod config;
pub mod constants;
pub mod delay;
pub mod display;
pub mod error;
pub mod math;
pub mod mesh;
pub mod processor;
pub mod registry;
pub mod ring;
pub mod sampler;
pub mod source;
pub mod state;
pub mod tracker;
pub mod view;
pub mod wav;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use beat::{BeatCaptureBuffer, Transport};
pub use config::ScopeConfig;
pub use display::{FrameReport, LaneKind, WaveformDisplay};
pub use error::{Result, ScopeError};
pub use processor::{FreeRunningTransport, PhaseProcessor};
pub use registry::{SourceHandle, SourceRegistry};
pub use sampler::ViewWindow;
pub use source::{ErrorFlags, ListenMode, SourceShared};
pub use view::ViewController;
pub use wav::save_wav;
