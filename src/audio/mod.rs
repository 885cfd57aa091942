pub mod capture;
pub mod player;
pub mod source;
pub mod tone;

pub use capture::{AudioCapture, list_input_devices};
pub use player::{PlayerStatus, SourcePlayer};
pub use source::{AudioSource, ToneSource, WavFileSource};
pub use tone::TestTone;
