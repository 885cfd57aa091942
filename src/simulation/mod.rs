mod kick;
mod measure;
mod noise;

pub use kick::{KickConfig, beat_length, generate_kick_pair, generate_kick_track};
pub use measure::{
    Alignment, capture_signal, combined_rms, estimate_offset, find_cancelling_delay,
};
pub use noise::{ClickConfig, HissConfig, HumConfig, NoiseConfig, apply_noise};
