use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid vertex layout: {0}")]
    VertexLayout(String),

    #[error("GPU buffer error: {0}")]
    GpuBuffer(String),

    #[error("Stale source handle {index}:{generation}")]
    StaleHandle { index: u32, generation: u32 },

    #[error("Saved state error: {0}")]
    State(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScopeError>;
