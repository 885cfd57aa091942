//! Configuration for the beatscope capture and display.
//!
//! Every section has defaults, so a TOML file only needs the values it
//! changes:
//!
//! ```toml
//! [capture]
//! bpm = 128.0
//! listen_mode = "Left"
//!
//! [display]
//! zoom_speed = 0.05
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BPM, DEFAULT_MAX_SAMPLE_RATE, DEFAULT_MIN_BPM, DEFAULT_ZOOM_SPEED, MAX_ZOOM_LEVEL,
    MIN_ZOOM_LEVEL, NUM_QUADS,
};
use crate::error::{Result, ScopeError};
use crate::source::ListenMode;

/// Audio device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Audio sample rate in Hz (typically 48000)
    pub sample_rate: u32,
    /// Processing buffer size in frames
    pub buffer_size: usize,
    /// Number of input channels to open (1 or 2)
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            channels: 2,
        }
    }
}

/// Beat capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Tempo for standalone capture, where no host transport exists
    pub bpm: f64,
    /// Slowest tempo the capture storage must hold one beat of
    pub min_bpm: f64,
    /// Highest sample rate the capture storage must hold one beat of
    pub max_sample_rate: u32,
    /// Channel policy for the captured beat
    pub listen_mode: ListenMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            min_bpm: DEFAULT_MIN_BPM,
            max_sample_rate: DEFAULT_MAX_SAMPLE_RATE,
            listen_mode: ListenMode::default(),
        }
    }
}

/// Waveform display configuration
///
/// Colours are linear RGBA in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Quads per waveform lane
    pub num_quads: usize,
    /// Zoom step per wheel notch
    pub zoom_speed: f64,
    /// Lowest zoom level a wheel step can reach
    pub min_zoom: f64,
    /// Highest zoom level a wheel step can reach
    pub max_zoom: f64,
    /// Beat marker width in pixels
    pub marker_width_px: f32,
    pub local_colour: [f32; 4],
    pub remote_colour: [f32; 4],
    pub combined_colour: [f32; 4],
    pub marker_colour: [f32; 4],
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            num_quads: NUM_QUADS,
            zoom_speed: DEFAULT_ZOOM_SPEED,
            min_zoom: MIN_ZOOM_LEVEL,
            max_zoom: MAX_ZOOM_LEVEL,
            marker_width_px: 1.0,
            local_colour: [141.0 / 255.0, 21.0 / 255.0, 74.0 / 255.0, 1.0],
            remote_colour: [40.0 / 255.0, 119.0 / 255.0, 118.0 / 255.0, 1.0],
            combined_colour: [0.3, 0.3, 0.3, 1.0],
            marker_colour: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

/// Complete beatscope configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub audio: AudioConfig,
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
}

impl ScopeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ScopeConfig =
            toml::from_str(text).map_err(|e| ScopeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ScopeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| ScopeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(ScopeError::Config(msg));
        if self.audio.sample_rate == 0 {
            return bad("audio.sample_rate must be positive".into());
        }
        if self.audio.buffer_size == 0 {
            return bad("audio.buffer_size must be positive".into());
        }
        if !(1..=2).contains(&self.audio.channels) {
            return bad(format!(
                "audio.channels must be 1 or 2, got {}",
                self.audio.channels
            ));
        }
        if !(self.capture.min_bpm.is_finite() && self.capture.min_bpm > 0.0) {
            return bad(format!(
                "capture.min_bpm must be positive, got {}",
                self.capture.min_bpm
            ));
        }
        if !(self.capture.bpm.is_finite() && self.capture.bpm >= self.capture.min_bpm) {
            return bad(format!(
                "capture.bpm {} is below capture.min_bpm {}",
                self.capture.bpm, self.capture.min_bpm
            ));
        }
        if self.capture.max_sample_rate < self.audio.sample_rate {
            return bad(format!(
                "capture.max_sample_rate {} is below audio.sample_rate {}",
                self.capture.max_sample_rate, self.audio.sample_rate
            ));
        }
        if self.display.num_quads == 0 {
            return bad("display.num_quads must be positive".into());
        }
        let zoom = 0.0..=1.0;
        if !zoom.contains(&self.display.min_zoom)
            || !zoom.contains(&self.display.max_zoom)
            || self.display.min_zoom > self.display.max_zoom
        {
            return bad(format!(
                "display zoom bounds [{}, {}] must be ordered within [0, 1]",
                self.display.min_zoom, self.display.max_zoom
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScopeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.display.num_quads, 500);
        assert_eq!(config.capture.bpm, 100.0);
        assert_eq!(config.capture.listen_mode, ListenMode::Left);
    }

    #[test]
    fn test_partial_toml() {
        let config = ScopeConfig::from_toml_str(
            r#"
            [capture]
            bpm = 128.0
            listen_mode = "Right"

            [display]
            zoom_speed = 0.05
            "#,
        )
        .unwrap();
        assert_eq!(config.capture.bpm, 128.0);
        assert_eq!(config.capture.listen_mode, ListenMode::Right);
        assert_eq!(config.display.zoom_speed, 0.05);
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.display.num_quads, NUM_QUADS);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ScopeConfig::from_toml_str("[capture]\nbpm = 0.0\n").is_err());
        assert!(ScopeConfig::from_toml_str("[audio]\nchannels = 6\n").is_err());
        assert!(ScopeConfig::from_toml_str("[display]\nnum_quads = 0\n").is_err());
        assert!(ScopeConfig::from_toml_str("[display]\nmin_zoom = 0.9\nmax_zoom = 0.5\n").is_err());
        assert!(ScopeConfig::from_toml_str("[capture]\nlisten_mode = \"Middle\"\n").is_err());
        assert!(ScopeConfig::from_toml_str("not toml at all [").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = ScopeConfig::default();
        config.capture.bpm = 174.0;
        config.display.local_colour = [1.0, 0.0, 0.0, 1.0];
        let text = config.to_toml_string().unwrap();
        assert_eq!(ScopeConfig::from_toml_str(&text).unwrap(), config);
    }
}
