use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::WavReader;

use super::TestTone;
use crate::error::{Result, ScopeError};

/// Pull-based audio for standalone use, one deinterleaved block at a time.
pub trait AudioSource: Send {
    /// Fill the first [`channels`](AudioSource::channels) slices with the
    /// next frames. Returns the number of frames written, 0 once exhausted.
    fn read_block(&mut self, channels: &mut [&mut [f32]]) -> usize;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> usize;
}

/// A mono or stereo WAV file held in memory.
pub struct WavFileSource {
    /// One vector per channel.
    channels: Vec<Vec<f32>>,
    position: usize,
    looping: bool,
    sample_rate: u32,
}

impl WavFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        if !(1..=2).contains(&spec.channels) {
            return Err(ScopeError::Config(format!(
                "Expected mono or stereo WAV file, got {} channels",
                spec.channels
            )));
        }

        let interleaved = Self::read_samples(reader, &spec)?;
        let channels = Self::deinterleave(&interleaved, spec.channels as usize);
        log::info!(
            "Loaded {} frames of {} channel audio at {} Hz from {}",
            channels[0].len(),
            spec.channels,
            spec.sample_rate,
            path.as_ref().display()
        );

        Ok(Self {
            channels,
            position: 0,
            looping: false,
            sample_rate: spec.sample_rate,
        })
    }

    /// Restart from the beginning when the end is reached.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn read_samples(
        mut reader: WavReader<BufReader<File>>,
        spec: &hound::WavSpec,
    ) -> Result<Vec<f32>> {
        let samples = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?
            }
            hound::SampleFormat::Int => {
                let max_val = 2_i32.pow(spec.bits_per_sample as u32 - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(samples)
    }

    fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
        (0..channels)
            .map(|ch| interleaved.iter().skip(ch).step_by(channels).copied().collect())
            .collect()
    }
}

impl AudioSource for WavFileSource {
    fn read_block(&mut self, channels: &mut [&mut [f32]]) -> usize {
        let total = self.frames();
        if total == 0 {
            return 0;
        }
        if self.position >= total {
            if !self.looping {
                return 0;
            }
            self.position = 0;
        }

        let wanted = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        let frames = wanted.min(total - self.position);
        let range = self.position..self.position + frames;
        for (out, data) in channels.iter_mut().zip(&self.channels) {
            out[..frames].copy_from_slice(&data[range.clone()]);
        }
        self.position += frames;
        frames
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels.len()
    }
}

/// Endless stereo test tone.
pub struct ToneSource {
    tone: TestTone,
    sample_rate: u32,
}

impl ToneSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            tone: TestTone::new(sample_rate as f64),
            sample_rate,
        }
    }

    /// A tone starting in phase with `other`.
    pub fn in_phase_with(other: &ToneSource) -> Self {
        Self {
            tone: TestTone::in_phase_with(&other.tone),
            sample_rate: other.sample_rate,
        }
    }
}

impl AudioSource for ToneSource {
    fn read_block(&mut self, channels: &mut [&mut [f32]]) -> usize {
        let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        self.tone.fill(channels);
        frames
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        2
    }
}
