use std::path::Path;

use hound::{WavSpec, WavWriter};

use crate::error::{Result, ScopeError};

/// Write one or two equal-length channels as a 32-bit float WAV file.
pub fn save_wav<P: AsRef<Path>>(path: P, channels: &[&[f32]], sample_rate: u32) -> Result<()> {
    let frames = channels.first().map_or(0, |c| c.len());
    if !(1..=2).contains(&channels.len()) || channels.iter().any(|c| c.len() != frames) {
        return Err(ScopeError::Config(format!(
            "Expected one or two channels of equal length, got {}",
            channels.len()
        )));
    }

    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioSource, WavFileSource};

    #[test]
    fn test_save_and_reload_stereo() {
        let path = std::env::temp_dir().join(format!("beatscope_save_{}.wav", std::process::id()));
        let left = [0.0, 0.25, -0.5, 1.0];
        let right = [0.1, 0.2, 0.3, 0.4];
        save_wav(&path, &[&left, &right], 44100).unwrap();

        let mut source = WavFileSource::new(&path).unwrap();
        assert_eq!(source.sample_rate(), 44100);
        let mut l = vec![0.0; 4];
        let mut r = vec![0.0; 4];
        let mut block: [&mut [f32]; 2] = [&mut l, &mut r];
        assert_eq!(source.read_block(&mut block), 4);
        assert_eq!(l, left);
        assert_eq!(r, right);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rejects_mismatched_channels() {
        let path = std::env::temp_dir().join("beatscope_never_written.wav");
        assert!(save_wav(&path, &[&[0.0, 1.0], &[0.0]], 48000).is_err());
        assert!(save_wav(&path, &[], 48000).is_err());
    }
}
