//! Impairments added to synthetic kick tracks so the two sides of a pair
//! never match sample for sample.

use rand::RngExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Normal};

use crate::math::rms;

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct NoiseConfig {
    pub seed: Option<u64>,
    pub hiss: Option<HissConfig>,
    pub clicks: Option<ClickConfig>,
    pub hum: Option<HumConfig>,
}

impl NoiseConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_hiss(mut self, snr_db: f32) -> Self {
        self.hiss = Some(HissConfig { snr_db });
        self
    }

    pub fn with_clicks(mut self, rate_hz: f32, amplitude: f32) -> Self {
        self.clicks = Some(ClickConfig {
            rate_hz,
            amplitude,
            ..ClickConfig::default()
        });
        self
    }

    pub fn with_hum(mut self, frequency_hz: f32, level_db: f32) -> Self {
        self.hum = Some(HumConfig {
            frequency_hz,
            level_db,
        });
        self
    }

    pub fn is_clean(&self) -> bool {
        self.hiss.is_none() && self.clicks.is_none() && self.hum.is_none()
    }
}

/// White noise at a signal-to-noise ratio measured against the whole track.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct HissConfig {
    pub snr_db: f32,
}

/// Short decaying clicks at random intervals, like a noisy cable.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    /// Mean clicks per second
    pub rate_hz: f32,
    pub amplitude: f32,
    /// Samples for a click to decay to 1/e
    pub decay_samples: f32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            rate_hz: 2.0,
            amplitude: 0.5,
            decay_samples: 3.0,
        }
    }
}

/// Mains hum: a fundamental plus a weaker third harmonic.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct HumConfig {
    pub frequency_hz: f32,
    /// Hum RMS relative to the track RMS
    pub level_db: f32,
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

fn db_to_ratio(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn add_hiss(signal: &mut [f32], config: &HissConfig, reference_rms: f32, rng: &mut ChaCha8Rng) {
    let noise_rms = reference_rms / db_to_ratio(config.snr_db);
    let Ok(normal) = Normal::new(0.0, noise_rms as f64) else {
        return;
    };
    for sample in signal.iter_mut() {
        *sample += normal.sample(rng) as f32;
    }
}

fn add_clicks(signal: &mut [f32], config: &ClickConfig, sample_rate: f32, rng: &mut ChaCha8Rng) {
    if config.rate_hz <= 0.0 || sample_rate <= 0.0 {
        return;
    }
    let Ok(gaps) = Exp::new((config.rate_hz / sample_rate) as f64) else {
        return;
    };
    let decay = config.decay_samples.max(0.1);
    let tail = (decay * 8.0).ceil() as usize;

    let mut pos = gaps.sample(rng);
    while (pos as usize) < signal.len() {
        let start = pos as usize;
        let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
        let end = (start + tail).min(signal.len());
        for (i, sample) in signal[start..end].iter_mut().enumerate() {
            *sample += sign * config.amplitude * (-(i as f32) / decay).exp();
        }
        pos += gaps.sample(rng).max(1.0);
    }
}

fn add_hum(
    signal: &mut [f32],
    config: &HumConfig,
    sample_rate: f32,
    reference_rms: f32,
    rng: &mut ChaCha8Rng,
) {
    if config.frequency_hz <= 0.0 || sample_rate <= 0.0 {
        return;
    }
    // fundamental at 1.0 and third at 0.3 have an RMS of sqrt(1.09 / 2)
    let peak = reference_rms * db_to_ratio(config.level_db) / (1.09f32 / 2.0).sqrt();
    let phase = rng.random::<f32>() * std::f32::consts::TAU;
    let step = std::f32::consts::TAU * config.frequency_hz / sample_rate;
    for (i, sample) in signal.iter_mut().enumerate() {
        let t = phase + step * i as f32;
        *sample += peak * (t.sin() + 0.3 * (3.0 * t).sin());
    }
}

/// Apply the configured impairments in place. Levels are relative to the
/// clean track, and the same seed always gives the same result.
pub fn apply_noise(signal: &mut [f32], sample_rate: u32, config: &NoiseConfig) {
    let reference_rms = rms(signal);
    if reference_rms == 0.0 && config.clicks.is_none() {
        return;
    }
    let mut rng = create_rng(config.seed);
    let sample_rate = sample_rate as f32;

    if let Some(hum) = &config.hum {
        add_hum(signal, hum, sample_rate, reference_rms, &mut rng);
    }
    if let Some(hiss) = &config.hiss {
        add_hiss(signal, hiss, reference_rms, &mut rng);
    }
    if let Some(clicks) = &config.clicks {
        add_clicks(signal, clicks, sample_rate, &mut rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(n: usize) -> Vec<f32> {
        (0..n).map(|i| (i as f32 * 0.05).sin()).collect()
    }

    fn residual(noisy: &[f32], clean: &[f32]) -> Vec<f32> {
        noisy.iter().zip(clean).map(|(a, b)| a - b).collect()
    }

    #[test]
    fn test_hiss_snr() {
        let clean = sine(48000);
        let mut noisy = clean.clone();
        apply_noise(&mut noisy, 48000, &NoiseConfig::default().with_seed(7).with_hiss(20.0));

        let snr_db = 20.0 * (rms(&clean) / rms(&residual(&noisy, &clean))).log10();
        assert_abs_diff_eq!(snr_db, 20.0, epsilon = 0.5);
    }

    #[test]
    fn test_hum_level() {
        let clean = sine(48000);
        let mut noisy = clean.clone();
        apply_noise(&mut noisy, 48000, &NoiseConfig::default().with_seed(1).with_hum(50.0, -12.0));

        let level_db = 20.0 * (rms(&residual(&noisy, &clean)) / rms(&clean)).log10();
        assert_abs_diff_eq!(level_db, -12.0, epsilon = 0.2);
    }

    #[test]
    fn test_clicks_decay() {
        let mut silent = vec![0.0; 48000];
        let config = NoiseConfig::default().with_seed(3).with_clicks(10.0, 0.5);
        apply_noise(&mut silent, 48000, &config);

        let peaks = silent.iter().filter(|s| s.abs() >= 0.45).count();
        assert!(peaks > 0);
        assert!(silent.iter().all(|s| s.abs() < 2.0));
        assert!(silent.iter().filter(|&&s| s == 0.0).count() > 47000);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let config = NoiseConfig::default()
            .with_seed(42)
            .with_hiss(10.0)
            .with_clicks(20.0, 0.5)
            .with_hum(60.0, -20.0);
        let mut a = sine(4800);
        let mut b = sine(4800);
        apply_noise(&mut a, 48000, &config);
        apply_noise(&mut b, 48000, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_silence_gets_no_hiss_or_hum() {
        let mut silent = vec![0.0; 100];
        let config = NoiseConfig::default().with_hiss(0.0).with_hum(50.0, 0.0);
        apply_noise(&mut silent, 48000, &config);
        assert!(silent.iter().all(|&s| s == 0.0));
        assert!(!config.is_clean());
        assert!(NoiseConfig::default().is_clean());
    }
}
