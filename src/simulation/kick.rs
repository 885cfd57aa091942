use std::f32::consts::PI;

/// Shape of a synthetic kick drum: a sine whose pitch falls exponentially
/// from `start_hz` to `end_hz` under an exponential amplitude decay.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct KickConfig {
    pub start_hz: f32,
    pub end_hz: f32,
    /// Pitch sweep time constant in milliseconds
    pub sweep_ms: f32,
    /// Amplitude decay time constant in milliseconds
    pub decay_ms: f32,
    pub amplitude: f32,
}

impl Default for KickConfig {
    fn default() -> Self {
        Self {
            start_hz: 150.0,
            end_hz: 45.0,
            sweep_ms: 40.0,
            decay_ms: 120.0,
            amplitude: 0.8,
        }
    }
}

impl KickConfig {
    /// Kick value `t` seconds after its onset. Zero before the onset.
    pub fn sample_at(&self, t: f32) -> f32 {
        if t < 0.0 {
            return 0.0;
        }
        let sweep = (self.sweep_ms / 1000.0).max(f32::EPSILON);
        let decay = (self.decay_ms / 1000.0).max(f32::EPSILON);
        // integral of end + (start - end) * exp(-t / sweep)
        let cycles =
            self.end_hz * t + (self.start_hz - self.end_hz) * sweep * (1.0 - (-t / sweep).exp());
        self.amplitude * (-t / decay).exp() * (2.0 * PI * cycles).sin()
    }
}

/// Samples between kicks, fractional.
pub fn beat_length(sample_rate: u32, bpm: f32) -> f64 {
    if bpm <= 0.0 {
        return f64::INFINITY;
    }
    sample_rate as f64 * 60.0 / bpm as f64
}

/// A mono track of one kick per beat, with the first kick at
/// `offset_samples`. A negative offset starts inside a kick.
pub fn generate_kick_track(
    duration_secs: f32,
    sample_rate: u32,
    bpm: f32,
    offset_samples: i64,
    kick: &KickConfig,
) -> Vec<f32> {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let beat = beat_length(sample_rate, bpm);

    (0..num_samples)
        .map(|i| {
            let since_onset = i as f64 - offset_samples as f64;
            let in_beat = if beat.is_finite() {
                since_onset.rem_euclid(beat)
            } else {
                since_onset
            };
            kick.sample_at((in_beat / sample_rate as f64) as f32)
        })
        .collect()
}

/// Two kick tracks at the same tempo, the second `offset_samples` later.
pub fn generate_kick_pair(
    duration_secs: f32,
    sample_rate: u32,
    bpm: f32,
    offset_samples: i64,
    kick: &KickConfig,
) -> (Vec<f32>, Vec<f32>) {
    (
        generate_kick_track(duration_secs, sample_rate, bpm, 0, kick),
        generate_kick_track(duration_secs, sample_rate, bpm, offset_samples, kick),
    )
}
