use std::f64::consts::{PI, TAU};

/// Test tone frequency in Hz.
pub const TEST_TONE_FREQUENCY: f64 = 80.0;

/// Test tone amplitude.
pub const TEST_TONE_GAIN: f32 = 0.5;

/// Sine generator that can stand in for the input while testing alignment.
///
/// Two tones created with [`in_phase_with`](TestTone::in_phase_with) start
/// at the same angle, so two sources fed by them line up exactly.
#[derive(Debug, Clone)]
pub struct TestTone {
    sample_rate: f64,
    angle: f64,
}

impl TestTone {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            angle: 0.0,
        }
    }

    /// New tone continuing from `other`'s current angle.
    pub fn in_phase_with(other: &TestTone) -> Self {
        other.clone()
    }

    /// Restart at angle 0 for a new sample rate.
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.angle = 0.0;
    }

    /// Current phase in radians, within `(-PI, PI]`.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
    }

    /// Next sample without gain applied.
    pub fn next_sample(&mut self) -> f32 {
        let sample = self.angle.sin() as f32;
        if self.sample_rate > 0.0 {
            self.angle += TEST_TONE_FREQUENCY / self.sample_rate * TAU;
            if self.angle > PI {
                self.angle -= TAU;
            }
        }
        sample
    }

    /// Overwrite the first two channels with the tone at [`TEST_TONE_GAIN`].
    /// Every channel gets the same phase.
    pub fn fill(&mut self, channels: &mut [&mut [f32]]) {
        let start = self.angle;
        for channel in channels.iter_mut().take(2) {
            self.angle = start;
            for sample in channel.iter_mut() {
                *sample = self.next_sample() * TEST_TONE_GAIN;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_period() {
        let mut tone = TestTone::new(48000.0);
        let samples: Vec<f32> = (0..1200).map(|_| tone.next_sample()).collect();
        // 80 Hz at 48 kHz is 600 samples per cycle
        assert!(samples[0].abs() < 1e-6);
        assert!((samples[150] - 1.0).abs() < 1e-4);
        assert!(samples[600].abs() < 1e-3);
        assert!((samples[450] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_angle_stays_wrapped() {
        let mut tone = TestTone::new(1000.0);
        for _ in 0..10_000 {
            tone.next_sample();
            assert!(tone.angle() <= PI && tone.angle() > -PI - 1e-9);
        }
    }

    #[test]
    fn test_fill_channels_share_phase() {
        let mut tone = TestTone::new(48000.0);
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
        tone.fill(&mut channels);
        assert_eq!(left, right);
        assert!(left.iter().all(|s| s.abs() <= TEST_TONE_GAIN));
    }

    #[test]
    fn test_in_phase_with() {
        let mut first = TestTone::new(44100.0);
        for _ in 0..123 {
            first.next_sample();
        }
        let mut second = TestTone::in_phase_with(&first);
        for _ in 0..50 {
            assert_eq!(first.next_sample(), second.next_sample());
        }
    }
}
