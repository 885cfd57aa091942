/// Modulo that always lands in `[0, modulus)`.
///
/// `modulus` must be non-zero; callers check for an empty buffer first.
#[inline]
pub fn positive_modulo(value: i64, modulus: usize) -> usize {
    debug_assert!(modulus > 0, "positive_modulo by zero");
    value.rem_euclid(modulus as i64) as usize
}

/// Samples in one beat at the given tempo, `ceil(sample_rate * 60 / bpm)`.
///
/// Returns 0 for a non-positive or non-finite tempo.
pub fn samples_per_beat(sample_rate: f64, bpm: f64) -> usize {
    if !bpm.is_finite() || !sample_rate.is_finite() || bpm <= 0.0 || sample_rate <= 0.0 {
        return 0;
    }
    (sample_rate * 60.0 / bpm).ceil() as usize
}

/// Largest number of samples one quad can represent: `ceil(capacity / num_quads)`.
pub fn quad_half_width(capacity: usize, num_quads: usize) -> usize {
    if num_quads == 0 {
        return capacity;
    }
    capacity.div_ceil(num_quads)
}

/// Linear RMS of a block, 0 for an empty block.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_modulo() {
        assert_eq!(positive_modulo(5, 3), 2);
        assert_eq!(positive_modulo(-1, 3), 2);
        assert_eq!(positive_modulo(-3, 3), 0);
        assert_eq!(positive_modulo(-7, 3), 2);
        assert_eq!(positive_modulo(0, 1), 0);
    }

    #[test]
    fn test_samples_per_beat() {
        assert_eq!(samples_per_beat(48000.0, 120.0), 24000);
        assert_eq!(samples_per_beat(44100.0, 100.0), 26460);
        // 48000 * 60 / 97 = 29690.72 -> rounded up
        assert_eq!(samples_per_beat(48000.0, 97.0), 29691);
    }

    #[test]
    fn test_samples_per_beat_invalid_tempo() {
        assert_eq!(samples_per_beat(48000.0, 0.0), 0);
        assert_eq!(samples_per_beat(48000.0, -10.0), 0);
        assert_eq!(samples_per_beat(48000.0, f64::NAN), 0);
        assert_eq!(samples_per_beat(0.0, 120.0), 0);
    }

    #[test]
    fn test_quad_half_width() {
        assert_eq!(quad_half_width(24000, 500), 48);
        assert_eq!(quad_half_width(24001, 500), 49);
        assert_eq!(quad_half_width(10, 500), 1);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[1.0, -1.0, 1.0, -1.0]) - 1.0).abs() < 1e-6);
    }
}
