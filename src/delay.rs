use crate::constants::{DELAY_LINE_CAPACITY, MAX_DELAY};
use crate::ring::SampleRing;
use crate::source::clamp_delay;

/// Channels the delay line processes. Further channels pass through.
pub const DELAY_CHANNELS: usize = 2;

/// Bounded, invertible delay for up to two channels.
///
/// Input is written at the undelayed position and read back
/// `delay + MAX_DELAY` samples later, so the line has a fixed latency of
/// `MAX_DELAY` samples and a delay of `-MAX_DELAY` passes input straight
/// through.
pub struct DelayLine {
    channels: [SampleRing; DELAY_CHANNELS],
    position: i64,
}

impl DelayLine {
    pub fn new() -> Self {
        Self {
            channels: [
                SampleRing::new(DELAY_LINE_CAPACITY),
                SampleRing::new(DELAY_LINE_CAPACITY),
            ],
            position: 0,
        }
    }

    /// Latency reported to the host, in samples.
    pub fn latency(&self) -> usize {
        MAX_DELAY as usize
    }

    /// Absolute position of the next frame to be written.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Copy `data` into `channel` at absolute position `start`.
    pub fn write(&self, channel: usize, start: i64, data: &[f32]) {
        if let Some(ring) = self.channels.get(channel) {
            ring.write(start, data);
        }
    }

    /// Delayed sample for the frame at absolute `position`.
    ///
    /// Returns `sign * input[position - delay - MAX_DELAY]`. The input must
    /// have been written through `position` and not yet overwritten.
    #[inline]
    pub fn read(&self, channel: usize, position: i64, delay: i32, invert_phase: bool) -> f32 {
        let sign = if invert_phase { -1.0 } else { 1.0 };
        match self.channels.get(channel).and_then(SampleRing::reader) {
            Some(reader) => sign * reader.read(position - delay as i64 - MAX_DELAY as i64),
            None => 0.0,
        }
    }

    /// Delay `channels` in place and advance the write position.
    ///
    /// Long blocks are handled in chunks no longer than the ring can hold
    /// for the current delay, so any block size is processed correctly.
    pub fn process(&mut self, channels: &mut [&mut [f32]], delay: i32, invert_phase: bool) {
        let delay = clamp_delay(delay);
        let Some(frames) = channels.iter().map(|c| c.len()).min() else {
            return;
        };

        // Oldest sample still needed is `delay + MAX_DELAY` behind.
        let max_chunk = (DELAY_LINE_CAPACITY as i64 - delay as i64 - MAX_DELAY as i64).max(1) as usize;

        let mut offset = 0;
        while offset < frames {
            let len = max_chunk.min(frames - offset);
            let start = self.position + offset as i64;
            for (index, data) in channels.iter_mut().take(DELAY_CHANNELS).enumerate() {
                let chunk = &mut data[offset..offset + len];
                self.write(index, start, chunk);
                for (i, sample) in chunk.iter_mut().enumerate() {
                    *sample = self.read(index, start + i as i64, delay, invert_phase);
                }
            }
            offset += len;
        }
        self.position += frames as i64;
    }

    /// Zero the history and restart at position 0.
    pub fn reset(&mut self) {
        for ring in &self.channels {
            ring.clear();
        }
        self.position = 0;
    }
}

impl Default for DelayLine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(delay: i32, invert: bool, block_size: usize, total: usize) -> Vec<f32> {
        let mut line = DelayLine::new();
        let mut input = vec![0.0f32; total];
        input[0] = 1.0;
        let mut output = Vec::with_capacity(total);
        for block in input.chunks(block_size) {
            let mut left = block.to_vec();
            let mut right = block.to_vec();
            let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
            line.process(&mut channels, delay, invert);
            assert_eq!(left, right);
            output.extend_from_slice(&left);
        }
        output
    }

    fn impulse_at(output: &[f32]) -> Option<usize> {
        output.iter().position(|&s| s != 0.0)
    }

    #[test]
    fn test_zero_delay_has_fixed_latency() {
        let output = impulse_response(0, false, 256, 8192);
        assert_eq!(impulse_at(&output), Some(MAX_DELAY as usize));
    }

    #[test]
    fn test_delay_extremes() {
        let output = impulse_response(-MAX_DELAY, false, 256, 8192);
        assert_eq!(impulse_at(&output), Some(0));

        let output = impulse_response(MAX_DELAY, false, 256, 8192);
        assert_eq!(impulse_at(&output), Some(2 * MAX_DELAY as usize));
    }

    #[test]
    fn test_positive_delay_shifts_later() {
        let output = impulse_response(100, false, 64, 8192);
        assert_eq!(impulse_at(&output), Some(MAX_DELAY as usize + 100));
    }

    #[test]
    fn test_invert_phase() {
        let output = impulse_response(-50, true, 128, 8192);
        let at = impulse_at(&output).unwrap();
        assert_eq!(at, MAX_DELAY as usize - 50);
        assert_eq!(output[at], -1.0);
    }

    #[test]
    fn test_block_larger_than_ring() {
        for delay in [-MAX_DELAY, 0, 1234, MAX_DELAY] {
            let output = impulse_response(delay, false, 10_000, 10_000);
            assert_eq!(
                impulse_at(&output),
                Some((delay + MAX_DELAY) as usize),
                "delay {}",
                delay
            );
        }
    }

    #[test]
    fn test_out_of_range_delay_is_clamped() {
        let output = impulse_response(MAX_DELAY + 500, false, 512, 8192);
        assert_eq!(impulse_at(&output), Some(2 * MAX_DELAY as usize));
    }

    #[test]
    fn test_extra_channels_pass_through() {
        let mut line = DelayLine::new();
        let mut left = vec![1.0; 8];
        let mut right = vec![1.0; 8];
        let mut aux = vec![0.5; 8];
        let mut channels: [&mut [f32]; 3] = [&mut left, &mut right, &mut aux];
        line.process(&mut channels, 0, false);
        assert_eq!(aux, vec![0.5; 8]);
        assert_eq!(left, vec![0.0; 8]);
        assert_eq!(line.position(), 8);
    }
}
