use std::sync::Arc;

use crate::audio::TestTone;
use crate::beat::Transport;
use crate::constants::DEFAULT_BPM;
use crate::delay::DelayLine;
use crate::source::{ErrorFlags, SourceShared};

/// Audio-callback side of one source.
///
/// Each block is captured into the source's beat buffer (before the delay)
/// and then delayed in place. Nothing here allocates, locks or logs once
/// constructed.
pub struct PhaseProcessor {
    shared: Arc<SourceShared>,
    delay_line: DelayLine,
    sample_rate: f64,
    test_tone: Option<TestTone>,
}

impl PhaseProcessor {
    pub fn new(shared: Arc<SourceShared>) -> Self {
        Self {
            shared,
            delay_line: DelayLine::new(),
            sample_rate: 0.0,
            test_tone: None,
        }
    }

    pub fn shared(&self) -> &Arc<SourceShared> {
        &self.shared
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Reset for a stream starting at `sample_rate`.
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.delay_line.reset();
        self.shared.beat().reset();
        if let Some(tone) = &mut self.test_tone {
            tone.prepare(sample_rate);
        }
    }

    /// Drop delay history when the stream stops.
    pub fn release(&mut self) {
        self.delay_line.reset();
    }

    /// Output latency in samples.
    pub fn latency_samples(&self) -> usize {
        self.delay_line.latency()
    }

    /// Replace the input with a test tone, or stop doing so.
    pub fn set_test_tone(&mut self, tone: Option<TestTone>) {
        self.test_tone = tone.map(|mut tone| {
            if self.sample_rate > 0.0 {
                tone.prepare(self.sample_rate);
            }
            tone
        });
    }

    pub fn test_tone(&self) -> Option<&TestTone> {
        self.test_tone.as_ref()
    }

    /// Process one block in place.
    ///
    /// With no channels the block is left untouched and `NoInputChannels` is
    /// raised. A missing transport or zero tempo skips the capture and raises
    /// `NoPlayheadFound`, but the delay is still applied.
    pub fn process_block(&mut self, channels: &mut [&mut [f32]], transport: Option<Transport>) {
        if channels.is_empty() {
            self.shared.raise(ErrorFlags::NO_INPUT_CHANNELS);
            return;
        }

        if let Some(tone) = &mut self.test_tone {
            tone.fill(channels);
        }

        let params = self.shared.params();
        let beat = self.shared.beat();
        let status = match &*channels {
            [] => return,
            [mono] => beat.capture(&[&**mono], transport, self.sample_rate, params.listen_mode),
            [left, right, ..] => beat.capture(
                &[&**left, &**right],
                transport,
                self.sample_rate,
                params.listen_mode,
            ),
        };
        self.shared.raise(status.into());
        self.shared.record_transport(
            self.sample_rate.round() as u32,
            transport.map_or(0.0, |t| t.bpm),
        );

        self.delay_line
            .process(channels, params.delay, params.invert_phase);
    }
}

/// Transport for standalone use: a fixed tempo and a running sample count.
#[derive(Debug, Clone)]
pub struct FreeRunningTransport {
    bpm: f64,
    position: i64,
}

impl FreeRunningTransport {
    pub fn new(bpm: f64) -> Self {
        Self { bpm, position: 0 }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Transport for the next block of `frames`, advancing the position.
    pub fn advance(&mut self, frames: usize) -> Transport {
        let transport = Transport {
            bpm: self.bpm,
            time_in_samples: self.position,
        };
        self.position += frames as i64;
        transport
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl Default for FreeRunningTransport {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_DELAY;
    use crate::source::ListenMode;

    fn processor() -> PhaseProcessor {
        let mut processor = PhaseProcessor::new(Arc::new(SourceShared::new(48000, 60.0)));
        processor.prepare(48000.0);
        processor
    }

    #[test]
    fn test_no_input_channels() {
        let mut processor = processor();
        let mut channels: [&mut [f32]; 0] = [];
        processor.process_block(&mut channels, None);
        assert!(
            processor
                .shared()
                .take_errors()
                .contains(ErrorFlags::NO_INPUT_CHANNELS)
        );
    }

    #[test]
    fn test_capture_happens_before_delay() {
        let mut processor = processor();
        processor.shared().set_delay(500);
        processor.shared().set_listen_mode(ListenMode::Sum);

        let mut left = vec![1.0; 256];
        let mut right = vec![0.5; 256];
        let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
        let transport = Transport {
            bpm: 120.0,
            time_in_samples: 0,
        };
        processor.process_block(&mut channels, Some(transport));

        let beat = processor.shared().beat();
        assert_eq!(beat.capacity(), 24000);
        assert_eq!(beat.cursor(), 256);
        assert!(beat.to_vec()[..256].iter().all(|&s| s == 0.75));
        // still inside the latency window
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(processor.shared().errors().is_empty());
    }

    #[test]
    fn test_missing_transport_still_delays() {
        let mut processor = processor();
        processor.shared().set_delay(-MAX_DELAY);
        let mut left = vec![0.25; 32];
        let mut channels: [&mut [f32]; 1] = [&mut left];
        processor.process_block(&mut channels, None);

        assert_eq!(left, vec![0.25; 32]);
        assert!(
            processor
                .shared()
                .errors()
                .contains(ErrorFlags::NO_PLAYHEAD_FOUND)
        );
        assert_eq!(processor.shared().beat().cursor(), 0);
    }

    #[test]
    fn test_tone_replaces_input() {
        let mut processor = processor();
        processor.shared().set_delay(-MAX_DELAY);
        processor.set_test_tone(Some(TestTone::new(48000.0)));

        let mut left = vec![9.0; 300];
        let mut right = vec![9.0; 300];
        let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
        let mut transport = FreeRunningTransport::new(120.0);
        processor.process_block(&mut channels, Some(transport.advance(300)));

        assert_eq!(left, right);
        assert!(left.iter().all(|s| s.abs() <= 0.5));
        assert!((left[150] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_free_running_transport() {
        let mut transport = FreeRunningTransport::default();
        assert_eq!(transport.advance(128).time_in_samples, 0);
        let next = transport.advance(128);
        assert_eq!(next.time_in_samples, 128);
        assert_eq!(next.bpm, DEFAULT_BPM);
        assert_eq!(transport.position(), 256);
    }
}
