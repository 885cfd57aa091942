use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::constants::DEFAULT_MIN_BPM;
use crate::math::rms;
use crate::processor::{FreeRunningTransport, PhaseProcessor};
use crate::sampler::LaneInput;
use crate::source::{SourceParams, SourceShared};

/// Lag of `delayed` against `reference` with the highest correlation,
/// searched over `-max_lag..=max_lag`. Positive means `delayed` is late.
pub fn estimate_offset(reference: &[f32], delayed: &[f32], max_lag: usize) -> i64 {
    let max_lag = max_lag as i64;
    let n = reference.len().min(delayed.len()) as i64;
    let mut best = (0, f32::NEG_INFINITY);
    for lag in -max_lag..=max_lag {
        let score: f32 = (0..n)
            .filter_map(|i| {
                let j = i - lag;
                (0..n)
                    .contains(&j)
                    .then(|| delayed[i as usize] * reference[j as usize])
            })
            .sum();
        if score > best.1 {
            best = (lag, score);
        }
    }
    best.0
}

/// Run a mono signal through a fresh source at a fixed tempo and return
/// its shared state, beat buffer filled.
pub fn capture_signal(
    signal: &[f32],
    sample_rate: u32,
    bpm: f64,
    block_frames: usize,
) -> Arc<SourceShared> {
    let shared = Arc::new(SourceShared::new(sample_rate, bpm.min(DEFAULT_MIN_BPM)));
    let mut processor = PhaseProcessor::new(Arc::clone(&shared));
    processor.prepare(sample_rate as f64);
    let mut transport = FreeRunningTransport::new(bpm);
    let mut scratch = vec![0.0f32; block_frames.max(1)];

    for block in signal.chunks(block_frames.max(1)) {
        let out = &mut scratch[..block.len()];
        out.copy_from_slice(block);
        let mut channels: [&mut [f32]; 1] = [out];
        processor.process_block(&mut channels, Some(transport.advance(block.len())));
    }
    shared
}

/// RMS of the combined lane over the whole beat with the given remote
/// parameters, as the scope would draw it.
pub fn combined_rms(local: &SourceShared, remote: &SourceShared, remote_params: SourceParams) -> f32 {
    let (Some(local_reader), Some(remote_reader)) = (local.beat().reader(), remote.beat().reader())
    else {
        return 0.0;
    };
    let inputs = [
        LaneInput::new(local_reader, &local.params()),
        LaneInput::new(remote_reader, &remote_params),
    ];
    let values: Vec<f32> = (0..local_reader.capacity())
        .map(|p| inputs.iter().map(|input| input.value_at(p as f64)).sum())
        .collect();
    rms(&values)
}

/// Result of [`find_cancelling_delay`].
#[derive(Debug, Clone, Copy)]
pub struct Alignment {
    pub delay: i32,
    pub residual_rms: f32,
}

/// Remote delay in `search` that best cancels the local signal when the
/// remote is inverted, the way a user would line up two kicks by ear.
pub fn find_cancelling_delay(
    local: &SourceShared,
    remote: &SourceShared,
    search: RangeInclusive<i32>,
) -> Alignment {
    let mut best = Alignment {
        delay: 0,
        residual_rms: f32::INFINITY,
    };
    for delay in search {
        let params = SourceParams {
            delay,
            invert_phase: true,
            listen_mode: remote.listen_mode(),
        };
        let residual_rms = combined_rms(local, remote, params);
        if residual_rms < best.residual_rms {
            best = Alignment {
                delay,
                residual_rms,
            };
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{KickConfig, generate_kick_pair};

    #[test]
    fn test_estimate_offset() {
        let (a, b) = generate_kick_pair(0.2, 48000, 120.0, 37, &KickConfig::default());
        assert_eq!(estimate_offset(&a, &b, 100), 37);
        assert_eq!(estimate_offset(&b, &a, 100), -37);
    }

    #[test]
    fn test_cancelling_delay_undoes_offset() {
        let (a, b) = generate_kick_pair(1.0, 48000, 120.0, 40, &KickConfig::default());
        let local = capture_signal(&a, 48000, 120.0, 512);
        let remote = capture_signal(&b, 48000, 120.0, 512);
        assert_eq!(local.beat().capacity(), 24000);

        let alignment = find_cancelling_delay(&local, &remote, -60..=60);
        assert_eq!(alignment.delay, -40);
        assert!(alignment.residual_rms < 1e-3);
    }
}
