use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::AudioSource;
use crate::processor::{FreeRunningTransport, PhaseProcessor};

/// Counters a [`SourcePlayer`] thread publishes.
#[derive(Debug, Default)]
pub struct PlayerStatus {
    frames: AtomicU64,
    finished: AtomicBool,
}

impl PlayerStatus {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Runs an [`AudioSource`] through a [`PhaseProcessor`] on its own thread,
/// standing in for a device callback.
///
/// Blocks are paced to real time unless `realtime` is false, in which case
/// the source is processed as fast as possible.
pub struct SourcePlayer {
    handle: Option<thread::JoinHandle<()>>,
    stop_requested: Arc<AtomicBool>,
    status: Arc<PlayerStatus>,
}

impl SourcePlayer {
    pub fn spawn(
        mut source: Box<dyn AudioSource>,
        mut processor: PhaseProcessor,
        bpm: f64,
        block_frames: usize,
        realtime: bool,
    ) -> Self {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let status = Arc::new(PlayerStatus::default());
        let stop = Arc::clone(&stop_requested);
        let published = Arc::clone(&status);

        let handle = thread::spawn(move || {
            let sample_rate = source.sample_rate();
            processor.prepare(sample_rate as f64);
            let mut transport = FreeRunningTransport::new(bpm);
            let block_frames = block_frames.max(1);
            let mut scratch = [vec![0.0f32; block_frames], vec![0.0f32; block_frames]];
            let channels = source.channels().clamp(1, 2);

            let wall_start = Instant::now();
            let mut expected_time = 0.0_f64;

            while !stop.load(Ordering::Relaxed) {
                let [left, right] = &mut scratch;
                let mut blocks: [&mut [f32]; 2] = [&mut left[..], &mut right[..]];
                let frames = source.read_block(&mut blocks[..channels]);
                if frames == 0 {
                    break;
                }

                let mut blocks: [&mut [f32]; 2] = [&mut left[..frames], &mut right[..frames]];
                processor.process_block(&mut blocks[..channels], Some(transport.advance(frames)));
                published.frames.fetch_add(frames as u64, Ordering::Relaxed);

                if realtime && sample_rate > 0 {
                    expected_time += frames as f64 / sample_rate as f64;
                    let elapsed = wall_start.elapsed().as_secs_f64();
                    if expected_time > elapsed {
                        thread::sleep(Duration::from_secs_f64(expected_time - elapsed));
                    }
                }
            }

            processor.release();
            published.finished.store(true, Ordering::Relaxed);
            log::info!("Source playback stopped after {} frames", published.frames());
        });

        Self {
            handle: Some(handle),
            stop_requested,
            status,
        }
    }

    pub fn status(&self) -> &Arc<PlayerStatus> {
        &self.status
    }

    /// Stop the thread and wait for it.
    pub fn stop(&mut self) {
        self.stop_requested.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Source player thread panicked");
            }
        }
    }
}

impl Drop for SourcePlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
