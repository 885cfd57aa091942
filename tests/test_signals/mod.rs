#![allow(dead_code)]

use std::sync::Arc;

use beatscope::mesh::{ColourVertex, MemoryBufferId, MemoryDevice};
use beatscope::{
    FreeRunningTransport, PhaseProcessor, SourceHandle, SourceRegistry, SourceShared, Transport,
};

/// Deterministic test signal: no two beats at a common tempo look alike.
pub fn signal_at(time: i64) -> f32 {
    let t = time as f32;
    0.6 * (t * 0.0123).sin() + 0.3 * (t * 0.0711 + 1.0).sin()
}

/// A registered source with its processor prepared at `sample_rate`.
pub struct TestSource {
    pub shared: Arc<SourceShared>,
    pub handle: SourceHandle,
    pub processor: PhaseProcessor,
    pub transport: FreeRunningTransport,
}

impl TestSource {
    pub fn new(registry: &mut SourceRegistry, sample_rate: u32, bpm: f64) -> Self {
        let shared = Arc::new(SourceShared::new(sample_rate, 60.0));
        let handle = registry.add(Arc::clone(&shared));
        let mut processor = PhaseProcessor::new(Arc::clone(&shared));
        processor.prepare(sample_rate as f64);
        Self {
            shared,
            handle,
            processor,
            transport: FreeRunningTransport::new(bpm),
        }
    }

    /// This source as the display's remote.
    pub fn as_remote(&self) -> Option<(SourceHandle, &SourceShared)> {
        Some((self.handle, &*self.shared))
    }

    /// Feed `frames` of [`signal_at`] as a mono block on the running
    /// transport.
    pub fn feed(&mut self, frames: usize) {
        let start = self.transport.position();
        let transport = self.transport.advance(frames);
        self.feed_block(frames, start, Some(transport));
    }

    /// Feed `frames` of `signal_at(time + offset)`.
    pub fn feed_offset(&mut self, frames: usize, offset: i64) {
        let start = self.transport.position() + offset;
        let transport = self.transport.advance(frames);
        self.feed_block(frames, start, Some(transport));
    }

    pub fn feed_block(&mut self, frames: usize, signal_start: i64, transport: Option<Transport>) {
        let mut block: Vec<f32> = (0..frames as i64).map(|i| signal_at(signal_start + i)).collect();
        let mut channels: [&mut [f32]; 1] = [&mut block];
        self.processor.process_block(&mut channels, transport);
    }
}

/// Vertex buffer of each lane drawn since the log was cleared, in draw
/// order. Lanes draw all `num_quads` quads; marker draws are skipped.
pub fn lane_buffers(device: &MemoryDevice, num_quads: usize) -> Vec<MemoryBufferId> {
    device
        .draws()
        .iter()
        .filter(|d| d.base_vertex == 0 && d.quads == (0..num_quads))
        .map(|d| d.vertices)
        .collect()
}

pub fn lane_contents(device: &MemoryDevice, num_quads: usize) -> Vec<Vec<ColourVertex>> {
    lane_buffers(device, num_quads)
        .into_iter()
        .map(|id| device.buffer_vertices(id).unwrap_or_default())
        .collect()
}
