//! Property-based tests for the sample ring and the incremental display.
//!
//! The display properties drive a local and a remote source at a small
//! sample rate through random sequences of writes, parameter changes and
//! view changes, and compare what reached the device against a display
//! rebuilt from scratch.

mod test_signals;

use beatscope::config::DisplayConfig;
use beatscope::constants::NUM_QUADS;
use beatscope::mesh::{MemoryBufferId, MemoryDevice, VERTICES_PER_QUAD};
use beatscope::ring::SampleRing;
use beatscope::sampler::{LaneInput, ViewMapping};
use beatscope::view::DragMode;
use beatscope::{
    LaneKind, SourceRegistry, SourceShared, ViewController, ViewWindow, WaveformDisplay,
};
use proptest::prelude::*;
use test_signals::{TestSource, lane_contents};

const SAMPLE_RATE: u32 = 4800;
const VIEWPORT_PX: f64 = 1000.0;

#[derive(Debug, Clone)]
enum Op {
    FeedLocal(usize),
    FeedRemote(usize),
    FeedBoth(usize),
    SetDelay { remote: bool, delay: i32 },
    DragDelay { remote: bool, px: f64 },
    ToggleInvert,
    Zoom { delta: f64, pointer: f64 },
    Pan(f64),
    ResetView,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1usize..1200).prop_map(Op::FeedLocal),
        2 => (1usize..1200).prop_map(Op::FeedRemote),
        4 => (1usize..600).prop_map(Op::FeedBoth),
        1 => (any::<bool>(), -3000i32..3000).prop_map(|(remote, delay)| Op::SetDelay { remote, delay }),
        1 => (any::<bool>(), -400.0f64..400.0).prop_map(|(remote, px)| Op::DragDelay { remote, px }),
        1 => Just(Op::ToggleInvert),
        2 => (-4.0f64..4.0, 0.0f64..=1.0).prop_map(|(delta, pointer)| Op::Zoom { delta, pointer }),
        1 => (-600.0f64..600.0).prop_map(Op::Pan),
        1 => Just(Op::ResetView),
    ]
}

struct Rig {
    local: TestSource,
    remote: TestSource,
    view: ViewController,
}

impl Rig {
    fn new() -> Self {
        let mut registry = SourceRegistry::new();
        Self {
            local: TestSource::new(&mut registry, SAMPLE_RATE, 120.0),
            remote: TestSource::new(&mut registry, SAMPLE_RATE, 120.0),
            view: ViewController::new(),
        }
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::FeedLocal(frames) => self.local.feed(frames),
            Op::FeedRemote(frames) => self.remote.feed_offset(frames, -17),
            Op::FeedBoth(frames) => {
                self.local.feed(frames);
                self.remote.feed_offset(frames, -17);
            }
            Op::SetDelay { remote, delay } => self.source(remote).shared.set_delay(delay),
            Op::DragDelay { remote, px } => {
                let mode = if remote {
                    DragMode::RemoteDelay
                } else {
                    DragMode::LocalDelay
                };
                self.view.begin_drag(mode);
                let target: &SourceShared = if remote {
                    &self.remote.shared
                } else {
                    &self.local.shared
                };
                self.view.drag_to(px, VIEWPORT_PX, Some(target));
                self.view.end_drag();
            }
            Op::ToggleInvert => {
                let shared = &self.remote.shared;
                shared.set_invert_phase(!shared.invert_phase());
            }
            Op::Zoom { delta, pointer } => {
                self.view.wheel(delta, pointer);
            }
            Op::Pan(px) => {
                self.view.begin_drag(DragMode::View);
                self.view.drag_to(px, VIEWPORT_PX, None);
                self.view.end_drag();
            }
            Op::ResetView => self.view.reset(),
        }
    }

    fn source(&self, remote: bool) -> &TestSource {
        if remote { &self.remote } else { &self.local }
    }
}

fn new_display() -> WaveformDisplay<MemoryBufferId> {
    let mut display = WaveformDisplay::new(&DisplayConfig::default()).unwrap();
    display.set_viewport_width(VIEWPORT_PX as f32);
    display
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever survives a write reads back unchanged at its absolute index.
    #[test]
    fn ring_round_trip(
        capacity in 1usize..2000,
        start in -1_000_000i64..1_000_000,
        data in prop::collection::vec(-1.0f32..=1.0, 0..3000),
    ) {
        let ring = SampleRing::new(capacity);
        ring.write(start, &data);
        let reader = ring.reader().unwrap();

        let kept = data.len().min(capacity);
        let skip = data.len() - kept;
        for (i, &value) in data.iter().enumerate().skip(skip) {
            prop_assert_eq!(reader.read(start + i as i64), value);
        }
    }

    /// Resizing never lets a reader see stale content or index past storage.
    #[test]
    fn capacity_change_safety(
        max_capacity in 1usize..1500,
        steps in prop::collection::vec((0usize..3000, -50_000i64..50_000, 0usize..2000), 1..12),
    ) {
        let ring = SampleRing::with_storage(max_capacity);
        for (capacity, start, len) in steps {
            let before = ring.capacity();
            let accepted = ring.resize(capacity);
            prop_assert_eq!(accepted, capacity <= max_capacity);
            prop_assert!(ring.capacity() <= ring.max_capacity());
            if accepted && capacity != before {
                prop_assert!(ring.to_vec().iter().all(|&s| s == 0.0));
            }

            ring.write_with(start, len, |i| i as f32);
            if let Some(reader) = ring.reader() {
                prop_assert_eq!(reader.capacity(), ring.capacity());
                for index in [start, start - 1, start + len as i64, i64::from(i32::MIN)] {
                    prop_assert!(reader.read(index).is_finite());
                }
            } else {
                prop_assert_eq!(ring.capacity(), 0);
            }
        }
    }

    /// Interpolation hits stored samples exactly and wraps continuously.
    #[test]
    fn interpolation_exactness(
        data in prop::collection::vec(-1.0f32..=1.0, 1..500),
        index in -5000i64..5000,
        fraction in 0.0f64..1.0,
    ) {
        let ring = SampleRing::new(data.len());
        ring.write(0, &data);
        let reader = ring.reader().unwrap();
        let n = data.len() as i64;

        prop_assert_eq!(reader.sample(index as f64), reader.read(index));
        prop_assert_eq!(reader.sample(-0.5), reader.sample(n as f64 - 0.5));

        let value = reader.sample(index as f64 + fraction);
        let a = reader.read(index);
        let b = reader.read(index + 1);
        prop_assert!(value >= a.min(b) - 1e-6 && value <= a.max(b) + 1e-6);
    }

    /// Incremental uploads leave the device holding exactly what a full
    /// rebuild would draw.
    #[test]
    fn incremental_upload_matches_full_refresh(
        warmup in 0usize..3000,
        ops in prop::collection::vec(op(), 1..24),
    ) {
        let mut rig = Rig::new();
        rig.local.feed(warmup.max(1));
        rig.remote.feed_offset(warmup.max(1), -17);

        let mut display = new_display();
        let mut device = MemoryDevice::new();
        display.update(&rig.local.shared, rig.remote.as_remote(), rig.view.window(), false);
        display.submit(&mut device).unwrap();

        for op in &ops {
            rig.apply(op);
            device.clear_log();
            display.update(&rig.local.shared, rig.remote.as_remote(), rig.view.window(), false);
            display.submit(&mut device).unwrap();

            let mut fresh = new_display();
            let mut fresh_device = MemoryDevice::new();
            fresh.update(&rig.local.shared, rig.remote.as_remote(), rig.view.window(), true);
            fresh.submit(&mut fresh_device).unwrap();

            let incremental = lane_contents(&device, NUM_QUADS);
            let rebuilt = lane_contents(&fresh_device, NUM_QUADS);
            prop_assert_eq!(incremental.len(), 3);
            for (kind, (got, want)) in LaneKind::ALL.iter().zip(incremental.iter().zip(&rebuilt)) {
                prop_assert!(got == want, "{:?} lane differs after {:?}", kind, op);
            }
            fresh.release(&mut fresh_device);
        }
        display.release(&mut device);
    }

    /// Each combined edge is the clamped sum of the delayed, signed sources.
    #[test]
    fn combined_lane_sums_sources(
        local_frames in 1usize..5000,
        remote_frames in 1usize..5000,
        local_delay in -3000i32..3000,
        remote_delay in -3000i32..3000,
        invert in any::<bool>(),
        start in 0.0f64..0.9,
        width in 0.001f64..0.1,
    ) {
        let mut registry = SourceRegistry::new();
        let mut local = TestSource::new(&mut registry, SAMPLE_RATE, 120.0);
        let mut remote = TestSource::new(&mut registry, SAMPLE_RATE, 120.0);
        local.feed(local_frames);
        remote.feed_offset(remote_frames, 311);
        local.shared.set_delay(local_delay);
        remote.shared.set_delay(remote_delay);
        remote.shared.set_invert_phase(invert);

        let window = ViewWindow::new(start, (start + width).min(1.0)).unwrap();
        let mut display = new_display();
        let report = display.update(&local.shared, remote.as_remote(), window, false);
        prop_assert!(report.remote_combined);

        let capacity = local.shared.beat().capacity();
        let mapping = ViewMapping::new(window, capacity, NUM_QUADS).unwrap();
        let local_input = LaneInput::new(local.shared.beat().reader().unwrap(), &local.shared.params());
        let remote_input = LaneInput::new(remote.shared.beat().reader().unwrap(), &remote.shared.params());

        let combined = display.lane_vertices(LaneKind::Combined);
        for (quad, vertices) in combined.chunks_exact(VERTICES_PER_QUAD).enumerate() {
            let position = mapping.edge_position(quad);
            let expected = (local_input.value_at(position) + remote_input.value_at(position)).clamp(-1.0, 1.0);
            prop_assert!(
                (vertices[0].position[1] - expected).abs() <= 1e-6,
                "quad {}: {} vs {}", quad, vertices[0].position[1], expected
            );
        }
    }
}
