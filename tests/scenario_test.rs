use approx::assert_abs_diff_eq;
use beatscope::beat::BeatCaptureBuffer;
use beatscope::constants::{MAX_DELAY, NUM_QUADS};
use beatscope::math::quad_half_width;
use beatscope::sampler::ViewMapping;
use beatscope::source::{ListenMode, SourceParams};
use beatscope::tracker::{SampleChange, SourceCache, changed_samples, dirty_quads};
use beatscope::view::DragMode;
use beatscope::{SourceShared, Transport, ViewController, ViewWindow};

#[test]
fn test_capacity_and_wrapped_write() {
    let beat = BeatCaptureBuffer::for_limits(48000, 60.0);
    let block: Vec<f32> = (0..512).map(|i| i as f32 + 1.0).collect();

    let transport = Transport {
        bpm: 120.0,
        time_in_samples: 23800,
    };
    beat.capture(&[&block[..]], Some(transport), 48000.0, ListenMode::Sum);

    assert_eq!(beat.capacity(), 24000);
    assert_eq!(beat.cursor(), 312);
    let contents = beat.to_vec();
    assert_eq!(&contents[23800..24000], &block[..200]);
    assert_eq!(&contents[..312], &block[200..]);
    assert!(contents[312..23800].iter().all(|&s| s == 0.0));
}

#[test]
fn test_full_view_scale() {
    let mapping = ViewMapping::new(ViewWindow::FULL, 24000, NUM_QUADS).unwrap();
    assert_abs_diff_eq!(mapping.scale, 48.0);
    assert_abs_diff_eq!(mapping.edge_position(0), 0.0);
    assert_abs_diff_eq!(mapping.edge_position(1), 48.0);
    assert_abs_diff_eq!(mapping.edge_position(NUM_QUADS), 24000.0);
}

fn cache_after(source: &SourceShared) -> SourceCache {
    SourceCache::capture(source)
}

#[test]
fn test_delay_change_and_small_advance() {
    let source = SourceShared::new(48000, 60.0);
    let block = vec![0.1f32; 512];
    source.beat().capture(
        &[&block[..]],
        Some(Transport {
            bpm: 120.0,
            time_in_samples: 0,
        }),
        48000.0,
        ListenMode::Sum,
    );
    let mapping = ViewMapping::new(ViewWindow::FULL, 24000, NUM_QUADS).unwrap();
    let before = cache_after(&source);

    source.set_delay(100);
    let delayed = cache_after(&source);
    assert!(dirty_quads(&before, &delayed, &mapping).is_full());

    source.beat().capture(
        &[&block[..10]],
        Some(Transport {
            bpm: 120.0,
            time_in_samples: 512,
        }),
        48000.0,
        ListenMode::Sum,
    );
    let advanced = cache_after(&source);
    let half_width = quad_half_width(24000, NUM_QUADS);
    match changed_samples(&delayed, &advanced, NUM_QUADS) {
        SampleChange::Range { start, end } => {
            assert_eq!(start, 512 + 100 - half_width);
            assert_eq!(end - start, 10 + 2 * half_width);
        }
        other => panic!("expected a range, got {:?}", other),
    }
    let dirty = dirty_quads(&delayed, &advanced, &mapping);
    assert!(!dirty.is_full() && !dirty.is_clean());
    assert!(dirty.quad_count(NUM_QUADS) <= 8);
}

#[test]
fn test_drag_at_half_width_clamps_delay() {
    let mut view = ViewController::new();
    // (1 - zoom)^3 = 0.5
    let zoom = 1.0 - 0.5f64.cbrt();
    view.wheel(zoom / 0.1, 0.5);
    assert_abs_diff_eq!(view.window().width(), 0.5, epsilon = 1e-9);

    let ratio = view.drag_ratio(100.0, 420.0);
    assert_abs_diff_eq!(ratio, 0.119, epsilon = 1e-3);
    assert_eq!((ratio * 24000.0).round() as i32, 2857);

    let source = SourceShared::new(48000, 60.0);
    assert!(source.beat().reconfigure(120.0, 48000.0));
    view.begin_drag(DragMode::LocalDelay);
    assert_eq!(view.drag_to(100.0, 420.0, Some(&source)), Some(MAX_DELAY));
    assert_eq!(source.delay(), MAX_DELAY);
}

#[test]
fn test_wheel_zoom_step() {
    let mut view = ViewController::new();
    assert!(view.wheel(1.0, 0.5));
    assert_abs_diff_eq!(view.zoom_level(), 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(view.window().width(), 0.729, epsilon = 1e-9);
    assert!(view.window().start() >= 0.0 && view.window().end() <= 1.0);
    // centred on the pointer at the middle of the beat
    assert_abs_diff_eq!(view.window().ratio_at(0.5), 0.5, epsilon = 1e-9);
}

#[test]
fn test_params_default() {
    let params = SourceParams::default();
    assert_eq!(params.delay, 0);
    assert!(!params.invert_phase);
    assert_eq!(params.listen_mode, ListenMode::Left);
}
