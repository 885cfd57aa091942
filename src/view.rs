//! Pointer interaction with the waveform view: wheel zoom, drag to pan, and
//! modifier-drag to nudge a source's delay.

use crate::constants::{DEFAULT_ZOOM_SPEED, MAX_ZOOM_LEVEL, MIN_ZOOM_LEVEL};
use crate::sampler::ViewWindow;
use crate::source::{SourceShared, clamp_delay};

/// Narrowest view, as a fraction of the beat. A zoom level of 1 would
/// otherwise give an empty window.
pub const MIN_VIEW_WIDTH: f64 = 1e-6;

/// What a drag does, chosen from the modifiers held when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    /// Pan the view.
    View,
    /// Shift-drag: adjust the local source's delay.
    LocalDelay,
    /// Alt-drag: adjust the remote source's delay.
    RemoteDelay,
}

impl DragMode {
    pub fn from_modifiers(shift: bool, alt: bool) -> Self {
        if shift {
            DragMode::LocalDelay
        } else if alt {
            DragMode::RemoteDelay
        } else {
            DragMode::View
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    mode: DragMode,
    view_start: f64,
    /// Delay change already applied by this drag.
    applied_samples: i32,
}

/// View window and zoom state driven by pointer events.
#[derive(Debug, Clone)]
pub struct ViewController {
    window: ViewWindow,
    zoom_level: f64,
    zoom_speed: f64,
    min_zoom: f64,
    max_zoom: f64,
    drag: Option<DragState>,
}

impl ViewController {
    pub fn new() -> Self {
        Self::with_zoom(DEFAULT_ZOOM_SPEED, MIN_ZOOM_LEVEL, MAX_ZOOM_LEVEL)
    }

    /// Controller with custom zoom step and bounds. Bounds are sorted and
    /// kept within `[0, 1]`.
    pub fn with_zoom(zoom_speed: f64, min_zoom: f64, max_zoom: f64) -> Self {
        let lo = min_zoom.clamp(0.0, 1.0);
        let hi = max_zoom.clamp(0.0, 1.0);
        Self {
            window: ViewWindow::FULL,
            zoom_level: 0.0,
            zoom_speed,
            min_zoom: lo.min(hi),
            max_zoom: lo.max(hi),
            drag: None,
        }
    }

    pub fn window(&self) -> ViewWindow {
        self.window
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    pub fn drag_mode(&self) -> Option<DragMode> {
        self.drag.map(|d| d.mode)
    }

    /// Back to the whole beat.
    pub fn reset(&mut self) {
        self.window = ViewWindow::FULL;
        self.zoom_level = 0.0;
        self.drag = None;
    }

    /// View width for a zoom level.
    pub fn width_for_zoom(zoom_level: f64) -> f64 {
        (1.0 - zoom_level).powi(3).max(MIN_VIEW_WIDTH)
    }

    /// Zoom by `delta` wheel steps about the pointer at `pointer_fraction`
    /// across the view. Ignored while dragging. Returns whether the window
    /// changed.
    pub fn wheel(&mut self, delta: f64, pointer_fraction: f64) -> bool {
        if self.drag.is_some() || !delta.is_finite() {
            return false;
        }
        let zoom = (self.zoom_level + delta * self.zoom_speed).clamp(self.min_zoom, self.max_zoom);
        if zoom == self.zoom_level {
            return false;
        }
        self.zoom_level = zoom;

        let pointer = if pointer_fraction.is_finite() {
            pointer_fraction.clamp(0.0, 1.0)
        } else {
            0.5
        };
        let focus = self.window.ratio_at(pointer);
        let width = Self::width_for_zoom(zoom);

        let mut start = focus - pointer * width;
        let mut end = start + width;
        if start < 0.0 {
            end -= start;
            start = 0.0;
        } else if end > 1.0 {
            start -= end - 1.0;
            end = 1.0;
        }
        self.set_window(start, end);
        true
    }

    /// Start a drag.
    pub fn begin_drag(&mut self, mode: DragMode) {
        self.drag = Some(DragState {
            mode,
            view_start: self.window.start(),
            applied_samples: 0,
        });
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Drag distance as a ratio of the beat.
    pub fn drag_ratio(&self, distance_px: f64, view_width_px: f64) -> f64 {
        if view_width_px <= 0.0 || !distance_px.is_finite() {
            return 0.0;
        }
        distance_px * self.window.width() / view_width_px
    }

    /// Update an active drag that has moved `distance_px` from where it
    /// started.
    ///
    /// A view drag pans the window. A delay drag changes `target`'s delay
    /// by however much the drag grew since the last call, so a delay set
    /// elsewhere mid-drag is kept. Returns the new delay for delay drags.
    pub fn drag_to(
        &mut self,
        distance_px: f64,
        view_width_px: f64,
        target: Option<&SourceShared>,
    ) -> Option<i32> {
        let ratio = self.drag_ratio(distance_px, view_width_px);
        let drag = self.drag.as_mut()?;
        match drag.mode {
            DragMode::View => {
                let width = self.window.width();
                let start = (drag.view_start - ratio).clamp(0.0, 1.0 - width);
                self.set_window(start, start + width);
                None
            }
            DragMode::LocalDelay | DragMode::RemoteDelay => {
                let target = target?;
                let capacity = target.beat().capacity() as f64;
                let samples = (ratio * capacity)
                    .round()
                    .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                let delay = clamp_delay(
                    target
                        .delay()
                        .saturating_add(samples.saturating_sub(drag.applied_samples)),
                );
                target.set_delay(delay);
                drag.applied_samples = samples;
                Some(delay)
            }
        }
    }

    fn set_window(&mut self, start: f64, end: f64) {
        let start = start.clamp(0.0, 1.0);
        let end = end.clamp(0.0, 1.0);
        let window = ViewWindow::new(start, end)
            .or_else(|| ViewWindow::new((end - MIN_VIEW_WIDTH).max(0.0), end))
            .or_else(|| ViewWindow::new(start, (start + MIN_VIEW_WIDTH).min(1.0)));
        if let Some(window) = window {
            self.window = window;
        }
    }
}

impl Default for ViewController {
    fn default() -> Self {
        Self::new()
    }
}
