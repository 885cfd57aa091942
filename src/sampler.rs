//! Turns a view window over a beat buffer into waveform quads.
//!
//! Quad `i` of a lane spans view positions `view_start + i * scale` to
//! `view_start + (i + 1) * scale`. Each edge is an interpolated sample read
//! through the source's delay, and adjacent quads share their edge value so
//! the outline has no seams. Every edge is computed by the same expression
//! whether the whole lane or a few quads are rebuilt, so a partial update
//! produces exactly the vertices a full rebuild would.

use std::ops::RangeInclusive;

use crate::constants::WAVEFORM_DEPTH;
use crate::mesh::{ColourVertex, QuadMesh};
use crate::ring::RingReader;
use crate::source::SourceParams;
use crate::tracker::DirtyQuads;

/// Visible part of the beat as a ratio range within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewWindow {
    start: f64,
    end: f64,
}

impl ViewWindow {
    pub const FULL: ViewWindow = ViewWindow {
        start: 0.0,
        end: 1.0,
    };

    /// Window from `start` to `end`, or `None` unless
    /// `0 <= start < end <= 1`.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        (start.is_finite() && end.is_finite() && 0.0 <= start && start < end && end <= 1.0)
            .then_some(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    /// Ratio within the beat for a ratio across the window.
    pub fn ratio_at(&self, fraction: f64) -> f64 {
        self.start + fraction * self.width()
    }
}

impl Default for ViewWindow {
    fn default() -> Self {
        Self::FULL
    }
}

/// A view window resolved against a buffer capacity and quad count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMapping {
    /// `floor(start * capacity)`.
    pub view_start: i64,
    /// `ceil(end * capacity)`.
    pub view_end: i64,
    /// Samples per quad.
    pub scale: f64,
    pub capacity: usize,
    pub num_quads: usize,
}

impl ViewMapping {
    /// `None` for an empty buffer, no quads, or a window that covers no
    /// samples.
    pub fn new(window: ViewWindow, capacity: usize, num_quads: usize) -> Option<Self> {
        if capacity == 0 || num_quads == 0 {
            return None;
        }
        let view_start = (window.start * capacity as f64).floor() as i64;
        let view_end = (window.end * capacity as f64).ceil() as i64;
        if view_end <= view_start {
            return None;
        }
        Some(Self {
            view_start,
            view_end,
            scale: (view_end - view_start) as f64 / num_quads as f64,
            capacity,
            num_quads,
        })
    }

    /// View position of quad edge `edge` (edge `i` is the left side of quad
    /// `i`, edge `num_quads` the right side of the last quad).
    #[inline]
    pub fn edge_position(&self, edge: usize) -> f64 {
        self.view_start as f64 + edge as f64 * self.scale
    }
}

/// Horizontal clip-space coordinate of quad edge `edge`.
#[inline]
pub fn edge_x(edge: usize, num_quads: usize) -> f32 {
    -1.0 + edge as f32 * (2.0 / num_quads as f32)
}

/// One signal contributing to a lane.
#[derive(Clone, Copy)]
pub struct LaneInput<'a> {
    pub reader: RingReader<'a>,
    pub delay: i32,
    pub sign: f32,
}

impl<'a> LaneInput<'a> {
    pub fn new(reader: RingReader<'a>, params: &SourceParams) -> Self {
        Self {
            reader,
            delay: params.delay,
            sign: params.sign(),
        }
    }

    /// Signed sample shown at view `position`.
    #[inline]
    pub fn value_at(&self, position: f64) -> f32 {
        self.sign * self.reader.sample(position - self.delay as f64)
    }
}

/// Sum of every input at view `position`.
#[inline]
pub fn combined_value_at(inputs: &[LaneInput<'_>], position: f64) -> f32 {
    inputs.iter().map(|input| input.value_at(position)).sum()
}

/// Vertical bar from 0 to each edge height, clamped to `[-1, 1]`.
///
/// Vertices are top-left, top-right, bottom-right, bottom-left.
pub fn waveform_quad(
    index: usize,
    num_quads: usize,
    start_height: f32,
    end_height: f32,
    colour: [f32; 4],
) -> [ColourVertex; 4] {
    let x0 = edge_x(index, num_quads);
    let x1 = edge_x(index + 1, num_quads);
    [
        ColourVertex::new(x0, start_height.clamp(-1.0, 1.0), WAVEFORM_DEPTH, colour),
        ColourVertex::new(x1, end_height.clamp(-1.0, 1.0), WAVEFORM_DEPTH, colour),
        ColourVertex::new(x1, 0.0, WAVEFORM_DEPTH, colour),
        ColourVertex::new(x0, 0.0, WAVEFORM_DEPTH, colour),
    ]
}

/// Rebuild `quads` of `mesh` from the summed `inputs`.
///
/// With one input this is a single source lane; with several it is the
/// combined lane. Quads outside the mesh are skipped.
pub fn sample_quads<B>(
    inputs: &[LaneInput<'_>],
    mapping: &ViewMapping,
    quads: RangeInclusive<usize>,
    colour: [f32; 4],
    mesh: &mut QuadMesh<ColourVertex, B>,
) {
    let num_quads = mapping.num_quads.min(mesh.capacity());
    let first = *quads.start();
    let last = (*quads.end()).min(num_quads.saturating_sub(1));
    if num_quads == 0 || first > last {
        return;
    }

    let mut start = combined_value_at(inputs, mapping.edge_position(first));
    for index in first..=last {
        let end = combined_value_at(inputs, mapping.edge_position(index + 1));
        mesh.set_quad(index, waveform_quad(index, mapping.num_quads, start, end, colour));
        start = end;
    }
}

/// Rebuild the quads selected by `dirty`. Returns how many were rebuilt.
pub fn sample_dirty<B>(
    inputs: &[LaneInput<'_>],
    mapping: &ViewMapping,
    dirty: DirtyQuads,
    colour: [f32; 4],
    mesh: &mut QuadMesh<ColourVertex, B>,
) -> usize {
    let mut rebuilt = 0;
    for range in dirty.ranges(mapping.num_quads).into_iter().flatten() {
        rebuilt += range.end() + 1 - range.start();
        sample_quads(inputs, mapping, range, colour, mesh);
    }
    rebuilt
}

/// Quads of a combined lane that went stale, given the dirty quads of each
/// contributing source under the same mapping.
pub fn combined_dirty_quads(dirty: &[DirtyQuads], num_quads: usize) -> DirtyQuads {
    dirty
        .iter()
        .fold(DirtyQuads::Clean, |acc, &d| acc.union(d, num_quads))
}

/// Set every quad of `mesh` to a zero-height bar.
pub fn flatten<B>(mesh: &mut QuadMesh<ColourVertex, B>, colour: [f32; 4]) {
    let num_quads = mesh.capacity();
    for index in 0..num_quads {
        mesh.set_quad(index, waveform_quad(index, num_quads, 0.0, 0.0, colour));
    }
}
