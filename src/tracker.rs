//! Works out which waveform quads went stale between two frames.
//!
//! The render thread keeps the cursor and parameters it last drew from.
//! Samples written since then sit between the old and the new cursor; in
//! view space they are shifted by the delay and widened by half a quad on
//! each side. Anything that invalidates the whole mapping (a parameter,
//! capacity, generation or view change, a backwards or oversized jump)
//! escalates to a full refresh.

use std::ops::RangeInclusive;

use crate::beat::BeatSnapshot;
use crate::math::{positive_modulo, quad_half_width};
use crate::sampler::ViewMapping;
use crate::source::{SourceParams, SourceShared};

/// Quads that need rebuilding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyQuads {
    Clean,
    Full,
    /// `first..=last`.
    Span { first: usize, last: usize },
    /// `0..=head_last` and `tail_first..=num_quads - 1`, for a change that
    /// wraps around the edges of the view.
    Flanks { head_last: usize, tail_first: usize },
}

impl DirtyQuads {
    pub fn is_clean(&self) -> bool {
        matches!(self, DirtyQuads::Clean)
    }

    pub fn is_full(&self) -> bool {
        matches!(self, DirtyQuads::Full)
    }

    /// Up to two inclusive quad ranges, clipped to `num_quads`.
    pub fn ranges(self, num_quads: usize) -> [Option<RangeInclusive<usize>>; 2] {
        let Some(last_quad) = num_quads.checked_sub(1) else {
            return [None, None];
        };
        let clip = |first: usize, last: usize| {
            let last = last.min(last_quad);
            (first <= last).then_some(first..=last)
        };
        match self {
            DirtyQuads::Clean => [None, None],
            DirtyQuads::Full => [Some(0..=last_quad), None],
            DirtyQuads::Span { first, last } => [clip(first, last), None],
            DirtyQuads::Flanks {
                head_last,
                tail_first,
            } => [clip(0, head_last), clip(tail_first, last_quad)],
        }
    }

    /// Number of quads selected.
    pub fn quad_count(self, num_quads: usize) -> usize {
        self.ranges(num_quads)
            .into_iter()
            .flatten()
            .map(|r| r.end() + 1 - r.start())
            .sum()
    }

    /// Smallest description covering both `self` and `other`.
    pub fn union(self, other: DirtyQuads, num_quads: usize) -> DirtyQuads {
        if self.is_full() || other.is_full() {
            return DirtyQuads::Full;
        }
        let mut intervals: Vec<(usize, usize)> = self
            .ranges(num_quads)
            .into_iter()
            .chain(other.ranges(num_quads))
            .flatten()
            .map(|r| (*r.start(), *r.end()))
            .collect();
        Self::from_intervals(&mut intervals, num_quads)
    }

    /// Normalise a set of inclusive intervals within `[0, num_quads)`.
    ///
    /// Anything that is not one span or two edge flanks is widened to the
    /// bounding span.
    fn from_intervals(intervals: &mut [(usize, usize)], num_quads: usize) -> DirtyQuads {
        let Some(last_quad) = num_quads.checked_sub(1) else {
            return DirtyQuads::Clean;
        };
        intervals.sort_unstable();

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(intervals.len());
        for &(first, last) in intervals.iter() {
            match merged.last_mut() {
                Some(prev) if first <= prev.1 + 1 => prev.1 = prev.1.max(last),
                _ => merged.push((first, last)),
            }
        }

        let span = |first: usize, last: usize| {
            if first == 0 && last >= last_quad {
                DirtyQuads::Full
            } else {
                DirtyQuads::Span {
                    first,
                    last: last.min(last_quad),
                }
            }
        };

        match merged.as_slice() {
            [] => DirtyQuads::Clean,
            [(first, last)] => span(*first, *last),
            [(0, head_last), (tail_first, tail_last)] if *tail_last >= last_quad => {
                DirtyQuads::Flanks {
                    head_last: *head_last,
                    tail_first: *tail_first,
                }
            }
            [(first, _), .., (_, last)] => span(*first, *last),
        }
    }
}

/// What the renderer last drew a source from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCache {
    pub beat: BeatSnapshot,
    pub params: SourceParams,
}

impl SourceCache {
    pub fn capture(source: &SourceShared) -> Self {
        Self {
            beat: source.beat().snapshot(),
            params: source.params(),
        }
    }
}

/// Samples changed between two caches, in view space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleChange {
    Unchanged,
    Full,
    /// Inclusive, wrapped: `start > end` means the range wraps past the end
    /// of the buffer.
    Range { start: usize, end: usize },
}

/// Changed view-space samples between `prev` and `next`, widened by half a
/// quad on each side.
pub fn changed_samples(prev: &SourceCache, next: &SourceCache, num_quads: usize) -> SampleChange {
    if prev.params != next.params {
        return SampleChange::Full;
    }
    let (before, after) = (&prev.beat, &next.beat);
    if before.generation != after.generation || before.capacity != after.capacity {
        return SampleChange::Full;
    }

    let capacity = after.capacity;
    if capacity == 0 {
        return SampleChange::Unchanged;
    }

    let advance = after.head - before.head;
    if advance < 0 {
        return SampleChange::Full;
    }
    if advance == 0 {
        return if before.cursor == after.cursor {
            SampleChange::Unchanged
        } else {
            SampleChange::Full
        };
    }

    let half_width = quad_half_width(capacity, num_quads) as i64;
    if advance + 2 * half_width + 2 >= capacity as i64 {
        return SampleChange::Full;
    }

    let delay = next.params.delay as i64;
    SampleChange::Range {
        start: positive_modulo(before.cursor as i64 + delay - half_width, capacity),
        end: positive_modulo(after.cursor as i64 + delay + half_width, capacity),
    }
}

/// Quads whose vertices read any view position in `start..=end`.
///
/// A vertex at position `p` reads `floor(p)` and `floor(p) + 1`, so each
/// range is widened by one sample before mapping; the quad range then gets
/// one more quad of margin on each side. A view reaching the end of the
/// buffer also reads slots `0` and `1` again at positions `capacity` and
/// `capacity + 1`, so a range starting there is tested again shifted by one
/// capacity.
pub fn quads_for_samples(start: usize, end: usize, mapping: &ViewMapping) -> DirtyQuads {
    let capacity = mapping.capacity;
    let num_quads = mapping.num_quads;
    if capacity == 0 || num_quads == 0 || start >= capacity || end >= capacity {
        return DirtyQuads::Full;
    }

    let pieces = if start <= end {
        [Some((start, end)), None]
    } else {
        [Some((start, capacity - 1)), Some((0, end))]
    };

    let last_quad = num_quads as i64 - 1;
    let view_start = mapping.view_start as f64;
    let mut intervals = Vec::with_capacity(4);
    let mut push = |first: i64, last: i64| {
        if last >= 0 && first <= last_quad {
            intervals.push((first.max(0) as usize, last.min(last_quad) as usize));
        }
    };
    for (a, b) in pieces.into_iter().flatten() {
        let (a, b) = (a as f64, b as f64);
        push(
            ((a - 1.0 - view_start) / mapping.scale).floor() as i64 - 2,
            ((b + 1.0 - view_start) / mapping.scale).ceil() as i64,
        );

        // only the first two slots can alias past the last edge
        let (a, b) = (a + capacity as f64, b + capacity as f64);
        if a <= (mapping.view_end + 1) as f64 {
            push(
                ((a - 1.0 - view_start) / mapping.scale).floor() as i64 - 1,
                ((b + 1.0 - view_start) / mapping.scale).ceil() as i64,
            );
        }
    }

    DirtyQuads::from_intervals(&mut intervals, num_quads)
}

/// Dirty quads between two caches drawn with the same mapping.
pub fn dirty_quads(prev: &SourceCache, next: &SourceCache, mapping: &ViewMapping) -> DirtyQuads {
    if next.beat.capacity != mapping.capacity {
        return DirtyQuads::Full;
    }
    match changed_samples(prev, next, mapping.num_quads) {
        SampleChange::Unchanged => DirtyQuads::Clean,
        SampleChange::Full => DirtyQuads::Full,
        SampleChange::Range { start, end } => quads_for_samples(start, end, mapping),
    }
}

/// Per-lane memory of the last frame.
#[derive(Debug, Clone, Default)]
pub struct SourceChangeTracker {
    prev: Option<SourceCache>,
    mapping: Option<ViewMapping>,
}

impl SourceChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the last frame so the next update is a full refresh.
    pub fn reset(&mut self) {
        self.prev = None;
        self.mapping = None;
    }

    pub fn cache(&self) -> Option<&SourceCache> {
        self.prev.as_ref()
    }

    /// Dirty quads for drawing `next` with `mapping`, then remember both.
    ///
    /// The first frame, `force`, and a changed mapping all give a full
    /// refresh.
    pub fn update(&mut self, next: SourceCache, mapping: &ViewMapping, force: bool) -> DirtyQuads {
        let dirty = match (&self.prev, &self.mapping) {
            (Some(prev), Some(last)) if !force && last == mapping => {
                dirty_quads(prev, &next, mapping)
            }
            _ => DirtyQuads::Full,
        };
        self.prev = Some(next);
        self.mapping = Some(*mapping);
        dirty
    }
}
