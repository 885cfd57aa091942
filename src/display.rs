//! The waveform display: one lane per source plus a combined lane, and the
//! beat division markers.
//!
//! A frame is two steps. [`WaveformDisplay::update`] reads the sources and
//! rebuilds stale quads in CPU-side meshes; it needs no graphics context.
//! [`WaveformDisplay::submit`] then uploads what changed and issues the
//! draws on a [`GpuDevice`].

use crate::config::DisplayConfig;
use crate::constants::{MARKER_DEPTH, NUM_BEAT_MARKERS};
use crate::error::Result;
use crate::mesh::{ColourVertex, GpuDevice, QuadMesh, TransientMesh};
use crate::registry::SourceHandle;
use crate::ring::RingReader;
use crate::sampler::{
    LaneInput, ViewMapping, ViewWindow, combined_dirty_quads, flatten, sample_dirty,
};
use crate::source::{SourceParams, SourceShared};
use crate::tracker::{DirtyQuads, SourceCache, SourceChangeTracker};

/// Quads the marker stream holds before it is orphaned.
const MARKER_STREAM_QUADS: usize = NUM_BEAT_MARKERS * 16;

/// The three waveform lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneKind {
    Local,
    Remote,
    /// Sum of local and remote, drawn only while a remote is attached.
    Combined,
}

impl LaneKind {
    pub const ALL: [LaneKind; 3] = [LaneKind::Local, LaneKind::Remote, LaneKind::Combined];
}

/// What one [`WaveformDisplay::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub local: DirtyQuads,
    /// `None` while no remote is attached.
    pub remote: Option<DirtyQuads>,
    pub combined: Option<DirtyQuads>,
    /// Whether the remote contributes to the combined lane this frame.
    pub remote_combined: bool,
    pub quads_rebuilt: usize,
    pub markers: usize,
}

/// What one [`WaveformDisplay::submit`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    pub bytes_uploaded: usize,
    pub lanes_drawn: usize,
}

struct Lane<B> {
    mesh: QuadMesh<ColourVertex, B>,
    tracker: SourceChangeTracker,
    colour: [f32; 4],
    visible: bool,
    /// Mesh holds a flat line from an empty buffer.
    flat: bool,
}

impl<B> Lane<B> {
    fn new(num_quads: usize, colour: [f32; 4]) -> Result<Self> {
        let mut mesh = QuadMesh::new(num_quads)?;
        flatten(&mut mesh, colour);
        Ok(Self {
            mesh,
            tracker: SourceChangeTracker::new(),
            colour,
            visible: false,
            flat: true,
        })
    }

    /// Show a flat line. Returns the dirty quads this caused.
    fn flatten(&mut self) -> DirtyQuads {
        self.tracker.reset();
        if self.flat {
            return DirtyQuads::Clean;
        }
        flatten(&mut self.mesh, self.colour);
        self.flat = true;
        DirtyQuads::Full
    }

    fn hide(&mut self) {
        self.visible = false;
        self.tracker.reset();
    }
}

/// A source resolved for this frame.
struct Resolved<'a> {
    reader: RingReader<'a>,
    params: SourceParams,
    mapping: ViewMapping,
}

/// CPU-side lane meshes and their device buffers.
pub struct WaveformDisplay<B> {
    num_quads: usize,
    local: Lane<B>,
    remote: Lane<B>,
    combined: Lane<B>,
    markers: TransientMesh<ColourVertex, B>,
    marker_colour: [f32; 4],
    marker_width_px: f32,
    viewport_width_px: f32,
    remote_handle: Option<SourceHandle>,
    remote_combined: bool,
}

impl<B> WaveformDisplay<B> {
    pub fn new(config: &DisplayConfig) -> Result<Self> {
        Ok(Self {
            num_quads: config.num_quads,
            local: Lane::new(config.num_quads, config.local_colour)?,
            remote: Lane::new(config.num_quads, config.remote_colour)?,
            combined: Lane::new(config.num_quads, config.combined_colour)?,
            markers: TransientMesh::new(MARKER_STREAM_QUADS)?,
            marker_colour: config.marker_colour,
            marker_width_px: config.marker_width_px,
            viewport_width_px: 0.0,
            remote_handle: None,
            remote_combined: false,
        })
    }

    pub fn num_quads(&self) -> usize {
        self.num_quads
    }

    /// Width of the lane viewport in pixels, used for marker width. A change
    /// takes effect on the next update.
    pub fn set_viewport_width(&mut self, width_px: f32) {
        self.viewport_width_px = width_px.max(0.0);
    }

    pub fn is_visible(&self, kind: LaneKind) -> bool {
        self.lane(kind).visible
    }

    /// CPU-side vertices of a lane.
    pub fn lane_vertices(&self, kind: LaneKind) -> &[ColourVertex] {
        self.lane(kind).mesh.vertices()
    }

    pub fn marker_vertices(&self) -> &[ColourVertex] {
        self.markers.vertices()
    }

    fn lane(&self, kind: LaneKind) -> &Lane<B> {
        match kind {
            LaneKind::Local => &self.local,
            LaneKind::Remote => &self.remote,
            LaneKind::Combined => &self.combined,
        }
    }

    fn lane_mut(&mut self, kind: LaneKind) -> &mut Lane<B> {
        match kind {
            LaneKind::Local => &mut self.local,
            LaneKind::Remote => &mut self.remote,
            LaneKind::Combined => &mut self.combined,
        }
    }

    /// Bring every lane up to date with its sources for `window`.
    ///
    /// `force` rebuilds everything, e.g. after a resize. The remote is
    /// identified by its registry handle: attaching, detaching or switching
    /// it forces a rebuild too, including a new source registered in the
    /// slot of a removed one.
    pub fn update(
        &mut self,
        local: &SourceShared,
        remote: Option<(SourceHandle, &SourceShared)>,
        window: ViewWindow,
        force: bool,
    ) -> FrameReport {
        let remote_handle = remote.map(|(handle, _)| handle);
        let force = if remote_handle != self.remote_handle {
            log::debug!("Remote source changed, full refresh");
            self.remote_handle = remote_handle;
            true
        } else {
            force
        };
        let remote = remote.map(|(_, shared)| shared);

        let mut quads_rebuilt = 0;

        let (local_dirty, local_resolved) =
            self.update_lane(LaneKind::Local, local, window, force, &mut quads_rebuilt);

        let (remote_dirty, remote_resolved) = match remote {
            Some(remote) => {
                let (dirty, resolved) =
                    self.update_lane(LaneKind::Remote, remote, window, force, &mut quads_rebuilt);
                (Some(dirty), resolved)
            }
            None => {
                self.remote.hide();
                (None, None)
            }
        };

        let combined_dirty = match remote_dirty {
            Some(remote_dirty) => Some(self.update_combined(
                local_dirty,
                remote_dirty,
                local_resolved.as_ref(),
                remote_resolved.as_ref(),
                force,
                &mut quads_rebuilt,
            )),
            None => {
                self.combined.hide();
                self.remote_combined = false;
                None
            }
        };

        let markers = self.update_markers(window);

        FrameReport {
            local: local_dirty,
            remote: remote_dirty,
            combined: combined_dirty,
            remote_combined: self.remote_combined,
            quads_rebuilt,
            markers,
        }
    }

    fn update_lane<'a>(
        &mut self,
        kind: LaneKind,
        source: &'a SourceShared,
        window: ViewWindow,
        force: bool,
        quads_rebuilt: &mut usize,
    ) -> (DirtyQuads, Option<Resolved<'a>>) {
        let num_quads = self.num_quads;
        let lane = self.lane_mut(kind);
        lane.visible = true;

        let mut cache = SourceCache::capture(source);
        let reader = source.beat().reader();
        let mapping = reader
            .as_ref()
            .and_then(|r| ViewMapping::new(window, r.capacity(), num_quads));
        let (Some(reader), Some(mapping)) = (reader, mapping) else {
            let dirty = lane.flatten();
            *quads_rebuilt += dirty.quad_count(num_quads);
            return (dirty, None);
        };

        // the buffer was resized between the snapshot and taking the reader
        let torn = cache.beat.capacity != reader.capacity();
        if torn {
            cache.beat.capacity = reader.capacity();
        }

        let dirty = lane.tracker.update(cache, &mapping, force || torn || lane.flat);
        if torn {
            lane.tracker.reset();
        }
        lane.flat = false;

        let inputs = [LaneInput::new(reader, &cache.params)];
        *quads_rebuilt += sample_dirty(&inputs, &mapping, dirty, lane.colour, &mut lane.mesh);

        (
            dirty,
            Some(Resolved {
                reader,
                params: cache.params,
                mapping,
            }),
        )
    }

    fn update_combined(
        &mut self,
        local_dirty: DirtyQuads,
        remote_dirty: DirtyQuads,
        local: Option<&Resolved<'_>>,
        remote: Option<&Resolved<'_>>,
        force: bool,
        quads_rebuilt: &mut usize,
    ) -> DirtyQuads {
        let num_quads = self.num_quads;
        self.combined.visible = true;

        let Some(local) = local else {
            self.remote_combined = false;
            let dirty = self.combined.flatten();
            *quads_rebuilt += dirty.quad_count(num_quads);
            return dirty;
        };

        // only sources with the local capacity line up quad for quad
        let remote = remote.filter(|r| r.mapping.capacity == local.mapping.capacity);
        let include_remote = remote.is_some();
        let membership_changed = include_remote != self.remote_combined;
        if membership_changed {
            log::debug!(
                "Remote {} the combined lane",
                if include_remote { "joins" } else { "leaves" }
            );
        }
        self.remote_combined = include_remote;

        let mut inputs = vec![LaneInput::new(local.reader, &local.params)];
        let mut dirty = vec![local_dirty];
        if let Some(remote) = remote {
            inputs.push(LaneInput::new(remote.reader, &remote.params));
            dirty.push(remote_dirty);
        }

        let dirty = if force || membership_changed || self.combined.flat {
            DirtyQuads::Full
        } else {
            combined_dirty_quads(&dirty, num_quads)
        };
        self.combined.flat = false;

        *quads_rebuilt += sample_dirty(
            &inputs,
            &local.mapping,
            dirty,
            self.combined.colour,
            &mut self.combined.mesh,
        );
        dirty
    }

    /// Rebuild the beat division markers visible in `window`.
    fn update_markers(&mut self, window: ViewWindow) -> usize {
        self.markers.clear();
        let half_width = if self.viewport_width_px > 0.0 {
            self.marker_width_px / self.viewport_width_px
        } else {
            0.0
        };

        let divisions = (NUM_BEAT_MARKERS + 1) as f64;
        let mut count = 0;
        for marker in 1..=NUM_BEAT_MARKERS {
            let ratio = marker as f64 / divisions;
            let fraction = (ratio - window.start()) / window.width();
            if !(0.0..=1.0).contains(&fraction) {
                continue;
            }
            let x = (-1.0 + 2.0 * fraction) as f32;
            let (x0, x1) = ((x - half_width).max(-1.0), (x + half_width).min(1.0));
            let colour = self.marker_colour;
            self.markers.add([
                ColourVertex::new(x0, 1.0, MARKER_DEPTH, colour),
                ColourVertex::new(x1, 1.0, MARKER_DEPTH, colour),
                ColourVertex::new(x1, -1.0, MARKER_DEPTH, colour),
                ColourVertex::new(x0, -1.0, MARKER_DEPTH, colour),
            ]);
            count += 1;
        }
        count
    }

    /// Upload and draw one lane with the markers on top. Hidden lanes draw
    /// nothing.
    pub fn submit_lane<D: GpuDevice<Buffer = B>>(
        &mut self,
        device: &mut D,
        kind: LaneKind,
    ) -> Result<usize> {
        let num_quads = self.num_quads;
        let lane = self.lane_mut(kind);
        if !lane.visible {
            return Ok(0);
        }
        let mut uploaded = lane.mesh.render(device, 0..num_quads)?;
        uploaded += self.markers.render(device)?;
        Ok(uploaded)
    }

    /// Upload and draw every visible lane.
    pub fn submit<D: GpuDevice<Buffer = B>>(&mut self, device: &mut D) -> Result<SubmitStats> {
        let mut stats = SubmitStats::default();
        for kind in LaneKind::ALL {
            if !self.is_visible(kind) {
                continue;
            }
            stats.bytes_uploaded += self.submit_lane(device, kind)?;
            stats.lanes_drawn += 1;
        }
        Ok(stats)
    }

    /// Free every device buffer. The next submit recreates and refills
    /// them.
    pub fn release<D: GpuDevice<Buffer = B>>(&mut self, device: &mut D) {
        for kind in LaneKind::ALL {
            self.lane_mut(kind).mesh.release(device);
        }
        self.markers.release(device);
    }
}
