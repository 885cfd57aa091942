//! CPU-side quad meshes and the seam to whatever draws them.
//!
//! A [`QuadMesh`] keeps a fixed number of quads and remembers which ones
//! changed since the last upload, so [`QuadMesh::render`] only sends the
//! dirty byte range to the device. A [`TransientMesh`] is rebuilt every
//! frame and streamed into a ring of device memory, orphaning the buffer
//! when it runs out of room instead of waiting on the device.
//!
//! Device buffers must be released with `release` while the device is
//! still usable; dropping a mesh that still owns buffers only logs.

use std::ops::{Range, RangeInclusive};

use bytemuck::{Pod, Zeroable};

use crate::error::{Result, ScopeError};

pub const VERTICES_PER_QUAD: usize = 4;
pub const INDICES_PER_QUAD: usize = 6;

const FLOAT_SIZE: usize = std::mem::size_of::<f32>();

/// One vertex attribute: `components` floats starting at byte `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub components: usize,
    pub offset: usize,
}

impl VertexAttribute {
    pub fn new(name: &'static str, components: usize, offset: usize) -> Self {
        Self {
            name,
            components,
            offset,
        }
    }

    fn end(&self) -> usize {
        self.offset + self.components * FLOAT_SIZE
    }
}

/// Runtime description of a vertex format, validated once on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    stride: usize,
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Validate and build a layout.
    ///
    /// Attributes must be non-empty, have 1 to 4 float components, be
    /// float aligned, fit inside `stride`, not overlap and have unique names.
    pub fn new(stride: usize, attributes: Vec<VertexAttribute>) -> Result<Self> {
        if attributes.is_empty() {
            return Err(ScopeError::VertexLayout("no attributes".into()));
        }
        if stride == 0 || stride % FLOAT_SIZE != 0 {
            return Err(ScopeError::VertexLayout(format!(
                "stride {} is not a positive multiple of {}",
                stride, FLOAT_SIZE
            )));
        }

        for (i, attribute) in attributes.iter().enumerate() {
            if !(1..=4).contains(&attribute.components) {
                return Err(ScopeError::VertexLayout(format!(
                    "attribute '{}' has {} components",
                    attribute.name, attribute.components
                )));
            }
            if attribute.offset % FLOAT_SIZE != 0 {
                return Err(ScopeError::VertexLayout(format!(
                    "attribute '{}' offset {} is not float aligned",
                    attribute.name, attribute.offset
                )));
            }
            if attribute.end() > stride {
                return Err(ScopeError::VertexLayout(format!(
                    "attribute '{}' ends at byte {} past stride {}",
                    attribute.name,
                    attribute.end(),
                    stride
                )));
            }
            for other in &attributes[..i] {
                if other.name == attribute.name {
                    return Err(ScopeError::VertexLayout(format!(
                        "duplicate attribute '{}'",
                        attribute.name
                    )));
                }
                if attribute.offset < other.end() && other.offset < attribute.end() {
                    return Err(ScopeError::VertexLayout(format!(
                        "attributes '{}' and '{}' overlap",
                        other.name, attribute.name
                    )));
                }
            }
        }

        Ok(Self { stride, attributes })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Plain-old-data vertex with a runtime layout.
pub trait Vertex: Pod {
    fn layout() -> Result<VertexLayout>;
}

/// Position plus RGBA colour.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColourVertex {
    pub position: [f32; 3],
    pub colour: [f32; 4],
}

impl ColourVertex {
    pub fn new(x: f32, y: f32, z: f32, colour: [f32; 4]) -> Self {
        Self {
            position: [x, y, z],
            colour,
        }
    }
}

impl Vertex for ColourVertex {
    fn layout() -> Result<VertexLayout> {
        VertexLayout::new(
            std::mem::size_of::<ColourVertex>(),
            vec![
                VertexAttribute::new("position", 3, 0),
                VertexAttribute::new("colour", 4, 3 * FLOAT_SIZE),
            ],
        )
    }
}

/// Two triangles per quad: `(0, 1, 2)` and `(0, 2, 3)` of each quad's
/// four vertices.
pub fn quad_indices(num_quads: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity(num_quads * INDICES_PER_QUAD);
    for quad in 0..num_quads as u32 {
        let base = quad * VERTICES_PER_QUAD as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    indices
}

/// Whatever owns device memory and issues draw calls.
///
/// All calls happen on the render thread while the device is usable.
pub trait GpuDevice {
    type Buffer;

    /// Allocate `size_bytes` of vertex storage with undefined contents.
    fn create_vertex_buffer(
        &mut self,
        layout: &VertexLayout,
        size_bytes: usize,
    ) -> Result<Self::Buffer>;

    /// Allocate and fill an index buffer.
    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Self::Buffer>;

    /// Overwrite `bytes.len()` bytes at `byte_offset`.
    fn upload(&mut self, buffer: &Self::Buffer, byte_offset: usize, bytes: &[u8]);

    /// Replace the buffer's storage; the previous contents become undefined.
    fn orphan(&mut self, buffer: &Self::Buffer);

    /// Draw `quads` using the quad index pattern, with vertex indices
    /// offset by `base_vertex`.
    fn draw_quads(
        &mut self,
        vertices: &Self::Buffer,
        indices: &Self::Buffer,
        base_vertex: usize,
        quads: Range<usize>,
    );

    fn release(&mut self, buffer: Self::Buffer);
}

struct MeshBuffers<B> {
    vertices: B,
    indices: B,
}

impl<B> MeshBuffers<B> {
    fn create<D: GpuDevice<Buffer = B>>(
        device: &mut D,
        layout: &VertexLayout,
        num_quads: usize,
    ) -> Result<Self> {
        let size = num_quads * VERTICES_PER_QUAD * layout.stride();
        let vertices = device.create_vertex_buffer(layout, size)?;
        let indices = match device.create_index_buffer(&quad_indices(num_quads)) {
            Ok(indices) => indices,
            Err(e) => {
                device.release(vertices);
                return Err(e);
            }
        };
        Ok(Self { vertices, indices })
    }

    fn release<D: GpuDevice<Buffer = B>>(self, device: &mut D) {
        device.release(self.vertices);
        device.release(self.indices);
    }
}

/// Fixed number of quads with dirty-range tracking.
pub struct QuadMesh<V: Vertex, B> {
    layout: VertexLayout,
    vertices: Vec<V>,
    dirty: Option<(usize, usize)>,
    buffers: Option<MeshBuffers<B>>,
}

impl<V: Vertex, B> QuadMesh<V, B> {
    /// A mesh of `num_quads` zeroed quads, all dirty.
    pub fn new(num_quads: usize) -> Result<Self> {
        let layout = V::layout()?;
        if layout.stride() != std::mem::size_of::<V>() {
            return Err(ScopeError::VertexLayout(format!(
                "layout stride {} does not match vertex size {}",
                layout.stride(),
                std::mem::size_of::<V>()
            )));
        }
        Ok(Self {
            layout,
            vertices: vec![V::zeroed(); num_quads * VERTICES_PER_QUAD],
            dirty: num_quads.checked_sub(1).map(|last| (0, last)),
            buffers: None,
        })
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Capacity in quads.
    pub fn capacity(&self) -> usize {
        self.vertices.len() / VERTICES_PER_QUAD
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn quad(&self, index: usize) -> Option<&[V]> {
        let start = index * VERTICES_PER_QUAD;
        self.vertices.get(start..start + VERTICES_PER_QUAD)
    }

    /// Quads changed since the last upload.
    pub fn dirty_quads(&self) -> Option<RangeInclusive<usize>> {
        self.dirty.map(|(first, last)| first..=last)
    }

    /// Overwrite quad `index` and mark it dirty. Out-of-range indices are
    /// ignored.
    pub fn set_quad(&mut self, index: usize, quad: [V; VERTICES_PER_QUAD]) {
        let start = index * VERTICES_PER_QUAD;
        let Some(slot) = self.vertices.get_mut(start..start + VERTICES_PER_QUAD) else {
            return;
        };
        slot.copy_from_slice(&quad);
        self.dirty = Some(match self.dirty {
            Some((first, last)) => (first.min(index), last.max(index)),
            None => (index, index),
        });
    }

    /// Mark every quad dirty, e.g. after the device lost its contents.
    pub fn mark_all_dirty(&mut self) {
        self.dirty = self.capacity().checked_sub(1).map(|last| (0, last));
    }

    /// Upload the dirty range, if any, and draw `quads`.
    ///
    /// Device buffers are created on first use. Returns the number of bytes
    /// uploaded.
    pub fn render<D: GpuDevice<Buffer = B>>(
        &mut self,
        device: &mut D,
        quads: Range<usize>,
    ) -> Result<usize> {
        if self.buffers.is_none() {
            self.buffers = Some(MeshBuffers::create(device, &self.layout, self.capacity())?);
            self.mark_all_dirty();
        }
        let Some(buffers) = &self.buffers else {
            return Ok(0);
        };

        let mut uploaded = 0;
        if let Some((first, last)) = self.dirty.take() {
            let vertices = &self.vertices[first * VERTICES_PER_QUAD..(last + 1) * VERTICES_PER_QUAD];
            let bytes: &[u8] = bytemuck::cast_slice(vertices);
            let offset = first * VERTICES_PER_QUAD * self.layout.stride();
            device.upload(&buffers.vertices, offset, bytes);
            uploaded = bytes.len();
        }

        let end = quads.end.min(self.capacity());
        if quads.start < end {
            device.draw_quads(&buffers.vertices, &buffers.indices, 0, quads.start..end);
        }
        Ok(uploaded)
    }

    /// Free device buffers. The next render recreates and refills them.
    pub fn release<D: GpuDevice<Buffer = B>>(&mut self, device: &mut D) {
        if let Some(buffers) = self.buffers.take() {
            buffers.release(device);
        }
    }

    pub fn has_device_buffers(&self) -> bool {
        self.buffers.is_some()
    }
}

impl<V: Vertex, B> Drop for QuadMesh<V, B> {
    fn drop(&mut self) {
        if self.buffers.is_some() {
            log::warn!("Quad mesh dropped without releasing its device buffers");
        }
    }
}

/// Quads rebuilt every frame, streamed into a device buffer of `capacity`
/// quads.
pub struct TransientMesh<V: Vertex, B> {
    layout: VertexLayout,
    vertices: Vec<V>,
    capacity: usize,
    write_quad: usize,
    orphan_count: usize,
    buffers: Option<MeshBuffers<B>>,
}

impl<V: Vertex, B> TransientMesh<V, B> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ScopeError::GpuBuffer(
                "transient mesh needs a capacity of at least one quad".into(),
            ));
        }
        Ok(Self {
            layout: V::layout()?,
            vertices: Vec::new(),
            capacity,
            write_quad: 0,
            orphan_count: 0,
            buffers: None,
        })
    }

    /// Device capacity in quads.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn quad_count(&self) -> usize {
        self.vertices.len() / VERTICES_PER_QUAD
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    /// Times the device buffer was orphaned.
    pub fn orphan_count(&self) -> usize {
        self.orphan_count
    }

    pub fn add(&mut self, quad: [V; VERTICES_PER_QUAD]) {
        self.vertices.extend_from_slice(&quad);
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Stream the quads to the next free region and draw them.
    ///
    /// If they do not fit after the last write the buffer is orphaned and
    /// writing restarts at the beginning. Quads beyond the device capacity
    /// are dropped. Returns the number of bytes uploaded.
    pub fn render<D: GpuDevice<Buffer = B>>(&mut self, device: &mut D) -> Result<usize> {
        let count = self.quad_count().min(self.capacity);
        if count == 0 {
            return Ok(0);
        }
        if count < self.quad_count() {
            log::warn!(
                "Transient mesh holds {} quads, drawing the first {}",
                self.quad_count(),
                count
            );
        }

        if self.buffers.is_none() {
            self.buffers = Some(MeshBuffers::create(device, &self.layout, self.capacity)?);
            self.write_quad = 0;
        }
        let Some(buffers) = &self.buffers else {
            return Ok(0);
        };

        if self.write_quad + count > self.capacity {
            device.orphan(&buffers.vertices);
            self.orphan_count += 1;
            self.write_quad = 0;
        }

        let bytes: &[u8] = bytemuck::cast_slice(&self.vertices[..count * VERTICES_PER_QUAD]);
        let base_vertex = self.write_quad * VERTICES_PER_QUAD;
        device.upload(&buffers.vertices, base_vertex * self.layout.stride(), bytes);
        device.draw_quads(&buffers.vertices, &buffers.indices, base_vertex, 0..count);
        self.write_quad += count;
        Ok(bytes.len())
    }

    pub fn release<D: GpuDevice<Buffer = B>>(&mut self, device: &mut D) {
        if let Some(buffers) = self.buffers.take() {
            buffers.release(device);
        }
    }

    pub fn has_device_buffers(&self) -> bool {
        self.buffers.is_some()
    }
}

impl<V: Vertex, B> Drop for TransientMesh<V, B> {
    fn drop(&mut self) {
        if self.buffers.is_some() {
            log::warn!("Transient mesh dropped without releasing its device buffers");
        }
    }
}

/// Handle to a [`MemoryDevice`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryBufferId(usize);

/// One recorded upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRecord {
    pub buffer: MemoryBufferId,
    pub byte_offset: usize,
    pub len: usize,
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub vertices: MemoryBufferId,
    pub base_vertex: usize,
    pub quads: Range<usize>,
}

/// Byte written into orphaned storage so stale reads are visible.
pub const ORPHAN_FILL: u8 = 0xA5;

/// Device that keeps buffers in host memory and records every call.
///
/// Used by the headless CLI and by tests that compare what reached the
/// "device" against a full rebuild.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    buffers: Vec<Option<Vec<u8>>>,
    uploads: Vec<UploadRecord>,
    draws: Vec<DrawRecord>,
    orphans: usize,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, bytes: Vec<u8>) -> MemoryBufferId {
        self.buffers.push(Some(bytes));
        MemoryBufferId(self.buffers.len() - 1)
    }

    /// Current contents of a live buffer.
    pub fn buffer_bytes(&self, id: MemoryBufferId) -> Option<&[u8]> {
        self.buffers.get(id.0)?.as_deref()
    }

    /// Contents of a live buffer decoded as vertices.
    pub fn buffer_vertices<V: Pod>(&self, id: MemoryBufferId) -> Option<Vec<V>> {
        let bytes = self.buffer_bytes(id)?;
        Some(
            bytes
                .chunks_exact(std::mem::size_of::<V>())
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        )
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    pub fn uploads(&self) -> &[UploadRecord] {
        &self.uploads
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn orphans(&self) -> usize {
        self.orphans
    }

    /// Total bytes uploaded since the log was last cleared.
    pub fn bytes_uploaded(&self) -> usize {
        self.uploads.iter().map(|u| u.len).sum()
    }

    /// Forget recorded uploads and draws; buffer contents are kept.
    pub fn clear_log(&mut self) {
        self.uploads.clear();
        self.draws.clear();
    }
}

impl GpuDevice for MemoryDevice {
    type Buffer = MemoryBufferId;

    fn create_vertex_buffer(
        &mut self,
        _layout: &VertexLayout,
        size_bytes: usize,
    ) -> Result<Self::Buffer> {
        Ok(self.allocate(vec![ORPHAN_FILL; size_bytes]))
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Self::Buffer> {
        Ok(self.allocate(bytemuck::cast_slice(indices).to_vec()))
    }

    fn upload(&mut self, buffer: &Self::Buffer, byte_offset: usize, bytes: &[u8]) {
        let Some(Some(storage)) = self.buffers.get_mut(buffer.0) else {
            log::warn!("Upload to unknown buffer {:?}", buffer);
            return;
        };
        let end = byte_offset + bytes.len();
        if end > storage.len() {
            log::warn!(
                "Upload of {} bytes at {} overruns buffer of {}",
                bytes.len(),
                byte_offset,
                storage.len()
            );
            return;
        }
        storage[byte_offset..end].copy_from_slice(bytes);
        self.uploads.push(UploadRecord {
            buffer: *buffer,
            byte_offset,
            len: bytes.len(),
        });
    }

    fn orphan(&mut self, buffer: &Self::Buffer) {
        if let Some(Some(storage)) = self.buffers.get_mut(buffer.0) {
            storage.fill(ORPHAN_FILL);
            self.orphans += 1;
        }
    }

    fn draw_quads(
        &mut self,
        vertices: &Self::Buffer,
        _indices: &Self::Buffer,
        base_vertex: usize,
        quads: Range<usize>,
    ) {
        self.draws.push(DrawRecord {
            vertices: *vertices,
            base_vertex,
            quads,
        });
    }

    fn release(&mut self, buffer: Self::Buffer) {
        if let Some(slot) = self.buffers.get_mut(buffer.0) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(value: f32) -> [ColourVertex; 4] {
        [ColourVertex::new(value, value, 0.5, [1.0, 0.0, 0.0, 1.0]); 4]
    }

    #[test]
    fn test_colour_vertex_layout() {
        let layout = ColourVertex::layout().unwrap();
        assert_eq!(layout.stride(), 28);
        assert_eq!(layout.attribute("colour").unwrap().offset, 12);
        assert_eq!(bytemuck::bytes_of(&ColourVertex::default()).len(), 28);
    }

    #[test]
    fn test_layout_validation() {
        assert!(VertexLayout::new(16, vec![]).is_err());
        assert!(VertexLayout::new(16, vec![VertexAttribute::new("a", 5, 0)]).is_err());
        assert!(VertexLayout::new(8, vec![VertexAttribute::new("a", 3, 0)]).is_err());
        assert!(VertexLayout::new(16, vec![VertexAttribute::new("a", 2, 2)]).is_err());
        assert!(
            VertexLayout::new(
                16,
                vec![VertexAttribute::new("a", 2, 0), VertexAttribute::new("b", 2, 4)]
            )
            .is_err()
        );
        assert!(
            VertexLayout::new(
                16,
                vec![VertexAttribute::new("a", 2, 0), VertexAttribute::new("a", 2, 8)]
            )
            .is_err()
        );
        assert!(
            VertexLayout::new(
                16,
                vec![VertexAttribute::new("a", 2, 0), VertexAttribute::new("b", 2, 8)]
            )
            .is_ok()
        );
    }

    #[test]
    fn test_quad_indices() {
        assert_eq!(quad_indices(2), vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn test_first_render_uploads_everything() {
        let mut device = MemoryDevice::new();
        let mut mesh = QuadMesh::<ColourVertex, _>::new(10).unwrap();
        let uploaded = mesh.render(&mut device, 0..10).unwrap();
        assert_eq!(uploaded, 10 * 4 * 28);
        assert!(mesh.dirty_quads().is_none());
        assert_eq!(device.draws().len(), 1);
        mesh.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_only_dirty_range_uploaded() {
        let mut device = MemoryDevice::new();
        let mut mesh = QuadMesh::<ColourVertex, _>::new(10).unwrap();
        mesh.render(&mut device, 0..10).unwrap();
        device.clear_log();

        mesh.set_quad(3, quad(0.3));
        mesh.set_quad(5, quad(0.5));
        assert_eq!(mesh.dirty_quads(), Some(3..=5));
        let uploaded = mesh.render(&mut device, 0..10).unwrap();
        assert_eq!(uploaded, 3 * 4 * 28);
        assert_eq!(device.uploads()[0].byte_offset, 3 * 4 * 28);

        device.clear_log();
        assert_eq!(mesh.render(&mut device, 0..10).unwrap(), 0);
        assert!(device.uploads().is_empty());
        mesh.release(&mut device);
    }

    #[test]
    fn test_device_mirrors_cpu_vertices() {
        let mut device = MemoryDevice::new();
        let mut mesh = QuadMesh::<ColourVertex, _>::new(4).unwrap();
        mesh.render(&mut device, 0..4).unwrap();
        mesh.set_quad(2, quad(-0.25));
        mesh.render(&mut device, 0..4).unwrap();

        let id = device.draws()[0].vertices;
        let on_device: Vec<ColourVertex> = device.buffer_vertices(id).unwrap();
        assert_eq!(on_device.as_slice(), mesh.vertices());
        mesh.release(&mut device);
    }

    #[test]
    fn test_set_quad_out_of_range_ignored() {
        let mut mesh = QuadMesh::<ColourVertex, MemoryBufferId>::new(2).unwrap();
        assert_eq!(mesh.dirty_quads(), Some(0..=1));
        mesh.set_quad(7, quad(1.0));
        assert_eq!(mesh.dirty_quads(), Some(0..=1));
        assert_eq!(mesh.vertex_count(), 8);
    }

    #[test]
    fn test_transient_mesh_orphans_when_full() {
        let mut device = MemoryDevice::new();
        let mut mesh = TransientMesh::<ColourVertex, _>::new(8).unwrap();

        for frame in 0..3 {
            mesh.clear();
            for i in 0..3 {
                mesh.add(quad(i as f32));
            }
            mesh.render(&mut device).unwrap();
            let draw = device.draws().last().unwrap().clone();
            assert_eq!(draw.quads, 0..3);
            // third frame would need quads 6..9 of 8
            let expected_base = if frame < 2 { frame * 12 } else { 0 };
            assert_eq!(draw.base_vertex, expected_base);
        }
        assert_eq!(mesh.orphan_count(), 1);
        assert_eq!(device.orphans(), 1);
        mesh.release(&mut device);
    }

    #[test]
    fn test_transient_mesh_empty_draws_nothing() {
        let mut device = MemoryDevice::new();
        let mut mesh = TransientMesh::<ColourVertex, _>::new(4).unwrap();
        assert_eq!(mesh.render(&mut device).unwrap(), 0);
        assert!(device.draws().is_empty());
        assert!(!mesh.has_device_buffers());
    }

    #[test]
    fn test_transient_mesh_drops_overflow() {
        let mut device = MemoryDevice::new();
        let mut mesh = TransientMesh::<ColourVertex, _>::new(2).unwrap();
        for i in 0..5 {
            mesh.add(quad(i as f32));
        }
        let uploaded = mesh.render(&mut device).unwrap();
        assert_eq!(uploaded, 2 * 4 * 28);
        mesh.release(&mut device);
    }
}
