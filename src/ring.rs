use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::math::positive_modulo;

/// Fixed-storage circular buffer of `f32` samples shared between the audio
/// thread and the render thread.
///
/// Samples are stored as `f32` bits in relaxed atomics: the writer never
/// blocks and a concurrent reader may see a mix of old and new samples, but
/// never a torn value. Storage is allocated once; the active `capacity` can
/// be anything up to the storage length and is the modulus for every index.
///
/// A capacity of zero means "no data". Reads go through [`RingReader`],
/// which can only be obtained for a non-empty ring.
pub struct SampleRing {
    storage: Box<[AtomicU32]>,
    capacity: AtomicUsize,
}

impl SampleRing {
    /// Create a ring whose active capacity equals its storage.
    pub fn new(capacity: usize) -> Self {
        let ring = Self::with_storage(capacity);
        ring.capacity.store(capacity, Ordering::Relaxed);
        ring
    }

    /// Create a ring with `max_capacity` slots of storage and an active
    /// capacity of zero.
    pub fn with_storage(max_capacity: usize) -> Self {
        let storage = (0..max_capacity)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            storage,
            capacity: AtomicUsize::new(0),
        }
    }

    pub fn max_capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.capacity() == 0
    }

    /// Change the active capacity.
    ///
    /// When the capacity actually changes the new active region is zeroed
    /// before the capacity is published, so readers never index old content
    /// at stale offsets. Returns `false` (and leaves the ring untouched) if
    /// `capacity` exceeds the storage.
    pub fn resize(&self, capacity: usize) -> bool {
        if capacity > self.storage.len() {
            return false;
        }
        if capacity != self.capacity() {
            self.capacity.store(0, Ordering::Relaxed);
            self.zero(capacity);
            self.capacity.store(capacity, Ordering::Relaxed);
        }
        true
    }

    /// Zero the active region.
    pub fn clear(&self) {
        self.zero(self.capacity());
    }

    fn zero(&self, len: usize) {
        let zero = 0.0f32.to_bits();
        for slot in &self.storage[..len] {
            slot.store(zero, Ordering::Relaxed);
        }
    }

    /// Copy `data` into the ring starting at absolute index `start`.
    ///
    /// The copy is split into at most two contiguous segments at the wrap
    /// boundary. If `data` is longer than the capacity only its last
    /// `capacity` samples can survive, so only those are written.
    pub fn write(&self, start: i64, data: &[f32]) {
        self.write_with(start, data.len(), |i| data[i]);
    }

    /// Like [`write`](Self::write) but the sample for offset `i` of the
    /// block is produced by `source(i)`, so callers can mix channels without
    /// a scratch buffer.
    pub fn write_with(&self, start: i64, len: usize, mut source: impl FnMut(usize) -> f32) {
        let capacity = self.capacity();
        if capacity == 0 || len == 0 {
            return;
        }

        let skip = len.saturating_sub(capacity);
        let len = len - skip;
        let pos = positive_modulo(start + skip as i64, capacity);

        let first = len.min(capacity - pos);
        for (i, slot) in self.storage[pos..pos + first].iter().enumerate() {
            slot.store(source(skip + i).to_bits(), Ordering::Relaxed);
        }
        for (i, slot) in self.storage[..len - first].iter().enumerate() {
            slot.store(source(skip + first + i).to_bits(), Ordering::Relaxed);
        }
    }

    /// Store a single sample at absolute index `index`.
    #[inline]
    pub fn write_sample(&self, index: i64, value: f32) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        self.storage[positive_modulo(index, capacity)].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Reader pinned to the current capacity, or `None` when the ring holds
    /// no data.
    pub fn reader(&self) -> Option<RingReader<'_>> {
        let capacity = self.capacity();
        (capacity > 0).then_some(RingReader {
            storage: &self.storage,
            capacity,
        })
    }

    /// Copy of the active region in slot order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.storage[..self.capacity()]
            .iter()
            .map(|slot| f32::from_bits(slot.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Read access to a [`SampleRing`] with the capacity captured once.
///
/// Every index is reduced modulo the captured capacity, which never exceeds
/// the storage length, so reads stay in bounds even if the writer shrinks
/// the ring concurrently.
#[derive(Clone, Copy)]
pub struct RingReader<'a> {
    storage: &'a [AtomicU32],
    capacity: usize,
}

impl RingReader<'_> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sample at absolute index `index`, wrapped with positive modulo.
    #[inline]
    pub fn read(&self, index: i64) -> f32 {
        let slot = &self.storage[positive_modulo(index, self.capacity)];
        f32::from_bits(slot.load(Ordering::Relaxed))
    }

    /// Linearly interpolated sample at a fractional absolute position.
    ///
    /// Interpolates between `floor(position)` and `floor(position) + 1`, both
    /// wrapped, so the result is continuous across the wrap boundary and
    /// exact at integer positions.
    #[inline]
    pub fn sample(&self, position: f64) -> f32 {
        let index = position.floor();
        let ratio = (position - index) as f32;
        let index = index as i64;
        self.read(index) * (1.0 - ratio) + self.read(index + 1) * ratio
    }
}
