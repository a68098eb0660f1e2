//! Fixed-capacity frame store for the delay line.

/// A circular store of multi-channel `f32` frames.
///
/// Slots are addressed by caller-supplied indices taken modulo the
/// capacity; the buffer never advances a cursor of its own. That lets the
/// delay engine read the oldest frame and overwrite it within the same step.
///
/// Storage is a single interleaved allocation made at construction and
/// zero-filled, so reads before anything was written return silence.
/// Capacity is fixed for the buffer's lifetime; resizing means building a
/// new buffer.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    samples: Vec<f32>,
    capacity: usize,
    channels: usize,
}

impl RingBuffer {
    /// Creates a zero-filled buffer of `capacity` frames, `channels` wide.
    ///
    /// Both dimensions are floored at one.
    pub fn new(capacity: usize, channels: usize) -> Self {
        let capacity = capacity.max(1);
        let channels = channels.max(1);
        Self {
            samples: vec![0.0; capacity * channels],
            capacity,
            channels,
        }
    }

    /// Overwrites slot `at mod capacity` with `frame`.
    ///
    /// Samples beyond the buffer width are ignored; missing samples are
    /// stored as silence.
    #[inline]
    pub fn write(&mut self, frame: &[f32], at: usize) {
        let slot = self.slot_mut(at);
        let shared = frame.len().min(slot.len());
        slot[..shared].copy_from_slice(&frame[..shared]);
        slot[shared..].fill(0.0);
    }

    /// Returns the frame stored at slot `at mod capacity`.
    #[inline]
    pub fn read(&self, at: usize) -> &[f32] {
        let start = (at % self.capacity) * self.channels;
        &self.samples[start..start + self.channels]
    }

    /// Number of frames the buffer holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per frame.
    pub fn channels(&self) -> usize {
        self.channels
    }

    fn slot_mut(&mut self, at: usize) -> &mut [f32] {
        let start = (at % self.capacity) * self.channels;
        &mut self.samples[start..start + self.channels]
    }
}
