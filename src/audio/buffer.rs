//! Fixed-capacity ring of recent output samples for monitoring.
//!
//! The beamformed stream is copied here (optionally rescaled) so a listener
//! or meter can look at the last few seconds without touching the recording
//! that will be saved.  When full, new samples overwrite the oldest.
//!
//! # Example
//!
//! ```rust
//! use array_steer::audio::RingBuffer;
//!
//! let mut ring = RingBuffer::new(4);
//! ring.push_scaled(&[1.0, 2.0, 3.0, 4.0, 5.0], 2.0);
//! assert_eq!(ring.snapshot(), vec![4.0, 6.0, 8.0, 10.0]);
//! assert_eq!(ring.len(), 4);
//! ```

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// Bounded FIFO of `f32` samples that keeps the newest `capacity` values.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RingBuffer {
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Ring sized to hold `secs` of audio at `sample_rate` (at least one
    /// sample).
    pub fn for_duration(secs: f32, sample_rate: u32) -> Self {
        let capacity = (secs.max(0.0) * sample_rate as f32).round() as usize;
        Self::new(capacity.max(1))
    }

    /// Append `data` unchanged.
    pub fn push_slice(&mut self, data: &[f32]) {
        self.push_scaled(data, 1.0);
    }

    /// Append `data` multiplied by `gain`, evicting the oldest samples as
    /// needed.
    pub fn push_scaled(&mut self, data: &[f32], gain: f32) {
        // Only the tail of an oversized slice can survive.
        let data = &data[data.len().saturating_sub(self.capacity)..];
        let overflow = (self.samples.len() + data.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(data.iter().map(|&s| s * gain));
    }

    /// Copy of the stored samples, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }

    /// The newest `n` samples (fewer if not that many are stored).
    pub fn latest(&self, n: usize) -> Vec<f32> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Take all stored samples, oldest first, leaving the ring empty.
    pub fn drain(&mut self) -> Vec<f32> {
        self.samples.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Seconds of audio held, at `sample_rate` Hz.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Push / snapshot ---------------------------------------------------

    #[test]
    fn push_within_capacity() {
        let mut ring = RingBuffer::new(8);
        ring.push_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(ring.len(), 3);
        assert!(!ring.is_full());
        assert_eq!(ring.snapshot(), vec![1.0, 2.0, 3.0]);
        // Snapshot does not consume.
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn overflow_keeps_newest_across_calls() {
        let mut ring = RingBuffer::new(3);
        ring.push_slice(&[1.0, 2.0, 3.0]);
        ring.push_slice(&[4.0, 5.0]);
        assert_eq!(ring.snapshot(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn oversized_slice_keeps_its_tail() {
        let mut ring = RingBuffer::new(4);
        ring.push_slice(&[9.0]);
        ring.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(ring.snapshot(), vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn scaled_copy() {
        let mut ring = RingBuffer::new(4);
        ring.push_scaled(&[0.1, -0.2], 0.5);
        let got = ring.snapshot();
        assert!((got[0] - 0.05).abs() < 1e-7);
        assert!((got[1] + 0.1).abs() < 1e-7);
    }

    #[test]
    fn latest_n() {
        let mut ring = RingBuffer::new(8);
        ring.push_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(ring.latest(2), vec![3.0, 4.0]);
        assert_eq!(ring.latest(10), vec![1.0, 2.0, 3.0, 4.0]);
    }

    // ---- Drain / clear -----------------------------------------------------

    #[test]
    fn drain_empties() {
        let mut ring = RingBuffer::new(4);
        ring.push_slice(&[1.0, 2.0]);
        assert_eq!(ring.drain(), vec![1.0, 2.0]);
        assert!(ring.is_empty());
        assert_eq!(ring.drain(), Vec::<f32>::new());
    }

    #[test]
    fn clear_then_reuse() {
        let mut ring = RingBuffer::new(2);
        ring.push_slice(&[1.0, 2.0, 3.0]);
        ring.clear();
        ring.push_slice(&[9.0]);
        assert_eq!(ring.snapshot(), vec![9.0]);
    }

    // ---- Sizing ------------------------------------------------------------

    #[test]
    fn sized_for_duration() {
        let ring = RingBuffer::for_duration(5.0, 16_000);
        assert_eq!(ring.capacity(), 80_000);
        assert_eq!(RingBuffer::for_duration(0.0, 16_000).capacity(), 1);
    }

    #[test]
    fn duration_secs_calculation() {
        let mut ring = RingBuffer::new(16_000);
        ring.push_slice(&vec![0.0; 8_000]);
        assert!((ring.duration_secs(16_000) - 0.5).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "RingBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ring = RingBuffer::new(0);
    }
}
