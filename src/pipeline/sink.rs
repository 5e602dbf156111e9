//! Typed observers of the processed stream.
//!
//! Every processed block is handed to each registered [`AudioSink`] together
//! with its beamformed output and the estimate it was steered by.  Sinks run
//! on the DSP worker inside the per-block critical section, so they must be
//! quick; anything slow belongs on a channel drained elsewhere.

use thiserror::Error;

use crate::array::NUM_MICS;
use crate::audio::AudioBlock;
use crate::beamformer::BeamOutput;
use crate::doa::DirectionEstimate;

/// Upper bound on registered sinks.
pub const MAX_SINKS: usize = 8;

// ---------------------------------------------------------------------------
// AudioSink
// ---------------------------------------------------------------------------

/// Receives every processed block.
pub trait AudioSink: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn on_block(&mut self, block: &AudioBlock, output: &BeamOutput, estimate: DirectionEstimate);
}

// ---------------------------------------------------------------------------
// SinkSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink limit of {0} reached")]
    Full(usize),

    #[error("no sink registered at index {0}")]
    Unknown(usize),
}

/// Fixed-capacity collection of sinks.
///
/// Indices returned by [`register`](Self::register) stay valid until that
/// sink is removed; a freed slot is reused by the next registration.
#[derive(Default)]
pub struct SinkSet {
    slots: Vec<Option<Box<dyn AudioSink>>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(MAX_SINKS),
        }
    }

    /// Add a sink; returns its index.
    pub fn register(&mut self, sink: Box<dyn AudioSink>) -> Result<usize, SinkError> {
        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None if self.slots.len() < MAX_SINKS => {
                self.slots.push(None);
                self.slots.len() - 1
            }
            None => return Err(SinkError::Full(MAX_SINKS)),
        };
        log::debug!("pipeline: registered sink '{}' at {index}", sink.name());
        self.slots[index] = Some(sink);
        Ok(index)
    }

    /// Remove the sink at `index`, handing it back.
    pub fn unregister(&mut self, index: usize) -> Result<Box<dyn AudioSink>, SinkError> {
        let sink = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(SinkError::Unknown(index))?;
        log::debug!("pipeline: removed sink '{}' from {index}", sink.name());
        Ok(sink)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatch(&mut self, block: &AudioBlock, output: &BeamOutput, estimate: DirectionEstimate) {
        for sink in self.slots.iter_mut().flatten() {
            sink.on_block(block, output, estimate);
        }
    }
}

// ---------------------------------------------------------------------------
// RawRecorder
// ---------------------------------------------------------------------------

/// Accumulates the unprocessed microphone channels for a four-channel WAV.
#[derive(Debug, Default)]
pub struct RawRecorder {
    channels: [Vec<f32>; NUM_MICS],
}

impl RawRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames recorded so far.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand over the recorded channels, leaving the recorder empty.
    pub fn take(&mut self) -> Vec<Vec<f32>> {
        self.channels.iter_mut().map(std::mem::take).collect()
    }

    /// Put back channels returned by [`take`](Self::take), ahead of any
    /// frames recorded since.
    pub fn restore(&mut self, channels: Vec<Vec<f32>>) {
        for (dst, mut older) in self.channels.iter_mut().zip(channels) {
            older.extend_from_slice(dst);
            *dst = older;
        }
    }

    pub fn clear(&mut self) {
        self.channels.iter_mut().for_each(Vec::clear);
    }
}

impl AudioSink for RawRecorder {
    fn name(&self) -> &str {
        "raw"
    }

    fn on_block(&mut self, block: &AudioBlock, _output: &BeamOutput, _estimate: DirectionEstimate) {
        // Trim to the shortest channel so the recording stays rectangular.
        let len = block.len();
        for (dst, src) in self.channels.iter_mut().zip(&block.channels) {
            dst.extend_from_slice(&src[..len]);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicUsize>);

    impl AudioSink for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_block(&mut self, _: &AudioBlock, _: &BeamOutput, _: DirectionEstimate) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn output(len: usize) -> BeamOutput {
        BeamOutput {
            samples: vec![0.0; len],
            gain: 1.0,
            angle_index: 0,
            sanitized: 0,
        }
    }

    #[test]
    fn dispatch_reaches_every_sink() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut set = SinkSet::new();
        set.register(Box::new(Counting(Arc::clone(&hits)))).expect("first");
        set.register(Box::new(Counting(Arc::clone(&hits)))).expect("second");

        let block = AudioBlock::silent(8, 16_000);
        set.dispatch(&block, &output(8), DirectionEstimate::default());
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut set = SinkSet::new();
        for _ in 0..MAX_SINKS {
            set.register(Box::new(Counting(Arc::clone(&hits)))).expect("room");
        }
        let err = set
            .register(Box::new(Counting(Arc::clone(&hits))))
            .unwrap_err();
        assert_eq!(err, SinkError::Full(MAX_SINKS));
        assert_eq!(set.len(), MAX_SINKS);
    }

    #[test]
    fn unregistered_sink_stops_receiving_and_slot_is_reused() {
        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));
        let mut set = SinkSet::new();
        let first = set
            .register(Box::new(Counting(Arc::clone(&first_hits))))
            .expect("first");
        let second = set
            .register(Box::new(Counting(Arc::clone(&second_hits))))
            .expect("second");

        let removed = set.unregister(first).expect("registered");
        assert_eq!(removed.name(), "counting");
        assert_eq!(set.len(), 1);

        let block = AudioBlock::silent(8, 16_000);
        set.dispatch(&block, &output(8), DirectionEstimate::default());
        assert_eq!(first_hits.load(Ordering::Relaxed), 0);
        assert_eq!(second_hits.load(Ordering::Relaxed), 1);

        assert_eq!(set.unregister(first).err(), Some(SinkError::Unknown(first)));
        assert_eq!(
            set.unregister(MAX_SINKS + 3).err(),
            Some(SinkError::Unknown(MAX_SINKS + 3))
        );

        // The freed slot comes back; the other index is untouched.
        let again = set
            .register(Box::new(Counting(Arc::clone(&first_hits))))
            .expect("room");
        assert_eq!(again, first);
        assert_ne!(again, second);
    }

    // ---- RawRecorder ----

    #[test]
    fn raw_recorder_accumulates_and_takes() {
        let mut raw = RawRecorder::new();
        let mut block = AudioBlock::silent(4, 16_000);
        block.channels[3] = vec![0.1, 0.2, 0.3, 0.4];

        raw.on_block(&block, &output(4), DirectionEstimate::default());
        raw.on_block(&block, &output(4), DirectionEstimate::default());
        assert_eq!(raw.len(), 8);

        let taken = raw.take();
        assert_eq!(taken.len(), 4);
        assert_eq!(taken[3][5], 0.2);
        assert!(raw.is_empty());
    }

    #[test]
    fn raw_recorder_restore_keeps_order() {
        let mut raw = RawRecorder::new();
        let mut block = AudioBlock::silent(2, 16_000);
        block.channels[0] = vec![0.1, 0.2];
        raw.on_block(&block, &output(2), DirectionEstimate::default());
        let taken = raw.take();

        block.channels[0] = vec![0.3, 0.4];
        raw.on_block(&block, &output(2), DirectionEstimate::default());
        raw.restore(taken);

        assert_eq!(raw.len(), 4);
        assert_eq!(raw.take()[0], vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn raw_recorder_trims_ragged_block() {
        let mut raw = RawRecorder::new();
        let mut block = AudioBlock::silent(4, 16_000);
        block.channels[1].pop();
        raw.on_block(&block, &output(3), DirectionEstimate::default());
        assert!(raw.take().iter().all(|c| c.len() == 3));
    }
}
