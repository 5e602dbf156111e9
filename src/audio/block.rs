//! Fixed-size four-microphone blocks and the assembler that cuts them out of
//! whatever buffer sizes the capture callback delivers.

use std::time::Duration;

use crate::array::NUM_MICS;

// ---------------------------------------------------------------------------
// deinterleave
// ---------------------------------------------------------------------------

/// Split interleaved frames into the four microphone channels.
///
/// Microphones are channels `first_mic..first_mic + 4` of each
/// `total_channels`-wide frame.  A trailing partial frame is ignored.
///
/// # Example
///
/// ```rust
/// use array_steer::audio::deinterleave;
///
/// // Two 6-channel frames: channel index encoded in the value.
/// let frames = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
/// let mics = deinterleave(&frames, 6, 1);
/// assert_eq!(mics[0], vec![1.0, 11.0]);
/// assert_eq!(mics[3], vec![4.0, 14.0]);
/// ```
pub fn deinterleave(
    frames: &[f32],
    total_channels: usize,
    first_mic: usize,
) -> [Vec<f32>; NUM_MICS] {
    let frame_count = if total_channels == 0 {
        0
    } else {
        frames.len() / total_channels
    };
    let mut channels: [Vec<f32>; NUM_MICS] =
        std::array::from_fn(|_| Vec::with_capacity(frame_count));
    if total_channels < first_mic + NUM_MICS {
        return channels;
    }
    for frame in frames.chunks_exact(total_channels) {
        for (m, channel) in channels.iter_mut().enumerate() {
            channel.push(frame[first_mic + m]);
        }
    }
    channels
}

// ---------------------------------------------------------------------------
// AudioBlock
// ---------------------------------------------------------------------------

/// One block of four-microphone audio, consumed once by the DOA estimator and
/// once by the beamformer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Per-microphone samples in `[-1.0, 1.0]`.
    pub channels: [Vec<f32>; NUM_MICS],
    pub sample_rate: u32,
    /// Position of the block in the capture stream, starting at 0.
    pub sequence: u64,
    /// Stream time of the first sample.
    pub timestamp: Duration,
}

impl AudioBlock {
    pub fn new(channels: [Vec<f32>; NUM_MICS], sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            sequence: 0,
            timestamp: Duration::ZERO,
        }
    }

    /// Build a block from interleaved capture frames.
    pub fn from_interleaved(
        frames: &[f32],
        total_channels: usize,
        first_mic: usize,
        sample_rate: u32,
    ) -> Self {
        Self::new(deinterleave(frames, total_channels, first_mic), sample_rate)
    }

    /// Tag the block with its stream position.
    pub fn with_sequence(mut self, sequence: u64, timestamp: Duration) -> Self {
        self.sequence = sequence;
        self.timestamp = timestamp;
        self
    }

    /// A block of digital silence.
    pub fn silent(len: usize, sample_rate: u32) -> Self {
        Self::new(std::array::from_fn(|_| vec![0.0; len]), sample_rate)
    }

    /// Samples per channel (the shortest channel if they disagree).
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All channels non-empty and of equal length.
    pub fn is_well_formed(&self) -> bool {
        let len = self.channels[0].len();
        len > 0 && self.channels.iter().all(|c| c.len() == len)
    }

    /// No NaN or infinite samples.
    pub fn is_finite(&self) -> bool {
        self.channels.iter().flatten().all(|s| s.is_finite())
    }

    /// Duration covered by the block.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }
}

// ---------------------------------------------------------------------------
// BlockAssembler
// ---------------------------------------------------------------------------

/// Re-chunks interleaved callback buffers of any size into exact
/// `block_size`-frame [`AudioBlock`]s.
///
/// Leftover frames are kept for the next call, so no sample is lost or
/// duplicated across block boundaries.
#[derive(Debug)]
pub struct BlockAssembler {
    block_size: usize,
    total_channels: usize,
    first_mic: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    sequence: u64,
}

impl BlockAssembler {
    pub fn new(
        block_size: usize,
        total_channels: usize,
        first_mic: usize,
        sample_rate: u32,
    ) -> Self {
        Self {
            block_size,
            total_channels,
            first_mic,
            sample_rate,
            pending: Vec::with_capacity(2 * block_size * total_channels),
            sequence: 0,
        }
    }

    /// Append interleaved `data` and hand every completed block to `emit`.
    pub fn push(&mut self, data: &[f32], mut emit: impl FnMut(AudioBlock)) {
        self.pending.extend_from_slice(data);
        let block_len = self.block_size * self.total_channels;
        if block_len == 0 {
            self.pending.clear();
            return;
        }

        let mut consumed = 0;
        while self.pending.len() - consumed >= block_len {
            let frames = &self.pending[consumed..consumed + block_len];
            let timestamp = Duration::from_secs_f64(
                self.sequence as f64 * self.block_size as f64 / self.sample_rate.max(1) as f64,
            );
            let block = AudioBlock::from_interleaved(
                frames,
                self.total_channels,
                self.first_mic,
                self.sample_rate,
            )
            .with_sequence(self.sequence, timestamp);
            self.sequence += 1;
            consumed += block_len;
            emit(block);
        }
        self.pending.drain(..consumed);
    }

    /// Drop any partial block and restart numbering.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.sequence = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Interleaved 6-channel frames where sample `n` of channel `c` is
    /// `n * 10 + c`.
    fn frames(count: usize, start: usize) -> Vec<f32> {
        (start..start + count)
            .flat_map(|n| (0..6).map(move |c| (n * 10 + c) as f32))
            .collect()
    }

    // ---- deinterleave ----

    #[test]
    fn deinterleave_picks_mic_channels() {
        let mics = deinterleave(&frames(3, 0), 6, 1);
        assert_eq!(mics[0], vec![1.0, 11.0, 21.0]);
        assert_eq!(mics[2], vec![3.0, 13.0, 23.0]);
    }

    #[test]
    fn deinterleave_too_few_channels_is_empty() {
        let mics = deinterleave(&[0.0; 8], 4, 1);
        assert!(mics.iter().all(Vec::is_empty));
    }

    #[test]
    fn deinterleave_ignores_partial_frame() {
        let mut data = frames(2, 0);
        data.extend([1.0, 2.0, 3.0]);
        let mics = deinterleave(&data, 6, 0);
        assert_eq!(mics[0].len(), 2);
    }

    // ---- AudioBlock ----

    #[test]
    fn silent_block_shape() {
        let block = AudioBlock::silent(1024, 16_000);
        assert_eq!(block.len(), 1024);
        assert!(block.is_well_formed());
        assert!(block.is_finite());
        assert!((block.duration().as_secs_f64() - 0.064).abs() < 1e-9);
    }

    #[test]
    fn ragged_block_is_not_well_formed() {
        let mut block = AudioBlock::silent(16, 16_000);
        block.channels[2].pop();
        assert!(!block.is_well_formed());
        assert_eq!(block.len(), 15);
    }

    #[test]
    fn nan_block_is_not_finite() {
        let mut block = AudioBlock::silent(16, 16_000);
        block.channels[1][5] = f32::NAN;
        assert!(!block.is_finite());
    }

    // ---- BlockAssembler ----

    #[test]
    fn assembler_emits_exact_blocks_across_uneven_buffers() {
        let mut assembler = BlockAssembler::new(4, 6, 1, 16_000);
        let mut blocks = Vec::new();

        assembler.push(&frames(3, 0), |b| blocks.push(b));
        assert!(blocks.is_empty());

        assembler.push(&frames(7, 3), |b| blocks.push(b));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].channels[0], vec![1.0, 11.0, 21.0, 31.0]);
        assert_eq!(blocks[1].channels[0], vec![41.0, 51.0, 61.0, 71.0]);
        assert_eq!(blocks[1].sequence, 1);
        assert_eq!(blocks[1].timestamp, Duration::from_secs_f64(4.0 / 16_000.0));

        // Two frames (80, 90) remain pending.
        assembler.push(&frames(2, 10), |b| blocks.push(b));
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].channels[3], vec![84.0, 94.0, 104.0, 114.0]);
        assert_eq!(blocks[2].sequence, 2);
    }

    #[test]
    fn assembler_reset_drops_partial() {
        let mut assembler = BlockAssembler::new(4, 6, 1, 16_000);
        let mut count = 0;
        assembler.push(&frames(3, 0), |_| count += 1);
        assembler.reset();
        assembler.push(&frames(3, 0), |_| count += 1);
        assert_eq!(count, 0);
        assembler.push(&frames(1, 3), |_| count += 1);
        assert_eq!(count, 1);
    }
}
