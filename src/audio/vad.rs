//! Energy-based activity gate.
//!
//! [`ActivityGate`] decides whether a four-microphone block carries enough
//! signal to be worth a direction search.  Each channel's DC mean is removed
//! first, so a biased ADC does not read as activity; the remaining RMS over
//! all four channels is compared to a fixed threshold.
//!
//! ```rust
//! use array_steer::audio::{ActivityGate, AudioBlock};
//!
//! let gate = ActivityGate::new(0.005);
//!
//! // A constant offset is not activity.
//! let biased = AudioBlock::new(std::array::from_fn(|_| vec![0.3_f32; 256]), 16_000);
//! assert!(!gate.is_active(&biased));
//! ```

use super::AudioBlock;

// ---------------------------------------------------------------------------
// ActivityGate
// ---------------------------------------------------------------------------

/// RMS threshold gate over the four microphone channels.
#[derive(Debug, Clone, Copy)]
pub struct ActivityGate {
    /// Blocks whose DC-free RMS does not exceed this are inactive.
    rms_threshold: f32,
}

impl ActivityGate {
    pub fn new(rms_threshold: f32) -> Self {
        Self { rms_threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    /// RMS of the block after removing each channel's mean.
    ///
    /// Empty blocks measure 0.  Non-finite samples propagate into the result.
    pub fn measure(&self, block: &AudioBlock) -> f32 {
        let mut sum_sq = 0.0_f64;
        let mut count = 0_usize;
        for channel in &block.channels {
            if channel.is_empty() {
                continue;
            }
            let mean = channel.iter().map(|&s| s as f64).sum::<f64>() / channel.len() as f64;
            sum_sq += channel
                .iter()
                .map(|&s| (s as f64 - mean).powi(2))
                .sum::<f64>();
            count += channel.len();
        }
        if count == 0 {
            return 0.0;
        }
        (sum_sq / count as f64).sqrt() as f32
    }

    /// Returns `true` when the block is loud enough to search.
    pub fn is_active(&self, block: &AudioBlock) -> bool {
        self.measure(block) > self.rms_threshold
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn block_of(value: impl Fn(usize) -> f32) -> AudioBlock {
        let channel: Vec<f32> = (0..480).map(&value).collect();
        AudioBlock::new(std::array::from_fn(|_| channel.clone()), 16_000)
    }

    #[test]
    fn silence_is_inactive() {
        let gate = ActivityGate::new(0.005);
        let block = AudioBlock::silent(480, 16_000);
        assert_eq!(gate.measure(&block), 0.0);
        assert!(!gate.is_active(&block));
    }

    #[test]
    fn dc_offset_is_ignored() {
        let gate = ActivityGate::new(0.005);
        assert!(gate.measure(&block_of(|_| -0.25)) < 1e-6);
    }

    #[test]
    fn square_wave_rms() {
        let gate = ActivityGate::new(0.005);
        let block = block_of(|n| if n % 2 == 0 { 0.5 } else { -0.5 });
        assert!((gate.measure(&block) - 0.5).abs() < 1e-6);
        assert!(gate.is_active(&block));
    }

    #[test]
    fn quiet_signal_below_threshold() {
        let gate = ActivityGate::new(0.01);
        let block = block_of(|n| if n % 2 == 0 { 0.004 } else { -0.004 });
        assert!(!gate.is_active(&block));
    }

    #[test]
    fn empty_block_measures_zero() {
        let gate = ActivityGate::new(0.005);
        assert_eq!(gate.measure(&AudioBlock::silent(0, 16_000)), 0.0);
    }

    #[test]
    fn threshold_getter() {
        let gate = ActivityGate::new(0.05);
        assert!((gate.threshold() - 0.05).abs() < 1e-7);
    }
}
