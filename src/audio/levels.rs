//! Signal level metering for status reports and the console meter.
//!
//! # Example
//!
//! ```rust
//! use array_steer::audio::Levels;
//!
//! let square: Vec<f32> = (0..160).map(|n| if n % 2 == 0 { 0.5 } else { -0.5 }).collect();
//! let levels = Levels::measure(&square);
//! assert!((levels.rms - 0.5).abs() < 1e-6);
//! assert!((levels.peak - 0.5).abs() < 1e-6);
//! assert!((levels.rms_dbfs() + 6.02).abs() < 0.01);
//! ```

use crate::array::NUM_MICS;

use super::AudioBlock;

/// Floor reported for digital silence.
pub const SILENCE_DBFS: f32 = -120.0;

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

/// RMS and peak amplitude of one stretch of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Levels {
    pub rms: f32,
    pub peak: f32,
}

impl Levels {
    /// Measure `samples`.  Non-finite values are skipped.
    pub fn measure(samples: &[f32]) -> Self {
        let mut sum_sq = 0.0_f64;
        let mut count = 0_usize;
        let mut peak = 0.0_f32;
        for &s in samples.iter().filter(|s| s.is_finite()) {
            sum_sq += (s as f64) * (s as f64);
            count += 1;
            peak = peak.max(s.abs());
        }
        let rms = if count == 0 {
            0.0
        } else {
            (sum_sq / count as f64).sqrt() as f32
        };
        Self { rms, peak }
    }

    /// Per-microphone levels of a block.
    pub fn of_block(block: &AudioBlock) -> [Self; NUM_MICS] {
        std::array::from_fn(|m| Self::measure(&block.channels[m]))
    }

    pub fn rms_dbfs(&self) -> f32 {
        to_dbfs(self.rms)
    }

    pub fn peak_dbfs(&self) -> f32 {
        to_dbfs(self.peak)
    }
}

/// Amplitude to dBFS, floored at [`SILENCE_DBFS`].
pub fn to_dbfs(amplitude: f32) -> f32 {
    if amplitude <= 0.0 || !amplitude.is_finite() {
        return SILENCE_DBFS;
    }
    (20.0 * amplitude.log10()).max(SILENCE_DBFS)
}

/// RMS envelope of `audio` in `num_bars` equal chunks, each clamped to
/// `[0, 1]`.  Missing bars are padded with 0.
pub fn envelope(audio: &[f32], num_bars: usize) -> Vec<f32> {
    if num_bars == 0 {
        return Vec::new();
    }
    if audio.is_empty() {
        return vec![0.0; num_bars];
    }
    let chunk_size = (audio.len() / num_bars).max(1);
    let mut bars: Vec<f32> = audio
        .chunks(chunk_size)
        .take(num_bars)
        .map(|chunk| Levels::measure(chunk).rms.min(1.0))
        .collect();
    bars.resize(num_bars, 0.0);
    bars
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_measures_zero() {
        let levels = Levels::measure(&[0.0; 64]);
        assert_eq!(levels, Levels::default());
        assert_eq!(levels.rms_dbfs(), SILENCE_DBFS);
    }

    #[test]
    fn full_scale_is_zero_dbfs() {
        assert!(to_dbfs(1.0).abs() < 1e-6);
        assert!((to_dbfs(0.1) + 20.0).abs() < 1e-4);
    }

    #[test]
    fn non_finite_skipped() {
        let levels = Levels::measure(&[f32::NAN, 0.5, -0.5, f32::INFINITY]);
        assert!((levels.rms - 0.5).abs() < 1e-6);
        assert!((levels.peak - 0.5).abs() < 1e-6);
    }

    #[test]
    fn per_channel_levels() {
        let mut block = AudioBlock::silent(100, 16_000);
        block.channels[2] = vec![0.25; 100];
        let levels = Levels::of_block(&block);
        assert_eq!(levels[0].rms, 0.0);
        assert!((levels[2].rms - 0.25).abs() < 1e-6);
    }

    // ---- envelope ----

    #[test]
    fn envelope_bar_count_and_range() {
        let bars = envelope(&vec![1.0_f32; 1_600], 10);
        assert_eq!(bars.len(), 10);
        assert!(bars.iter().all(|&b| (0.0..=1.0).contains(&b)));
    }

    #[test]
    fn envelope_pads_short_input() {
        let bars = envelope(&[0.5, 0.5], 5);
        assert_eq!(bars.len(), 5);
        assert!((bars[0] - 0.5).abs() < 1e-6);
        assert_eq!(bars[4], 0.0);
    }

    #[test]
    fn envelope_zero_bars() {
        assert!(envelope(&[0.1; 10], 0).is_empty());
    }
}
