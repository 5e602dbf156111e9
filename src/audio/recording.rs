//! Accumulated output awaiting a flush, and the save-time conditioning applied
//! to it.
//!
//! | Stage | Where | Effect |
//! |-------|-------|--------|
//! | Accumulate | worker thread, every block | samples appended unchanged |
//! | Condition | flush, off the capture thread | whole buffer scaled down if its peak exceeds the ceiling |
//! | Persist | [`super::WavStore`] | 16-bit PCM |
//!
//! # Example
//!
//! ```rust
//! use array_steer::audio::{condition, Recording};
//!
//! let mut rec = Recording::new(16_000);
//! rec.append(&[0.2, -1.6, 0.4]);
//! let mut samples = rec.take();
//! assert!(rec.is_empty());
//!
//! let scale = condition(&mut samples, 0.8);
//! assert!((scale - 0.5).abs() < 1e-6);
//! assert!((samples[1] + 0.8).abs() < 1e-6);
//! ```

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// Growable mono buffer of beamformed output.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Recording {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    pub fn append(&mut self, data: &[f32]) {
        self.samples.extend_from_slice(data);
    }

    /// Hand over everything accumulated so far, leaving the recording empty.
    pub fn take(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }

    /// Put back samples handed out by [`take`](Self::take) whose save
    /// failed.  They go ahead of anything appended since.
    pub fn restore(&mut self, mut samples: Vec<f32>) {
        samples.extend_from_slice(&self.samples);
        self.samples = samples;
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Largest absolute sample, ignoring non-finite values.
    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }
}

// ---------------------------------------------------------------------------
// Conditioning
// ---------------------------------------------------------------------------

/// Largest finite absolute value in `samples` (0 when empty).
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| s.abs())
        .fold(0.0_f32, f32::max)
}

/// Prepare a buffer for 16-bit persistence.
///
/// Non-finite samples become 0.  If the peak exceeds `ceiling` the whole
/// buffer is scaled so the peak lands exactly on it; a single global factor
/// keeps relative levels intact.  Finally every sample is clamped to
/// `[-1, 1]`.  Returns the scale that was applied (1.0 when untouched).
pub fn condition(samples: &mut [f32], ceiling: f32) -> f32 {
    for s in samples.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
        }
    }

    let peak = peak(samples);
    let scale = if ceiling > 0.0 && peak > ceiling {
        ceiling / peak
    } else {
        1.0
    };

    for s in samples.iter_mut() {
        *s = (*s * scale).clamp(-1.0, 1.0);
    }
    scale
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
