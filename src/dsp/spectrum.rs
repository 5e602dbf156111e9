//! Per-channel FFT front end for the DOA estimator.
//!
//! [`SpectrumAnalyzer`] removes the DC offset, applies a Hann window and
//! runs a forward FFT planned once with `rustfft`.  Only the requested bins
//! are copied out, so the caller never holds the full spectrum.

use std::fmt;
use std::sync::Arc;

use rustfft::{num_complex::Complex64, Fft, FftPlanner};

use super::window::hann;

/// Windowed FFT of fixed size.
pub struct SpectrumAnalyzer {
    size: usize,
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    buffer: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl SpectrumAnalyzer {
    /// Plan a forward FFT of `size` points.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            size,
            fft,
            window: hann(size),
            buffer: vec![Complex64::new(0.0, 0.0); size],
            scratch,
        }
    }

    /// FFT length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transform `samples` (DC removed, Hann windowed) and write the values
    /// of `bins` into `out`, in the same order.
    ///
    /// `samples` shorter than the FFT size are zero-padded; extra samples
    /// are ignored.  Bins at or beyond the FFT size read as zero.
    pub fn analyze(&mut self, samples: &[f32], bins: &[usize], out: &mut Vec<Complex64>) {
        let n = samples.len().min(self.size);
        let mean = if n == 0 {
            0.0
        } else {
            samples[..n].iter().map(|&s| s as f64).sum::<f64>() / n as f64
        };

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let v = if i < n {
                (samples[i] as f64 - mean) * self.window[i]
            } else {
                0.0
            };
            *slot = Complex64::new(v, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        out.clear();
        out.extend(bins.iter().map(|&b| {
            self.buffer
                .get(b)
                .copied()
                .unwrap_or_else(|| Complex64::new(0.0, 0.0))
        }));
    }
}
