// ============================================================================
// Compressor: moving-average envelope, dB-domain reduction, smoothed gain
// ============================================================================
//
// Per sample:
//   envelope  = mean(|x|) over the last `envelope_window` samples
//   excess_db = max(0, 20 log10(envelope) - threshold_db)
//   target    = 10^(-excess_db * (1 - 1/ratio) / 20)
//   gain      = s * gain + (1 - s) * target
//   y         = x * gain
//
// The envelope window and the smoothed gain persist across blocks.

use crate::config::CompressorConfig;

/// Envelope level treated as silence (avoids log of zero).
const ENVELOPE_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f64,
    slope: f64,
    smoothing: f32,
    window: Vec<f32>,
    index: usize,
    sum: f64,
    gain: f32,
}

impl Compressor {
    pub fn new(config: &CompressorConfig) -> Self {
        let window_len = config.envelope_window.max(1);
        Self {
            threshold_db: config.threshold_db as f64,
            slope: 1.0 - 1.0 / (config.ratio.max(1.0) as f64),
            smoothing: config.gain_smoothing.clamp(0.0, 0.999_999),
            window: vec![0.0; window_len],
            index: 0,
            sum: 0.0,
            gain: 1.0,
        }
    }

    /// Gain currently applied (after smoothing).
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Static curve: linear gain for an envelope level.
    pub fn target_gain(&self, envelope: f64) -> f32 {
        let level_db = 20.0 * envelope.max(ENVELOPE_FLOOR).log10();
        let excess_db = (level_db - self.threshold_db).max(0.0);
        10.0_f64.powf(-excess_db * self.slope / 20.0) as f32
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        let len = self.window.len();
        for sample in samples.iter_mut() {
            let magnitude = sample.abs();
            self.sum += magnitude as f64 - self.window[self.index] as f64;
            self.window[self.index] = magnitude;
            self.index = (self.index + 1) % len;

            // Running sum can drift slightly negative.
            let envelope = (self.sum / len as f64).max(0.0);
            let target = self.target_gain(envelope);
            self.gain = self.smoothing * self.gain + (1.0 - self.smoothing) * target;

            *sample *= self.gain;
        }

        if !self.sum.is_finite() || !self.gain.is_finite() {
            log::warn!("compressor: non-finite envelope, resetting");
            self.reset();
        }
    }

    /// Forget the envelope history and return to unity gain.
    pub fn reset(&mut self) {
        self.window.iter_mut().for_each(|v| *v = 0.0);
        self.index = 0;
        self.sum = 0.0;
        self.gain = 1.0;
    }
}
