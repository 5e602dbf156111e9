//! The per-block beamforming chain.

use std::sync::Arc;

use crate::array::{QuantizedDelayTable, NUM_MICS};
use crate::audio::AudioBlock;
use crate::config::{BeamformerConfig, FilterMode};
use crate::doa::DirectionEstimate;
use crate::dsp::window::{half_cosine_fade, hann};
use crate::dsp::{BandPass, Compressor, FilterError};

use super::align::{align_fractional, align_integer};
use super::gain::AdaptiveGain;

// ---------------------------------------------------------------------------
// BeamOutput
// ---------------------------------------------------------------------------

/// One conditioned output block.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamOutput {
    /// Mono samples, same length as the input block.
    pub samples: Vec<f32>,
    /// Adaptive gain applied before compression.
    pub gain: f32,
    /// Delay-table row the block was steered to.
    pub angle_index: usize,
    /// Samples replaced with zero because they were not finite.
    pub sanitized: usize,
}

// ---------------------------------------------------------------------------
// Beamformer
// ---------------------------------------------------------------------------

/// Delay-sum beamformer with adaptive gain, compression, band-pass and an
/// edge fade.  Owns the filter and compressor state.
pub struct Beamformer {
    table: Arc<QuantizedDelayTable>,
    fractional: bool,
    window_input: bool,
    gain: AdaptiveGain,
    compressor: Compressor,
    band_pass: BandPass,
    filter_mode: FilterMode,
    filter_fallback: bool,
    fade: Vec<f32>,
    window: Vec<f64>,
}

impl Beamformer {
    /// Build the chain.  Fails if the band-pass cannot be designed at
    /// `sample_rate`.
    pub fn new(
        config: &BeamformerConfig,
        table: Arc<QuantizedDelayTable>,
        sample_rate: u32,
    ) -> Result<Self, FilterError> {
        let band_pass = if config.band_pass.enabled {
            BandPass::design(
                config.band_pass.low_hz,
                config.band_pass.high_hz,
                config.band_pass.order,
                sample_rate as f64,
            )?
        } else {
            BandPass::identity()
        };
        Ok(Self::with_filter(config, table, band_pass, false))
    }

    /// Like [`new`](Self::new), but an unusable band-pass is replaced by a
    /// pass-through filter instead of failing.
    pub fn new_or_passthrough(
        config: &BeamformerConfig,
        table: Arc<QuantizedDelayTable>,
        sample_rate: u32,
    ) -> Self {
        match Self::new(config, Arc::clone(&table), sample_rate) {
            Ok(beamformer) => beamformer,
            Err(e) => {
                log::warn!("beamformer: {e}; band-pass disabled");
                Self::with_filter(config, table, BandPass::identity(), true)
            }
        }
    }

    fn with_filter(
        config: &BeamformerConfig,
        table: Arc<QuantizedDelayTable>,
        band_pass: BandPass,
        filter_fallback: bool,
    ) -> Self {
        Self {
            table,
            fractional: config.fractional_alignment,
            window_input: config.window_input,
            gain: AdaptiveGain::new(&config.gain),
            compressor: Compressor::new(&config.compressor),
            band_pass,
            filter_mode: config.band_pass.mode,
            filter_fallback,
            fade: half_cosine_fade(config.fade_len),
            window: Vec::new(),
        }
    }

    /// `true` when the configured band-pass was replaced by a pass-through.
    pub fn filter_fallback(&self) -> bool {
        self.filter_fallback
    }

    /// Current compressor gain.
    pub fn compressor_gain(&self) -> f32 {
        self.compressor.gain()
    }

    /// Clear filter, compressor and gain-run state.
    pub fn reset(&mut self) {
        self.band_pass.reset();
        self.compressor.reset();
        self.gain.reset();
    }

    /// Steer to `direction` and condition one block.
    pub fn process(&mut self, block: &AudioBlock, direction: DirectionEstimate) -> BeamOutput {
        let len = block.len();
        let angle_index = self.table.index_for(direction.angle_deg);

        let windowed: [Vec<f32>; NUM_MICS];
        let channels = if self.window_input {
            if self.window.len() != len {
                self.window = hann(len);
            }
            let window = &self.window;
            windowed = std::array::from_fn(|m| {
                block.channels[m]
                    .iter()
                    .zip(window)
                    .map(|(&x, &w)| (x as f64 * w) as f32)
                    .collect()
            });
            &windowed
        } else {
            &block.channels
        };

        let mut samples = if self.fractional {
            align_fractional(channels, self.table.exact_row(angle_index), len)
        } else {
            align_integer(channels, self.table.row(angle_index), len)
        };

        let gain = self.gain.next(direction.confidence);
        samples.iter_mut().for_each(|s| *s *= gain);

        self.compressor.process(&mut samples);

        match self.filter_mode {
            FilterMode::Causal => self.band_pass.process(&mut samples),
            FilterMode::ZeroPhase => self.band_pass.process_zero_phase(&mut samples),
        }

        let fade_len = self.fade.len().min(len);
        let tail = len - fade_len;
        let fade = &self.fade[self.fade.len() - fade_len..];
        for (s, f) in samples[tail..].iter_mut().zip(fade) {
            *s *= f;
        }

        let sanitized = sanitize(&mut samples);
        if sanitized > 0 {
            log::warn!("beamformer: replaced {sanitized} non-finite samples");
        }

        BeamOutput {
            samples,
            gain,
            angle_index,
            sanitized,
        }
    }
}

/// Replace NaN and infinite samples with zero; returns how many changed.
pub fn sanitize(samples: &mut [f32]) -> usize {
    let mut replaced = 0;
    for s in samples.iter_mut().filter(|s| !s.is_finite()) {
        *s = 0.0;
        replaced += 1;
    }
    replaced
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
