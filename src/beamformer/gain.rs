//! Confidence-tiered output gain.

use crate::config::GainConfig;

/// Confidence band a block fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainTier {
    High,
    Mid,
    Low,
}

/// Base gain times a per-tier multiplier, plus a small bonus once the
/// estimator has stayed in the high tier for a sustained run of blocks.
#[derive(Debug, Clone)]
pub struct AdaptiveGain {
    config: GainConfig,
    high_run: u32,
}

impl AdaptiveGain {
    pub fn new(config: &GainConfig) -> Self {
        Self {
            config: config.clone(),
            high_run: 0,
        }
    }

    pub fn tier(&self, confidence: f64) -> GainTier {
        if confidence >= self.config.high_confidence {
            GainTier::High
        } else if confidence >= self.config.low_confidence {
            GainTier::Mid
        } else {
            GainTier::Low
        }
    }

    /// Gain for the next block at `confidence`; advances the high-tier run.
    pub fn next(&mut self, confidence: f64) -> f32 {
        let tier = self.tier(confidence);
        let multiplier = match tier {
            GainTier::High => {
                self.high_run = self.high_run.saturating_add(1);
                self.config.high_gain
            }
            GainTier::Mid => {
                self.high_run = 0;
                self.config.mid_gain
            }
            GainTier::Low => {
                self.high_run = 0;
                self.config.low_gain
            }
        };
        let after = self.config.bonus_after_blocks;
        let bonus = if after > 0 && self.high_run > after {
            self.config.bonus_gain
        } else {
            1.0
        };
        self.config.base_gain * multiplier * bonus
    }

    /// Consecutive high-tier blocks so far.
    pub fn high_run(&self) -> u32 {
        self.high_run
    }

    pub fn reset(&mut self) {
        self.high_run = 0;
    }
}
