//! SRP-PHAT direction finder.
//!
//! For every block the estimator gates on activity, transforms each channel,
//! whitens the cross-spectrum of every microphone pair and scores candidate
//! angles by summing the real part of the whitened cross-spectra rotated by
//! the phase each angle predicts:
//!
//! ```text
//! score(θ) = Σ_pairs Σ_bins Re{ X_i X_j* / |X_i X_j*| · exp(j 2π f (d_i(θ) - d_j(θ))) }
//! ```
//!
//! A coarse pass over the whole circle finds the peak region and the score
//! statistics used for confidence; a fine pass at full resolution around the
//! peak picks the raw angle.  Between coarse refreshes the estimator only
//! runs the fine pass around the last raw angle.

use std::sync::Arc;

use rustfft::num_complex::Complex64;

use crate::array::{normalize_deg, DelayTable, NUM_MICS};
use crate::audio::{ActivityGate, AudioBlock};
use crate::config::{DoaConfig, PairSet};
use crate::dsp::SpectrumAnalyzer;

use super::bins::select_bins;
use super::direction::{DirectionCell, DirectionEstimate, OffsetCell};
use super::smoothing::SmoothingState;

/// Cross-spectrum magnitudes at or below this are left out of the score.
const CROSS_MAGNITUDE_FLOOR: f64 = 1e-12;

/// Keeps the confidence denominator away from zero.
const CONFIDENCE_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Which search the most recent block ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// No search: the block was inactive or unusable.
    Idle,
    /// Full-circle coarse pass followed by a fine pass around its peak.
    CoarseSearch,
    /// Fine pass around the previous raw angle only.
    FineSearch,
}

/// Why a searched block did not produce a fresh angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// No pair/bin had cross-spectral energy above the floor.
    NoUsableEnergy,
    /// The best steered score was below the configured floor.
    BelowScoreFloor,
    /// The peak was not distinct enough to trust.
    LowConfidence,
}

/// Why a block was not searched at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// RMS below the activity threshold.
    Inactive,
    /// The block contained NaN or infinite samples.
    NonFinite,
    /// Channels were empty or of unequal length.
    Malformed,
}

/// Result of feeding one block to [`DoaEstimator::process`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DoaOutcome {
    /// A new angle was accepted into the smoothing history.
    Updated(DirectionEstimate),
    /// Searched, but the previous angle was kept with reduced confidence.
    Degraded {
        estimate: DirectionEstimate,
        reason: DegradeReason,
    },
    /// Not searched; the previous angle was kept and confidence decayed.
    Skipped {
        estimate: DirectionEstimate,
        reason: SkipReason,
    },
}

impl DoaOutcome {
    /// The estimate published for this block.
    pub fn estimate(&self) -> DirectionEstimate {
        match *self {
            DoaOutcome::Updated(estimate)
            | DoaOutcome::Degraded { estimate, .. }
            | DoaOutcome::Skipped { estimate, .. } => estimate,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, DoaOutcome::Updated(_))
    }
}

/// Score statistics of the latest coarse pass.
#[derive(Debug, Clone, Copy)]
struct CoarseStats {
    median: f64,
    min: f64,
    max: f64,
}

// ---------------------------------------------------------------------------
// DoaEstimator
// ---------------------------------------------------------------------------

/// Streaming SRP-PHAT estimator owning the smoothing history and publishing
/// into a shared [`DirectionCell`].
pub struct DoaEstimator {
    table: Arc<DelayTable>,
    gate: ActivityGate,
    analyzer: SpectrumAnalyzer,
    bins: Vec<usize>,
    /// `2π f` for each selected bin.
    omegas: Vec<f64>,
    pairs: Vec<(usize, usize)>,
    coarse_step: usize,
    fine_steps: usize,
    refresh_blocks: u32,
    score_floor: f64,
    low_confidence: f64,
    low_confidence_discount: f64,
    inactive_decay: f64,

    spectra: [Vec<Complex64>; NUM_MICS],
    /// PHAT-whitened cross-spectra, `pairs.len() * bins.len()`, pair-major.
    cross: Vec<Complex64>,

    coarse: Option<CoarseStats>,
    blocks_since_coarse: u32,
    last_raw: Option<usize>,
    smoothing: SmoothingState,
    smoothed_deg: f64,
    confidence: f64,
    phase: SearchPhase,

    offset: Arc<OffsetCell>,
    published: Arc<DirectionCell>,
}

impl DoaEstimator {
    /// Build an estimator for blocks of `fft_size` samples at `sample_rate`.
    pub fn new(
        config: &DoaConfig,
        table: Arc<DelayTable>,
        sample_rate: u32,
        fft_size: usize,
    ) -> Self {
        let selected = select_bins(&config.bins, sample_rate, fft_size);
        if selected.is_empty() {
            log::warn!("doa: no frequency bins selected, every block will be degraded");
        } else {
            log::debug!(
                "doa: {} bins from {:.0} to {:.0} Hz",
                selected.len(),
                selected[0].1,
                selected[selected.len() - 1].1
            );
        }
        let bins: Vec<usize> = selected.iter().map(|b| b.0).collect();
        let omegas: Vec<f64> = selected
            .iter()
            .map(|b| 2.0 * std::f64::consts::PI * b.1)
            .collect();

        let mut pairs = vec![(0, 1), (1, 2), (2, 3), (3, 0)];
        if config.pairs == PairSet::AdjacentAndDiagonal {
            pairs.extend([(0, 2), (1, 3)]);
        }

        let resolution = table.resolution_deg();
        let coarse_step = ((config.coarse_stride_deg / resolution).round() as usize).max(1);
        let fine_steps = (config.fine_half_width_deg / resolution).round() as usize;

        let estimator = Self {
            cross: Vec::with_capacity(pairs.len() * bins.len()),
            spectra: std::array::from_fn(|_| Vec::with_capacity(bins.len())),
            table,
            gate: ActivityGate::new(config.activity_threshold),
            analyzer: SpectrumAnalyzer::new(fft_size),
            bins,
            omegas,
            pairs,
            coarse_step,
            fine_steps,
            refresh_blocks: config.coarse_refresh_blocks.max(1),
            score_floor: config.score_floor,
            low_confidence: config.low_confidence,
            low_confidence_discount: config.low_confidence_discount,
            inactive_decay: config.inactive_decay,
            coarse: None,
            blocks_since_coarse: 0,
            last_raw: None,
            smoothing: SmoothingState::new(config.smoothing_capacity),
            smoothed_deg: 0.0,
            confidence: 0.0,
            phase: SearchPhase::Idle,
            offset: Arc::new(OffsetCell::new(0.0)),
            published: Arc::new(DirectionCell::new()),
        };
        estimator.publish();
        estimator
    }

    // ---- Handles -----------------------------------------------------------

    /// Shared cell holding the latest published estimate.
    pub fn direction_handle(&self) -> Arc<DirectionCell> {
        Arc::clone(&self.published)
    }

    /// Shared cell holding the calibration offset.
    pub fn offset_handle(&self) -> Arc<OffsetCell> {
        Arc::clone(&self.offset)
    }

    pub fn set_offset(&self, offset_deg: f64) {
        self.offset.set(offset_deg);
        self.publish();
    }

    pub fn offset(&self) -> f64 {
        self.offset.get()
    }

    // ---- State -------------------------------------------------------------

    /// Latest published estimate (smoothed angle plus offset).
    pub fn current(&self) -> DirectionEstimate {
        DirectionEstimate::new(
            normalize_deg(self.smoothed_deg + self.offset.get()),
            self.confidence,
        )
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Forget history, angle and confidence.  The offset is kept.
    pub fn reset(&mut self) {
        self.smoothing.clear();
        self.coarse = None;
        self.blocks_since_coarse = 0;
        self.last_raw = None;
        self.smoothed_deg = 0.0;
        self.confidence = 0.0;
        self.phase = SearchPhase::Idle;
        self.publish();
    }

    fn publish(&self) {
        self.published.store(self.current());
    }

    // ---- Per-block processing ------------------------------------------------

    /// Process one block and publish the resulting estimate.
    pub fn process(&mut self, block: &AudioBlock) -> DoaOutcome {
        if !block.is_well_formed() {
            return self.skip(SkipReason::Malformed);
        }
        if !block.is_finite() {
            return self.skip(SkipReason::NonFinite);
        }
        if !self.gate.is_active(block) {
            return self.skip(SkipReason::Inactive);
        }

        if self.whiten(block) == 0 {
            return self.degrade(DegradeReason::NoUsableEnergy);
        }

        self.blocks_since_coarse = self.blocks_since_coarse.saturating_add(1);
        let tracked = match (self.coarse, self.last_raw) {
            (Some(stats), Some(center)) if self.blocks_since_coarse < self.refresh_blocks => {
                Some((stats, center))
            }
            _ => None,
        };

        let (stats, center) = match tracked {
            Some(found) => {
                self.phase = SearchPhase::FineSearch;
                found
            }
            None => {
                self.phase = SearchPhase::CoarseSearch;
                let (stats, peak) = self.coarse_search();
                if !(stats.max >= self.score_floor) {
                    return self.degrade(DegradeReason::BelowScoreFloor);
                }
                self.coarse = Some(stats);
                self.blocks_since_coarse = 0;
                (stats, peak)
            }
        };

        let (raw, peak) = self.fine_search(center);
        if !(peak >= self.score_floor) {
            return self.degrade(DegradeReason::BelowScoreFloor);
        }

        let spread = peak.max(stats.max) - stats.min + CONFIDENCE_EPSILON;
        let confidence = ((peak - stats.median) / spread).clamp(0.0, 1.0);
        let confidence = if confidence.is_finite() { confidence } else { 0.0 };
        log::trace!(
            "doa: {:?} raw {:.1} deg, confidence {:.2}",
            self.phase,
            self.table.angle_at(raw),
            confidence
        );

        if confidence < self.low_confidence {
            self.confidence = confidence * self.low_confidence_discount;
            self.force_coarse();
            self.publish();
            return DoaOutcome::Degraded {
                estimate: self.current(),
                reason: DegradeReason::LowConfidence,
            };
        }

        let raw_deg = self.table.angle_at(raw);
        self.last_raw = Some(raw);
        self.smoothing.push(raw_deg);
        self.smoothed_deg = self.smoothing.median().unwrap_or(raw_deg);
        self.confidence = confidence;
        self.publish();
        DoaOutcome::Updated(self.current())
    }

    fn skip(&mut self, reason: SkipReason) -> DoaOutcome {
        self.phase = SearchPhase::Idle;
        self.confidence *= self.inactive_decay;
        self.force_coarse();
        self.publish();
        DoaOutcome::Skipped {
            estimate: self.current(),
            reason,
        }
    }

    fn degrade(&mut self, reason: DegradeReason) -> DoaOutcome {
        self.confidence *= self.low_confidence_discount;
        self.force_coarse();
        self.publish();
        DoaOutcome::Degraded {
            estimate: self.current(),
            reason,
        }
    }

    /// Make the next searched block run a full coarse pass.
    fn force_coarse(&mut self) {
        self.coarse = None;
    }

    /// Fill `cross` with whitened cross-spectra; returns how many entries
    /// carried usable energy.
    fn whiten(&mut self, block: &AudioBlock) -> usize {
        for (channel, spectrum) in block.channels.iter().zip(self.spectra.iter_mut()) {
            self.analyzer.analyze(channel, &self.bins, spectrum);
        }

        self.cross.clear();
        let mut usable = 0;
        for &(i, j) in &self.pairs {
            for (a, b) in self.spectra[i].iter().zip(&self.spectra[j]) {
                let c = a * b.conj();
                let magnitude = c.norm();
                if magnitude > CROSS_MAGNITUDE_FLOOR && magnitude.is_finite() {
                    self.cross.push(c / magnitude);
                    usable += 1;
                } else {
                    self.cross.push(Complex64::new(0.0, 0.0));
                }
            }
        }
        usable
    }

    /// Steered response power at table index `index`.
    fn score(&self, index: usize) -> f64 {
        let row = self.table.row(index);
        let bins = self.omegas.len();
        let mut total = 0.0;
        for (p, &(i, j)) in self.pairs.iter().enumerate() {
            let tau = row[i] - row[j];
            let cross = &self.cross[p * bins..(p + 1) * bins];
            for (c, &omega) in cross.iter().zip(&self.omegas) {
                let (sin, cos) = (omega * tau).sin_cos();
                total += c.re * cos - c.im * sin;
            }
        }
        total
    }

    /// Score every `coarse_step`-th angle; returns the statistics and the
    /// index of the best one.
    fn coarse_search(&self) -> (CoarseStats, usize) {
        let mut scores = Vec::with_capacity(self.table.len() / self.coarse_step + 1);
        let mut best = (0, f64::NEG_INFINITY);
        for index in (0..self.table.len()).step_by(self.coarse_step) {
            let s = self.score(index);
            if s > best.1 {
                best = (index, s);
            }
            scores.push(s);
        }

        scores.sort_by(f64::total_cmp);
        let n = scores.len();
        let median = if n == 0 {
            0.0
        } else if n % 2 == 1 {
            scores[n / 2]
        } else {
            0.5 * (scores[n / 2 - 1] + scores[n / 2])
        };
        let stats = CoarseStats {
            median,
            min: scores.first().copied().unwrap_or(0.0),
            max: scores.last().copied().unwrap_or(f64::NEG_INFINITY),
        };
        (stats, best.0)
    }

    /// Full-resolution search within `fine_steps` of `center`; returns the
    /// best index and its score.
    fn fine_search(&self, center: usize) -> (usize, f64) {
        let n = self.table.len() as isize;
        let w = self.fine_steps as isize;
        let mut best = (center, f64::NEG_INFINITY);
        for offset in -w..=w {
            let index = (center as isize + offset).rem_euclid(n) as usize;
            let s = self.score(index);
            if s > best.1 {
                best = (index, s);
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::angle_difference;
    use crate::config::BinStrategy;
    use crate::testing::{test_array, uncorrelated_noise, PlaneWave, BLOCK_SIZE, SAMPLE_RATE};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn estimator(config: &DoaConfig) -> DoaEstimator {
        let table = Arc::new(DelayTable::new(&test_array(), 1.0));
        DoaEstimator::new(config, table, SAMPLE_RATE, BLOCK_SIZE)
    }

    fn run(est: &mut DoaEstimator, wave: &mut PlaneWave, blocks: usize) -> DoaOutcome {
        let mut last = None;
        for _ in 0..blocks {
            last = Some(est.process(&wave.next_block()));
        }
        last.unwrap()
    }

    // ---- Construction ----

    #[test]
    fn default_bins_and_pairs() {
        let est = estimator(&DoaConfig::default());
        assert_eq!(est.bin_count(), 161);
        assert_eq!(est.pair_count(), 6);
        assert_eq!(est.current(), DirectionEstimate::default());
        assert_eq!(est.phase(), SearchPhase::Idle);
    }

    #[test]
    fn adjacent_pairs_only() {
        let est = estimator(&DoaConfig {
            pairs: PairSet::Adjacent,
            ..Default::default()
        });
        assert_eq!(est.pair_count(), 4);
    }

    // ---- Round trip ----

    #[test]
    fn plane_wave_round_trip() {
        for (i, angle) in [0.0, 45.0, 90.0, 200.0, 315.0].into_iter().enumerate() {
            let mut est = estimator(&DoaConfig::default());
            let mut wave = PlaneWave::broadband(angle, 7 + i as u64);
            let outcome = run(&mut est, &mut wave, 3);

            let got = outcome.estimate();
            assert!(outcome.is_updated(), "{angle}: {outcome:?}");
            assert!(
                angle_difference(got.angle_deg, angle).abs() <= 1.0,
                "expected {angle}, got {}",
                got.angle_deg
            );
            assert!(got.confidence > 0.5, "{angle}: confidence {}", got.confidence);
        }
    }

    #[test]
    fn coarse_refresh_cadence() {
        let mut est = estimator(&DoaConfig::default());
        let mut wave = PlaneWave::broadband(120.0, 3);
        let mut phases = Vec::new();
        for _ in 0..8 {
            est.process(&wave.next_block());
            phases.push(est.phase());
        }
        use SearchPhase::{CoarseSearch as C, FineSearch as F};
        assert_eq!(phases, vec![C, F, F, F, C, F, F, F]);
    }

    #[test]
    fn follows_a_moving_source() {
        let mut est = estimator(&DoaConfig::default());
        let mut wave = PlaneWave::broadband(90.0, 11);
        run(&mut est, &mut wave, 6);
        wave.set_angle(180.0);
        let got = run(&mut est, &mut wave, 12).estimate();
        assert!(angle_difference(got.angle_deg, 180.0).abs() <= 1.0, "{got:?}");
    }

    // ---- Silence and bad input ----

    #[test]
    fn silence_decays_confidence_and_keeps_angle() {
        let mut est = estimator(&DoaConfig::default());
        let mut wave = PlaneWave::broadband(90.0, 5);
        let before = run(&mut est, &mut wave, 3).estimate();
        assert!(before.confidence > 0.5);

        let silence = AudioBlock::silent(BLOCK_SIZE, SAMPLE_RATE);
        let mut outcome = est.process(&silence);
        assert!(matches!(
            outcome,
            DoaOutcome::Skipped {
                reason: SkipReason::Inactive,
                ..
            }
        ));
        for _ in 0..40 {
            outcome = est.process(&silence);
        }
        let after = outcome.estimate();
        assert_eq!(after.angle_deg, before.angle_deg);
        assert!(after.confidence < 0.01);
        assert_eq!(est.phase(), SearchPhase::Idle);
    }

    #[test]
    fn silence_from_start_never_fabricates() {
        let mut est = estimator(&DoaConfig::default());
        let silence = AudioBlock::silent(BLOCK_SIZE, SAMPLE_RATE);
        for _ in 0..5 {
            let outcome = est.process(&silence);
            assert_eq!(outcome.estimate(), DirectionEstimate::default());
        }
    }

    #[test]
    fn non_finite_block_is_skipped() {
        let mut est = estimator(&DoaConfig::default());
        let mut block = PlaneWave::broadband(30.0, 1).next_block();
        block.channels[2][100] = f32::NAN;
        assert!(matches!(
            est.process(&block),
            DoaOutcome::Skipped {
                reason: SkipReason::NonFinite,
                ..
            }
        ));
    }

    #[test]
    fn malformed_block_is_skipped() {
        let mut est = estimator(&DoaConfig::default());
        let mut block = PlaneWave::broadband(30.0, 1).next_block();
        block.channels[0].truncate(10);
        assert!(matches!(
            est.process(&block),
            DoaOutcome::Skipped {
                reason: SkipReason::Malformed,
                ..
            }
        ));
    }

    #[test]
    fn no_bins_degrades() {
        let mut est = estimator(&DoaConfig {
            bins: BinStrategy::Strategic {
                freqs_hz: vec![12_000.0],
            },
            ..Default::default()
        });
        let outcome = est.process(&PlaneWave::broadband(30.0, 1).next_block());
        assert!(matches!(
            outcome,
            DoaOutcome::Degraded {
                reason: DegradeReason::NoUsableEnergy,
                ..
            }
        ));
        assert_eq!(outcome.estimate().confidence, 0.0);
    }

    // ---- Degraded paths ----

    #[test]
    fn low_confidence_keeps_angle_and_discounts() {
        let mut est = estimator(&DoaConfig::default());
        let mut wave = PlaneWave::broadband(90.0, 21);
        let before = run(&mut est, &mut wave, 3).estimate();
        assert!(before.confidence > 0.6);

        // No search result can clear this threshold.
        est.low_confidence = 1.1;
        let outcome = est.process(&wave.next_block());
        assert!(matches!(
            outcome,
            DoaOutcome::Degraded {
                reason: DegradeReason::LowConfidence,
                ..
            }
        ));
        let after = outcome.estimate();
        assert_eq!(after.angle_deg, before.angle_deg);
        assert!(after.confidence <= 0.5 && after.confidence < before.confidence);
        assert_eq!(est.direction_handle().load().angle_deg, before.angle_deg);

        // The next block starts over with a full coarse pass.
        est.process(&wave.next_block());
        assert_eq!(est.phase(), SearchPhase::CoarseSearch);
    }

    #[test]
    fn score_below_floor_keeps_angle_and_halves_confidence() {
        let mut est = estimator(&DoaConfig::default());
        let mut wave = PlaneWave::broadband(90.0, 22);
        let before = run(&mut est, &mut wave, 3).estimate();

        est.score_floor = f64::INFINITY;
        let outcome = est.process(&wave.next_block());
        assert!(matches!(
            outcome,
            DoaOutcome::Degraded {
                reason: DegradeReason::BelowScoreFloor,
                ..
            }
        ));
        let after = outcome.estimate();
        assert_eq!(after.angle_deg, before.angle_deg);
        assert_eq!(after.confidence, before.confidence * 0.5);
    }

    #[test]
    fn degraded_blocks_in_noise_never_move_the_angle() {
        let mut est = estimator(&DoaConfig::default());
        let mut wave = PlaneWave::broadband(90.0, 23);
        run(&mut est, &mut wave, 4);

        let mut rng = StdRng::seed_from_u64(99);
        let mut degraded = 0;
        for _ in 0..40 {
            let previous = est.current();
            let outcome = est.process(&uncorrelated_noise(&mut rng, 0.05));
            if let DoaOutcome::Degraded { estimate, reason } = outcome {
                degraded += 1;
                assert_eq!(estimate.angle_deg, previous.angle_deg, "{reason:?}");
            }
        }
        assert!(degraded > 0);
    }

    // ---- Publishing ----

    #[test]
    fn published_angle_stays_below_360() {
        let est = estimator(&DoaConfig::default());
        est.set_offset(-1e-5);
        assert!(est.current().angle_deg < 360.0);
        let published = est.direction_handle().load().angle_deg;
        assert!((0.0..360.0).contains(&published), "published {published}");
    }

    #[test]
    fn published_estimate_is_stable_between_blocks() {
        let mut est = estimator(&DoaConfig::default());
        let cell = est.direction_handle();
        let mut wave = PlaneWave::broadband(250.0, 9);
        run(&mut est, &mut wave, 2);

        let first = cell.load();
        let second = cell.load();
        assert_eq!(first, second);
        assert!((first.angle_deg - est.current().angle_deg).abs() < 1e-3);
    }

    #[test]
    fn offset_is_added_modulo_360() {
        let mut est = estimator(&DoaConfig::default());
        let mut wave = PlaneWave::broadband(355.0, 13);
        run(&mut est, &mut wave, 3);
        let raw = est.current().angle_deg;

        est.offset_handle().set(10.0);
        let shifted = run(&mut est, &mut wave, 1).estimate().angle_deg;
        assert!((angle_difference(shifted, raw) - 10.0).abs() <= 1.0);
        assert!(shifted < 360.0);
    }

    #[test]
    fn reset_clears_estimate_but_keeps_offset() {
        let mut est = estimator(&DoaConfig::default());
        let mut wave = PlaneWave::broadband(60.0, 2);
        run(&mut est, &mut wave, 2);
        est.set_offset(-3.0);
        est.reset();
        assert_eq!(est.current().confidence, 0.0);
        assert_eq!(est.offset(), -3.0);
        assert_eq!(est.last_raw, None);
        assert_eq!(est.direction_handle().load().angle_deg, 357.0);
    }
}
