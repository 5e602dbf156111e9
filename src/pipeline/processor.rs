//! Synchronous per-block processing.
//!
//! [`BlockProcessor::process`] runs one block through the whole chain in a
//! fixed order:
//!
//! ```text
//! DoaEstimator::process ──publish──▶ DirectionCell
//!        │ (same block's estimate)
//!        ▼
//! Beamformer::process ──▶ Recording (saved stream)
//!                     ──▶ RingBuffer × monitor_gain (monitoring only)
//!                     ──▶ RawRecorder, AudioSinks
//! ```
//!
//! The beamformer therefore always steers by the estimate published for the
//! block it is processing.  Wall-clock time of the whole chain is checked
//! against the block period.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::array::{DelayTable, MicrophoneArray};
use crate::audio::{AudioBlock, Levels, Recording, RingBuffer};
use crate::beamformer::{BeamOutput, Beamformer};
use crate::config::AppConfig;
use crate::doa::{DirectionCell, DoaEstimator, DoaOutcome, OffsetCell};

use super::sink::{AudioSink, RawRecorder, SinkError, SinkSet};
use super::state::PipelineStats;

// ---------------------------------------------------------------------------
// PendingRecording
// ---------------------------------------------------------------------------

/// Audio taken out of the processor for persistence.
#[derive(Debug, Clone, Default)]
pub struct PendingRecording {
    /// Unconditioned beamformed output.
    pub beamformed: Vec<f32>,
    /// Raw microphone channels, when raw recording is enabled.
    pub raw: Option<Vec<Vec<f32>>>,
    pub sample_rate: u32,
}

impl PendingRecording {
    pub fn is_empty(&self) -> bool {
        self.beamformed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// BlockProcessor
// ---------------------------------------------------------------------------

/// Owns the DOA estimator, the beamformer and everything downstream of them.
pub struct BlockProcessor {
    doa: DoaEstimator,
    beamformer: Beamformer,
    recording: Recording,
    monitor: RingBuffer,
    monitor_gain: f32,
    raw: Option<RawRecorder>,
    sinks: SinkSet,
    stats: Arc<PipelineStats>,
    block_period: Duration,
    output_levels: Levels,
}

impl BlockProcessor {
    /// Build the chain from a validated configuration.
    ///
    /// An unusable band-pass falls back to a pass-through; the fallback is
    /// recorded in `stats`.
    pub fn new(config: &AppConfig, stats: Arc<PipelineStats>) -> Self {
        let sample_rate = config.audio.sample_rate;
        let array = MicrophoneArray::from_config(&config.array);
        let table = Arc::new(DelayTable::new(&array, config.array.resolution_deg));
        let quantized = Arc::new(table.quantize(sample_rate));

        let doa = DoaEstimator::new(&config.doa, table, sample_rate, config.audio.block_size);
        let beamformer = Beamformer::new_or_passthrough(&config.beamformer, quantized, sample_rate);
        stats.set_filter_fallback(beamformer.filter_fallback());

        log::info!(
            "pipeline: {} bins x {} pairs, {} Hz, {}-sample blocks, widest mic pair {:.2} samples",
            doa.bin_count(),
            doa.pair_count(),
            sample_rate,
            config.audio.block_size,
            array.max_pair_delay() * sample_rate as f64
        );

        Self {
            doa,
            beamformer,
            recording: Recording::new(sample_rate),
            monitor: RingBuffer::for_duration(config.beamformer.monitor_secs, sample_rate),
            monitor_gain: config.beamformer.monitor_gain,
            raw: config.output.record_raw.then(RawRecorder::new),
            sinks: SinkSet::new(),
            stats,
            block_period: config.audio.block_period(),
            output_levels: Levels::default(),
        }
    }

    pub fn direction_handle(&self) -> Arc<DirectionCell> {
        self.doa.direction_handle()
    }

    pub fn offset_handle(&self) -> Arc<OffsetCell> {
        self.doa.offset_handle()
    }

    /// Apply a calibration offset and republish the current estimate.
    pub fn set_offset(&self, offset_deg: f64) {
        self.doa.set_offset(offset_deg);
    }

    pub fn register_sink(&mut self, sink: Box<dyn AudioSink>) -> Result<usize, SinkError> {
        self.sinks.register(sink)
    }

    pub fn unregister_sink(&mut self, index: usize) -> Result<Box<dyn AudioSink>, SinkError> {
        self.sinks.unregister(index)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len() + usize::from(self.raw.is_some())
    }

    /// Run one block through DOA, beamforming and every consumer.
    pub fn process(&mut self, block: &AudioBlock) -> (DoaOutcome, BeamOutput) {
        let started = Instant::now();

        let outcome = self.doa.process(block);
        self.stats.record_outcome(&outcome);
        if let DoaOutcome::Degraded { reason, estimate } = outcome {
            log::debug!(
                "pipeline: block #{} degraded ({reason:?}), confidence {:.2}",
                block.sequence,
                estimate.confidence
            );
        }

        let estimate = outcome.estimate();
        let output = self.beamformer.process(block, estimate);
        self.stats.record_sanitized(output.sanitized);

        self.recording.append(&output.samples);
        self.monitor.push_scaled(&output.samples, self.monitor_gain);
        self.output_levels = Levels::measure(&output.samples);
        if let Some(raw) = self.raw.as_mut() {
            raw.on_block(block, &output, estimate);
        }
        self.sinks.dispatch(block, &output, estimate);

        let elapsed = started.elapsed();
        if self.stats.record_timing(elapsed, self.block_period) {
            log::warn!(
                "pipeline: block #{} took {:.1} ms (budget {:.1} ms)",
                block.sequence,
                elapsed.as_secs_f64() * 1e3,
                self.block_period.as_secs_f64() * 1e3
            );
        }

        (outcome, output)
    }

    /// Take the accumulated recording, leaving the buffers empty.
    pub fn take_recording(&mut self) -> PendingRecording {
        PendingRecording {
            beamformed: self.recording.take(),
            raw: self.raw.as_mut().map(RawRecorder::take),
            sample_rate: self.recording.sample_rate(),
        }
    }

    /// Return a recording whose save failed so a later flush retries it.
    pub fn restore_recording(&mut self, pending: PendingRecording) {
        self.recording.restore(pending.beamformed);
        if let (Some(raw), Some(channels)) = (self.raw.as_mut(), pending.raw) {
            raw.restore(channels);
        }
    }

    pub fn recorded_secs(&self) -> f32 {
        self.recording.duration_secs()
    }

    /// Copy of the monitoring ring, oldest first.
    pub fn monitor_snapshot(&self) -> Vec<f32> {
        self.monitor.snapshot()
    }

    /// Gain the compressor is currently applying.
    pub fn compressor_gain(&self) -> f32 {
        self.beamformer.compressor_gain()
    }

    /// Levels of the most recent output block.
    pub fn output_levels(&self) -> Levels {
        self.output_levels
    }

    /// Clear DSP state (smoothing, filter, compressor, gain run) and the
    /// monitor so a restart begins clean.  The calibration offset and any
    /// unflushed recording are kept.
    pub fn reset(&mut self) {
        self.doa.reset();
        self.beamformer.reset();
        self.monitor.clear();
        self.output_levels = Levels::default();
    }

    /// Drop any unflushed recording.
    pub fn discard_recording(&mut self) {
        self.recording.clear();
        if let Some(raw) = self.raw.as_mut() {
            raw.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rms, PlaneWave, BLOCK_SIZE};

    fn processor(record_raw: bool) -> BlockProcessor {
        let mut config = AppConfig::default();
        config.output.record_raw = record_raw;
        BlockProcessor::new(&config, Arc::new(PipelineStats::new()))
    }

    // ---- End to end ----

    #[test]
    fn steers_to_source_at_90_degrees() {
        let stats = Arc::new(PipelineStats::new());
        let mut proc = BlockProcessor::new(&AppConfig::default(), Arc::clone(&stats));
        let direction = proc.direction_handle();
        let mut wave = PlaneWave::broadband(90.0, 7);

        let mut raw_rms = 0.0;
        let mut out_rms = 0.0;
        // 16 blocks of 64 ms is just over one second.
        for i in 0..16 {
            let block = wave.next_block();
            let (_, output) = proc.process(&block);
            assert_eq!(output.samples.len(), BLOCK_SIZE);
            if i >= 8 {
                raw_rms += rms(&block.channels[0]);
                out_rms += rms(&output.samples[..BLOCK_SIZE - 64]);
            }
        }

        let estimate = direction.load();
        assert!(
            (estimate.angle_deg - 90.0).abs() <= 1.0,
            "angle {}",
            estimate.angle_deg
        );
        assert!(estimate.confidence > 0.6, "confidence {}", estimate.confidence);
        assert!(out_rms > 1.2 * raw_rms, "out {out_rms} raw {raw_rms}");

        assert_eq!(stats.processed(), 16);
        assert_eq!(stats.updated(), 16);
        assert!((proc.recorded_secs() - 16.0 * 0.064).abs() < 1e-3);
    }

    #[test]
    fn silence_is_processed_without_updates() {
        let stats = Arc::new(PipelineStats::new());
        let mut proc = BlockProcessor::new(&AppConfig::default(), Arc::clone(&stats));
        for _ in 0..4 {
            let (outcome, output) = proc.process(&AudioBlock::silent(BLOCK_SIZE, 16_000));
            assert!(!outcome.is_updated());
            assert!(output.samples.iter().all(|s| *s == 0.0));
        }
        assert_eq!(stats.skipped(), 4);
        assert!((proc.recorded_secs() - 0.256).abs() < 1e-6);
    }

    // ---- Recording / monitor ----

    #[test]
    fn take_recording_empties_buffers() {
        let mut proc = processor(true);
        let mut wave = PlaneWave::broadband(30.0, 1);
        proc.process(&wave.next_block());
        proc.process(&wave.next_block());

        let pending = proc.take_recording();
        assert_eq!(pending.beamformed.len(), 2 * BLOCK_SIZE);
        assert_eq!(pending.sample_rate, 16_000);
        let raw = pending.raw.expect("raw enabled");
        assert_eq!(raw.len(), 4);
        assert!(raw.iter().all(|c| c.len() == 2 * BLOCK_SIZE));

        assert!(proc.take_recording().is_empty());
    }

    #[test]
    fn restored_recording_precedes_newer_audio() {
        let mut proc = processor(true);
        let mut wave = PlaneWave::broadband(30.0, 9);
        proc.process(&wave.next_block());
        let pending = proc.take_recording();
        let first = pending.beamformed.clone();

        proc.process(&wave.next_block());
        proc.restore_recording(pending);

        let again = proc.take_recording();
        assert_eq!(again.beamformed.len(), 2 * BLOCK_SIZE);
        assert_eq!(&again.beamformed[..BLOCK_SIZE], first.as_slice());
        assert!(again
            .raw
            .expect("raw enabled")
            .iter()
            .all(|c| c.len() == 2 * BLOCK_SIZE));
    }

    #[test]
    fn raw_disabled_yields_none() {
        let mut proc = processor(false);
        proc.process(&AudioBlock::silent(BLOCK_SIZE, 16_000));
        assert!(proc.take_recording().raw.is_none());
        assert_eq!(proc.sink_count(), 0);
    }

    #[test]
    fn monitor_copy_is_scaled_independently() {
        let mut config = AppConfig::default();
        config.beamformer.monitor_gain = 0.5;
        let mut proc = BlockProcessor::new(&config, Arc::new(PipelineStats::new()));
        let mut wave = PlaneWave::broadband(180.0, 3);
        proc.process(&wave.next_block());

        let monitor = proc.monitor_snapshot();
        let pending = proc.take_recording();
        assert_eq!(monitor.len(), pending.beamformed.len());
        for (m, r) in monitor.iter().zip(&pending.beamformed) {
            assert!((m - 0.5 * r).abs() < 1e-6);
        }
    }

    #[test]
    fn reset_clears_direction_but_not_recording() {
        let mut proc = processor(false);
        let mut wave = PlaneWave::broadband(45.0, 5);
        for _ in 0..3 {
            proc.process(&wave.next_block());
        }
        assert!(proc.direction_handle().load().confidence > 0.5);

        proc.reset();
        assert_eq!(proc.compressor_gain(), 1.0);
        assert_eq!(proc.direction_handle().load().confidence, 0.0);
        assert!(proc.monitor_snapshot().is_empty());
        assert_eq!(proc.take_recording().beamformed.len(), 3 * BLOCK_SIZE);
    }

    #[test]
    fn invalid_band_pass_is_flagged() {
        let mut config = AppConfig::default();
        config.beamformer.band_pass.high_hz = 9_000.0;
        let stats = Arc::new(PipelineStats::new());
        let _proc = BlockProcessor::new(&config, Arc::clone(&stats));
        assert!(stats.filter_fallback());
    }
}
