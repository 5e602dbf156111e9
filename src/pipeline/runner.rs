//! The owning context: worker lifecycle, direction queries, calibration,
//! flushing and status.
//!
//! [`ArraySystem`] is constructed once from an [`AppConfig`] and owns every
//! component.  [`start`](ArraySystem::start) spawns the `array-dsp` worker
//! thread and returns the [`BlockFeed`] the capture callback pushes into.
//!
//! ```text
//! capture callback ──BlockFeed (bounded, try_send)──▶ array-dsp thread
//!                                                      │ lock (one block)
//!                                                      ▼
//!                                              BlockProcessor::process
//!
//! get_current_direction ── DirectionCell (atomic, never blocks)
//! calibrate (async)     ── polls DirectionCell, writes OffsetCell
//! flush (async)         ── take under lock → spawn_blocking(condition + WAV)
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;

use crate::audio::{condition, BlockFeed, CaptureCounters, RecordingStore, StoreError, WavStore};
use crate::calibration::{self, CalibrationError, CalibrationReport};
use crate::config::{AppConfig, AppPaths};
use crate::doa::{DirectionCell, DirectionEstimate, OffsetCell};

use super::processor::{BlockProcessor, PendingRecording};
use super::sink::{AudioSink, SinkError};
use super::state::{PipelineStats, SystemState, SystemStatus};

/// How often the worker wakes to check for shutdown when no block arrives.
const WORKER_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("system is already running")]
    AlreadyRunning,

    #[error("system is not running")]
    NotRunning,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to save recording: {0}")]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// SavedRecording
// ---------------------------------------------------------------------------

/// Files written by one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedRecording {
    pub beamformed: PathBuf,
    pub raw: Option<PathBuf>,
    pub duration_secs: f32,
    /// Global scale applied by the safety ceiling (1.0 when untouched).
    pub scale: f32,
}

// ---------------------------------------------------------------------------
// ArraySystem
// ---------------------------------------------------------------------------

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Explicit owning context for the whole processing system.
pub struct ArraySystem {
    config: AppConfig,
    processor: Arc<Mutex<BlockProcessor>>,
    stats: Arc<PipelineStats>,
    capture: Arc<CaptureCounters>,
    direction: Arc<DirectionCell>,
    offset: Arc<OffsetCell>,
    store: Arc<dyn RecordingStore>,
    calibration_file: PathBuf,
    state: SystemState,
    paused: Arc<AtomicBool>,
    worker: Option<Worker>,
}

impl ArraySystem {
    /// Validate `config` and build the system with a [`WavStore`] in the
    /// configured recordings directory and `calibration.json` in the
    /// platform config directory.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(WavStore::new(config.recordings_dir()));
        let calibration_file = AppPaths::new().calibration_file;
        Self::with_store(config, store, calibration_file)
    }

    /// Build with an explicit recording store and calibration file.
    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn RecordingStore>,
        calibration_file: PathBuf,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;

        let stats = Arc::new(PipelineStats::new());
        let processor = BlockProcessor::new(&config, Arc::clone(&stats));
        let direction = processor.direction_handle();
        let offset = processor.offset_handle();

        if config.calibration.load_saved {
            match calibration::load_report(&calibration_file) {
                Ok(Some(report)) => {
                    log::info!(
                        "pipeline: applying saved calibration offset {:.1} deg",
                        report.offset_deg
                    );
                    processor.set_offset(report.offset_deg);
                }
                Ok(None) => {}
                Err(e) => log::warn!(
                    "pipeline: ignoring unreadable {}: {e:#}",
                    calibration_file.display()
                ),
            }
        }

        Ok(Self {
            config,
            processor: Arc::new(Mutex::new(processor)),
            stats,
            capture: Arc::new(CaptureCounters::new()),
            direction,
            offset,
            store,
            calibration_file,
            state: SystemState::Idle,
            paused: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    // ---- Lifecycle ----------------------------------------------------------

    /// Spawn the DSP worker and return the feed for the capture side.
    pub fn start(&mut self) -> Result<BlockFeed, PipelineError> {
        if self.state.is_started() {
            return Err(PipelineError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::sync_channel(self.config.audio.queue_depth);
        self.stats.reset();
        self.capture.reset();
        let stop = Arc::new(AtomicBool::new(false));
        self.paused.store(false, Ordering::SeqCst);

        let handle = {
            let stop = Arc::clone(&stop);
            let paused = Arc::clone(&self.paused);
            let processor = Arc::clone(&self.processor);
            let stats = Arc::clone(&self.stats);
            std::thread::Builder::new()
                .name("array-dsp".into())
                .spawn(move || run_worker(rx, processor, stats, stop, paused))
                .map_err(PipelineError::Spawn)?
        };

        self.worker = Some(Worker { stop, handle });
        self.state = SystemState::Running;
        log::info!("pipeline: started");
        Ok(BlockFeed::new(tx, Arc::clone(&self.capture)))
    }

    /// Keep the worker alive but drop incoming blocks.
    pub fn pause(&mut self) -> Result<(), PipelineError> {
        if !self.state.is_started() {
            return Err(PipelineError::NotRunning);
        }
        self.paused.store(true, Ordering::SeqCst);
        self.state = SystemState::Paused;
        log::info!("pipeline: paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), PipelineError> {
        if !self.state.is_started() {
            return Err(PipelineError::NotRunning);
        }
        self.paused.store(false, Ordering::SeqCst);
        self.state = SystemState::Running;
        log::info!("pipeline: resumed");
        Ok(())
    }

    /// Stop dispatching blocks, optionally save what was recorded, and reset
    /// the DSP state so a later [`start`](Self::start) begins clean.
    ///
    /// The reset happens even when saving fails; the recording is then kept
    /// for a later [`flush`](Self::flush) and the store error is returned.
    /// Stopping an idle system is a no-op apart from the optional flush.
    pub async fn stop(&mut self, flush: bool) -> Result<Option<SavedRecording>, PipelineError> {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::SeqCst);
            match tokio::task::spawn_blocking(move || worker.handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => log::error!("pipeline: worker thread panicked"),
                Err(e) => log::error!("pipeline: could not join worker: {e}"),
            }
        }
        self.state = SystemState::Idle;
        self.paused.store(false, Ordering::SeqCst);

        let saved = if flush {
            self.flush().await
        } else {
            lock(&self.processor).discard_recording();
            Ok(None)
        };

        lock(&self.processor).reset();
        log::info!("pipeline: stopped");
        saved
    }

    // ---- Queries ------------------------------------------------------------

    /// Most recently published direction (offset applied).  Never blocks.
    pub fn get_current_direction(&self) -> DirectionEstimate {
        self.direction.load()
    }

    pub fn offset(&self) -> f64 {
        self.offset.get()
    }

    /// Copy of the monitoring ring.
    pub fn monitor_snapshot(&self) -> Vec<f32> {
        lock(&self.processor).monitor_snapshot()
    }

    /// Add an observer of every processed block; returns its index.
    pub fn register_sink(&self, sink: Box<dyn AudioSink>) -> Result<usize, SinkError> {
        lock(&self.processor).register_sink(sink)
    }

    /// Remove the observer registered at `index` and hand it back.
    pub fn unregister_sink(&self, index: usize) -> Result<Box<dyn AudioSink>, SinkError> {
        lock(&self.processor).unregister_sink(index)
    }

    pub fn status(&self) -> SystemStatus {
        let (sinks, recorded_secs, levels, compressor_gain) = {
            let processor = lock(&self.processor);
            (
                processor.sink_count(),
                processor.recorded_secs(),
                processor.output_levels(),
                processor.compressor_gain(),
            )
        };
        let estimate = self.direction.load();
        SystemStatus {
            state: self.state,
            sample_rate: self.config.audio.sample_rate,
            block_size: self.config.audio.block_size,
            sinks,
            angle_deg: estimate.angle_deg,
            confidence: estimate.confidence,
            offset_deg: self.offset.get(),
            blocks_processed: self.stats.processed(),
            blocks_updated: self.stats.updated(),
            blocks_degraded: self.stats.degraded(),
            blocks_skipped: self.stats.skipped(),
            blocks_dropped_paused: self.stats.paused_drops(),
            overflows: self.capture.overflows(),
            faults: self.capture.faults(),
            slow_blocks: self.stats.slow_blocks(),
            sanitized_samples: self.stats.sanitized_samples(),
            last_processing_ms: self.stats.last_processing().as_secs_f64() * 1e3,
            max_processing_ms: self.stats.max_processing().as_secs_f64() * 1e3,
            filter_fallback: self.stats.filter_fallback(),
            recorded_secs,
            output_rms_dbfs: levels.rms_dbfs(),
            compressor_gain,
        }
    }

    // ---- Calibration --------------------------------------------------------

    /// Calibrate against a source at `reference_deg` and return the applied
    /// offset, or `None` if no usable estimate was seen.
    pub async fn calibrate(&self, reference_deg: f64, duration: Duration) -> Option<f64> {
        self.calibrate_with_report(reference_deg, duration)
            .await
            .ok()
            .map(|report| report.offset_deg)
    }

    /// Like [`calibrate`](Self::calibrate), returning the full report.  The
    /// report is written to `calibration.json` when persistence is enabled.
    pub async fn calibrate_with_report(
        &self,
        reference_deg: f64,
        duration: Duration,
    ) -> Result<CalibrationReport, CalibrationError> {
        if self.state != SystemState::Running {
            return Err(CalibrationError::NotRunning);
        }

        let report = calibration::calibrate(
            Arc::clone(&self.direction),
            Arc::clone(&self.offset),
            &self.config.calibration,
            reference_deg,
            duration,
        )
        .await?;

        if self.config.calibration.persist {
            let path = self.calibration_file.clone();
            let to_save = report.clone();
            let saved =
                tokio::task::spawn_blocking(move || calibration::save_report(&path, &to_save))
                    .await;
            match saved {
                Ok(Ok(())) => log::info!(
                    "calibration: saved {}",
                    self.calibration_file.display()
                ),
                Ok(Err(e)) => log::warn!("calibration: could not save report: {e:#}"),
                Err(e) => log::warn!("calibration: save task failed: {e}"),
            }
        }
        Ok(report)
    }

    // ---- Persistence --------------------------------------------------------

    /// Hand the accumulated recording to the store.
    ///
    /// The buffers are taken under the processor lock; conditioning and file
    /// I/O run on the blocking pool.  A failed save puts the recording back
    /// ahead of anything captured meanwhile.  Returns `None` when nothing was
    /// recorded.
    pub async fn flush(&self) -> Result<Option<SavedRecording>, PipelineError> {
        let pending = lock(&self.processor).take_recording();
        if pending.is_empty() {
            log::debug!("pipeline: flush with empty recording");
            return Ok(None);
        }

        let store = Arc::clone(&self.store);
        let ceiling = self.config.beamformer.safety_ceiling;
        let (pending, result) = tokio::task::spawn_blocking(move || {
            let result = persist(store.as_ref(), &pending, ceiling);
            (pending, result)
        })
        .await?;

        match result {
            Ok(saved) => Ok(Some(saved)),
            Err(e) => {
                log::warn!(
                    "pipeline: save failed, keeping {:.2}s for the next flush: {e}",
                    pending.beamformed.len() as f32 / pending.sample_rate.max(1) as f32
                );
                lock(&self.processor).restore_recording(pending);
                Err(e.into())
            }
        }
    }
}

impl Drop for ArraySystem {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::SeqCst);
            if worker.handle.join().is_err() {
                log::error!("pipeline: worker thread panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lock, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker(
    rx: Receiver<crate::audio::AudioBlock>,
    processor: Arc<Mutex<BlockProcessor>>,
    stats: Arc<PipelineStats>,
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
) {
    log::debug!("pipeline: worker running");
    while !stop.load(Ordering::SeqCst) {
        let block = match rx.recv_timeout(WORKER_POLL) {
            Ok(block) => block,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("pipeline: feed closed");
                break;
            }
        };
        if paused.load(Ordering::SeqCst) {
            stats.record_paused_drop();
            continue;
        }
        lock(&processor).process(&block);
    }
    log::debug!("pipeline: worker exiting");
}

/// Condition and write one pending recording.
///
/// All or nothing: if the raw file cannot be written the beamformed file
/// written just before it is removed again.
fn persist(
    store: &dyn RecordingStore,
    pending: &PendingRecording,
    ceiling: f32,
) -> Result<SavedRecording, StoreError> {
    let sample_rate = pending.sample_rate;
    let mut beamformed = pending.beamformed.clone();

    let scale = condition(&mut beamformed, ceiling);
    if scale < 1.0 {
        log::info!("pipeline: recording peak above {ceiling}, scaled by {scale:.3}");
    }
    let duration_secs = beamformed.len() as f32 / sample_rate.max(1) as f32;
    let beamformed = store.save_mono(&beamformed, sample_rate)?;

    let raw = match &pending.raw {
        Some(channels) if !channels.iter().all(Vec::is_empty) => {
            let clamped: Vec<Vec<f32>> = channels
                .iter()
                .map(|channel| {
                    channel
                        .iter()
                        .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
                        .collect()
                })
                .collect();
            match store.save_channels(&clamped, sample_rate) {
                Ok(path) => Some(path),
                Err(e) => {
                    if let Err(undo) = store.remove(&beamformed) {
                        log::warn!("pipeline: could not roll back partial save: {undo}");
                    }
                    return Err(e);
                }
            }
        }
        _ => None,
    };

    Ok(SavedRecording {
        beamformed,
        raw,
        duration_secs,
        scale,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
