//! System lifecycle state and processing counters.
//!
//! [`SystemState`] tracks where the [`super::ArraySystem`] is in its
//! lifecycle.  [`PipelineStats`] is a set of atomic counters written by the
//! DSP worker and read by anyone holding the `Arc` without taking a lock.
//! [`SystemStatus`] is the plain snapshot handed to callers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::doa::DoaOutcome;

// ---------------------------------------------------------------------------
// SystemState
// ---------------------------------------------------------------------------

/// Lifecycle of the processing system.
///
/// ```text
/// Idle ──start──▶ Running ──pause──▶ Paused ──resume──▶ Running
/// Running / Paused ──stop──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SystemState {
    /// No worker; blocks are not accepted.
    #[default]
    Idle,
    /// Blocks are processed as they arrive.
    Running,
    /// The worker is alive but drops incoming blocks.
    Paused,
}

impl SystemState {
    /// Returns `true` while a worker thread exists.
    ///
    /// ```
    /// use array_steer::pipeline::SystemState;
    ///
    /// assert!(!SystemState::Idle.is_started());
    /// assert!(SystemState::Running.is_started());
    /// assert!(SystemState::Paused.is_started());
    /// ```
    pub fn is_started(&self) -> bool {
        !matches!(self, SystemState::Idle)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SystemState::Idle => "Idle",
            SystemState::Running => "Running",
            SystemState::Paused => "Paused",
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineStats
// ---------------------------------------------------------------------------

/// Lock-free per-block counters.
#[derive(Debug, Default)]
pub struct PipelineStats {
    processed: AtomicU64,
    updated: AtomicU64,
    degraded: AtomicU64,
    skipped: AtomicU64,
    paused_drops: AtomicU64,
    slow_blocks: AtomicU64,
    sanitized_samples: AtomicU64,
    last_processing_us: AtomicU64,
    max_processing_us: AtomicU64,
    filter_fallback: AtomicBool,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one processed block and the DOA outcome it produced.
    pub fn record_outcome(&self, outcome: &DoaOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            DoaOutcome::Updated(_) => &self.updated,
            DoaOutcome::Degraded { .. } => &self.degraded,
            DoaOutcome::Skipped { .. } => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a block took; returns `true` if it exceeded `budget`.
    pub fn record_timing(&self, elapsed: Duration, budget: Duration) -> bool {
        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.last_processing_us.store(us, Ordering::Relaxed);
        self.max_processing_us.fetch_max(us, Ordering::Relaxed);
        let slow = elapsed > budget;
        if slow {
            self.slow_blocks.fetch_add(1, Ordering::Relaxed);
        }
        slow
    }

    pub fn record_sanitized(&self, count: usize) {
        if count > 0 {
            self.sanitized_samples
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_paused_drop(&self) {
        self.paused_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_filter_fallback(&self, fallback: bool) {
        self.filter_fallback.store(fallback, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn updated(&self) -> u64 {
        self.updated.load(Ordering::Relaxed)
    }

    pub fn degraded(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn paused_drops(&self) -> u64 {
        self.paused_drops.load(Ordering::Relaxed)
    }

    pub fn slow_blocks(&self) -> u64 {
        self.slow_blocks.load(Ordering::Relaxed)
    }

    pub fn sanitized_samples(&self) -> u64 {
        self.sanitized_samples.load(Ordering::Relaxed)
    }

    pub fn last_processing(&self) -> Duration {
        Duration::from_micros(self.last_processing_us.load(Ordering::Relaxed))
    }

    pub fn max_processing(&self) -> Duration {
        Duration::from_micros(self.max_processing_us.load(Ordering::Relaxed))
    }

    pub fn filter_fallback(&self) -> bool {
        self.filter_fallback.load(Ordering::Relaxed)
    }

    /// Zero the block counters.  The filter-fallback flag describes the
    /// configuration and survives.
    pub fn reset(&self) {
        for counter in [
            &self.processed,
            &self.updated,
            &self.degraded,
            &self.skipped,
            &self.paused_drops,
            &self.slow_blocks,
            &self.sanitized_samples,
            &self.last_processing_us,
            &self.max_processing_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// SystemStatus
// ---------------------------------------------------------------------------

/// Point-in-time report returned by [`super::ArraySystem::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub state: SystemState,
    pub sample_rate: u32,
    pub block_size: usize,
    pub sinks: usize,
    pub angle_deg: f64,
    pub confidence: f64,
    pub offset_deg: f64,
    pub blocks_processed: u64,
    pub blocks_updated: u64,
    pub blocks_degraded: u64,
    pub blocks_skipped: u64,
    pub blocks_dropped_paused: u64,
    pub overflows: u64,
    pub faults: u64,
    pub slow_blocks: u64,
    pub sanitized_samples: u64,
    pub last_processing_ms: f64,
    pub max_processing_ms: f64,
    pub filter_fallback: bool,
    pub recorded_secs: f32,
    pub output_rms_dbfs: f32,
    /// Linear gain the compressor is applying (1.0 when idle).
    pub compressor_gain: f32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
