//! Real-time orchestration of the DOA estimator and the beamformer.
//!
//! # Architecture
//!
//! ```text
//! ArrayCapture (cpal thread)
//!        │ BlockAssembler → BlockFeed::offer (try_send, overflow counted)
//!        ▼
//! array-dsp worker thread
//!        │ BlockProcessor::process
//!        │   ├─ DoaEstimator  → DirectionCell (published first)
//!        │   ├─ Beamformer    (steered by that same estimate)
//!        │   ├─ Recording / monitor RingBuffer
//!        │   └─ RawRecorder / AudioSinks
//!        ▼
//! PipelineStats (atomics) ←── ArraySystem::status
//!
//! ArraySystem::flush → spawn_blocking(condition + WavStore)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use array_steer::audio::ArrayCapture;
//! use array_steer::config::AppConfig;
//! use array_steer::pipeline::ArraySystem;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let mut system = ArraySystem::new(config.clone())?;
//!
//!     let capture = ArrayCapture::open(&config.audio)?;
//!     let _stream = capture.start(system.start()?)?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     let direction = system.get_current_direction();
//!     println!("{:.0} deg ({:.2})", direction.angle_deg, direction.confidence);
//!
//!     system.stop(true).await?;
//!     Ok(())
//! }
//! ```

pub mod processor;
pub mod runner;
pub mod sink;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use processor::{BlockProcessor, PendingRecording};
pub use runner::{ArraySystem, PipelineError, SavedRecording};
pub use sink::{AudioSink, RawRecorder, SinkError, SinkSet, MAX_SINKS};
pub use state::{PipelineStats, SystemState, SystemStatus};
