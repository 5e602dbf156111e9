//! Direction-of-arrival estimation.
//!
//! [`DoaEstimator`] turns four-microphone blocks into a [`DirectionEstimate`]
//! using SRP-PHAT over the shared [`DelayTable`](crate::array::DelayTable).
//! Each block runs through:
//!
//! ```text
//! activity gate → Hann + FFT → PHAT cross-spectra → coarse / fine search
//!               → confidence → median smoothing → + calibration offset → publish
//! ```
//!
//! The published estimate lives in a [`DirectionCell`] that any thread can
//! read without blocking; the calibration offset lives in an [`OffsetCell`]
//! the estimator reads once per block.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use array_steer::array::{DelayTable, MicrophoneArray};
//! use array_steer::audio::AudioBlock;
//! use array_steer::config::DoaConfig;
//! use array_steer::doa::{DoaEstimator, DoaOutcome};
//!
//! let array = MicrophoneArray::circular(0.0325, -90.0, 343.0);
//! let table = Arc::new(DelayTable::new(&array, 1.0));
//! let mut doa = DoaEstimator::new(&DoaConfig::default(), table, 16_000, 1024);
//!
//! let outcome = doa.process(&AudioBlock::silent(1024, 16_000));
//! assert!(matches!(outcome, DoaOutcome::Skipped { .. }));
//! assert_eq!(doa.direction_handle().load().confidence, 0.0);
//! ```

pub mod bins;
pub mod direction;
pub mod estimator;
pub mod smoothing;

pub use bins::select_bins;
pub use direction::{DirectionCell, DirectionEstimate, OffsetCell};
pub use estimator::{DegradeReason, DoaEstimator, DoaOutcome, SearchPhase, SkipReason};
pub use smoothing::SmoothingState;
