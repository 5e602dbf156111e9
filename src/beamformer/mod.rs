//! Delay-sum beamformer and output conditioning.
//!
//! For each block, steered by the latest [`DirectionEstimate`](crate::doa::DirectionEstimate):
//!
//! ```text
//! (Hann window) → delay-sum alignment → adaptive gain → compressor
//!              → band-pass → edge fade → sanitise → BeamOutput
//! ```
//!
//! [`Beamformer`] owns the band-pass and compressor state; nothing else
//! touches them.  Alignment uses the quantized delay table, either the
//! integer shifts or their exact fractional values.

pub mod align;
pub mod engine;
pub mod gain;

pub use align::{align_fractional, align_integer};
pub use engine::{sanitize, BeamOutput, Beamformer};
pub use gain::{AdaptiveGain, GainTier};
