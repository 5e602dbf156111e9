//! Array geometry and the per-angle delay model shared by DOA and beamformer.
//!
//! ```text
//!               mic 2 (0, r)
//!                    │
//!   mic 3 (-r, 0) ───┼─── mic 1 (r, 0)      0° = +x, counter-clockwise
//!                    │
//!               mic 0 (0, -r)
//! ```
//!
//! [`MicrophoneArray`] holds the four positions and the speed of sound.
//! [`DelayTable`] precomputes the signed arrival delay of every microphone for
//! every candidate angle; [`QuantizedDelayTable`] derives the non-negative
//! sample shifts the delay-sum beamformer applies.
//!
//! # Example
//!
//! ```rust
//! use array_steer::array::{DelayTable, MicrophoneArray};
//!
//! let array = MicrophoneArray::circular(0.0325, -90.0, 343.0);
//! let table = DelayTable::new(&array, 1.0);
//! assert_eq!(table.len(), 360);
//!
//! let shifts = table.quantize(16_000);
//! assert_eq!(*shifts.row(shifts.index_for(90.0)).iter().min().unwrap(), 0);
//! ```

pub mod delays;
pub mod geometry;

pub use delays::{DelayTable, QuantizedDelayTable};
pub use geometry::{MicrophoneArray, NUM_MICS};

/// Map any angle in degrees into `[0, 360)`.
pub fn normalize_deg(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Signed angular difference `a - b`, wrapped into `[-180, 180)`.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    (a - b + 180.0).rem_euclid(360.0) - 180.0
}
