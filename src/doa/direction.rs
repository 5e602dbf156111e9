//! The published direction and the lock-free cells that carry it (and the
//! calibration offset) between threads.

use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// DirectionEstimate
// ---------------------------------------------------------------------------

/// Angle of arrival and how much to trust it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DirectionEstimate {
    /// Degrees in `[0, 360)`, 0° along +x, counter-clockwise.
    pub angle_deg: f64,
    /// Normalised confidence in `[0, 1]`.
    pub confidence: f64,
}

impl DirectionEstimate {
    pub fn new(angle_deg: f64, confidence: f64) -> Self {
        Self {
            angle_deg,
            confidence,
        }
    }
}

// ---------------------------------------------------------------------------
// DirectionCell
// ---------------------------------------------------------------------------

/// Single-writer, many-reader slot holding the latest [`DirectionEstimate`].
///
/// Angle and confidence are stored as two `f32`s packed into one `AtomicU64`,
/// so a reader always sees a pair written together and never blocks.  An
/// angle just below 360 that rounds up to `360.0` in `f32` is stored as 0.
#[derive(Debug, Default)]
pub struct DirectionCell {
    bits: AtomicU64,
}

impl DirectionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, estimate: DirectionEstimate) {
        let mut angle = estimate.angle_deg as f32;
        if angle >= 360.0 {
            angle = 0.0;
        }
        let angle = angle.to_bits() as u64;
        let confidence = (estimate.confidence as f32).to_bits() as u64;
        self.bits.store(angle << 32 | confidence, Ordering::Release);
    }

    pub fn load(&self) -> DirectionEstimate {
        let bits = self.bits.load(Ordering::Acquire);
        DirectionEstimate {
            angle_deg: f32::from_bits((bits >> 32) as u32) as f64,
            confidence: f32::from_bits(bits as u32) as f64,
        }
    }
}

// ---------------------------------------------------------------------------
// OffsetCell
// ---------------------------------------------------------------------------

/// Calibration offset in degrees, written by calibration and read by the
/// estimator once per block.  Kept at full `f64` precision.
#[derive(Debug, Default)]
pub struct OffsetCell {
    bits: AtomicU64,
}

impl OffsetCell {
    pub fn new(offset_deg: f64) -> Self {
        let cell = Self::default();
        cell.set(offset_deg);
        cell
    }

    pub fn set(&self, offset_deg: f64) {
        self.bits.store(offset_deg.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
