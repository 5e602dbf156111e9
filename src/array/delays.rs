//! Per-angle delay tables.
//!
//! [`DelayTable`] stores signed continuous delays (seconds) for every angle
//! of the grid; the DOA estimator predicts cross-spectrum phase from them.
//! [`QuantizedDelayTable`] turns each row into sample shifts normalised so
//! the earliest microphone has shift zero; the beamformer aligns with them.

use super::geometry::{MicrophoneArray, NUM_MICS};
use super::normalize_deg;

// ---------------------------------------------------------------------------
// DelayTable
// ---------------------------------------------------------------------------

/// Signed arrival delays for a dense grid of candidate angles.
#[derive(Debug, Clone)]
pub struct DelayTable {
    resolution_deg: f64,
    rows: Vec<[f64; NUM_MICS]>,
}

impl DelayTable {
    /// Precompute delays for `360 / resolution_deg` angles starting at 0°.
    ///
    /// # Panics
    ///
    /// Panics if `resolution_deg` is not positive.
    pub fn new(array: &MicrophoneArray, resolution_deg: f64) -> Self {
        assert!(resolution_deg > 0.0, "resolution_deg must be > 0");
        let len = (360.0 / resolution_deg).round().max(1.0) as usize;
        let rows = (0..len)
            .map(|i| array.arrival_delays(i as f64 * resolution_deg))
            .collect();
        Self {
            resolution_deg,
            rows,
        }
    }

    /// Number of candidate angles.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Grid spacing in degrees.
    pub fn resolution_deg(&self) -> f64 {
        self.resolution_deg
    }

    /// Angle (degrees) of row `index`.
    pub fn angle_at(&self, index: usize) -> f64 {
        (index % self.len()) as f64 * self.resolution_deg
    }

    /// Row nearest to `angle_deg` (any value, wrapped into `[0, 360)`).
    pub fn index_for(&self, angle_deg: f64) -> usize {
        grid_index(angle_deg, self.resolution_deg, self.len())
    }

    /// Signed delays of row `index`, one per microphone.
    pub fn row(&self, index: usize) -> &[f64; NUM_MICS] {
        &self.rows[index % self.len()]
    }

    /// `delay(a) - delay(b)` for row `index`.
    pub fn pair_delay(&self, index: usize, a: usize, b: usize) -> f64 {
        let row = self.row(index);
        row[a] - row[b]
    }

    /// Derive the beamformer's sample-shift table at `sample_rate`.
    pub fn quantize(&self, sample_rate: u32) -> QuantizedDelayTable {
        let fs = sample_rate as f64;
        let mut shifts = Vec::with_capacity(self.len());
        let mut exact = Vec::with_capacity(self.len());

        for row in &self.rows {
            let in_samples: [f64; NUM_MICS] = std::array::from_fn(|m| row[m] * fs);

            let rounded: [i64; NUM_MICS] = std::array::from_fn(|m| in_samples[m].round() as i64);
            let min_rounded = rounded.iter().copied().min().unwrap_or(0);
            shifts.push(std::array::from_fn(|m| (rounded[m] - min_rounded) as usize));

            let min_exact = in_samples.iter().copied().fold(f64::INFINITY, f64::min);
            exact.push(std::array::from_fn(|m| in_samples[m] - min_exact));
        }

        QuantizedDelayTable {
            resolution_deg: self.resolution_deg,
            shifts,
            exact,
        }
    }
}

// ---------------------------------------------------------------------------
// QuantizedDelayTable
// ---------------------------------------------------------------------------

/// Non-negative per-microphone sample shifts for every candidate angle.
///
/// Each integer row has a minimum of exactly zero.  The matching `exact` row
/// keeps the unrounded shift (also with minimum zero) for sub-sample
/// alignment.
#[derive(Debug, Clone)]
pub struct QuantizedDelayTable {
    resolution_deg: f64,
    shifts: Vec<[usize; NUM_MICS]>,
    exact: Vec<[f64; NUM_MICS]>,
}

impl QuantizedDelayTable {
    /// Number of candidate angles.
    pub fn len(&self) -> usize {
        self.shifts.len()
    }

    /// `true` when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    /// Row nearest to `angle_deg`.
    pub fn index_for(&self, angle_deg: f64) -> usize {
        grid_index(angle_deg, self.resolution_deg, self.len())
    }

    /// Integer sample shifts of row `index`.
    pub fn row(&self, index: usize) -> &[usize; NUM_MICS] {
        &self.shifts[index % self.len()]
    }

    /// Fractional sample shifts of row `index`.
    pub fn exact_row(&self, index: usize) -> &[f64; NUM_MICS] {
        &self.exact[index % self.len()]
    }
}

fn grid_index(angle_deg: f64, resolution_deg: f64, len: usize) -> usize {
    let steps = (normalize_deg(angle_deg) / resolution_deg).round() as usize;
    steps % len.max(1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
