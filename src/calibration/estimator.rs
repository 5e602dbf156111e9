//! Offset estimation from a stream of published directions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::array::angle_difference;
use crate::config::CalibrationConfig;
use crate::doa::DirectionEstimate;

// ---------------------------------------------------------------------------
// CalibrationError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CalibrationError {
    /// Nothing above the confidence floor was observed.
    #[error("no usable samples ({seen} observed, none above confidence {floor})")]
    NoUsableSamples { seen: usize, floor: f64 },

    /// The system was not running when calibration was requested.
    #[error("calibration needs a running system")]
    NotRunning,
}

// ---------------------------------------------------------------------------
// CalibrationReport
// ---------------------------------------------------------------------------

/// Outcome of one calibration run; also the on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Where the source really was.
    pub reference_deg: f64,
    /// Samples polled in total.
    pub samples_seen: usize,
    /// Samples above the confidence floor.
    pub samples_used: usize,
    /// Median of `estimate - reference`, wrapped into `[-180, 180)`.
    pub median_error_deg: f64,
    /// Population standard deviation of the same errors.
    pub std_dev_deg: f64,
    /// Offset to apply (the negated median, or 0 when within threshold).
    pub offset_deg: f64,
    /// `false` when the error was small enough to need no correction.
    pub applied: bool,
    /// RFC 3339 local time the report was produced.
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// CalibrationEstimator
// ---------------------------------------------------------------------------

/// Collects direction samples against a known reference angle.
///
/// ```rust
/// use array_steer::calibration::CalibrationEstimator;
/// use array_steer::config::CalibrationConfig;
/// use array_steer::doa::DirectionEstimate;
///
/// let mut cal = CalibrationEstimator::new(&CalibrationConfig::default(), 0.0);
/// for angle in [4.0, 5.0, 6.0, 5.0] {
///     cal.observe(DirectionEstimate::new(angle, 0.9));
/// }
/// let report = cal.finish().unwrap();
/// assert!((report.offset_deg + 5.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct CalibrationEstimator {
    reference_deg: f64,
    confidence_floor: f64,
    error_threshold_deg: f64,
    errors: Vec<f64>,
    seen: usize,
}

impl CalibrationEstimator {
    pub fn new(config: &CalibrationConfig, reference_deg: f64) -> Self {
        Self {
            reference_deg,
            confidence_floor: config.confidence_floor,
            error_threshold_deg: config.error_threshold_deg,
            errors: Vec::new(),
            seen: 0,
        }
    }

    /// Record one polled estimate; returns `true` if it was kept.
    pub fn observe(&mut self, estimate: DirectionEstimate) -> bool {
        self.seen += 1;
        let usable = estimate.confidence > self.confidence_floor && estimate.angle_deg.is_finite();
        if usable {
            self.errors
                .push(angle_difference(estimate.angle_deg, self.reference_deg));
        }
        usable
    }

    pub fn samples_used(&self) -> usize {
        self.errors.len()
    }

    /// Summarise the collected errors.
    pub fn finish(&self) -> Result<CalibrationReport, CalibrationError> {
        if self.errors.is_empty() {
            return Err(CalibrationError::NoUsableSamples {
                seen: self.seen,
                floor: self.confidence_floor,
            });
        }

        let median_error_deg = median(&self.errors);
        let mean = self.errors.iter().sum::<f64>() / self.errors.len() as f64;
        let variance = self
            .errors
            .iter()
            .map(|e| (e - mean).powi(2))
            .sum::<f64>()
            / self.errors.len() as f64;

        let applied = median_error_deg.abs() > self.error_threshold_deg;
        let offset_deg = if applied { -median_error_deg } else { 0.0 };

        Ok(CalibrationReport {
            reference_deg: self.reference_deg,
            samples_seen: self.seen,
            samples_used: self.errors.len(),
            median_error_deg,
            std_dev_deg: variance.sqrt(),
            offset_deg,
            applied,
            created_at: chrono::Local::now().to_rfc3339(),
        })
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
