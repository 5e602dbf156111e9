//! Static offset calibration.
//!
//! With a source at a known angle, the published direction stream is polled
//! for a fixed time.  Samples above a confidence floor are turned into
//! wrapped angular errors; their median becomes the negated offset when it
//! exceeds a small threshold.
//!
//! * [`CalibrationEstimator`] is the pure statistics part.
//! * [`calibrate`] runs it against live [`DirectionCell`](crate::doa::DirectionCell)
//!   and [`OffsetCell`](crate::doa::OffsetCell) handles on a tokio timer.
//! * [`save_report`] / [`load_report`] persist the result as JSON.

pub mod estimator;
pub mod session;
pub mod store;

pub use estimator::{CalibrationError, CalibrationEstimator, CalibrationReport};
pub use session::calibrate;
pub use store::{load_report, save_report};
