//! Timed calibration against the live direction stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::CalibrationConfig;
use crate::doa::{DirectionCell, OffsetCell};

use super::estimator::{CalibrationError, CalibrationEstimator, CalibrationReport};

/// Poll `direction` for `duration` and derive a calibration offset.
///
/// The current offset is zeroed for the collection so the samples reflect
/// the uncorrected estimate.  On success the new offset is written to
/// `offset`; on failure the previous offset is restored.
pub async fn calibrate(
    direction: Arc<DirectionCell>,
    offset: Arc<OffsetCell>,
    config: &CalibrationConfig,
    reference_deg: f64,
    duration: Duration,
) -> Result<CalibrationReport, CalibrationError> {
    let previous = offset.get();
    offset.set(0.0);
    log::info!(
        "calibration: collecting for {:.1}s against {reference_deg:.1} deg",
        duration.as_secs_f64()
    );

    let mut estimator = CalibrationEstimator::new(config, reference_deg);
    let mut ticker = interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; give the estimator one poll
    // interval to publish without the old offset.
    ticker.tick().await;

    let deadline = Instant::now() + duration;
    loop {
        ticker.tick().await;
        if Instant::now() > deadline {
            break;
        }
        estimator.observe(direction.load());
    }

    match estimator.finish() {
        Ok(report) => {
            offset.set(report.offset_deg);
            if report.applied {
                log::info!(
                    "calibration: offset {:.1} deg from {} samples (median error {:.1}, std {:.1})",
                    report.offset_deg,
                    report.samples_used,
                    report.median_error_deg,
                    report.std_dev_deg
                );
            } else {
                log::info!(
                    "calibration: median error {:.1} deg within threshold, no offset needed",
                    report.median_error_deg
                );
            }
            Ok(report)
        }
        Err(e) => {
            offset.set(previous);
            log::warn!("calibration: {e}; keeping offset {previous:.1} deg");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doa::DirectionEstimate;

    fn fast_config() -> CalibrationConfig {
        CalibrationConfig {
            poll_interval_ms: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn biased_stream_sets_offset() {
        let direction = Arc::new(DirectionCell::new());
        direction.store(DirectionEstimate::new(95.0, 0.9));
        let offset = Arc::new(OffsetCell::new(0.0));

        let report = calibrate(
            Arc::clone(&direction),
            Arc::clone(&offset),
            &fast_config(),
            90.0,
            Duration::from_millis(60),
        )
        .await
        .unwrap();

        assert!(report.samples_used > 0);
        assert!((report.offset_deg + 5.0).abs() < 1e-4);
        assert!((offset.get() + 5.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn failure_restores_previous_offset() {
        let direction = Arc::new(DirectionCell::new());
        direction.store(DirectionEstimate::new(95.0, 0.1));
        let offset = Arc::new(OffsetCell::new(3.0));

        let result = calibrate(
            direction,
            Arc::clone(&offset),
            &fast_config(),
            90.0,
            Duration::from_millis(40),
        )
        .await;

        assert!(matches!(result, Err(CalibrationError::NoUsableSamples { .. })));
        assert_eq!(offset.get(), 3.0);
    }

    #[tokio::test]
    async fn accurate_stream_clears_offset() {
        let direction = Arc::new(DirectionCell::new());
        direction.store(DirectionEstimate::new(45.5, 0.8));
        let offset = Arc::new(OffsetCell::new(7.0));

        let report = calibrate(
            direction,
            Arc::clone(&offset),
            &fast_config(),
            45.0,
            Duration::from_millis(40),
        )
        .await
        .unwrap();

        assert!(!report.applied);
        assert_eq!(offset.get(), 0.0);
    }
}
