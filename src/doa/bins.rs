//! Frequency-bin selection for the SRP-PHAT score.

use crate::config::BinStrategy;

/// FFT bins (with their centre frequencies in Hz) the estimator accumulates.
///
/// `Band` keeps every bin whose centre lies in `[min_hz, max_hz]`;
/// `Strategic` rounds each listed frequency to its nearest bin.  DC and bins
/// at or above Nyquist are never returned, and duplicates are removed.
pub fn select_bins(
    strategy: &BinStrategy,
    sample_rate: u32,
    fft_size: usize,
) -> Vec<(usize, f64)> {
    if fft_size < 2 || sample_rate == 0 {
        return Vec::new();
    }
    let bin_hz = sample_rate as f64 / fft_size as f64;
    let usable = 1..fft_size / 2;

    let mut bins: Vec<usize> = match strategy {
        BinStrategy::Band { min_hz, max_hz } => usable
            .filter(|&b| {
                let f = b as f64 * bin_hz;
                f >= *min_hz && f <= *max_hz
            })
            .collect(),
        BinStrategy::Strategic { freqs_hz } => freqs_hz
            .iter()
            .filter(|f| f.is_finite() && **f > 0.0)
            .map(|f| (f / bin_hz).round() as usize)
            .filter(|b| usable.contains(b))
            .collect(),
    };
    bins.sort_unstable();
    bins.dedup();
    bins.into_iter().map(|b| (b, b as f64 * bin_hz)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_at_defaults() {
        let bins = select_bins(&BinStrategy::default(), 16_000, 1024);
        // 15.625 Hz bins: 500 Hz is bin 32, 3000 Hz is bin 192.
        assert_eq!(bins.first().map(|b| b.0), Some(32));
        assert_eq!(bins.last().map(|b| b.0), Some(192));
        assert_eq!(bins.len(), 161);
        assert!((bins[0].1 - 500.0).abs() < 1e-9);
    }

    #[test]
    fn strategic_rounds_and_dedups() {
        let strategy = BinStrategy::Strategic {
            freqs_hz: vec![1000.0, 1003.0, 250.0, 9000.0, -5.0],
        };
        let bins = select_bins(&strategy, 16_000, 1024);
        let indices: Vec<usize> = bins.iter().map(|b| b.0).collect();
        assert_eq!(indices, vec![16, 64]);
    }

    #[test]
    fn band_above_nyquist_is_empty() {
        let strategy = BinStrategy::Band {
            min_hz: 9000.0,
            max_hz: 12000.0,
        };
        assert!(select_bins(&strategy, 16_000, 1024).is_empty());
    }
}
