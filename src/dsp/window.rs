//! Window and fade shapes.

use std::f64::consts::PI;

/// Symmetric Hann window of `len` points (both ends at zero).
///
/// ```rust
/// use array_steer::dsp::window::hann;
///
/// let w = hann(5);
/// let expected = [0.0, 0.5, 1.0, 0.5, 0.0];
/// for (got, want) in w.iter().zip(expected) {
///     assert!((got - want).abs() < 1e-12);
/// }
/// ```
pub fn hann(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        n => (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
            .collect(),
    }
}

/// Half-cosine fade-out of `len` gains, falling from just below 1 to 0.
pub fn half_cosine_fade(len: usize) -> Vec<f32> {
    (0..len)
        .map(|k| (0.5 * (1.0 + (PI * (k + 1) as f64 / len as f64).cos())) as f32)
        .collect()
}
