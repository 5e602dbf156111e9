//! Delay-sum alignment.
//!
//! Channel `m` is advanced by its non-negative shift `s_m`, so
//! `y[n] = Σ x_m[n + s_m] / count(n)` where `count(n)` is the number of
//! channels that still have a sample at `n + s_m`.  Dividing by the actual
//! contributor count keeps the tail of the block at full level.

use crate::array::NUM_MICS;

/// Integer-sample delay-sum of the first `len` samples of each channel.
pub fn align_integer(
    channels: &[Vec<f32>; NUM_MICS],
    shifts: &[usize; NUM_MICS],
    len: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0_f32; len];
    let mut count = vec![0_u8; len];

    for (channel, &shift) in channels.iter().zip(shifts) {
        let channel = &channel[..len.min(channel.len())];
        if shift >= channel.len() {
            continue;
        }
        for (n, &x) in channel[shift..].iter().enumerate() {
            sum[n] += x;
            count[n] += 1;
        }
    }

    normalize(sum, &count)
}

/// Sub-sample delay-sum using linear interpolation between neighbours.
pub fn align_fractional(
    channels: &[Vec<f32>; NUM_MICS],
    shifts: &[f64; NUM_MICS],
    len: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0_f32; len];
    let mut count = vec![0_u8; len];

    for (channel, &shift) in channels.iter().zip(shifts) {
        let channel = &channel[..len.min(channel.len())];
        let shift = shift.max(0.0);
        let whole = shift.floor() as usize;
        let frac = (shift - whole as f64) as f32;

        for n in 0..len {
            let i = n + whole;
            let value = if frac == 0.0 {
                match channel.get(i) {
                    Some(&x) => x,
                    None => break,
                }
            } else {
                match (channel.get(i), channel.get(i + 1)) {
                    (Some(&a), Some(&b)) => a + frac * (b - a),
                    _ => break,
                }
            };
            sum[n] += value;
            count[n] += 1;
        }
    }

    normalize(sum, &count)
}

fn normalize(mut sum: Vec<f32>, count: &[u8]) -> Vec<f32> {
    for (y, &c) in sum.iter_mut().zip(count) {
        if c > 0 {
            *y /= c as f32;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(len: usize) -> Vec<f32> {
        (0..len).map(|n| ((n * 7919) % 101) as f32 / 101.0 - 0.5).collect()
    }

    /// Channels that hear `source` late by `shifts[m]` samples.
    fn delayed(source: &[f32], shifts: &[usize; NUM_MICS]) -> [Vec<f32>; NUM_MICS] {
        std::array::from_fn(|m| {
            (0..source.len())
                .map(|n| if n >= shifts[m] { source[n - shifts[m]] } else { 0.0 })
                .collect()
        })
    }

    #[test]
    fn output_length_matches_input() {
        let channels: [Vec<f32>; NUM_MICS] = std::array::from_fn(|_| vec![0.1; 64]);
        assert_eq!(align_integer(&channels, &[0, 3, 9, 2], 64).len(), 64);
        assert_eq!(align_fractional(&channels, &[0.0, 3.4, 8.9, 2.5], 64).len(), 64);
        // Shift longer than the block still yields a full-length output.
        assert_eq!(align_integer(&channels, &[0, 100, 0, 0], 64).len(), 64);
    }

    #[test]
    fn integer_alignment_recovers_source() {
        let s = source(256);
        let shifts = [2, 0, 2, 4];
        let y = align_integer(&delayed(&s, &shifts), &shifts, 256);
        for n in 0..252 {
            assert!((y[n] - s[n]).abs() < 1e-6, "sample {n}");
        }
    }

    #[test]
    fn no_dip_at_block_end() {
        let channels: [Vec<f32>; NUM_MICS] = std::array::from_fn(|_| vec![1.0; 32]);
        let y = align_integer(&channels, &[0, 1, 2, 3], 32);
        assert!(y.iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let y = align_fractional(&channels, &[0.0, 1.5, 2.25, 3.0], 32);
        assert!(y.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn fractional_with_integer_shifts_matches_integer() {
        let s = source(128);
        let shifts = [1, 0, 3, 2];
        let channels = delayed(&s, &shifts);
        let a = align_integer(&channels, &shifts, 128);
        let b = align_fractional(&channels, &shifts.map(|v| v as f64), 128);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn fractional_interpolates_half_sample() {
        let ramp: Vec<f32> = (0..16).map(|n| n as f32).collect();
        let channels: [Vec<f32>; NUM_MICS] = std::array::from_fn(|_| ramp.clone());
        let y = align_fractional(&channels, &[0.5; NUM_MICS], 16);
        assert!((y[0] - 0.5).abs() < 1e-6);
        assert!((y[10] - 10.5).abs() < 1e-6);
        // The last sample has no right neighbour in any channel.
        assert_eq!(y[15], 0.0);
    }
}
