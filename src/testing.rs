//! Synthetic plane-wave blocks for unit tests.
//!
//! Each microphone receives the same broadband multi-tone signal, delayed by
//! the exact arrival delay of a far-field source, plus independent uniform
//! noise at a fixed SNR.  Tones sit on FFT bin centres so a single block
//! carries no leakage between bins.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::array::{MicrophoneArray, NUM_MICS};
use crate::audio::AudioBlock;

pub const SAMPLE_RATE: u32 = 16_000;
pub const BLOCK_SIZE: usize = 1024;

/// Default array: 32.5 mm radius, first mic at -90°, 343 m/s.
pub fn test_array() -> MicrophoneArray {
    MicrophoneArray::circular(0.0325, -90.0, 343.0)
}

pub struct PlaneWave {
    array: MicrophoneArray,
    angle_deg: f64,
    tones: Vec<(f64, f64)>,
    amplitude: f64,
    noise: f64,
    rng: StdRng,
    next_block: u64,
}

impl PlaneWave {
    /// Tones on every bin from 28 to 199 (437 Hz .. 3.1 kHz), 20 dB SNR.
    pub fn broadband(angle_deg: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bin_hz = SAMPLE_RATE as f64 / BLOCK_SIZE as f64;
        let tones: Vec<(f64, f64)> = (28..200)
            .map(|b| (b as f64 * bin_hz, rng.gen_range(0.0..2.0 * PI)))
            .collect();

        let amplitude = 0.01;
        let signal_power = tones.len() as f64 * amplitude * amplitude / 2.0;
        let noise_power = signal_power / 100.0;
        // Uniform on [-a, a] has variance a^2 / 3.
        let noise = (3.0 * noise_power).sqrt();

        Self {
            array: test_array(),
            angle_deg,
            tones,
            amplitude,
            noise,
            rng,
            next_block: 0,
        }
    }

    pub fn set_angle(&mut self, angle_deg: f64) {
        self.angle_deg = angle_deg;
    }

    /// The next contiguous block of the stream.
    pub fn next_block(&mut self) -> AudioBlock {
        let delays = self.array.arrival_delays(self.angle_deg);
        let start = self.next_block * BLOCK_SIZE as u64;
        self.next_block += 1;

        let mut channels: [Vec<f32>; NUM_MICS] =
            std::array::from_fn(|_| Vec::with_capacity(BLOCK_SIZE));
        for (m, channel) in channels.iter_mut().enumerate() {
            for n in 0..BLOCK_SIZE {
                let t = (start + n as u64) as f64 / SAMPLE_RATE as f64 - delays[m];
                let clean: f64 = self
                    .tones
                    .iter()
                    .map(|&(f, phase)| (2.0 * PI * f * t + phase).sin())
                    .sum::<f64>()
                    * self.amplitude;
                let noise = self.rng.gen_range(-self.noise..self.noise);
                channel.push((clean + noise) as f32);
            }
        }
        AudioBlock::new(channels, SAMPLE_RATE).with_sequence(
            start / BLOCK_SIZE as u64,
            std::time::Duration::from_secs_f64(start as f64 / SAMPLE_RATE as f64),
        )
    }
}

/// Independent uniform noise on every microphone: no direction to find.
pub fn uncorrelated_noise(rng: &mut StdRng, amplitude: f32) -> AudioBlock {
    let channels: [Vec<f32>; NUM_MICS] = std::array::from_fn(|_| {
        (0..BLOCK_SIZE)
            .map(|_| rng.gen_range(-amplitude..amplitude))
            .collect()
    });
    AudioBlock::new(channels, SAMPLE_RATE)
}

/// RMS of a slice.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / samples.len() as f64).sqrt()
}
