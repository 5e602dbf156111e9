//! Microphone positions and plane-wave arrival delays.

use crate::config::ArrayConfig;

/// The array is fixed to four microphones.
pub const NUM_MICS: usize = 4;

/// Four microphone positions (metres) and the speed of sound.
///
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MicrophoneArray {
    positions: [[f64; 2]; NUM_MICS],
    sound_speed: f64,
}

impl MicrophoneArray {
    /// Build an array from explicit positions.
    pub fn new(positions: [[f64; 2]; NUM_MICS], sound_speed: f64) -> Self {
        Self {
            positions,
            sound_speed,
        }
    }

    /// Four microphones spaced 90° apart on a circle of `radius` metres,
    /// microphone 0 sitting at `first_mic_angle_deg`.
    pub fn circular(radius: f64, first_mic_angle_deg: f64, sound_speed: f64) -> Self {
        let mut positions = [[0.0; 2]; NUM_MICS];
        for (m, pos) in positions.iter_mut().enumerate() {
            let a = (first_mic_angle_deg + 90.0 * m as f64).to_radians();
            // Snap the tiny cos/sin residue at multiples of 90° to zero.
            *pos = [snap(radius * a.cos()), snap(radius * a.sin())];
        }
        Self::new(positions, sound_speed)
    }

    /// Build the array described by `config`.
    pub fn from_config(config: &ArrayConfig) -> Self {
        Self::circular(
            config.radius_m,
            config.first_mic_angle_deg,
            config.sound_speed_mps,
        )
    }

    /// Microphone positions in metres.
    pub fn positions(&self) -> &[[f64; 2]; NUM_MICS] {
        &self.positions
    }

    /// Speed of sound in m/s.
    pub fn sound_speed(&self) -> f64 {
        self.sound_speed
    }

    /// Extra propagation delay (seconds) of a plane wave arriving from
    /// `angle_deg` at microphone `mic`, relative to the array centre.
    ///
    /// Negative for microphones on the source side of the array.
    pub fn arrival_delay(&self, angle_deg: f64, mic: usize) -> f64 {
        let a = angle_deg.to_radians();
        let [x, y] = self.positions[mic];
        -(x * a.cos() + y * a.sin()) / self.sound_speed
    }

    /// [`arrival_delay`](Self::arrival_delay) for all four microphones.
    pub fn arrival_delays(&self, angle_deg: f64) -> [f64; NUM_MICS] {
        std::array::from_fn(|mic| self.arrival_delay(angle_deg, mic))
    }

    /// Largest possible delay between any two microphones (seconds).
    pub fn max_pair_delay(&self) -> f64 {
        let mut max_dist: f64 = 0.0;
        for a in 0..NUM_MICS {
            for b in (a + 1)..NUM_MICS {
                let dx = self.positions[a][0] - self.positions[b][0];
                let dy = self.positions[a][1] - self.positions[b][1];
                max_dist = max_dist.max((dx * dx + dy * dy).sqrt());
            }
        }
        max_dist / self.sound_speed
    }
}

fn snap(v: f64) -> f64 {
    if v.abs() < 1e-15 {
        0.0
    } else {
        v
    }
}
