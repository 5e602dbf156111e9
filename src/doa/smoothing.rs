//! Bounded history of raw angles and its circular median.

use std::collections::VecDeque;

use crate::array::{angle_difference, normalize_deg};

/// FIFO of the most recent raw angle estimates.
///
/// The median is taken on the circle: every stored angle is unwrapped to
/// within ±180° of the newest one first, so a history straddling 0°/360°
/// does not average out to 180°.
#[derive(Debug, Clone)]
pub struct SmoothingState {
    history: VecDeque<f64>,
    capacity: usize,
}

impl SmoothingState {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a raw angle, evicting the oldest when full.
    pub fn push(&mut self, angle_deg: f64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(normalize_deg(angle_deg));
    }

    /// Circular median of the history in `[0, 360)`, or `None` when empty.
    pub fn median(&self) -> Option<f64> {
        let newest = *self.history.back()?;
        let mut unwrapped: Vec<f64> = self
            .history
            .iter()
            .map(|&a| newest + angle_difference(a, newest))
            .collect();
        unwrapped.sort_by(f64::total_cmp);

        let n = unwrapped.len();
        let median = if n % 2 == 1 {
            unwrapped[n / 2]
        } else {
            0.5 * (unwrapped[n / 2 - 1] + unwrapped[n / 2])
        };
        Some(normalize_deg(median))
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
