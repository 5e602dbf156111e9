//! Butterworth band-pass built from cascaded biquads.
//!
//! The low edge is a Butterworth high-pass and the high edge a Butterworth
//! low-pass, each of the configured order, designed with the bilinear
//! transform after pre-warping the edge frequencies.  Sections run in
//! Direct Form II Transposed with `f64` state.
//!
//! ```rust
//! use array_steer::dsp::BandPass;
//!
//! let mut bp = BandPass::design(300.0, 3400.0, 4, 16_000.0).unwrap();
//! let mut block = vec![0.0_f32; 256];
//! block[0] = 1.0;
//! bp.process(&mut block);
//! assert!(block.iter().all(|s| s.is_finite()));
//! ```

use std::f64::consts::PI;

use thiserror::Error;

/// Highest order accepted per edge.
pub const MAX_ORDER: usize = 10;

/// Why a band-pass could not be designed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterError {
    #[error("filter order {0} outside 1..=10")]
    Order(usize),

    #[error("sample rate {0} Hz is not usable")]
    SampleRate(f64),

    #[error("band edges {low_hz}..{high_hz} Hz must satisfy 0 < low < high < {nyquist_hz}")]
    Edges {
        low_hz: f64,
        high_hz: f64,
        nyquist_hz: f64,
    },
}

// ---------------------------------------------------------------------------
// Biquad
// ---------------------------------------------------------------------------

/// One second-order section, `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    state: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self {
            b,
            a,
            state: [0.0; 2],
        }
    }

    /// Pass-through section.
    pub fn unity() -> Self {
        Self::new([1.0, 0.0, 0.0], [0.0, 0.0])
    }

    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let y = self.b[0] * x + self.state[0];
        self.state[0] = self.b[1] * x - self.a[0] * y + self.state[1];
        self.state[1] = self.b[2] * x - self.a[1] * y;
        y
    }

    pub fn reset(&mut self) {
        self.state = [0.0; 2];
    }

    fn state_is_finite(&self) -> bool {
        self.state.iter().all(|v| v.is_finite())
    }

    /// Poles strictly inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }
}

// ---------------------------------------------------------------------------
// Section design
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Edge {
    LowPass,
    HighPass,
}

/// Butterworth sections of `order` for one edge at `cutoff_hz`.
fn butterworth_sections(order: usize, cutoff_hz: f64, fs: f64, edge: Edge) -> Vec<Biquad> {
    let k = 2.0 * fs;
    let wc = k * (PI * cutoff_hz / fs).tan();
    let mut sections = Vec::with_capacity(order.div_ceil(2));

    // Conjugate pairs: one section per pole in the upper half plane.
    for i in 0..order / 2 {
        let theta = PI * (2 * i + order + 1) as f64 / (2 * order) as f64;
        let re = wc * theta.cos();
        let mag2 = wc * wc;
        let d = k * k - 2.0 * k * re + mag2;
        let a = [2.0 * (mag2 - k * k) / d, (k * k + 2.0 * k * re + mag2) / d];
        let b = match edge {
            Edge::LowPass => {
                let g = mag2 / d;
                [g, 2.0 * g, g]
            }
            Edge::HighPass => {
                let g = k * k / d;
                [g, -2.0 * g, g]
            }
        };
        sections.push(Biquad::new(b, a));
    }

    // Odd order leaves one real pole at -wc.
    if order % 2 == 1 {
        let p = -wc;
        let alpha = k - p;
        let a1 = -(k + p) / alpha;
        let b = match edge {
            Edge::LowPass => [-p / alpha, -p / alpha, 0.0],
            Edge::HighPass => [k / alpha, -k / alpha, 0.0],
        };
        sections.push(Biquad::new(b, [a1, 0.0]));
    }

    sections
}

// ---------------------------------------------------------------------------
// BandPass
// ---------------------------------------------------------------------------

/// Speech band-pass applied to beamformed blocks.
///
/// State carries across calls to [`process`](Self::process), so consecutive
/// blocks are filtered as one continuous signal.
#[derive(Debug, Clone)]
pub struct BandPass {
    sections: Vec<Biquad>,
}

impl BandPass {
    /// Design a band-pass of `order` per edge between `low_hz` and `high_hz`.
    pub fn design(
        low_hz: f64,
        high_hz: f64,
        order: usize,
        sample_rate: f64,
    ) -> Result<Self, FilterError> {
        if order == 0 || order > MAX_ORDER {
            return Err(FilterError::Order(order));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(FilterError::SampleRate(sample_rate));
        }
        let nyquist_hz = sample_rate / 2.0;
        let ordered = 0.0 < low_hz && low_hz < high_hz && high_hz < nyquist_hz;
        if !(low_hz.is_finite() && high_hz.is_finite() && ordered) {
            return Err(FilterError::Edges {
                low_hz,
                high_hz,
                nyquist_hz,
            });
        }

        let mut sections = butterworth_sections(order, low_hz, sample_rate, Edge::HighPass);
        sections.extend(butterworth_sections(order, high_hz, sample_rate, Edge::LowPass));
        Ok(Self { sections })
    }

    /// A band-pass that leaves the signal untouched.
    pub fn identity() -> Self {
        Self {
            sections: vec![Biquad::unity()],
        }
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Clear all section state.
    pub fn reset(&mut self) {
        for s in &mut self.sections {
            s.reset();
        }
    }

    /// Filter `block` in place, continuing from the previous call.
    ///
    /// If the state ends up non-finite (e.g. a NaN slipped in) it is cleared
    /// so the next block starts clean.
    pub fn process(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.run(*sample as f64) as f32;
        }
        if !self.sections.iter().all(Biquad::state_is_finite) {
            log::warn!("band-pass: non-finite filter state, resetting");
            self.reset();
        }
    }

    /// Forward-backward filtering of `block` on its own (no carried state).
    ///
    /// The block is extended at both ends by odd reflection to reduce edge
    /// transients, filtered forwards then backwards, and trimmed back.
    pub fn process_zero_phase(&mut self, block: &mut [f32]) {
        let n = block.len();
        if n < 2 {
            return;
        }
        let pad = (6 * self.sections.len()).min(n - 1);
        let first = block[0] as f64;
        let last = block[n - 1] as f64;

        let mut ext: Vec<f64> = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - block[i] as f64));
        ext.extend(block.iter().map(|&s| s as f64));
        ext.extend((1..=pad).map(|i| 2.0 * last - block[n - 1 - i] as f64));

        self.reset();
        for v in ext.iter_mut() {
            *v = self.run(*v);
        }
        self.reset();
        for v in ext.iter_mut().rev() {
            *v = self.run(*v);
        }
        self.reset();

        for (out, v) in block.iter_mut().zip(&ext[pad..pad + n]) {
            *out = *v as f32;
        }
    }

    fn run(&mut self, mut v: f64) -> f64 {
        for s in &mut self.sections {
            v = s.process_sample(v);
        }
        v
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 16_000.0;

    fn sine(freq: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f64 / FS).sin() as f32)
            .collect()
    }

    fn rms(x: &[f32]) -> f64 {
        (x.iter().map(|&v| (v as f64).powi(2)).sum::<f64>() / x.len() as f64).sqrt()
    }

    /// Steady-state gain of a causal band-pass at `freq`.
    fn gain_at(freq: f64) -> f64 {
        let mut bp = BandPass::design(300.0, 3400.0, 4, FS).unwrap();
        let mut x = sine(freq, 16_000);
        bp.process(&mut x);
        rms(&x[8_000..]) / std::f64::consts::FRAC_1_SQRT_2
    }

    // ---- Design ----

    #[test]
    fn section_count_follows_order() {
        assert_eq!(BandPass::design(300.0, 3400.0, 4, FS).unwrap().sections().len(), 4);
        assert_eq!(BandPass::design(300.0, 3400.0, 3, FS).unwrap().sections().len(), 4);
        assert_eq!(BandPass::design(300.0, 3400.0, 1, FS).unwrap().sections().len(), 2);
    }

    #[test]
    fn designed_sections_are_stable() {
        for order in 1..=MAX_ORDER {
            let bp = BandPass::design(300.0, 3400.0, order, FS).unwrap();
            assert!(bp.sections().iter().all(Biquad::is_stable), "order {order}");
        }
    }

    #[test]
    fn invalid_designs_rejected() {
        assert_eq!(
            BandPass::design(300.0, 3400.0, 0, FS).unwrap_err(),
            FilterError::Order(0)
        );
        assert!(matches!(
            BandPass::design(300.0, 9000.0, 4, FS),
            Err(FilterError::Edges { .. })
        ));
        assert!(matches!(
            BandPass::design(3400.0, 300.0, 4, FS),
            Err(FilterError::Edges { .. })
        ));
        assert!(matches!(
            BandPass::design(300.0, 3400.0, 4, 0.0),
            Err(FilterError::SampleRate(_))
        ));
    }

    // ---- Response ----

    #[test]
    fn passband_is_near_unity() {
        let g = gain_at(1_000.0);
        assert!((g - 1.0).abs() < 0.05, "gain at 1 kHz = {g}");
    }

    #[test]
    fn stopbands_are_attenuated() {
        assert!(gain_at(50.0) < 0.01);
        assert!(gain_at(7_000.0) < 0.01);
    }

    #[test]
    fn identity_passes_through() {
        let mut bp = BandPass::identity();
        let original = sine(440.0, 512);
        let mut x = original.clone();
        bp.process(&mut x);
        assert_eq!(x, original);
    }

    #[test]
    fn state_carries_between_blocks() {
        let input = sine(1_000.0, 2048);

        let mut whole = input.clone();
        BandPass::design(300.0, 3400.0, 4, FS).unwrap().process(&mut whole);

        let mut bp = BandPass::design(300.0, 3400.0, 4, FS).unwrap();
        let mut split = input;
        let (a, b) = split.split_at_mut(1024);
        bp.process(a);
        bp.process(b);

        for (x, y) in whole.iter().zip(&split) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn non_finite_input_resets_state() {
        let mut bp = BandPass::design(300.0, 3400.0, 4, FS).unwrap();
        let mut bad = vec![0.0_f32; 64];
        bad[10] = f32::NAN;
        bp.process(&mut bad);

        let mut next = sine(1_000.0, 256);
        bp.process(&mut next);
        assert!(next.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn zero_phase_keeps_tone_aligned() {
        let mut bp = BandPass::design(300.0, 3400.0, 4, FS).unwrap();
        let input = sine(1_000.0, 1024);
        let mut x = input.clone();
        bp.process_zero_phase(&mut x);

        // Middle of the block: same phase, near-unity gain.
        let mid = &x[256..768];
        let reference = &input[256..768];
        let err: f64 = mid
            .iter()
            .zip(reference)
            .map(|(a, b)| ((a - b) as f64).powi(2))
            .sum::<f64>()
            / mid.len() as f64;
        assert!(err.sqrt() < 0.05, "rms error {}", err.sqrt());
    }

    #[test]
    fn zero_phase_short_blocks() {
        let mut bp = BandPass::design(300.0, 3400.0, 4, FS).unwrap();
        let mut one = [0.5_f32];
        bp.process_zero_phase(&mut one);
        assert_eq!(one, [0.5]);

        let mut three = [0.1_f32, -0.2, 0.3];
        bp.process_zero_phase(&mut three);
        assert!(three.iter().all(|s| s.is_finite()));
    }
}
