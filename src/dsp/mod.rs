//! Signal-processing building blocks shared by the DOA estimator and the
//! beamformer.
//!
//! | Item | Used by |
//! |------|---------|
//! | [`window::hann`] | DOA spectrum, optional beamformer input window |
//! | [`window::half_cosine_fade`] | beamformer block-edge fade |
//! | [`SpectrumAnalyzer`] | DOA per-channel FFT |
//! | [`BandPass`] | beamformer speech band |
//! | [`Compressor`] | beamformer dynamic range |

pub mod compressor;
pub mod filter;
pub mod spectrum;
pub mod window;

pub use compressor::Compressor;
pub use filter::{BandPass, Biquad, FilterError};
pub use spectrum::SpectrumAnalyzer;
