//! Direction finding and adaptive beamforming for a four-microphone circular
//! array.
//!
//! | Module | Role |
//! |--------|------|
//! | [`array`] | geometry, per-angle delay tables |
//! | [`dsp`] | window, FFT, Butterworth band-pass, compressor |
//! | [`doa`] | SRP-PHAT direction estimator with smoothing and offset |
//! | [`beamformer`] | delay-sum beamformer and output conditioning |
//! | [`calibration`] | static offset calibration |
//! | [`audio`] | capture, blocks, metering, recording, WAV persistence |
//! | [`pipeline`] | per-block ordering, worker thread, owning context |
//! | [`config`] | settings, paths, validation |

pub mod array;
pub mod audio;
pub mod beamformer;
pub mod calibration;
pub mod config;
pub mod doa;
pub mod dsp;
pub mod pipeline;

#[cfg(test)]
mod testing;
