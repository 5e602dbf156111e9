//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for capture, array
//! geometry, DOA, beamformer, calibration and output, `AppPaths` for
//! cross-platform directories, and TOML persistence via `AppConfig::load` /
//! `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, ArrayConfig, AudioConfig, BandPassConfig, BeamformerConfig, BinStrategy,
    CalibrationConfig, CompressorConfig, ConfigError, DoaConfig, FilterMode, GainConfig,
    OutputConfig, PairSet,
};
