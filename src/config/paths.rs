//! Where array-steer keeps its files, resolved with `dirs`.
//!
//! ```text
//! <config dir>/array-steer/
//!     settings.toml                      AppConfig
//!     calibration.json                   last applied calibration report
//! <local data dir>/array-steer/recordings/
//!     beamformed_YYYYmmdd_HHMMSS.wav     conditioned beam output, mono
//!     raw_YYYYmmdd_HHMMSS.wav            the four microphones, when enabled
//! ```
//!
//! `output.recordings_dir` in the settings replaces the recordings directory.
//! A platform without a standard directory falls back to `./array-steer`.

use std::path::{Path, PathBuf};

const APP_NAME: &str = "array-steer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    pub calibration_file: PathBuf,
    /// Default home of saved WAV files.
    pub recordings_dir: PathBuf,
}

impl AppPaths {
    /// Platform locations for the current user.
    pub fn new() -> Self {
        let base = |dir: Option<PathBuf>| dir.unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME);
        Self::from_dirs(&base(dirs::config_dir()), &base(dirs::data_local_dir()))
    }

    /// Layout rooted at explicit config and data directories.
    pub fn from_dirs(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            settings_file: config_dir.join("settings.toml"),
            calibration_file: config_dir.join("calibration.json"),
            recordings_dir: data_dir.join("recordings"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
