//! 16-bit PCM WAV persistence via `hound`.
//!
//! [`WavStore`] writes timestamped files into one directory:
//!
//! ```text
//! <dir>/beamformed_20240501_142233.wav   mono, conditioned output
//! <dir>/raw_20240501_142233.wav          four microphone channels
//! ```
//!
//! Writing is blocking file I/O; callers on an async runtime run it inside
//! `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create recordings directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("nothing to save")]
    Empty,

    #[error("channels have different lengths")]
    RaggedChannels,
}

// ---------------------------------------------------------------------------
// RecordingStore
// ---------------------------------------------------------------------------

/// Destination for flushed recordings.
pub trait RecordingStore: Send + Sync {
    /// Persist a conditioned mono buffer in `[-1, 1]`.
    fn save_mono(&self, samples: &[f32], sample_rate: u32) -> Result<PathBuf, StoreError>;

    /// Persist equal-length channels as one interleaved file.
    fn save_channels(&self, channels: &[Vec<f32>], sample_rate: u32)
        -> Result<PathBuf, StoreError>;

    /// Delete a file this store wrote, used to roll back a partial save.
    fn remove(&self, path: &Path) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// WavStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WavStore {
    dir: PathBuf,
}

impl WavStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<prefix>_YYYYmmdd_HHMMSS.wav`, with `_1`, `_2`, ... appended if
    /// a file with that name already exists.
    fn next_path(&self, prefix: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let base = format!("{prefix}_{stamp}");
        let mut path = self.dir.join(format!("{base}.wav"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{base}_{n}.wav"));
            n += 1;
        }
        path
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    fn write(
        &self,
        prefix: &str,
        channels: &[&[f32]],
        sample_rate: u32,
    ) -> Result<PathBuf, StoreError> {
        let frames = channels.first().map_or(0, |c| c.len());
        if frames == 0 {
            return Err(StoreError::Empty);
        }
        if channels.iter().any(|c| c.len() != frames) {
            return Err(StoreError::RaggedChannels);
        }
        self.ensure_dir()?;

        let spec = hound::WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = self.next_path(prefix);
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for n in 0..frames {
            for channel in channels {
                writer.write_sample(to_i16(channel[n]))?;
            }
        }
        writer.finalize()?;

        log::info!(
            "audio: saved {} ({} ch, {:.2}s)",
            path.display(),
            channels.len(),
            frames as f32 / sample_rate.max(1) as f32
        );
        Ok(path)
    }
}

impl RecordingStore for WavStore {
    fn save_mono(&self, samples: &[f32], sample_rate: u32) -> Result<PathBuf, StoreError> {
        self.write("beamformed", &[samples], sample_rate)
    }

    fn save_channels(
        &self,
        channels: &[Vec<f32>],
        sample_rate: u32,
    ) -> Result<PathBuf, StoreError> {
        let refs: Vec<&[f32]> = channels.iter().map(Vec::as_slice).collect();
        self.write("raw", &refs, sample_rate)
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        std::fs::remove_file(path).map_err(|source| StoreError::Remove {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("audio: removed {}", path.display());
        Ok(())
    }
}

/// Full-scale float to 16-bit PCM with clamping.
fn to_i16(sample: f32) -> i16 {
    let s = if sample.is_finite() { sample } else { 0.0 };
    (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
