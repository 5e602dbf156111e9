//! Application settings structs, defaults, validation and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the worker
//! thread by value.  Every value is fixed once the system is constructed;
//! there is no hot reload.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration value that cannot be used to build the processing chain.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid configuration `{field}`: {reason}")]
pub struct ConfigError {
    /// Dotted path of the offending field (e.g. `"array.resolution_deg"`).
    pub field: &'static str,
    /// Human-readable explanation.
    pub reason: String,
}

impl ConfigError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture format delivered by the hardware collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per channel in one block.
    pub block_size: usize,
    /// Interleaved channels delivered by the device (the ReSpeaker 4-mic
    /// USB array exposes 6).
    pub capture_channels: u16,
    /// Index of the first microphone channel; the four microphones occupy
    /// `first_mic_channel..first_mic_channel + 4`.
    pub first_mic_channel: u16,
    /// Case-insensitive substring used to pick the input device.  `None`
    /// means the system default input.
    pub device_hint: Option<String>,
    /// Exact device name as printed by `array-steer devices`.  Overrides
    /// the hint.
    pub device_name: Option<String>,
    /// Position in the `array-steer devices` listing.  Overrides both the
    /// name and the hint.
    pub device_index: Option<usize>,
    /// Depth of the bounded block queue between the capture callback and the
    /// DSP worker.
    pub queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            block_size: 1024,
            capture_channels: 6,
            first_mic_channel: 1,
            device_hint: Some("respeaker".into()),
            device_name: None,
            device_index: None,
            queue_depth: 8,
        }
    }
}

impl AudioConfig {
    /// Wall-clock duration of one block.
    pub fn block_period(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }
}

// ---------------------------------------------------------------------------
// ArrayConfig
// ---------------------------------------------------------------------------

/// Geometry of the fixed four-microphone circular array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Radius of the microphone circle in metres.
    pub radius_m: f64,
    /// Speed of sound in m/s.
    pub sound_speed_mps: f64,
    /// Angle of microphone 0 on the circle; the others follow every 90°
    /// counter-clockwise.
    pub first_mic_angle_deg: f64,
    /// Spacing of the candidate-angle grid in degrees.  Must divide 360.
    pub resolution_deg: f64,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            radius_m: 0.0325,
            sound_speed_mps: 343.0,
            first_mic_angle_deg: -90.0,
            resolution_deg: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// DoaConfig
// ---------------------------------------------------------------------------

/// Which FFT bins take part in the SRP-PHAT score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BinStrategy {
    /// Every bin whose centre frequency lies in `[min_hz, max_hz]`.
    Band { min_hz: f64, max_hz: f64 },
    /// The bins nearest to a short list of frequencies (e.g. formant-adjacent
    /// voice frequencies).
    Strategic { freqs_hz: Vec<f64> },
}

impl Default for BinStrategy {
    fn default() -> Self {
        Self::Band {
            min_hz: 500.0,
            max_hz: 3000.0,
        }
    }
}

/// Microphone pairs whose cross-spectra are accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairSet {
    /// The four neighbouring pairs around the ring.
    Adjacent,
    /// The four neighbours plus the two diagonals.
    AdjacentAndDiagonal,
}

impl Default for PairSet {
    fn default() -> Self {
        Self::AdjacentAndDiagonal
    }
}

/// Direction-of-arrival estimator tuning.
///
/// The confidence thresholds were tuned by ear and are environment
/// dependent; they are exposed here rather than baked into the estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoaConfig {
    /// RMS (after DC removal) below which a block counts as silence.
    pub activity_threshold: f32,
    /// Frequency-bin selection.
    pub bins: BinStrategy,
    /// Microphone pairs used for cross-spectra.
    pub pairs: PairSet,
    /// Angular stride of the coarse full-circle search.
    pub coarse_stride_deg: f64,
    /// Half-width of the full-resolution window around the coarse peak.
    pub fine_half_width_deg: f64,
    /// Active blocks between full coarse searches; in between, only the
    /// window around the last raw angle is searched.  `1` searches the full
    /// circle on every block.
    pub coarse_refresh_blocks: u32,
    /// Peak score below which no source is considered detectable.
    pub score_floor: f64,
    /// Raw confidence below which the previous angle is kept.
    pub low_confidence: f64,
    /// Multiplier applied to the raw confidence of a rejected estimate.
    pub low_confidence_discount: f64,
    /// Per-block confidence decay while inactive or without a source.
    pub inactive_decay: f64,
    /// Capacity of the median-smoothing history.
    pub smoothing_capacity: usize,
}

impl Default for DoaConfig {
    fn default() -> Self {
        Self {
            activity_threshold: 0.005,
            bins: BinStrategy::default(),
            pairs: PairSet::default(),
            coarse_stride_deg: 10.0,
            fine_half_width_deg: 15.0,
            coarse_refresh_blocks: 4,
            score_floor: 1e-12,
            low_confidence: 0.3,
            low_confidence_discount: 0.5,
            inactive_decay: 0.85,
            smoothing_capacity: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// BeamformerConfig
// ---------------------------------------------------------------------------

/// Confidence-tiered output gain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GainConfig {
    /// Gain applied to every block before the tier multiplier.
    pub base_gain: f32,
    /// Confidence at or above which `high_gain` applies.
    pub high_confidence: f64,
    /// Confidence below which `low_gain` applies.
    pub low_confidence: f64,
    /// Tier multiplier for confident blocks.
    pub high_gain: f32,
    /// Tier multiplier between the two thresholds.
    pub mid_gain: f32,
    /// Tier multiplier for unreliable blocks.
    pub low_gain: f32,
    /// Consecutive high-confidence blocks before the bonus applies (0 disables).
    pub bonus_after_blocks: u32,
    /// Extra multiplier once the bonus applies.
    pub bonus_gain: f32,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            base_gain: 2.0,
            high_confidence: 0.7,
            low_confidence: 0.4,
            high_gain: 1.0,
            mid_gain: 0.7,
            low_gain: 0.4,
            bonus_after_blocks: 5,
            bonus_gain: 1.1,
        }
    }
}

/// Downward compressor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressorConfig {
    /// Threshold in dBFS.
    pub threshold_db: f32,
    /// Compression ratio (input dB over threshold : output dB over threshold).
    pub ratio: f32,
    /// Length of the moving-average envelope in samples.
    pub envelope_window: usize,
    /// Weight of the previous gain in the per-sample gain smoother.
    pub gain_smoothing: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 4.0,
            envelope_window: 100,
            gain_smoothing: 0.99,
        }
    }
}

/// How the band-pass filter is run over each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Causal filtering with state carried across blocks.
    Causal,
    /// Forward-backward filtering within each block; no state is kept.
    ZeroPhase,
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::Causal
    }
}

/// Speech band-pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandPassConfig {
    /// Disable to pass the compressed signal through untouched.
    pub enabled: bool,
    /// Lower -3 dB edge in Hz.
    pub low_hz: f64,
    /// Upper -3 dB edge in Hz.
    pub high_hz: f64,
    /// Butterworth order of each edge.
    pub order: usize,
    /// Streaming or zero-phase operation.
    pub mode: FilterMode,
}

impl Default for BandPassConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            low_hz: 300.0,
            high_hz: 3400.0,
            order: 4,
            mode: FilterMode::default(),
        }
    }
}

/// Delay-sum beamformer and output conditioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamformerConfig {
    /// Interpolate between samples using the fractional part of each delay.
    pub fractional_alignment: bool,
    /// Apply a Hann window to the input block before alignment.
    pub window_input: bool,
    /// Confidence-tiered gain.
    pub gain: GainConfig,
    /// Dynamic range compression.
    pub compressor: CompressorConfig,
    /// Speech band-pass.
    pub band_pass: BandPassConfig,
    /// Half-cosine fade-out length at the end of each block (0 disables).
    pub fade_len: usize,
    /// Seconds of output kept in the monitoring ring.
    pub monitor_secs: f32,
    /// Scale of the monitoring copy.  Never applied to the saved stream.
    pub monitor_gain: f32,
    /// Peak amplitude above which the whole recording is scaled down at save
    /// time.
    pub safety_ceiling: f32,
}

impl Default for BeamformerConfig {
    fn default() -> Self {
        Self {
            fractional_alignment: false,
            window_input: false,
            gain: GainConfig::default(),
            compressor: CompressorConfig::default(),
            band_pass: BandPassConfig::default(),
            fade_len: 32,
            monitor_secs: 5.0,
            monitor_gain: 1.0,
            safety_ceiling: 0.8,
        }
    }
}

// ---------------------------------------------------------------------------
// CalibrationConfig
// ---------------------------------------------------------------------------

/// Static offset calibration against a source at a known angle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Estimates below this confidence are discarded.
    pub confidence_floor: f64,
    /// Interval between polls of the published estimate.
    pub poll_interval_ms: u64,
    /// Absolute median error (degrees) below which no offset is applied.
    pub error_threshold_deg: f64,
    /// Write the result to `calibration.json` after a successful run.
    pub persist: bool,
    /// Apply the offset from `calibration.json` at start-up.
    pub load_saved: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.4,
            poll_interval_ms: 500,
            error_threshold_deg: 2.0,
            persist: true,
            load_saved: true,
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

/// Where and what to record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for WAV files.  `None` uses the platform data directory.
    pub recordings_dir: Option<PathBuf>,
    /// Also keep the raw four microphone channels for saving.
    pub record_raw: bool,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use array_steer::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Capture format.
    pub audio: AudioConfig,
    /// Array geometry.
    pub array: ArrayConfig,
    /// Direction-of-arrival estimator.
    pub doa: DoaConfig,
    /// Beamformer and conditioning chain.
    pub beamformer: BeamformerConfig,
    /// Offset calibration.
    pub calibration: CalibrationConfig,
    /// Recording output.
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory recordings are written to.
    pub fn recordings_dir(&self) -> PathBuf {
        self.output
            .recordings_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().recordings_dir)
    }

    /// Check every value the processing chain depends on.
    ///
    /// Band-pass edges are not checked here. An unusable filter degrades to
    /// a pass-through when the beamformer is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(ConfigError::new("audio.sample_rate", "must be > 0"));
        }
        if audio.block_size < 16 {
            return Err(ConfigError::new("audio.block_size", "must be at least 16"));
        }
        if audio.first_mic_channel as usize + 4 > audio.capture_channels as usize {
            return Err(ConfigError::new(
                "audio.capture_channels",
                format!(
                    "{} channels cannot hold four microphones starting at channel {}",
                    audio.capture_channels, audio.first_mic_channel
                ),
            ));
        }
        if audio.queue_depth == 0 {
            return Err(ConfigError::new("audio.queue_depth", "must be > 0"));
        }

        let array = &self.array;
        if !(array.radius_m > 0.0) {
            return Err(ConfigError::new("array.radius_m", "must be > 0"));
        }
        if !(array.sound_speed_mps > 0.0) {
            return Err(ConfigError::new("array.sound_speed_mps", "must be > 0"));
        }
        if !(array.resolution_deg > 0.0 && array.resolution_deg <= 90.0)
            || !divides(array.resolution_deg, 360.0)
        {
            return Err(ConfigError::new(
                "array.resolution_deg",
                "must lie in (0, 90] and divide 360",
            ));
        }

        let doa = &self.doa;
        if !divides(array.resolution_deg, doa.coarse_stride_deg)
            || doa.coarse_stride_deg < array.resolution_deg
        {
            return Err(ConfigError::new(
                "doa.coarse_stride_deg",
                "must be a multiple of array.resolution_deg",
            ));
        }
        if doa.fine_half_width_deg < 0.0 {
            return Err(ConfigError::new("doa.fine_half_width_deg", "must be >= 0"));
        }
        if doa.coarse_refresh_blocks == 0 {
            return Err(ConfigError::new("doa.coarse_refresh_blocks", "must be > 0"));
        }
        if doa.smoothing_capacity == 0 {
            return Err(ConfigError::new("doa.smoothing_capacity", "must be > 0"));
        }
        for (field, value) in [
            ("doa.low_confidence", doa.low_confidence),
            ("doa.low_confidence_discount", doa.low_confidence_discount),
            ("doa.inactive_decay", doa.inactive_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::new(field, "must lie in [0, 1]"));
            }
        }
        match &doa.bins {
            BinStrategy::Band { min_hz, max_hz } if !(min_hz < max_hz) => {
                return Err(ConfigError::new("doa.bins", "min_hz must be below max_hz"));
            }
            BinStrategy::Strategic { freqs_hz } if freqs_hz.is_empty() => {
                return Err(ConfigError::new("doa.bins", "needs at least one frequency"));
            }
            _ => {}
        }

        let gain = &self.beamformer.gain;
        if !(0.0..=1.0).contains(&gain.low_confidence)
            || !(0.0..=1.0).contains(&gain.high_confidence)
            || gain.low_confidence > gain.high_confidence
        {
            return Err(ConfigError::new(
                "beamformer.gain",
                "confidence thresholds must satisfy 0 <= low <= high <= 1",
            ));
        }
        let comp = &self.beamformer.compressor;
        if !(comp.ratio >= 1.0) {
            return Err(ConfigError::new("beamformer.compressor.ratio", "must be >= 1"));
        }
        if comp.envelope_window == 0 {
            return Err(ConfigError::new(
                "beamformer.compressor.envelope_window",
                "must be > 0",
            ));
        }
        if !(0.0..1.0).contains(&comp.gain_smoothing) {
            return Err(ConfigError::new(
                "beamformer.compressor.gain_smoothing",
                "must lie in [0, 1)",
            ));
        }
        if !(self.beamformer.safety_ceiling > 0.0 && self.beamformer.safety_ceiling <= 1.0) {
            return Err(ConfigError::new(
                "beamformer.safety_ceiling",
                "must lie in (0, 1]",
            ));
        }

        if !(0.0..=1.0).contains(&self.calibration.confidence_floor) {
            return Err(ConfigError::new(
                "calibration.confidence_floor",
                "must lie in [0, 1]",
            ));
        }
        if self.calibration.poll_interval_ms == 0 {
            return Err(ConfigError::new("calibration.poll_interval_ms", "must be > 0"));
        }

        Ok(())
    }
}

/// `true` when `whole` is an integer multiple of `step` (within rounding).
fn divides(step: f64, whole: f64) -> bool {
    if step <= 0.0 {
        return false;
    }
    let n = whole / step;
    (n - n.round()).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
