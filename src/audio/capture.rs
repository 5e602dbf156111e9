//! Array capture via `cpal`.
//!
//! [`ArrayCapture`] opens the microphone array at a fixed sample rate and
//! channel count.  The device is chosen in this order:
//!
//! 1. `device_index`, a position in [`ArrayCapture::list_devices`];
//! 2. `device_name`, an exact name from the same listing;
//! 3. the first device whose name contains `device_hint`;
//! 4. the system default input.
//!
//! A device picked by index or name must offer enough input channels or
//! opening fails.  The cpal callback re-chunks whatever it receives into
//! exact blocks with a [`BlockAssembler`] and offers each one to a
//! [`BlockFeed`].  The feed never blocks: when the bounded queue is full the
//! block is dropped and counted as an overflow.  The returned
//! [`StreamHandle`] is a RAII guard; dropping it stops the stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::array::NUM_MICS;
use crate::config::AudioConfig;

use super::{AudioBlock, BlockAssembler};

/// Minimum spacing between overflow warnings.
const OVERFLOW_WARN_INTERVAL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// CaptureCounters
// ---------------------------------------------------------------------------

/// Delivery faults reported by the capture side.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    overflows: AtomicU64,
    faults: AtomicU64,
}

impl CaptureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks dropped because the processing queue was full.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Stream errors reported by the audio backend.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.overflows.store(0, Ordering::Relaxed);
        self.faults.store(0, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// BlockFeed
// ---------------------------------------------------------------------------

/// Producer end of the bounded block queue.
///
/// Lives on the capture thread.  [`BlockFeed::offer`] never waits.
#[derive(Debug)]
pub struct BlockFeed {
    tx: SyncSender<AudioBlock>,
    counters: Arc<CaptureCounters>,
    last_warning: Option<Instant>,
    dropped_since_warning: u64,
}

impl BlockFeed {
    pub fn new(tx: SyncSender<AudioBlock>, counters: Arc<CaptureCounters>) -> Self {
        Self {
            tx,
            counters,
            last_warning: None,
            dropped_since_warning: 0,
        }
    }

    pub fn counters(&self) -> Arc<CaptureCounters> {
        Arc::clone(&self.counters)
    }

    /// Queue `block` for processing.
    ///
    /// Returns `false` if the block was dropped, either because the queue is
    /// full (counted as an overflow) or because the consumer has gone away.
    pub fn offer(&mut self, block: AudioBlock) -> bool {
        match self.tx.try_send(block) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                self.counters.overflows.fetch_add(1, Ordering::Relaxed);
                self.dropped_since_warning += 1;
                let due = self
                    .last_warning
                    .map_or(true, |t| t.elapsed() >= OVERFLOW_WARN_INTERVAL);
                if due {
                    log::warn!(
                        "capture: processing queue full, dropped {} block(s) (latest #{})",
                        self.dropped_since_warning,
                        dropped.sequence
                    );
                    self.last_warning = Some(Instant::now());
                    self.dropped_since_warning = 0;
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("no input device {0}")]
    DeviceNotFound(String),

    #[error("input device '{name}' has {available} channels, the array needs {required}")]
    TooFewChannels {
        name: String,
        available: u16,
        required: u16,
    },

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// InputDevice
// ---------------------------------------------------------------------------

/// One entry of the input device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    /// Position in the listing, usable as `audio.device_index`.
    pub index: usize,
    pub name: String,
    /// Largest channel count any supported input configuration offers.
    pub max_input_channels: u16,
    /// Whether this is the host's default input.
    pub is_default: bool,
}

impl InputDevice {
    /// Whether the device can deliver `required` interleaved channels.
    pub fn can_host(&self, required: u16) -> bool {
        self.max_input_channels >= required
    }
}

/// Explicit device choice from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManualChoice<'a> {
    Index(usize),
    Name(&'a str),
}

impl<'a> ManualChoice<'a> {
    fn from_config(config: &'a AudioConfig) -> Option<Self> {
        match (config.device_index, config.device_name.as_deref()) {
            (Some(index), _) => Some(Self::Index(index)),
            (None, Some(name)) => Some(Self::Name(name)),
            (None, None) => None,
        }
    }
}

/// Position in `devices` of the manually chosen device, provided it has at
/// least `required` channels.
fn resolve_manual(
    devices: &[InputDevice],
    choice: ManualChoice<'_>,
    required: u16,
) -> Result<usize, CaptureError> {
    let found = match choice {
        ManualChoice::Index(index) => devices.iter().position(|d| d.index == index),
        ManualChoice::Name(name) => devices.iter().position(|d| d.name == name),
    };
    let position = found.ok_or_else(|| {
        CaptureError::DeviceNotFound(match choice {
            ManualChoice::Index(index) => format!("at index {index}"),
            ManualChoice::Name(name) => format!("named '{name}'"),
        })
    })?;

    let device = &devices[position];
    if !device.can_host(required) {
        return Err(CaptureError::TooFewChannels {
            name: device.name.clone(),
            available: device.max_input_channels,
            required,
        });
    }
    Ok(position)
}

// ---------------------------------------------------------------------------
// ArrayCapture
// ---------------------------------------------------------------------------

/// Four-microphone array input built on `cpal`.
///
/// ```rust,no_run
/// use std::sync::{mpsc, Arc};
/// use array_steer::audio::{ArrayCapture, BlockFeed, CaptureCounters};
/// use array_steer::config::AudioConfig;
///
/// let config = AudioConfig::default();
/// let (tx, rx) = mpsc::sync_channel(config.queue_depth);
/// let capture = ArrayCapture::open(&config).unwrap();
/// let _handle = capture.start(BlockFeed::new(tx, Arc::new(CaptureCounters::new()))).unwrap();
///
/// while let Ok(block) = rx.recv() {
///     println!("block #{}: {} samples", block.sequence, block.len());
/// }
/// ```
pub struct ArrayCapture {
    device: cpal::Device,
    device_name: String,
    config: AudioConfig,
}

impl ArrayCapture {
    /// Every input device on the default host with its channel count.
    pub fn list_devices() -> Result<Vec<InputDevice>, CaptureError> {
        let host = cpal::default_host();
        Ok(enumerate(&host)?.into_iter().map(|(info, _)| info).collect())
    }

    /// Pick the input device (see the module docs for the order).
    pub fn open(config: &AudioConfig) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let required = config.capture_channels.max(NUM_MICS as u16);

        let device = match ManualChoice::from_config(config) {
            Some(choice) => {
                let mut devices = enumerate(&host)?;
                let infos: Vec<InputDevice> = devices.iter().map(|(info, _)| info.clone()).collect();
                let position = resolve_manual(&infos, choice, required)?;
                devices.swap_remove(position).1
            }
            None => {
                let hinted = match &config.device_hint {
                    Some(hint) => find_hinted(&host, hint, required)?,
                    None => None,
                };
                match hinted {
                    Some(device) => device,
                    None => {
                        if let Some(hint) = &config.device_hint {
                            log::warn!("capture: no input device matching '{hint}', using default");
                        }
                        host.default_input_device().ok_or(CaptureError::NoDevice)?
                    }
                }
            }
        };
        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
        log::info!("capture: using input device '{device_name}'");

        Ok(Self {
            device,
            device_name,
            config: config.clone(),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Start streaming blocks into `feed`.
    ///
    /// The backend picks its own hardware buffer size; the assembler turns
    /// whatever arrives into exact `block_size` blocks.
    pub fn start(&self, mut feed: BlockFeed) -> Result<StreamHandle, CaptureError> {
        let stream_config = cpal::StreamConfig {
            channels: self.config.capture_channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let counters = feed.counters();
        let mut assembler = BlockAssembler::new(
            self.config.block_size,
            self.config.capture_channels as usize,
            self.config.first_mic_channel as usize,
            self.config.sample_rate,
        );

        let stream = self.device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                assembler.push(data, |block| {
                    feed.offer(block);
                });
            },
            move |err: cpal::StreamError| {
                counters.record_fault();
                log::error!("capture: stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        log::info!(
            "capture: streaming {} ch @ {} Hz, {}-sample blocks",
            self.config.capture_channels,
            self.config.sample_rate,
            self.config.block_size
        );
        Ok(StreamHandle { _stream: stream })
    }
}

fn max_input_channels(device: &cpal::Device) -> u16 {
    device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

fn enumerate(host: &cpal::Host) -> Result<Vec<(InputDevice, cpal::Device)>, CaptureError> {
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let devices = host
        .input_devices()?
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "<unknown>".into());
            let info = InputDevice {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                max_input_channels: max_input_channels(&device),
                name,
            };
            (info, device)
        })
        .collect();
    Ok(devices)
}

fn find_hinted(
    host: &cpal::Host,
    hint: &str,
    channels: u16,
) -> Result<Option<cpal::Device>, CaptureError> {
    let hint = hint.to_lowercase();
    for device in host.input_devices()? {
        let Ok(name) = device.name() else { continue };
        if !name.to_lowercase().contains(&hint) {
            continue;
        }
        if max_input_channels(&device) >= channels {
            return Ok(Some(device));
        }
        log::debug!("capture: '{name}' has fewer than {channels} input channels");
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
