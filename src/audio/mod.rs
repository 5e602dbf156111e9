//! Audio plumbing around the DSP core: capture, blocks, metering, recording
//! and persistence.
//!
//! # Data flow
//!
//! ```text
//! cpal callback → BlockAssembler → BlockFeed (bounded, try_send)
//!              → worker: DOA → beamformer → Recording + RingBuffer (monitor)
//! flush        → condition (peak ceiling) → WavStore (16-bit PCM)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use array_steer::audio::{ActivityGate, BlockAssembler};
//!
//! // Six interleaved channels, microphones on 1..5, 4-sample blocks.
//! let mut assembler = BlockAssembler::new(4, 6, 1, 16_000);
//! let gate = ActivityGate::new(0.005);
//!
//! let mut blocks = Vec::new();
//! assembler.push(&vec![0.0_f32; 6 * 10], |b| blocks.push(b));
//! assert_eq!(blocks.len(), 2);
//! assert!(!gate.is_active(&blocks[0]));
//! ```

pub mod block;
pub mod buffer;
pub mod capture;
pub mod levels;
pub mod recording;
pub mod vad;
pub mod wav;

pub use block::{deinterleave, AudioBlock, BlockAssembler};
pub use buffer::RingBuffer;
pub use capture::{
    ArrayCapture, BlockFeed, CaptureCounters, CaptureError, InputDevice, StreamHandle,
};
pub use levels::{envelope, to_dbfs, Levels};
pub use recording::{condition, peak, Recording};
pub use vad::ActivityGate;
pub use wav::{RecordingStore, StoreError, WavStore};
