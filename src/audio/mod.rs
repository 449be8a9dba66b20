//! Audio pipeline — microphone capture → chunk buffer → 16 kHz s16le PCM.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → CaptureBackend callback → FrameAssembler (mono, fixed frames)
//!           → ChunkSink → ChunkGate ─(stop)─▶ codec::encode_pcm16 → Vec<u8>
//! ```
//!
//! [`AudioRecorder`] owns the session lifecycle; [`codec`] holds the pure
//! merge / resample / quantize / serialize stages.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_pcm::audio::{AudioRecorder, CaptureRequest, CpalBackend};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let recorder = AudioRecorder::new(Arc::new(CpalBackend::new()), CaptureRequest::default());
//! recorder.start().await?;
//! // ... later
//! let pcm: Option<Vec<u8>> = recorder.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod chunk;
pub mod codec;
pub mod recorder;
pub mod resample;

pub use capture::{CaptureBackend, CaptureError, CaptureRequest, CaptureSession, CpalBackend};
pub use chunk::{AudioChunk, ChunkGate, ChunkSink, FrameAssembler};
pub use codec::{CodecError, TARGET_SAMPLE_RATE};
pub use recorder::{AudioRecorder, RecorderError, StopError};
pub use resample::{resample, stereo_to_mono};
