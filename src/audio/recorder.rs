//! Capture controller — owns one live recording session at a time.
//!
//! [`AudioRecorder`] drives a [`CaptureBackend`] through the session
//! lifecycle and hands the accumulated chunks to the codec on stop.
//!
//! # Lifecycle
//!
//! ```text
//! start ──▶ [stop previous + settle] ──▶ open gate ──▶ backend.open(sink)
//!                                                      └─ frames ──▶ ChunkGate
//! stop  ──▶ close gate ──▶ disconnect ──▶ stop tracks ──▶ close (best effort)
//!       ──▶ encode_pcm16(chunks, actual rate → 16 kHz) ──▶ Some(bytes) | None
//! cleanup  ──▶ stop in the background if recording, result discarded
//! teardown ──▶ close gate, release handles, drop chunks unprocessed
//! ```
//!
//! Control operations are serialised by an async mutex, so two concurrent
//! `start` calls never interleave: the second one stops and finalises the
//! first session before opening its own.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_pcm::audio::{AudioRecorder, CaptureRequest, CpalBackend};
//!
//! # async fn example() -> Result<(), voice_pcm::audio::RecorderError> {
//! let recorder = AudioRecorder::new(Arc::new(CpalBackend::new()), CaptureRequest::default());
//! recorder.start().await?;
//! tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//! if let Some(pcm) = recorder.stop().await? {
//!     println!("{} bytes of 16 kHz s16le", pcm.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

use super::capture::{CaptureBackend, CaptureError, CaptureRequest, CaptureSession};
use super::chunk::ChunkGate;
use super::codec::{self, CodecError, TARGET_SAMPLE_RATE};

/// Default pause after stopping a superseded session, letting asynchronous
/// device teardown finish before the device is reopened.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Caller-facing recorder failure.  The message names the failing phase and
/// the underlying error is kept as the `source()`.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Failed to start recording: {0}")]
    Start(#[source] CaptureError),

    #[error("Failed to stop recording: {0}")]
    Stop(#[source] StopError),
}

/// Cause of a failed [`AudioRecorder::stop`].
#[derive(Debug, Error)]
pub enum StopError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

// ---------------------------------------------------------------------------
// AudioRecorder
// ---------------------------------------------------------------------------

/// Handle to a capture controller.  Cheap to clone; all clones drive the
/// same session.  When the last clone is dropped the controller tears down
/// any live session without processing it.
#[derive(Clone)]
pub struct AudioRecorder {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn CaptureBackend>,
    request: CaptureRequest,
    settle_delay: Duration,
    gate: Arc<ChunkGate>,
    /// Serialises start / stop.
    control: tokio::sync::Mutex<()>,
    /// Device handles of the live session.  Never held across an await.
    session: Mutex<Option<Box<dyn CaptureSession>>>,
    actual_rate: AtomicU32,
}

impl AudioRecorder {
    pub fn new(backend: Arc<dyn CaptureBackend>, request: CaptureRequest) -> Self {
        Self::with_settle_delay(backend, request, DEFAULT_SETTLE_DELAY)
    }

    pub fn with_settle_delay(
        backend: Arc<dyn CaptureBackend>,
        request: CaptureRequest,
        settle_delay: Duration,
    ) -> Self {
        let actual_rate = AtomicU32::new(request.sample_rate);
        Self {
            inner: Arc::new(Inner {
                backend,
                request,
                settle_delay,
                gate: ChunkGate::new(),
                control: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                actual_rate,
            }),
        }
    }

    /// Begin a new recording session.
    ///
    /// A session that is still live is stopped and finalised first (its
    /// audio is discarded), followed by the settle delay.
    ///
    /// # Errors
    ///
    /// [`RecorderError::Start`] wrapping the device error when the backend
    /// cannot open the input.  The recorder is left idle.
    pub async fn start(&self) -> Result<(), RecorderError> {
        let _control = self.inner.control.lock().await;

        if self.is_recording() {
            log::info!("recorder: start while recording; finalising previous session");
            match self.stop_locked().await {
                Ok(Some(pcm)) => {
                    log::debug!("recorder: discarded {} bytes from superseded session", pcm.len())
                }
                Ok(None) => {}
                Err(e) => log::warn!("recorder: previous session did not stop cleanly: {e}"),
            }
            tokio::time::sleep(self.inner.settle_delay).await;
        }

        // The gate opens before the backend registers its callback so the
        // first frames are never dropped.
        let sink = self.inner.gate.open();
        let generation = sink.generation();

        let mut session = match self.inner.backend.open(&self.inner.request, sink).await {
            Ok(session) => session,
            Err(e) => {
                self.inner.gate.close();
                self.inner.gate.clear();
                log::error!("recorder: {} backend failed to open input: {e}", self.inner.backend.name());
                return Err(RecorderError::Start(e));
            }
        };

        if !self.inner.gate.accepts(generation) && !self.inner.gate.device_lost() {
            log::warn!("recorder: torn down while opening; releasing new session");
            release(session.as_mut()).await.ok();
            self.inner.gate.clear();
            return Err(RecorderError::Start(CaptureError::Cancelled));
        }

        let rate = session.sample_rate();
        self.inner.actual_rate.store(rate, Ordering::SeqCst);
        *self.inner.session() = Some(session);

        log::info!(
            "recorder: recording via {} at {rate} Hz (requested {} Hz)",
            self.inner.backend.name(),
            self.inner.request.sample_rate
        );
        Ok(())
    }

    /// Stop recording and encode what was captured.
    ///
    /// Safe to call repeatedly and without a prior `start`.  Returns
    /// `Ok(None)` when no audio was captured, otherwise 16 kHz mono s16le
    /// PCM.  Device handles are released even when this fails.
    ///
    /// # Errors
    ///
    /// [`RecorderError::Stop`] when the frame callback could not be
    /// detached or the audio could not be encoded.  A failure to close the
    /// device is logged and ignored.
    pub async fn stop(&self) -> Result<Option<Vec<u8>>, RecorderError> {
        let _control = self.inner.control.lock().await;
        self.stop_locked().await
    }

    async fn stop_locked(&self) -> Result<Option<Vec<u8>>, RecorderError> {
        // First, so in-flight callbacks stop appending.
        self.inner.gate.close();

        let session = self.inner.session().take();
        let released = match session {
            Some(mut session) => release(session.as_mut()).await,
            None => Ok(()),
        };

        let chunks = self.inner.gate.take_chunks();
        released.map_err(|e| RecorderError::Stop(e.into()))?;

        if chunks.is_empty() {
            log::debug!("recorder: stopped with no audio captured");
            return Ok(None);
        }

        let rate = self.actual_sample_rate();
        let pcm = codec::encode_pcm16(&chunks, rate, TARGET_SAMPLE_RATE)
            .map_err(|e| RecorderError::Stop(e.into()))?;

        log::info!(
            "recorder: stopped; {} chunks → {} bytes ({:.2}s)",
            chunks.len(),
            pcm.len(),
            codec::pcm_duration_secs(&pcm, TARGET_SAMPLE_RATE)
        );
        Ok(Some(pcm))
    }

    /// Fire-and-forget stop for callers that are shutting down.
    ///
    /// Stops in the background only if a session is live; the result is
    /// discarded and errors are logged.  Outside a tokio runtime this falls
    /// back to [`teardown`](Self::teardown).
    pub fn cleanup(&self) {
        if !self.is_recording() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let recorder = self.clone();
                handle.spawn(async move {
                    if let Err(e) = recorder.stop().await {
                        log::warn!("recorder: cleanup stop failed: {e}");
                    }
                });
            }
            Err(_) => self.teardown(),
        }
    }

    /// Release everything without processing the captured audio.
    ///
    /// For callers that are being destroyed and cannot receive a result.
    /// Device closure is started but not awaited.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    /// `true` while a session holds device handles.
    pub fn is_recording(&self) -> bool {
        self.inner.session().is_some()
    }

    /// `true` while device frames are being accepted.
    pub fn is_accepting_audio(&self) -> bool {
        self.inner.gate.is_open()
    }

    /// Sample rate negotiated with the device for the latest session.
    pub fn actual_sample_rate(&self) -> u32 {
        self.inner.actual_rate.load(Ordering::SeqCst)
    }

    /// Seconds of audio captured so far in the current session.
    pub fn duration_secs(&self) -> f32 {
        let rate = self.actual_sample_rate();
        if rate == 0 {
            return 0.0;
        }
        self.inner.gate.total_samples() as f32 / rate as f32
    }

    /// Number of frames captured so far in the current session.
    pub fn chunk_count(&self) -> usize {
        self.inner.gate.chunk_count()
    }

    /// `true` if the input device disappeared during the current session.
    pub fn device_lost(&self) -> bool {
        self.inner.gate.device_lost()
    }

}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Option<Box<dyn CaptureSession>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn teardown(&self) {
        self.gate.close();
        let session = self.session().take();

        if let Some(mut session) = session {
            if let Err(e) = session.disconnect() {
                log::debug!("recorder: teardown disconnect failed: {e}");
            }
            session.stop_tracks();

            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = session.close().await {
                            log::debug!("recorder: teardown close failed: {e}");
                        }
                    });
                }
                Err(_) => drop(session),
            }
            // Chunks belong to whoever took the session; a stop that got
            // there first still encodes them.
            self.gate.clear();
            log::debug!("recorder: torn down without processing");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Release a session's handles in order.  Every step runs; a close failure
/// is logged and swallowed, a disconnect failure is returned.
async fn release(session: &mut dyn CaptureSession) -> Result<(), CaptureError> {
    let disconnected = session.disconnect();
    session.stop_tracks();
    if let Err(e) = session.close().await {
        log::warn!("recorder: error closing capture device (ignored): {e}");
    }
    disconnected
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
