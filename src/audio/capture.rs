//! Microphone capture devices.
//!
//! The recorder talks to hardware through two traits:
//!
//! * [`CaptureBackend`] acquires an input device for a [`CaptureRequest`]
//!   and starts pushing fixed-size mono frames into a [`ChunkSink`].
//! * [`CaptureSession`] owns the acquired handles and releases them in
//!   three steps: detach the frame callback, stop the stream, close the
//!   device.
//!
//! [`CpalBackend`] is the production implementation.  `cpal::Stream` is not
//! `Send` on every platform, so each session runs its stream on a dedicated
//! `audio-capture` thread and controls it over a command channel.  Dropping
//! the session shuts that thread down.

use std::sync::mpsc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use thiserror::Error;
use tokio::sync::oneshot;

use super::chunk::{ChunkSink, FrameAssembler};
use super::codec::TARGET_SAMPLE_RATE;

// ---------------------------------------------------------------------------
// CaptureRequest
// ---------------------------------------------------------------------------

/// What the recorder asks of the input device.
///
/// The device may not honour `sample_rate`; the session reports the rate it
/// actually negotiated.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Requested channel count.  Frames are always downmixed to mono.
    pub channels: u16,
    /// Mono samples per delivered frame.
    pub frame_size: usize,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Input device name; `None` selects the host default.
    pub device_name: Option<String>,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: 1,
            frame_size: 4_096,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: false,
            device_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring, running or releasing a device.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("capture worker failed: {0}")]
    Worker(String),

    #[error("capture was torn down while the device was opening")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of capture sessions.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire an input device and start delivering frames into `sink`.
    ///
    /// Suspends while the platform grants access to the device.
    async fn open(
        &self,
        request: &CaptureRequest,
        sink: ChunkSink,
    ) -> Result<Box<dyn CaptureSession>, CaptureError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Handles held for one live capture.
#[async_trait]
pub trait CaptureSession: Send {
    /// Sample rate the device actually negotiated, in Hz.
    fn sample_rate(&self) -> u32;

    /// Detach the frame callback from the stream.
    fn disconnect(&mut self) -> Result<(), CaptureError>;

    /// Stop the input stream.
    fn stop_tracks(&mut self);

    /// Release the device.  May be slow.
    async fn close(&mut self) -> Result<(), CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// Capture backend built on the default `cpal` host.
#[derive(Debug, Default, Clone)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// Names of all input devices on the default host.
    pub fn input_device_names() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        Ok(host
            .input_devices()?
            .filter_map(|d| d.name().ok())
            .collect())
    }

    /// Name of the host's default input device, if any.
    pub fn default_input_device_name() -> Option<String> {
        cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
    }
}

#[async_trait]
impl CaptureBackend for CpalBackend {
    async fn open(
        &self,
        request: &CaptureRequest,
        sink: ChunkSink,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let request = request.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (command_tx, command_rx) = mpsc::channel();

        let worker = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || run_worker(&request, sink, ready_tx, command_rx))
            .map_err(|e| CaptureError::Worker(format!("failed to spawn capture thread: {e}")))?;

        let sample_rate = match ready_rx.await {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(CaptureError::Worker(
                    "capture thread exited before the stream started".into(),
                ))
            }
        };

        Ok(Box::new(CpalSession {
            sample_rate,
            commands: command_tx,
            worker: Some(worker),
        }))
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

enum WorkerCommand {
    Pause,
    Shutdown,
}

struct CpalSession {
    sample_rate: u32,
    commands: mpsc::Sender<WorkerCommand>,
    worker: Option<JoinHandle<()>>,
}

#[async_trait]
impl CaptureSession for CpalSession {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn disconnect(&mut self) -> Result<(), CaptureError> {
        self.commands
            .send(WorkerCommand::Pause)
            .map_err(|_| CaptureError::Worker("capture thread is no longer running".into()))
    }

    fn stop_tracks(&mut self) {
        // The worker may already be gone; nothing left to stop then.
        let _ = self.commands.send(WorkerCommand::Shutdown);
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.commands.send(WorkerCommand::Shutdown);

        match tokio::task::spawn_blocking(move || worker.join()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(CaptureError::Worker("capture thread panicked".into())),
            Err(e) => Err(CaptureError::Worker(format!("failed to join capture thread: {e}"))),
        }
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
    }
}

/// Body of the `audio-capture` thread: owns the `cpal::Stream` for its whole
/// life and drops it on shutdown.
fn run_worker(
    request: &CaptureRequest,
    sink: ChunkSink,
    ready: oneshot::Sender<Result<u32, CaptureError>>,
    commands: mpsc::Receiver<WorkerCommand>,
) {
    let (stream, sample_rate) = match open_stream(request, sink) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(sample_rate)).is_err() {
        log::debug!("capture: recorder went away during setup; releasing stream");
        return;
    }

    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Pause => {
                if let Err(e) = stream.pause() {
                    log::debug!("capture: stream pause unsupported ({e}); dropping on shutdown");
                }
            }
            WorkerCommand::Shutdown => break,
        }
    }

    drop(stream);
    log::debug!("capture: input stream released");
}

fn open_stream(
    request: &CaptureRequest,
    sink: ChunkSink,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = select_device(&host, request.device_name.as_deref())?;
    let supported = negotiate_config(&device, request)?;

    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;

    log::info!(
        "capture: '{}' opened at {} Hz, {} ch, {:?} (requested {} Hz)",
        device.name().unwrap_or_else(|_| "<unnamed>".into()),
        sample_rate,
        config.channels,
        format,
        request.sample_rate
    );
    log::debug!(
        "capture: echo_cancellation={} noise_suppression={} auto_gain_control={} \
         are applied by the platform input device",
        request.echo_cancellation,
        request.noise_suppression,
        request.auto_gain_control
    );

    let stream = match format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, request.frame_size, sink)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, request.frame_size, sink)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, request.frame_size, sink)?,
        other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    Ok((stream, sample_rate))
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    match name {
        None => host.default_input_device().ok_or(CaptureError::NoDevice),
        Some(wanted) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string())),
    }
}

/// Pick a stream config at the requested rate, preferring the requested
/// channel count; fall back to the device default.
fn negotiate_config(
    device: &cpal::Device,
    request: &CaptureRequest,
) -> Result<cpal::SupportedStreamConfig, CaptureError> {
    let target = cpal::SampleRate(request.sample_rate);
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device.supported_input_configs()?.collect();

    let at_rate = |r: &&cpal::SupportedStreamConfigRange| {
        r.min_sample_rate() <= target && target <= r.max_sample_rate()
    };

    let chosen = ranges
        .iter()
        .filter(at_rate)
        .find(|r| r.channels() == request.channels)
        .or_else(|| ranges.iter().find(at_rate));

    match chosen {
        Some(range) => Ok(range.clone().with_sample_rate(target)),
        None => {
            let fallback = device.default_input_config()?;
            log::info!(
                "capture: device cannot run at {} Hz; using its default {} Hz",
                request.sample_rate,
                fallback.sample_rate().0
            );
            Ok(fallback)
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    frame_size: usize,
    sink: ChunkSink,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut assembler = FrameAssembler::new(frame_size, config.channels);
    let mut scratch: Vec<f32> = Vec::new();
    let error_sink = sink.clone();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|&s| f32::from_sample(s)));
            assembler.push_interleaved(&scratch, |frame| {
                sink.push(frame);
            });
        },
        move |err: cpal::StreamError| match err {
            cpal::StreamError::DeviceNotAvailable => {
                error_sink.device_lost("device not available");
            }
            other => log::error!("cpal stream error: {other}"),
        },
        None, // no timeout
    )?;

    Ok(stream)
}

// ---------------------------------------------------------------------------
// Scripted backend for tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
