//! Microphone capture actor.
//!
//! `cpal::Stream` is `!Send` on some platforms, so the stream lives on a
//! dedicated OS thread and the rest of the client talks to it through the
//! `Send + Sync` [`AudioCaptureHandle`]. The same thread doubles as the
//! device monitor: while recording, it polls the default input device and
//! reopens the stream (after a settle delay) when the default moves, so a
//! mid-capture headset switch does not kill the session.
//!
//! Captured audio is accumulated as mono f32 at whatever rate the device
//! opened with, then downmixed/resampled to 16 kHz mono i16 on `stop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use rubato::{FftFixedIn, Resampler as _};

use crate::audio_io::InputCapture;
use crate::device::{capture_rate_candidates, detect_profile};
use crate::error::ClientError;

/// Recognition input format: 16 kHz mono.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Largest slice appended to the buffer per callback.
pub const CAPTURE_CHUNK_SAMPLES: usize = 1024;

/// Buffers shorter than this are discarded as accidental taps.
pub const MIN_CAPTURE: Duration = Duration::from_millis(500);

/// Capture actor settings.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Sample rate the recogniser expects.
    pub target_rate: u32,
    /// Settle delay before reopening on a new default device.
    pub settle: Duration,
    /// Default-device poll interval while recording.
    pub monitor_interval: Duration,
    /// Whether to follow default-device changes at all.
    pub auto_switch: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_rate: TARGET_SAMPLE_RATE,
            settle: Duration::from_millis(300),
            monitor_interval: Duration::from_secs(1),
            auto_switch: true,
        }
    }
}

enum Command {
    Start {
        reply: std::sync::mpsc::Sender<Result<(), ClientError>>,
    },
    Stop {
        reply: std::sync::mpsc::Sender<Result<Vec<i16>, ClientError>>,
    },
    Shutdown,
}

/// `Send + Sync` handle to the capture thread.
pub struct AudioCaptureHandle {
    cmd_tx: std::sync::mpsc::Sender<Command>,
    recording: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioCaptureHandle {
    /// Spawn the capture thread.
    pub fn spawn(settings: CaptureSettings) -> Result<Self, ClientError> {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
        let recording = Arc::new(AtomicBool::new(false));
        let recording_flag = Arc::clone(&recording);

        let thread = thread::Builder::new()
            .name("loqui-capture".into())
            .spawn(move || {
                Worker::new(settings, recording_flag).run(&cmd_rx);
            })
            .map_err(|e| ClientError::InputStream(format!("failed to spawn capture thread: {e}")))?;

        Ok(Self {
            cmd_tx,
            recording,
            thread: Some(thread),
        })
    }

    fn send_and_recv<T>(
        &self,
        build: impl FnOnce(std::sync::mpsc::Sender<Result<T, ClientError>>) -> Command,
    ) -> Result<T, ClientError> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| ClientError::AudioThreadDied)?;
        rx.recv().map_err(|_| ClientError::AudioThreadDied)?
    }
}

impl InputCapture for AudioCaptureHandle {
    fn start(&self) -> Result<(), ClientError> {
        self.send_and_recv(|reply| Command::Start { reply })
    }

    fn stop(&self) -> Result<Vec<i16>, ClientError> {
        self.send_and_recv(|reply| Command::Stop { reply })
    }

    fn is_capturing(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

impl Drop for AudioCaptureHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

// ── Worker (owns the !Send stream) ─────────────────────────────────

struct Worker {
    settings: CaptureSettings,
    stream: Option<Stream>,
    buffer: Arc<Mutex<Vec<f32>>>,
    recording: Arc<AtomicBool>,
    /// Rate and device the open stream uses; meaningless while stopped.
    open_rate: u32,
    device_name: String,
    /// Set when a mid-capture device swap could not be recovered.
    broken: Option<ClientError>,
}

impl Worker {
    fn new(settings: CaptureSettings, recording: Arc<AtomicBool>) -> Self {
        let open_rate = settings.target_rate;
        Self {
            settings,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            recording,
            open_rate,
            device_name: String::new(),
            broken: None,
        }
    }

    fn run(mut self, cmd_rx: &std::sync::mpsc::Receiver<Command>) {
        loop {
            match cmd_rx.recv_timeout(self.settings.monitor_interval) {
                Ok(Command::Start { reply }) => {
                    let _ = reply.send(self.start());
                }
                Ok(Command::Stop { reply }) => {
                    let _ = reply.send(self.stop());
                }
                Ok(Command::Shutdown) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    break;
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    self.poll_device_change();
                }
            }
        }
        self.stream = None;
        tracing::debug!("capture thread shutting down");
    }

    fn start(&mut self) -> Result<(), ClientError> {
        if self.recording.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.buffer.lock().unwrap().clear();
        self.broken = None;
        self.open_default_device()?;
        self.recording.store(true, Ordering::SeqCst);
        tracing::debug!(rate = self.open_rate, device = %self.device_name, "capture started");
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<i16>, ClientError> {
        self.recording.store(false, Ordering::SeqCst);
        self.stream = None;

        if let Some(error) = self.broken.take() {
            return Err(error);
        }

        let raw = std::mem::take(&mut *self.buffer.lock().unwrap());

        let min_samples = (f64::from(self.open_rate) * MIN_CAPTURE.as_secs_f64()) as usize;
        if raw.len() < min_samples {
            tracing::debug!(samples = raw.len(), "capture too short, discarding");
            return Ok(Vec::new());
        }

        let mono = if self.open_rate == self.settings.target_rate {
            raw
        } else {
            resample(&raw, self.open_rate, self.settings.target_rate)?
        };

        Ok(mono
            .into_iter()
            .map(|s| {
                #[allow(clippy::cast_possible_truncation)]
                {
                    (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
                }
            })
            .collect())
    }

    /// While recording, follow the default input device.
    fn poll_device_change(&mut self) {
        if !self.settings.auto_switch
            || !self.recording.load(Ordering::SeqCst)
            || self.broken.is_some()
        {
            return;
        }

        let current = cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();
        if current.is_empty() || current == self.device_name {
            return;
        }

        tracing::info!(old = %self.device_name, new = %current, "input device changed, reopening");
        thread::sleep(self.settings.settle);

        self.stream = None;
        if let Err(error) = self.open_default_device() {
            tracing::warn!(%error, "could not continue capture on new device");
            self.broken = Some(error);
            self.recording.store(false, Ordering::SeqCst);
        }
    }

    /// Open the default input device, preferring mono at a profile-ordered
    /// candidate rate and falling back to the device's own default shape.
    fn open_default_device(&mut self) -> Result<(), ClientError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(ClientError::NoInputDevice)?;
        let default = device
            .default_input_config()
            .map_err(|e| ClientError::InputStream(e.to_string()))?;

        self.device_name = device.name().unwrap_or_default();
        let profile = detect_profile(default.channels(), default.sample_rate().0);
        let format = default.sample_format();

        for &rate in capture_rate_candidates(profile) {
            let config = StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            };
            if let Ok(stream) = self.build_stream(&device, &config, format) {
                if stream.play().is_ok() {
                    self.stream = Some(stream);
                    self.open_rate = rate;
                    return Ok(());
                }
            }
        }

        // Last resort: the device's own default shape, downmixed in the
        // callback.
        let config: StreamConfig = default.clone().into();
        let stream = self.build_stream(&device, &config, format)?;
        stream
            .play()
            .map_err(|e| ClientError::InputStream(e.to_string()))?;
        self.open_rate = config.sample_rate.0;
        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        format: SampleFormat,
    ) -> Result<Stream, ClientError> {
        let buffer = Arc::clone(&self.buffer);
        let recording = Arc::clone(&self.recording);
        let channels = config.channels;

        let err_fn = |err: cpal::StreamError| {
            tracing::error!(%err, "audio input stream error");
        };

        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !recording.load(Ordering::Relaxed) {
                        return;
                    }
                    append_frames(&buffer, data, channels);
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if !recording.load(Ordering::Relaxed) {
                        return;
                    }
                    let floats: Vec<f32> =
                        data.iter().map(|&s| f32::from(s) / 32_768.0).collect();
                    append_frames(&buffer, &floats, channels);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(ClientError::InputStream(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        };

        stream.map_err(|e| ClientError::InputStream(e.to_string()))
    }
}

/// Downmix interleaved frames to mono and append in bounded chunks.
fn append_frames(buffer: &Arc<Mutex<Vec<f32>>>, data: &[f32], channels: u16) {
    let mono: Vec<f32> = if channels > 1 {
        let channels = usize::from(channels);
        data.chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        data.to_vec()
    };

    if let Ok(mut buf) = buffer.lock() {
        for chunk in mono.chunks(CAPTURE_CHUNK_SAMPLES) {
            buf.extend_from_slice(chunk);
        }
    }
}

/// FFT resample mono audio between rates.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, ClientError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let chunk_size = 1024;
    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        chunk_size,
        2,
        1,
    )
    .map_err(|e| ClientError::Resample(e.to_string()))?;

    let mut output = Vec::new();
    let mut pos = 0;

    while pos + chunk_size <= samples.len() {
        let result = resampler
            .process(&[&samples[pos..pos + chunk_size]], None)
            .map_err(|e| ClientError::Resample(e.to_string()))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
        pos += chunk_size;
    }

    if pos < samples.len() {
        let remaining = &samples[pos..];
        let mut padded = vec![0.0f32; chunk_size];
        padded[..remaining.len()].copy_from_slice(remaining);

        let result = resampler
            .process(&[&padded], None)
            .map_err(|e| ClientError::Resample(e.to_string()))?;
        if let Some(channel) = result.first() {
            #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
            let keep = (remaining.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil()
                as usize;
            output.extend_from_slice(&channel[..keep.min(channel.len())]);
        }
    }

    Ok(output)
}
