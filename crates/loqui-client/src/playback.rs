//! Streaming playback actor.
//!
//! Server audio chunks land in a bounded ring guarded by a single lock;
//! the cpal output callback pulls from it and writes silence when the ring
//! is empty, so the callback is wait-free on the common path. Like the
//! capture actor, the `!Send` stream is confined to a dedicated thread
//! behind the `Send + Sync` [`AudioPlaybackHandle`].
//!
//! Backpressure drops the oldest queued samples; the number evicted is the
//! `enqueue` return value so the integration can report it. On a default
//! output device change the worker reopens the stream against a fresh
//! candidate list; queued samples survive the swap.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use loqui_core::events::{Event, EventPayload, EventPriority};
use loqui_core::events::names;
use loqui_core::ports::EventSink;

use crate::audio_io::OutputSink;
use crate::device::playback_candidates;
use crate::error::ClientError;

/// How quickly `abort` must silence the device.
pub const ABORT_DEADLINE: Duration = Duration::from_millis(200);

// ── Ring buffer ────────────────────────────────────────────────────

/// Bounded mono sample queue shared between the enqueue path and the
/// device callback. All mutation happens under one lock.
pub struct PlaybackRing {
    samples: VecDeque<i16>,
    capacity: usize,
    /// Fractional read index into the front, used for nearest-neighbour
    /// rate conversion.
    pos: f64,
}

impl PlaybackRing {
    /// Create a ring holding at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1 << 20)),
            capacity: capacity.max(1),
            pos: 0.0,
        }
    }

    /// Append a chunk, evicting the oldest samples on overflow.
    /// Returns how many samples were evicted.
    pub fn push(&mut self, chunk: &[i16]) -> usize {
        let mut dropped = 0;
        let incoming = chunk.len().min(self.capacity);

        let overflow = (self.samples.len() + incoming).saturating_sub(self.capacity);
        for _ in 0..overflow {
            self.samples.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            self.pos = (self.pos - dropped as f64).max(0.0);
        }

        // A chunk larger than the whole ring keeps only its tail.
        dropped += chunk.len() - incoming;
        self.samples.extend(&chunk[chunk.len() - incoming..]);
        dropped
    }

    /// Queued samples not yet consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.pos = 0.0;
    }

    /// Fill an interleaved output slice, duplicating the mono signal
    /// across `channels` and converting `src_rate` to `dst_rate` by
    /// nearest neighbour. Missing data becomes silence. Returns the number
    /// of frames that carried data.
    pub fn fill(&mut self, out: &mut [i16], channels: usize, src_rate: u32, dst_rate: u32) -> usize {
        let channels = channels.max(1);
        let step = f64::from(src_rate) / f64::from(dst_rate.max(1));
        let mut data_frames = 0;

        for frame in out.chunks_mut(channels) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let index = self.pos as usize;
            let sample = if index < self.samples.len() {
                data_frames += 1;
                self.pos += step;
                self.samples[index]
            } else {
                0
            };
            frame.fill(sample);
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let consumed = (self.pos as usize).min(self.samples.len());
        self.samples.drain(..consumed);
        self.pos -= consumed as f64;

        data_frames
    }
}

// ── Actor ──────────────────────────────────────────────────────────

/// Playback actor settings.
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    /// Ring capacity in seconds of source audio.
    pub buffer_secs: f64,
    /// Default-device poll interval while the device is held.
    pub monitor_interval: Duration,
    /// Whether to follow default-device changes.
    pub auto_switch: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            buffer_secs: 10.0,
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
        timeout: Duration,
        reply: std::sync::mpsc::Sender<Result<(), ClientError>>,
    },
    Abort {
        reply: std::sync::mpsc::Sender<()>,
    },
    Shutdown,
}

/// `Send + Sync` handle to the playback thread.
pub struct AudioPlaybackHandle {
    cmd_tx: std::sync::mpsc::Sender<Command>,
    ring: Arc<Mutex<PlaybackRing>>,
    active: Arc<AtomicBool>,
    source_rate: Arc<AtomicU32>,
    settings: PlaybackSettings,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioPlaybackHandle {
    /// Spawn the playback thread.
    ///
    /// `events` receives `audio.device_switched` when the worker reopens
    /// the stream on a new default device.
    pub fn spawn(
        settings: PlaybackSettings,
        events: Option<Arc<dyn EventSink>>,
    ) -> Result<Self, ClientError> {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
        // Sized for the configured seconds of source audio; resized to the
        // actual source rate on `start`.
        let initial_capacity = (settings.buffer_secs * 24_000.0) as usize;
        let ring = Arc::new(Mutex::new(PlaybackRing::new(initial_capacity.max(1))));
        let active = Arc::new(AtomicBool::new(false));
        let source_rate = Arc::new(AtomicU32::new(24_000));

        let worker_settings = settings.clone();
        let worker_ring = Arc::clone(&ring);
        let worker_active = Arc::clone(&active);
        let worker_source_rate = Arc::clone(&source_rate);

        let thread = thread::Builder::new()
            .name("loqui-playback".into())
            .spawn(move || {
                let worker = Worker {
                    settings: worker_settings,
                    ring: worker_ring,
                    active: worker_active,
                    source_rate: worker_source_rate,
                    events,
                    stream: None,
                    device_name: String::new(),
                };
                worker.run(&cmd_rx)
            })
            .map_err(|e| ClientError::OutputStream(format!("failed to spawn playback thread: {e}")))?;

        Ok(Self {
            cmd_tx,
            ring,
            active,
            source_rate,
            settings,
            thread: Some(thread),
        })
    }

    fn send_and_recv<T>(
        &self,
        build: impl FnOnce(std::sync::mpsc::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| ClientError::AudioThreadDied)?;
        rx.recv().map_err(|_| ClientError::AudioThreadDied)
    }
}

impl OutputSink for AudioPlaybackHandle {
    fn start(&self, source_rate: u32) -> Result<(), ClientError> {
        self.source_rate.store(source_rate, Ordering::SeqCst);
        {
            let mut ring = self.ring.lock().unwrap();
            let capacity = (self.settings.buffer_secs * f64::from(source_rate)) as usize;
            *ring = PlaybackRing::new(capacity.max(1));
        }
        self.send_and_recv(|reply| Command::Start { reply })?
    }

    fn enqueue(&self, samples: Vec<i16>) -> Result<usize, ClientError> {
        if self.thread.is_none() {
            return Err(ClientError::AudioThreadDied);
        }
        Ok(self.ring.lock().unwrap().push(&samples))
    }

    fn stop(&self, timeout: Duration) -> Result<(), ClientError> {
        self.send_and_recv(|reply| Command::Stop { timeout, reply })?
    }

    fn abort(&self) {
        // Empty the ring first so the callback goes silent immediately,
        // even before the worker releases the device.
        self.ring.lock().unwrap().clear();
        let _ = self.send_and_recv(|reply| Command::Abort { reply });
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn buffered_samples(&self) -> usize {
        self.ring.lock().unwrap().len()
    }
}

impl Drop for AudioPlaybackHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    settings: PlaybackSettings,
    ring: Arc<Mutex<PlaybackRing>>,
    active: Arc<AtomicBool>,
    source_rate: Arc<AtomicU32>,
    events: Option<Arc<dyn EventSink>>,
    stream: Option<Stream>,
    device_name: String,
}

impl Worker {
    fn run(mut self, cmd_rx: &std::sync::mpsc::Receiver<Command>) {
        loop {
            match cmd_rx.recv_timeout(self.settings.monitor_interval) {
                Ok(Command::Start { reply }) => {
                    let _ = reply.send(self.open_default_device());
                }
                Ok(Command::Stop { timeout, reply }) => {
                    let _ = reply.send(self.stop(timeout));
                }
                Ok(Command::Abort { reply }) => {
                    self.release();
                    let _ = reply.send(());
                }
                Ok(Command::Shutdown) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    break;
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    self.poll_device_change();
                }
            }
        }
        self.release();
        tracing::debug!("playback thread shutting down");
    }

    fn stop(&mut self, timeout: Duration) -> Result<(), ClientError> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.ring.lock().unwrap().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        self.stream = None;
        self.ring.lock().unwrap().clear();
        self.active.store(false, Ordering::SeqCst);
    }

    fn poll_device_change(&mut self) {
        if !self.settings.auto_switch || !self.active.load(Ordering::SeqCst) {
            return;
        }

        let current = cpal::default_host()
            .default_output_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();
        if current.is_empty() || current == self.device_name {
            return;
        }

        tracing::info!(old = %self.device_name, new = %current, "output device changed, reopening");
        self.stream = None;
        if let Err(error) = self.open_default_device() {
            tracing::error!(%error, "could not reopen playback on new device");
            self.release();
            return;
        }

        if let Some(events) = &self.events {
            events.publish(Event::new(
                names::AUDIO_DEVICE_SWITCHED,
                EventPayload::DeviceSwitched(current),
                EventPriority::Medium,
            ));
        }
    }

    /// Acquire the default output device, trying the candidate list until
    /// one shape opens.
    fn open_default_device(&mut self) -> Result<(), ClientError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(ClientError::NoOutputDevice)?;
        let default = device
            .default_output_config()
            .map_err(|e| ClientError::OutputStream(e.to_string()))?;

        self.device_name = device.name().unwrap_or_default();
        let format = default.sample_format();

        let mut last_error = None;
        for (channels, rate) in playback_candidates(default.channels(), default.sample_rate().0) {
            let config = StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            };
            match self.build_stream(&device, &config, format) {
                Ok(stream) => {
                    if let Err(e) = stream.play() {
                        last_error = Some(ClientError::OutputStream(e.to_string()));
                        continue;
                    }
                    self.stream = Some(stream);
                    self.active.store(true, Ordering::SeqCst);
                    tracing::debug!(
                        device = %self.device_name,
                        channels,
                        rate,
                        "playback stream opened"
                    );
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| ClientError::OutputStream("no candidate config opened".into())))
    }

    fn build_stream(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        format: SampleFormat,
    ) -> Result<Stream, ClientError> {
        let ring = Arc::clone(&self.ring);
        let source_rate = Arc::clone(&self.source_rate);
        let channels = usize::from(config.channels);
        let device_rate = config.sample_rate.0;

        let err_fn = |err: cpal::StreamError| {
            tracing::error!(%err, "audio output stream error");
        };

        let stream = match format {
            SampleFormat::I16 => device.build_output_stream(
                config,
                move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let src = source_rate.load(Ordering::Relaxed);
                    if let Ok(mut ring) = ring.lock() {
                        ring.fill(out, channels, src, device_rate);
                    } else {
                        out.fill(0);
                    }
                },
                err_fn,
                None,
            ),
            SampleFormat::F32 => {
                // Reused between callbacks; grows once to the device's
                // buffer size and never reallocates on the hot path.
                let mut scratch: Vec<i16> = Vec::new();
                device.build_output_stream(
                    config,
                    move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let src = source_rate.load(Ordering::Relaxed);
                        scratch.resize(out.len(), 0);
                        scratch.fill(0);
                        if let Ok(mut ring) = ring.lock() {
                            ring.fill(&mut scratch, channels, src, device_rate);
                        }
                        for (dst, s) in out.iter_mut().zip(&scratch) {
                            *dst = f32::from(*s) / f32::from(i16::MAX);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(ClientError::OutputStream(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        };

        stream.map_err(|e| ClientError::OutputStream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_reports_evictions() {
        let mut ring = PlaybackRing::new(4);
        assert_eq!(ring.push(&[1, 2, 3]), 0);
        assert_eq!(ring.len(), 3);

        // 3 queued + 3 incoming against capacity 4 evicts 2.
        assert_eq!(ring.push(&[4, 5, 6]), 2);
        assert_eq!(ring.len(), 4);

        let mut out = vec![0i16; 4];
        ring.fill(&mut out, 1, 16_000, 16_000);
        assert_eq!(out, vec![3, 4, 5, 6]);
    }

    #[test]
    fn oversized_chunk_keeps_tail() {
        let mut ring = PlaybackRing::new(2);
        assert_eq!(ring.push(&[1, 2, 3, 4, 5]), 3);
        let mut out = vec![0i16; 2];
        ring.fill(&mut out, 1, 16_000, 16_000);
        assert_eq!(out, vec![4, 5]);
    }

    #[test]
    fn fill_writes_silence_when_empty() {
        let mut ring = PlaybackRing::new(8);
        let mut out = vec![99i16; 6];
        let data = ring.fill(&mut out, 2, 16_000, 16_000);
        assert_eq!(data, 0);
        assert_eq!(out, vec![0; 6]);
    }

    #[test]
    fn fill_duplicates_mono_across_channels() {
        let mut ring = PlaybackRing::new(8);
        ring.push(&[10, 20]);
        let mut out = vec![0i16; 4];
        ring.fill(&mut out, 2, 16_000, 16_000);
        assert_eq!(out, vec![10, 10, 20, 20]);
        assert!(ring.is_empty());
    }

    #[test]
    fn fill_upsamples_by_nearest_neighbour() {
        let mut ring = PlaybackRing::new(8);
        ring.push(&[10, 20]);
        // 2 source samples at 8 kHz feed 4 output frames at 16 kHz.
        let mut out = vec![0i16; 4];
        let data = ring.fill(&mut out, 1, 8_000, 16_000);
        assert_eq!(data, 4);
        assert_eq!(out, vec![10, 10, 20, 20]);
        assert!(ring.is_empty());
    }

    #[test]
    fn fill_downsamples_by_nearest_neighbour() {
        let mut ring = PlaybackRing::new(8);
        ring.push(&[10, 20, 30, 40]);
        let mut out = vec![0i16; 2];
        ring.fill(&mut out, 1, 32_000, 16_000);
        assert_eq!(out, vec![10, 30]);
        assert!(ring.is_empty(), "consumed samples are drained");
    }

    #[test]
    fn partial_data_pads_with_silence_without_losing_position() {
        let mut ring = PlaybackRing::new(8);
        ring.push(&[7]);
        let mut out = vec![0i16; 3];
        let data = ring.fill(&mut out, 1, 16_000, 16_000);
        assert_eq!(data, 1);
        assert_eq!(out, vec![7, 0, 0]);

        // Later data plays from the start, not offset by the silent frames.
        ring.push(&[8]);
        let mut out = vec![0i16; 1];
        ring.fill(&mut out, 1, 16_000, 16_000);
        assert_eq!(out, vec![8]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut ring = PlaybackRing::new(8);
        ring.push(&[1, 2, 3]);
        ring.clear();
        assert!(ring.is_empty());
        let mut out = vec![5i16; 2];
        assert_eq!(ring.fill(&mut out, 1, 16_000, 16_000), 0);
        assert_eq!(out, vec![0, 0]);
    }
}
