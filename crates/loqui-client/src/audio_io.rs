//! Audio capability traits.
//!
//! The integrations talk to these instead of to the cpal-backed actors so
//! that every flow can be exercised in tests without audio hardware. The
//! real implementations are [`crate::capture::AudioCaptureHandle`] and
//! [`crate::playback::AudioPlaybackHandle`].

use std::time::Duration;

use crate::error::ClientError;

/// Push-to-talk microphone capture.
///
/// One recording at a time; `stop` hands back the whole buffer as 16 kHz
/// mono i16 PCM. A buffer shorter than half a second comes back empty.
pub trait InputCapture: Send + Sync {
    /// Open the input stream and start accumulating samples.
    fn start(&self) -> Result<(), ClientError>;

    /// Close the stream and return the captured buffer.
    fn stop(&self) -> Result<Vec<i16>, ClientError>;

    /// Whether a recording is in progress.
    fn is_capturing(&self) -> bool;
}

/// Ordered streaming playback of server audio.
pub trait OutputSink: Send + Sync {
    /// Acquire the output device and begin pulling from the ring.
    ///
    /// `source_rate` is the sample rate of the chunks that will be
    /// enqueued.
    fn start(&self, source_rate: u32) -> Result<(), ClientError>;

    /// Append a mono i16 chunk. Returns how many queued samples were
    /// evicted to make room (zero in the common case).
    fn enqueue(&self, samples: Vec<i16>) -> Result<usize, ClientError>;

    /// Drain up to `timeout`, then release the device.
    fn stop(&self, timeout: Duration) -> Result<(), ClientError>;

    /// Immediately empty the ring and silence the device.
    ///
    /// This is the only sanctioned way to flush audio.
    fn abort(&self);

    /// Whether the device is currently held.
    fn is_active(&self) -> bool;

    /// Samples waiting in the ring (zero once playback has drained).
    fn buffered_samples(&self) -> usize;
}
