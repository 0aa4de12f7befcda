//! Client error types.

/// Errors that can occur in the client process.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No audio input device found.
    #[error("no audio input device found")]
    NoInputDevice,

    /// Failed to open an audio input stream.
    #[error("failed to open audio input stream: {0}")]
    InputStream(String),

    /// No audio output device found.
    #[error("no audio output device found")]
    NoOutputDevice,

    /// Failed to open an audio output stream.
    #[error("failed to open audio output stream: {0}")]
    OutputStream(String),

    /// Microphone permission denied by the OS.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The dedicated audio thread is gone.
    #[error("audio thread died")]
    AudioThreadDied,

    /// Audio resampling failed.
    #[error("audio resampling failed: {0}")]
    Resample(String),

    /// The event-bus driver is gone.
    #[error("event bus closed")]
    BusClosed,

    /// Sends are refused while offline.
    #[error("network unavailable")]
    Offline,

    /// The gRPC transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The hardware id could not be resolved.
    #[error("hardware id unavailable: {0}")]
    HardwareId(String),

    /// IO error (caches, state file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
