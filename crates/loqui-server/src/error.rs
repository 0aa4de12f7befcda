//! Server error types.

/// Errors that can occur in the server process.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The inbound request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The text model failed.
    #[error("text provider failed: {0}")]
    TextProvider(String),

    /// Speech synthesis failed.
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// Memory persistence failed.
    #[error("memory storage failed: {0}")]
    Memory(String),

    /// The client went away mid-stream.
    #[error("client disconnected")]
    Disconnected,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
