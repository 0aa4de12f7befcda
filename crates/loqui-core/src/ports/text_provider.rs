//! Text model port.

use futures_util::stream::BoxStream;
use thiserror::Error;

/// The text model failed.
#[derive(Debug, Error)]
pub enum TextProviderError {
    /// Transport towards the model broke.
    #[error("text provider transport error: {0}")]
    Transport(String),
    /// The model returned an error mid-stream.
    #[error("text provider failed: {0}")]
    Generation(String),
}

/// Streams text fragments from the multimodal model.
///
/// Fragments are raw model output (tokens, words, or whole sentences
/// depending on the backend); sentence assembly happens downstream in the
/// streaming workflow.
pub trait TextProvider: Send + Sync {
    /// Stream a reply for `prompt`, optionally grounded in a JPEG
    /// screenshot. An `Err` item ends the stream.
    fn stream_text(
        &self,
        prompt: &str,
        screenshot: Option<Vec<u8>>,
    ) -> BoxStream<'static, Result<String, TextProviderError>>;
}
