//! Speech recognition and synthesis ports.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::domain::audio::AudioPayload;
use crate::domain::recognition::{RecognitionFailure, RecognitionOutcome};

/// Turns a PCM buffer into text.
///
/// The client's recognition integration layers language fallback and the
/// timeout budget on top of this; an implementation only handles a single
/// attempt in a single language.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Recognise `samples` (mono PCM at `sample_rate`) as `language`.
    async fn recognize(
        &self,
        samples: &[i16],
        sample_rate: u32,
        language: &str,
    ) -> Result<RecognitionOutcome, RecognitionFailure>;
}

/// Synthesis failed for a sentence.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The engine rejected the input text.
    #[error("synthesizer rejected input: {0}")]
    BadInput(String),
    /// The engine failed mid-stream.
    #[error("speech synthesis failed: {0}")]
    Engine(String),
}

/// Turns one sentence into a lazy stream of PCM chunks.
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` incrementally. Chunks arrive in playback order;
    /// an `Err` item ends the stream.
    fn synthesize(&self, text: &str) -> BoxStream<'static, Result<AudioPayload, SynthesisError>>;

    /// Output sample rate of the chunks this engine produces.
    fn sample_rate(&self) -> u32;
}
