//! Built-in development providers.
//!
//! Real deployments plug a multimodal model, a TTS engine, and a memory
//! analyser into the ports; these stand-ins keep the server end-to-end
//! exercisable (and the integration tests honest) without any external
//! engine: the text provider echoes the prompt, the synthesizer streams
//! silence sized to the text, and the analyser keeps a rolling summary of
//! the last exchange.

use futures_util::stream::BoxStream;

use async_trait::async_trait;

use loqui_core::domain::audio::AudioPayload;
use loqui_core::domain::memory::MemorySnapshot;
use loqui_core::ports::{
    MemoryAnalyser, MemoryAnalyserError, SpeechSynthesizer, SynthesisError, TextProvider,
    TextProviderError,
};

/// Echoes the prompt back as a short streamed reply.
#[derive(Debug, Default)]
pub struct EchoTextProvider;

impl TextProvider for EchoTextProvider {
    fn stream_text(
        &self,
        prompt: &str,
        _screenshot: Option<Vec<u8>>,
    ) -> BoxStream<'static, Result<String, TextProviderError>> {
        // Strip a memory prefix if present; echo only the user's words.
        let user_prompt = prompt
            .rsplit_once('\n')
            .map_or(prompt, |(_, tail)| tail)
            .to_string();

        let fragments: Vec<Result<String, TextProviderError>> = vec![
            Ok("You said: ".to_string()),
            Ok(format!("{user_prompt}. ")),
            Ok("That is all I can do without a language model configured.".to_string()),
        ];
        Box::pin(futures_util::stream::iter(fragments))
    }
}

/// Streams silent PCM sized to the sentence (about 60 ms per word).
#[derive(Debug)]
pub struct SilenceSynthesizer {
    sample_rate: u32,
    /// Samples per streamed chunk.
    chunk_samples: usize,
}

impl Default for SilenceSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            chunk_samples: 960,
        }
    }
}

impl SpeechSynthesizer for SilenceSynthesizer {
    fn synthesize(&self, text: &str) -> BoxStream<'static, Result<AudioPayload, SynthesisError>> {
        let words = text.split_whitespace().count().max(1);
        let total_samples = words * self.sample_rate as usize * 60 / 1000;
        let chunk_samples = self.chunk_samples;

        let chunks: Vec<Result<AudioPayload, SynthesisError>> = (0..total_samples)
            .step_by(chunk_samples)
            .map(|offset| {
                let len = chunk_samples.min(total_samples - offset);
                Ok(AudioPayload::from_i16_samples(&vec![0i16; len]))
            })
            .collect();

        Box::pin(futures_util::stream::iter(chunks))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Keeps the last exchange as short-term memory, untouched long-term.
#[derive(Debug, Default)]
pub struct RollingMemoryAnalyser;

#[async_trait]
impl MemoryAnalyser for RollingMemoryAnalyser {
    async fn distill(
        &self,
        prompt: &str,
        final_text: &str,
        previous: Option<&MemorySnapshot>,
    ) -> Result<MemorySnapshot, MemoryAnalyserError> {
        Ok(MemorySnapshot {
            short_term: format!("User: {prompt}\nAssistant: {final_text}"),
            long_term: previous.map(|p| p.long_term.clone()).unwrap_or_default(),
        }
        .clamped())
    }
}
