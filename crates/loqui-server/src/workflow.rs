//! The streaming workflow: text model in, interleaved sentences and audio
//! out.
//!
//! For every segment the aggregator emits, the sentence goes out first,
//! then its TTS audio chunk by chunk; the next sentence only starts after
//! the previous one's audio finished. The output is a lazy finite stream
//! terminated by exactly one `Final` item; a text-model or TTS failure
//! aborts the stream with an error `Final`, leaving earlier sentences
//! valid.

use std::sync::Arc;

use async_stream::stream;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use loqui_core::config::StreamConfig;
use loqui_core::domain::audio::AudioPayload;
use loqui_core::ports::{SpeechSynthesizer, TextProvider};

use crate::aggregator::{Segment, SentenceAggregator};
use crate::text_filter::{TextFilter, END_PUNCTUATION};

/// One item of the workflow output.
#[derive(Debug, Clone)]
pub enum WorkflowItem {
    /// An aggregated sentence.
    Text {
        sentence_index: u32,
        text: String,
    },
    /// One PCM chunk of the sentence's audio.
    Audio {
        sentence_index: u32,
        /// 1-based within the sentence.
        chunk_index: u32,
        payload: AudioPayload,
    },
    /// Terminal item; exactly one per run.
    Final(WorkflowSummary),
}

/// Aggregate counters reported by the terminal item.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSummary {
    pub success: bool,
    /// Present when the run aborted.
    pub error: Option<String>,
    /// All emitted sentences joined with spaces (memory write-back input).
    pub full_text: String,
    pub sentences: u32,
    pub audio_chunks: u64,
    pub audio_bytes: u64,
}

/// Drives text generation, aggregation, and per-sentence synthesis.
pub struct StreamingWorkflow {
    text: Arc<dyn TextProvider>,
    tts: Arc<dyn SpeechSynthesizer>,
    config: StreamConfig,
}

impl StreamingWorkflow {
    /// Create the workflow.
    #[must_use]
    pub fn new(
        text: Arc<dyn TextProvider>,
        tts: Arc<dyn SpeechSynthesizer>,
        config: StreamConfig,
    ) -> Self {
        Self { text, tts, config }
    }

    /// Process one request lazily.
    ///
    /// `prompt` should already carry the memory prefix when there is one.
    pub fn process(
        &self,
        prompt: String,
        screenshot: Option<Vec<u8>>,
    ) -> BoxStream<'static, WorkflowItem> {
        let text_provider = Arc::clone(&self.text);
        let tts = Arc::clone(&self.tts);
        let config = self.config.clone();

        Box::pin(stream! {
            let mut aggregator = SentenceAggregator::new(TextFilter::new(), config);
            let mut fragments = text_provider.stream_text(&prompt, screenshot);

            let mut summary = WorkflowSummary::default();
            let mut captured: Vec<String> = Vec::new();
            let mut queue: std::collections::VecDeque<Segment> = std::collections::VecDeque::new();
            let mut source_done = false;

            loop {
                // Refill the segment queue from the model.
                while queue.is_empty() && !source_done {
                    match fragments.next().await {
                        Some(Ok(fragment)) => {
                            queue.extend(aggregator.push(&fragment));
                        }
                        Some(Err(error)) => {
                            tracing::error!(%error, "text provider failed mid-stream");
                            summary.error = Some(error.to_string());
                            yield WorkflowItem::Final(summary);
                            return;
                        }
                        None => {
                            queue.extend(aggregator.finish());
                            source_done = true;
                        }
                    }
                }

                let Some(segment) = queue.pop_front() else {
                    break;
                };

                tracing::debug!(
                    index = segment.index,
                    len = segment.text.len(),
                    "emitting sentence"
                );
                summary.sentences = segment.index;
                captured.push(segment.text.clone());
                yield WorkflowItem::Text {
                    sentence_index: segment.index,
                    text: segment.text.clone(),
                };

                // Synthesis wants terminal punctuation.
                let tts_text = if segment.text.ends_with(END_PUNCTUATION) {
                    segment.text.clone()
                } else {
                    format!("{}.", segment.text)
                };

                let mut chunks = tts.synthesize(&tts_text);
                let mut chunk_index: u32 = 0;
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(payload) => {
                            chunk_index += 1;
                            summary.audio_chunks += 1;
                            summary.audio_bytes += payload.data.len() as u64;
                            yield WorkflowItem::Audio {
                                sentence_index: segment.index,
                                chunk_index,
                                payload,
                            };
                        }
                        Err(error) => {
                            tracing::error!(
                                %error,
                                sentence = segment.index,
                                "synthesis failed, aborting workflow"
                            );
                            summary.full_text = captured.join(" ");
                            summary.error = Some(error.to_string());
                            yield WorkflowItem::Final(summary);
                            return;
                        }
                    }
                }
                tracing::debug!(
                    index = segment.index,
                    chunks = chunk_index,
                    "sentence synthesized"
                );
            }

            summary.success = true;
            summary.full_text = captured.join(" ");
            tracing::info!(
                sentences = summary.sentences,
                audio_chunks = summary.audio_chunks,
                audio_bytes = summary.audio_bytes,
                "workflow completed"
            );
            yield WorkflowItem::Final(summary);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::Stream;
    use loqui_core::ports::{SynthesisError, TextProviderError};

    struct ScriptedText {
        fragments: Vec<Result<String, String>>,
    }

    impl TextProvider for ScriptedText {
        fn stream_text(
            &self,
            _prompt: &str,
            _screenshot: Option<Vec<u8>>,
        ) -> BoxStream<'static, Result<String, TextProviderError>> {
            let items: Vec<_> = self
                .fragments
                .iter()
                .map(|f| f.clone().map_err(TextProviderError::Generation))
                .collect();
            Box::pin(futures_util::stream::iter(items))
        }
    }

    struct FixedChunksTts {
        chunks_per_sentence: usize,
        fail_on_sentence: Option<&'static str>,
    }

    impl SpeechSynthesizer for FixedChunksTts {
        fn synthesize(
            &self,
            text: &str,
        ) -> BoxStream<'static, Result<AudioPayload, SynthesisError>> {
            if self
                .fail_on_sentence
                .is_some_and(|needle| text.contains(needle))
            {
                return Box::pin(futures_util::stream::iter(vec![Err(
                    SynthesisError::Engine("voice model crashed".into()),
                )]));
            }
            let chunks: Vec<_> = (0..self.chunks_per_sentence)
                .map(|_| Ok(AudioPayload::from_i16_samples(&[0i16; 960])))
                .collect();
            Box::pin(futures_util::stream::iter(chunks))
        }

        fn sample_rate(&self) -> u32 {
            24_000
        }
    }

    fn workflow(
        fragments: &[&str],
        tts: FixedChunksTts,
    ) -> impl Stream<Item = WorkflowItem> + Send {
        let text = ScriptedText {
            fragments: fragments.iter().map(|f| Ok((*f).to_string())).collect(),
        };
        StreamingWorkflow::new(Arc::new(text), Arc::new(tts), StreamConfig::default())
            .process("prompt".into(), None)
    }

    fn kind(item: &WorkflowItem) -> String {
        match item {
            WorkflowItem::Text { sentence_index, .. } => format!("text:{sentence_index}"),
            WorkflowItem::Audio {
                sentence_index,
                chunk_index,
                ..
            } => format!("audio:{sentence_index}:{chunk_index}"),
            WorkflowItem::Final(summary) => format!("final:{}", summary.success),
        }
    }

    /// Text precedes its audio; the next sentence starts only after the
    /// previous sentence's audio completed.
    #[tokio::test]
    async fn items_are_interleaved_in_order() {
        let items: Vec<_> = workflow(
            &["One full sentence here. ", "And a second full one. ", "tail"],
            FixedChunksTts {
                chunks_per_sentence: 2,
                fail_on_sentence: None,
            },
        )
        .collect()
        .await;

        let kinds: Vec<_> = items.iter().map(kind).collect();
        assert_eq!(
            kinds,
            vec![
                "text:1", "audio:1:1", "audio:1:2",
                "text:2", "audio:2:1", "audio:2:2",
                "final:true",
            ]
        );
    }

    /// The terminal item carries the aggregate counters.
    #[tokio::test]
    async fn final_summary_counts() {
        let items: Vec<_> = workflow(
            &["Counting sentences works fine. "],
            FixedChunksTts {
                chunks_per_sentence: 3,
                fail_on_sentence: None,
            },
        )
        .collect()
        .await;

        let WorkflowItem::Final(summary) = items.last().unwrap() else {
            panic!("last item must be Final");
        };
        assert!(summary.success);
        assert_eq!(summary.sentences, 1);
        assert_eq!(summary.audio_chunks, 3);
        assert_eq!(summary.audio_bytes, 3 * 960 * 2);
        assert_eq!(summary.full_text, "Counting sentences works fine.");
    }

    /// A TTS failure aborts the workflow; earlier sentences stay valid.
    #[tokio::test]
    async fn tts_failure_aborts_with_error_final() {
        let items: Vec<_> = workflow(
            &["Good first sentence here. ", "Bad second sentence here. "],
            FixedChunksTts {
                chunks_per_sentence: 1,
                fail_on_sentence: Some("Bad second"),
            },
        )
        .collect()
        .await;

        let kinds: Vec<_> = items.iter().map(kind).collect();
        assert_eq!(
            kinds,
            vec!["text:1", "audio:1:1", "text:2", "final:false"]
        );
        let WorkflowItem::Final(summary) = items.last().unwrap() else {
            panic!();
        };
        assert!(summary.error.as_deref().unwrap().contains("voice model"));
    }

    /// A text-provider failure aborts immediately.
    #[tokio::test]
    async fn text_failure_aborts() {
        let text = ScriptedText {
            fragments: vec![
                Ok("Unfinished fragment".into()),
                Err("upstream quota exceeded".into()),
            ],
        };
        let items: Vec<_> = StreamingWorkflow::new(
            Arc::new(text),
            Arc::new(FixedChunksTts {
                chunks_per_sentence: 1,
                fail_on_sentence: None,
            }),
            StreamConfig::default(),
        )
        .process("prompt".into(), None)
        .collect()
        .await;

        assert_eq!(items.len(), 1);
        let WorkflowItem::Final(summary) = &items[0] else {
            panic!();
        };
        assert!(!summary.success);
        assert!(summary.error.as_deref().unwrap().contains("quota"));
    }

    /// An empty model stream yields only a successful empty Final.
    #[tokio::test]
    async fn empty_stream_yields_empty_final() {
        let items: Vec<_> = workflow(
            &[],
            FixedChunksTts {
                chunks_per_sentence: 1,
                fail_on_sentence: None,
            },
        )
        .collect()
        .await;

        assert_eq!(items.len(), 1);
        let WorkflowItem::Final(summary) = &items[0] else {
            panic!();
        };
        assert!(summary.success);
        assert_eq!(summary.sentences, 0);
    }
}
