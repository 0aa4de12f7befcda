//! Per-request orchestration.
//!
//! One [`RequestOrchestrator::handle`] call drives a whole `StreamAudio`
//! exchange: validate the single inbound message, fetch memory under its
//! budget, run the streaming workflow, write each item outbound, and check
//! the interrupt registry between writes. Memory write-back is queued
//! after the stream ends and never blocks the RPC.
//!
//! Fairness: one active request per hardware id. A second request for an
//! already-active id interrupts the first and waits briefly for it to
//! vacate before proceeding.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures_util::StreamExt;

use loqui_proto::v1::StreamResponse;

use crate::interrupt::InterruptRegistry;
use crate::memory::{MemoryCoordinator, MemoryUpdate};
use crate::workflow::{StreamingWorkflow, WorkflowItem};

/// Inbound prompt cap.
pub const MAX_PROMPT_BYTES: usize = 4096;

/// How long a second request waits for the first to vacate.
const TAKEOVER_WAIT: Duration = Duration::from_secs(2);
const TAKEOVER_POLL: Duration = Duration::from_millis(50);

/// The outbound half of a stream, as the orchestrator sees it.
#[async_trait]
pub trait ResponseSink: Send {
    /// Write one message. An error means the client is gone.
    async fn send(&mut self, response: StreamResponse) -> Result<(), SinkClosed>;
}

/// The client closed its receive side.
#[derive(Debug, thiserror::Error)]
#[error("response sink closed")]
pub struct SinkClosed;

#[async_trait]
impl ResponseSink for tokio::sync::mpsc::Sender<StreamResponse> {
    async fn send(&mut self, response: StreamResponse) -> Result<(), SinkClosed> {
        tokio::sync::mpsc::Sender::send(self, response)
            .await
            .map_err(|_| SinkClosed)
    }
}

/// Tracks which hardware ids have an active request.
#[derive(Default)]
struct ActiveSessions {
    active: Mutex<HashSet<String>>,
}

impl ActiveSessions {
    fn try_register(&self, hardware_id: &str) -> bool {
        self.active.lock().unwrap().insert(hardware_id.to_string())
    }

    fn release(&self, hardware_id: &str) {
        self.active.lock().unwrap().remove(hardware_id);
    }
}

/// Drives requests end to end.
pub struct RequestOrchestrator {
    workflow: Arc<StreamingWorkflow>,
    memory: MemoryCoordinator,
    interrupts: Arc<InterruptRegistry>,
    sessions: ActiveSessions,
}

impl RequestOrchestrator {
    /// Create the orchestrator.
    #[must_use]
    pub fn new(
        workflow: Arc<StreamingWorkflow>,
        memory: MemoryCoordinator,
        interrupts: Arc<InterruptRegistry>,
    ) -> Self {
        Self {
            workflow,
            memory,
            interrupts,
            sessions: ActiveSessions::default(),
        }
    }

    /// The registry consulted between writes; the endpoint marks it on
    /// half-close.
    #[must_use]
    pub fn interrupts(&self) -> Arc<InterruptRegistry> {
        Arc::clone(&self.interrupts)
    }

    /// Handle one request against `sink`.
    pub async fn handle(
        &self,
        request: loqui_proto::v1::StreamRequest,
        sink: &mut dyn ResponseSink,
    ) {
        let hardware_id = request.hardware_id.trim().to_string();
        if hardware_id.is_empty() {
            let _ = sink
                .send(StreamResponse::error("missing hardware_id".into()))
                .await;
            return;
        }

        let mut prompt = request.prompt.trim().to_string();
        if prompt.is_empty() {
            let _ = sink.send(StreamResponse::error("empty prompt".into())).await;
            return;
        }
        if prompt.len() > MAX_PROMPT_BYTES {
            tracing::warn!(hardware_id, len = prompt.len(), "prompt over cap, truncating");
            let mut cut = MAX_PROMPT_BYTES;
            while !prompt.is_char_boundary(cut) {
                cut -= 1;
            }
            prompt.truncate(cut);
        }

        // One active request per hardware id: kick the incumbent out.
        if !self.sessions.try_register(&hardware_id) {
            tracing::info!(hardware_id, "superseding active request");
            self.interrupts.mark(&hardware_id);

            let deadline = tokio::time::Instant::now() + TAKEOVER_WAIT;
            while tokio::time::Instant::now() < deadline {
                tokio::time::sleep(TAKEOVER_POLL).await;
                if self.sessions.try_register(&hardware_id) {
                    break;
                }
            }
            // The incumbent cleared the mark on its way out; if it never
            // exited we proceed anyway rather than starve the new request.
            self.interrupts.clear(&hardware_id);
        }

        tracing::info!(
            hardware_id,
            prompt_len = prompt.len(),
            has_screenshot = !request.screenshot_base64.is_empty(),
            "request started"
        );

        let outcome = self.run(&hardware_id, prompt, &request, sink).await;
        self.sessions.release(&hardware_id);

        match outcome {
            RunOutcome::Completed => {}
            RunOutcome::Interrupted => {
                // A marked request clears its mark once it has stopped.
                self.interrupts.clear(&hardware_id);
                tracing::info!(hardware_id, "request interrupted");
            }
            RunOutcome::ClientGone => {
                // The endpoint marks the id when the client hangs up; that
                // mark dies with this request.
                self.interrupts.clear(&hardware_id);
                tracing::info!(hardware_id, "client went away mid-stream");
            }
        }
    }

    async fn run(
        &self,
        hardware_id: &str,
        prompt: String,
        request: &loqui_proto::v1::StreamRequest,
        sink: &mut dyn ResponseSink,
    ) -> RunOutcome {
        // Memory context under its budget; absence is not an error.
        let prompt = match self.memory.context_block(hardware_id).await {
            Some(block) => format!("{block}\n{prompt}"),
            None => prompt,
        };

        let screenshot = decode_screenshot(&request.screenshot_base64);

        let mut items = self.workflow.process(prompt.clone(), screenshot);

        while let Some(item) = items.next().await {
            let message = match item {
                WorkflowItem::Text { text, .. } => StreamResponse::text(text),
                WorkflowItem::Audio { payload, .. } => StreamResponse::audio(payload.into()),
                WorkflowItem::Final(summary) => {
                    let message = match &summary.error {
                        None => StreamResponse::end(String::new()),
                        Some(error) => StreamResponse::error(error.clone()),
                    };
                    let _ = sink.send(message).await;

                    if summary.success && !summary.full_text.is_empty() {
                        self.memory.schedule_update(MemoryUpdate {
                            hardware_id: hardware_id.to_string(),
                            prompt: request.prompt.clone(),
                            final_text: summary.full_text,
                        });
                    }
                    return RunOutcome::Completed;
                }
            };

            if sink.send(message).await.is_err() {
                return RunOutcome::ClientGone;
            }

            // One yield boundary after the write: a marked request stops
            // before producing the next item.
            if self.interrupts.is_marked(hardware_id) {
                let _ = sink.send(StreamResponse::end("interrupted".into())).await;
                return RunOutcome::Interrupted;
            }
        }

        // The workflow always terminates with Final; reaching here means
        // it was dropped mid-iteration.
        tracing::error!(hardware_id, "workflow ended without terminal item");
        let _ = sink
            .send(StreamResponse::error("internal error".into()))
            .await;
        RunOutcome::Completed
    }
}

enum RunOutcome {
    Completed,
    Interrupted,
    ClientGone,
}

fn decode_screenshot(encoded: &str) -> Option<Vec<u8>> {
    if encoded.is_empty() {
        return None;
    }
    match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(bytes) => {
            tracing::debug!(bytes = bytes.len(), "screenshot decoded");
            Some(bytes)
        }
        Err(error) => {
            tracing::warn!(%error, "undecodable screenshot ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::BoxStream;
    use loqui_core::config::StreamConfig;
    use loqui_core::domain::audio::AudioPayload;
    use loqui_core::domain::memory::MemorySnapshot;
    use loqui_core::ports::{
        MemoryAnalyser, MemoryAnalyserError, MemoryStore, MemoryStoreError, SpeechSynthesizer,
        SynthesisError, TextProvider, TextProviderError,
    };
    use loqui_proto::v1::stream_response::Payload;
    use loqui_proto::v1::StreamRequest;

    // ── Test doubles ───────────────────────────────────────────────

    struct StaticText(Vec<&'static str>);

    impl TextProvider for StaticText {
        fn stream_text(
            &self,
            _prompt: &str,
            _screenshot: Option<Vec<u8>>,
        ) -> BoxStream<'static, Result<String, TextProviderError>> {
            let fragments: Vec<Result<String, _>> =
                self.0.iter().map(|f| Ok((*f).to_string())).collect();
            Box::pin(futures_util::stream::iter(fragments))
        }
    }

    struct OneChunkTts;

    impl SpeechSynthesizer for OneChunkTts {
        fn synthesize(
            &self,
            _text: &str,
        ) -> BoxStream<'static, Result<AudioPayload, SynthesisError>> {
            Box::pin(futures_util::stream::iter(vec![Ok(
                AudioPayload::from_i16_samples(&[0i16; 960]),
            )]))
        }

        fn sample_rate(&self) -> u32 {
            24_000
        }
    }

    struct NullStore;

    #[async_trait]
    impl MemoryStore for NullStore {
        async fn fetch(
            &self,
            _hardware_id: &str,
        ) -> Result<Option<loqui_core::domain::memory::MemoryRecord>, MemoryStoreError> {
            Ok(None)
        }

        async fn store(
            &self,
            _record: &loqui_core::domain::memory::MemoryRecord,
        ) -> Result<(), MemoryStoreError> {
            Ok(())
        }
    }

    struct NullAnalyser;

    #[async_trait]
    impl MemoryAnalyser for NullAnalyser {
        async fn distill(
            &self,
            _prompt: &str,
            _final_text: &str,
            _previous: Option<&MemorySnapshot>,
        ) -> Result<MemorySnapshot, MemoryAnalyserError> {
            Ok(MemorySnapshot::default())
        }
    }

    struct VecSink {
        sent: Vec<StreamResponse>,
        /// When set, mark this hardware id after the nth send.
        mark_after: Option<(usize, Arc<InterruptRegistry>, String)>,
    }

    #[async_trait]
    impl ResponseSink for VecSink {
        async fn send(&mut self, response: StreamResponse) -> Result<(), SinkClosed> {
            self.sent.push(response);
            if let Some((after, registry, hardware_id)) = &self.mark_after {
                if self.sent.len() == *after {
                    registry.mark(hardware_id);
                }
            }
            Ok(())
        }
    }

    fn orchestrator(fragments: Vec<&'static str>) -> RequestOrchestrator {
        let workflow = Arc::new(StreamingWorkflow::new(
            Arc::new(StaticText(fragments)),
            Arc::new(OneChunkTts),
            StreamConfig::default(),
        ));
        let (memory, _writer) = MemoryCoordinator::new(
            Arc::new(NullStore),
            Arc::new(NullAnalyser),
            Duration::from_secs(2),
        );
        let registry = Arc::new(InterruptRegistry::new(Duration::from_secs(5)));
        RequestOrchestrator::new(workflow, memory, registry)
    }

    fn request(prompt: &str) -> StreamRequest {
        StreamRequest {
            prompt: prompt.to_string(),
            hardware_id: "hw-test".to_string(),
            screenshot_base64: String::new(),
            screen_info: None,
        }
    }

    fn kinds(sent: &[StreamResponse]) -> Vec<&'static str> {
        sent.iter()
            .map(|r| match r.payload {
                Some(Payload::TextChunk(_)) => "text",
                Some(Payload::AudioChunk(_)) => "audio",
                Some(Payload::EndMessage(_)) => "end",
                Some(Payload::ErrorMessage(_)) => "error",
                None => "empty",
            })
            .collect()
    }

    #[tokio::test]
    async fn happy_path_streams_text_audio_end() {
        let orchestrator = orchestrator(vec!["Hello there, good friend. ", "done"]);
        let mut sink = VecSink {
            sent: Vec::new(),
            mark_after: None,
        };

        orchestrator.handle(request("hi"), &mut sink).await;

        assert_eq!(kinds(&sink.sent), vec!["text", "audio", "end"]);
    }

    #[tokio::test]
    async fn empty_prompt_is_an_error_message() {
        let orchestrator = orchestrator(vec![]);
        let mut sink = VecSink {
            sent: Vec::new(),
            mark_after: None,
        };

        orchestrator.handle(request("   "), &mut sink).await;

        assert_eq!(kinds(&sink.sent), vec!["error"]);
    }

    #[tokio::test]
    async fn missing_hardware_id_is_rejected() {
        let orchestrator = orchestrator(vec![]);
        let mut sink = VecSink {
            sent: Vec::new(),
            mark_after: None,
        };

        let mut req = request("hi");
        req.hardware_id = String::new();
        orchestrator.handle(req, &mut sink).await;

        assert_eq!(kinds(&sink.sent), vec!["error"]);
    }

    /// A mark set right after a write stops the stream at the next yield
    /// boundary, and the mark is cleared afterwards.
    #[tokio::test]
    async fn interrupt_stops_at_the_next_boundary() {
        let orchestrator = orchestrator(vec![
            "First sentence goes out fine. ",
            "Second sentence never fully plays. ",
            "tail",
        ]);
        let registry = orchestrator.interrupts();
        let mut sink = VecSink {
            sent: Vec::new(),
            // Mark after the first audio write (send #2: text, audio).
            mark_after: Some((2, Arc::clone(&registry), "hw-test".to_string())),
        };

        orchestrator.handle(request("hi"), &mut sink).await;

        assert_eq!(kinds(&sink.sent), vec!["text", "audio", "end"]);
        assert!(
            !registry.is_marked("hw-test"),
            "mark cleared after the interrupted request ended"
        );
    }
}
