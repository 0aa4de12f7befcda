//! Wire-level tests for the streaming endpoint.
//!
//! A real tonic server is bound to an ephemeral localhost port with
//! scripted text/TTS providers; a real tonic client drives it. No audio
//! hardware or external engine is involved.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use tokio_stream::wrappers::TcpListenerStream;

use loqui_core::config::StreamConfig;
use loqui_core::domain::audio::AudioPayload;
use loqui_core::ports::{SpeechSynthesizer, SynthesisError, TextProvider, TextProviderError};
use loqui_proto::v1::assistant_client::AssistantClient;
use loqui_proto::v1::stream_response::Payload;
use loqui_proto::v1::StreamRequest;
use loqui_server::interrupt::InterruptRegistry;
use loqui_server::memory::MemoryCoordinator;
use loqui_server::orchestrator::RequestOrchestrator;
use loqui_server::providers::RollingMemoryAnalyser;
use loqui_server::service::AssistantService;
use loqui_server::store::SqliteMemoryStore;
use loqui_server::workflow::StreamingWorkflow;

// ── Scripted providers ─────────────────────────────────────────────

/// Streams the given fragments with a configurable delay between them.
struct PacedText {
    fragments: Vec<String>,
    pace: Duration,
}

impl TextProvider for PacedText {
    fn stream_text(
        &self,
        _prompt: &str,
        _screenshot: Option<Vec<u8>>,
    ) -> BoxStream<'static, Result<String, TextProviderError>> {
        let fragments = self.fragments.clone();
        let pace = self.pace;
        Box::pin(async_stream::stream! {
            for fragment in fragments {
                if !pace.is_zero() {
                    tokio::time::sleep(pace).await;
                }
                yield Ok(fragment);
            }
        })
    }
}

/// Fixed number of short chunks per sentence.
struct ChunkedTts {
    chunks: usize,
}

impl SpeechSynthesizer for ChunkedTts {
    fn synthesize(&self, _text: &str) -> BoxStream<'static, Result<AudioPayload, SynthesisError>> {
        let chunks: Vec<_> = (0..self.chunks)
            .map(|_| Ok(AudioPayload::from_i16_samples(&[0i16; 960])))
            .collect();
        Box::pin(futures_util::stream::iter(chunks))
    }

    fn sample_rate(&self) -> u32 {
        24_000
    }
}

async fn spawn_server(
    fragments: &[&str],
    pace: Duration,
    chunks_per_sentence: usize,
) -> SocketAddr {
    let workflow = Arc::new(StreamingWorkflow::new(
        Arc::new(PacedText {
            fragments: fragments.iter().map(|f| (*f).to_string()).collect(),
            pace,
        }),
        Arc::new(ChunkedTts {
            chunks: chunks_per_sentence,
        }),
        StreamConfig::default(),
    ));

    let store = Arc::new(SqliteMemoryStore::open_in_memory().await.unwrap());
    let (memory, writer) =
        MemoryCoordinator::new(store, Arc::new(RollingMemoryAnalyser), Duration::from_secs(2));
    tokio::spawn(writer.run());

    let interrupts = Arc::new(InterruptRegistry::new(Duration::from_secs(5)));
    let orchestrator = Arc::new(RequestOrchestrator::new(workflow, memory, interrupts));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(AssistantService::new(orchestrator).into_server())
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr
}

fn request(prompt: &str) -> StreamRequest {
    StreamRequest {
        prompt: prompt.to_string(),
        hardware_id: "hw-integration".to_string(),
        screenshot_base64: String::new(),
        screen_info: None,
    }
}

async fn connect(addr: SocketAddr) -> AssistantClient<tonic::transport::Channel> {
    let endpoint = format!("http://{addr}");
    for _ in 0..50 {
        if let Ok(client) = AssistantClient::connect(endpoint.clone()).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server did not come up at {addr}");
}

/// Happy path: one request in, interleaved sentences and audio out,
/// terminated by an end message.
#[tokio::test]
async fn round_trip_interleaves_text_and_audio() {
    let addr = spawn_server(
        &["Hello there, good friend. ", "A second sentence follows. ", "x"],
        Duration::ZERO,
        3,
    )
    .await;
    let mut client = connect(addr).await;

    let outbound = tokio_stream::once(request("hi"));
    let mut inbound = client.stream_audio(outbound).await.unwrap().into_inner();

    let mut kinds = Vec::new();
    while let Some(message) = inbound.message().await.unwrap() {
        match message.payload.unwrap() {
            Payload::TextChunk(text) => kinds.push(format!("text:{text}")),
            Payload::AudioChunk(chunk) => {
                assert_eq!(chunk.dtype, "int16");
                kinds.push("audio".to_string());
            }
            Payload::EndMessage(_) => kinds.push("end".to_string()),
            Payload::ErrorMessage(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(
        kinds,
        vec![
            "text:Hello there, good friend.",
            "audio",
            "audio",
            "audio",
            "text:A second sentence follows.",
            "audio",
            "audio",
            "audio",
            "end",
        ]
    );
}

/// Sentence text always precedes its audio, and text messages arrive in
/// emission order with no duplicates.
#[tokio::test]
async fn text_precedes_audio_and_never_repeats() {
    let addr = spawn_server(
        &[
            "One thing at a time. ",
            "Then another thing entirely. ",
            "Then a third for good measure. ",
            "x",
        ],
        Duration::ZERO,
        2,
    )
    .await;
    let mut client = connect(addr).await;

    let mut inbound = client
        .stream_audio(tokio_stream::once(request("go")))
        .await
        .unwrap()
        .into_inner();

    let mut texts: Vec<String> = Vec::new();
    let mut audio_since_text = true; // no audio before the first text
    while let Some(message) = inbound.message().await.unwrap() {
        match message.payload.unwrap() {
            Payload::TextChunk(text) => {
                assert!(
                    audio_since_text,
                    "a sentence arrived before the previous one's audio"
                );
                audio_since_text = false;
                texts.push(text);
            }
            Payload::AudioChunk(_) => audio_since_text = true,
            Payload::EndMessage(_) | Payload::ErrorMessage(_) => break,
        }
    }

    assert_eq!(texts.len(), 3);
    let mut deduped = texts.clone();
    deduped.dedup();
    assert_eq!(texts, deduped, "no sentence repeats");
}

/// An empty prompt is answered with a single error message.
#[tokio::test]
async fn empty_prompt_yields_error_message() {
    let addr = spawn_server(&["irrelevant"], Duration::ZERO, 1).await;
    let mut client = connect(addr).await;

    let mut inbound = client
        .stream_audio(tokio_stream::once(request("  ")))
        .await
        .unwrap()
        .into_inner();

    let message = inbound.message().await.unwrap().unwrap();
    assert!(matches!(message.payload, Some(Payload::ErrorMessage(_))));
    assert!(inbound.message().await.unwrap().is_none());
}

/// Dropping the client stream mid-response marks the hardware id and the
/// server stops streaming promptly.
#[tokio::test]
async fn client_drop_stops_the_stream() {
    // Many slow sentences so the stream is alive when we hang up.
    let fragments: Vec<String> = (0..20)
        .map(|i| format!("Sentence number {i} is reasonably long. "))
        .collect();
    let fragment_refs: Vec<&str> = fragments.iter().map(String::as_str).collect();
    let addr = spawn_server(&fragment_refs, Duration::from_millis(50), 2).await;
    let mut client = connect(addr).await;

    let mut inbound = client
        .stream_audio(tokio_stream::once(request("go")))
        .await
        .unwrap()
        .into_inner();

    // Read until the first audio chunk, then hang up.
    loop {
        let message = inbound.message().await.unwrap().unwrap();
        if matches!(message.payload, Some(Payload::AudioChunk(_))) {
            break;
        }
    }
    drop(inbound);
    drop(client);

    // Nothing to assert on the wire (we hung up); the server must simply
    // not wedge. Give it a moment and open a fresh session to prove the
    // hardware id is usable again.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut client = connect(addr).await;
    let mut inbound = client
        .stream_audio(tokio_stream::once(request("again")))
        .await
        .unwrap()
        .into_inner();
    let first = tokio::time::timeout(Duration::from_secs(10), inbound.message())
        .await
        .expect("fresh session should answer")
        .unwrap()
        .unwrap();
    assert!(first.payload.is_some());
}
