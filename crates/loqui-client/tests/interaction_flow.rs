//! End-to-end interaction flows: real event bus, real mode controller,
//! real gRPC client against a real in-process server, with the audio and
//! recognition hardware seams mocked.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_stream::wrappers::TcpListenerStream;

use loqui_client::audio_io::{InputCapture, OutputSink};
use loqui_client::bus::EventBus;
use loqui_client::error::ClientError;
use loqui_client::grpc::GrpcClientIntegration;
use loqui_client::hardware::{GeneratedHardwareId, HardwareIdIntegration};
use loqui_client::input::{attach_interrupt_bridge, InputIntegration, KeyTransition};
use loqui_client::mode::ModeController;
use loqui_client::recognition::RecognitionIntegration;
use loqui_client::screenshot::ScreenshotIntegration;
use loqui_client::speech_playback::PlaybackIntegration;
use loqui_core::config::{
    GrpcClientConfig, ModeConfig, NetworkConfig, RecognitionConfig, StreamConfig,
};
use loqui_core::domain::audio::AudioPayload;
use loqui_core::domain::recognition::{RecognitionFailure, RecognitionOutcome};
use loqui_core::domain::session::SessionClock;
use loqui_core::events::{names, EventPayload, EventPriority};
use loqui_core::paths::AppPaths;
use loqui_core::ports::{
    CapturedFrame, ScreenshotCapture, ScreenshotCaptureError, SpeechRecognizer, SpeechSynthesizer,
    SynthesisError, TextProvider, TextProviderError, TracingErrorSink,
};
use loqui_server::interrupt::InterruptRegistry;
use loqui_server::memory::MemoryCoordinator;
use loqui_server::orchestrator::RequestOrchestrator;
use loqui_server::providers::RollingMemoryAnalyser;
use loqui_server::service::AssistantService;
use loqui_server::store::SqliteMemoryStore;
use loqui_server::workflow::StreamingWorkflow;

// ── Server-side scripted providers ─────────────────────────────────

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

async fn spawn_server(fragments: Vec<String>, pace: Duration, chunks: usize) -> SocketAddr {
    let workflow = Arc::new(StreamingWorkflow::new(
        Arc::new(PacedText { fragments, pace }),
        Arc::new(ChunkedTts { chunks }),
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

// ── Client-side seams ──────────────────────────────────────────────

struct MockCapture {
    capturing: Mutex<bool>,
    samples: usize,
}

impl InputCapture for MockCapture {
    fn start(&self) -> Result<(), ClientError> {
        *self.capturing.lock().unwrap() = true;
        Ok(())
    }

    fn stop(&self) -> Result<Vec<i16>, ClientError> {
        *self.capturing.lock().unwrap() = false;
        Ok(vec![1; self.samples])
    }

    fn is_capturing(&self) -> bool {
        *self.capturing.lock().unwrap()
    }
}

struct MockRecognizer {
    text: &'static str,
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn recognize(
        &self,
        _samples: &[i16],
        _sample_rate: u32,
        language: &str,
    ) -> Result<RecognitionOutcome, RecognitionFailure> {
        Ok(RecognitionOutcome {
            text: self.text.to_string(),
            confidence: 0.9,
            language: language.to_string(),
        })
    }
}

struct JpegFrame;

#[async_trait]
impl ScreenshotCapture for JpegFrame {
    async fn capture(&self) -> Result<CapturedFrame, ScreenshotCaptureError> {
        Ok(CapturedFrame {
            jpeg: vec![0xFF; 4096],
            width: 320,
            height: 200,
        })
    }
}

/// Output sink that "plays" instantly: enqueue accepts everything and the
/// buffer always reads empty.
#[derive(Default)]
struct InstantSink {
    aborted: Mutex<usize>,
    samples: Mutex<usize>,
}

impl OutputSink for InstantSink {
    fn start(&self, _source_rate: u32) -> Result<(), ClientError> {
        Ok(())
    }

    fn enqueue(&self, samples: Vec<i16>) -> Result<usize, ClientError> {
        *self.samples.lock().unwrap() += samples.len();
        Ok(0)
    }

    fn stop(&self, _timeout: Duration) -> Result<(), ClientError> {
        Ok(())
    }

    fn abort(&self) {
        *self.aborted.lock().unwrap() += 1;
    }

    fn is_active(&self) -> bool {
        true
    }

    fn buffered_samples(&self) -> usize {
        0
    }
}

struct Client {
    bus: EventBus,
    input: InputIntegration,
    seen: Arc<Mutex<Vec<String>>>,
    sink: Arc<InstantSink>,
    _tempdir: tempfile::TempDir,
}

async fn build_client(addr: SocketAddr) -> Client {
    let (bus, driver) = EventBus::new(Arc::new(TracingErrorSink));
    tokio::spawn(driver.run());

    let tempdir = tempfile::tempdir().unwrap();
    let paths = AppPaths::with_root(tempdir.path()).unwrap();

    let controller = ModeController::new(bus.clone(), ModeConfig::default(), None);
    controller.attach();
    attach_interrupt_bridge(&bus);

    let input = InputIntegration::new(
        bus.clone(),
        Arc::new(SessionClock::new()),
        Duration::from_millis(100),
    );

    RecognitionIntegration::new(
        bus.clone(),
        Arc::new(MockCapture {
            capturing: Mutex::new(false),
            samples: 16_000,
        }),
        Arc::new(MockRecognizer { text: "Hello" }),
        RecognitionConfig::default(),
    )
    .attach();

    ScreenshotIntegration::new(bus.clone(), Arc::new(JpegFrame), paths).attach();

    GrpcClientIntegration::new(
        bus.clone(),
        GrpcClientConfig {
            server: format!("http://{addr}"),
            ..GrpcClientConfig::default()
        },
        NetworkConfig::default(),
    )
    .attach();

    let sink = Arc::new(InstantSink::default());
    PlaybackIntegration::new(bus.clone(), Arc::<InstantSink>::clone(&sink) as _, 24_000).attach();

    HardwareIdIntegration::new(
        bus.clone(),
        Arc::new(GeneratedHardwareId),
        tempdir.path().join("hardware_id"),
    )
    .attach();

    // Record the full observable event timeline.
    let seen = Arc::new(Mutex::new(Vec::new()));
    for name in [
        names::VOICE_RECORDING_START,
        names::VOICE_RECORDING_STOP,
        names::VOICE_RECOGNITION_COMPLETED,
        names::SCREENSHOT_CAPTURED,
        names::APP_MODE_CHANGED,
        names::GRPC_REQUEST_STARTED,
        names::GRPC_RESPONSE_TEXT,
        names::GRPC_RESPONSE_AUDIO,
        names::GRPC_REQUEST_COMPLETED,
        names::GRPC_REQUEST_FAILED,
        names::PLAYBACK_STARTED,
        names::PLAYBACK_COMPLETED,
        names::PLAYBACK_CANCELLED,
        names::INTERRUPT_REQUEST,
    ] {
        let seen = Arc::clone(&seen);
        bus.subscribe(name, EventPriority::Low, move |event| {
            let label = match &event.payload {
                EventPayload::ModeChanged(p) => format!("{}:{}", event.name, p.mode),
                EventPayload::GrpcRequest(p) => match &p.error {
                    Some(error) => format!("{}:{error}", event.name),
                    None => event.name.clone(),
                },
                EventPayload::GrpcAudio(p) => {
                    format!("{}:{}:{}", event.name, p.sentence_index, p.chunk_index)
                }
                EventPayload::Playback(p) => match &p.reason {
                    Some(reason) => format!("{}:{reason}", event.name),
                    None => event.name.clone(),
                },
                _ => event.name.clone(),
            };
            seen.lock().unwrap().push(label);
            Ok(())
        });
    }

    // Give the hardware id a moment to resolve before any session starts.
    tokio::time::sleep(Duration::from_millis(100)).await;

    Client {
        bus,
        input,
        seen,
        sink,
        _tempdir: tempdir,
    }
}

async fn wait_for(seen: &Arc<Mutex<Vec<String>>>, needle: &str, budget: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + budget;
    while tokio::time::Instant::now() < deadline {
        if seen.lock().unwrap().iter().any(|l| l.starts_with(needle)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Assert `expected` appears as an ordered subsequence of `timeline`.
fn assert_subsequence(timeline: &[String], expected: &[&str]) {
    let mut iter = timeline.iter();
    for needle in expected {
        assert!(
            iter.any(|l| l.starts_with(needle)),
            "missing '{needle}' (in order) in timeline: {timeline:#?}"
        );
    }
}

/// The full happy path: hold the key, speak, release, hear the reply.
#[tokio::test(flavor = "multi_thread")]
async fn push_to_talk_round_trip() {
    let addr = spawn_server(
        vec!["Hello there. ".to_string(), "x".to_string()],
        Duration::ZERO,
        3,
    )
    .await;
    let client = build_client(addr).await;

    client.input.handle(KeyTransition::Down);
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.input.handle(KeyTransition::Up);

    assert!(
        wait_for(&client.seen, "playback.completed", Duration::from_secs(10)).await,
        "round trip did not complete: {:#?}",
        client.seen.lock().unwrap()
    );
    assert!(wait_for(&client.seen, "app.mode_changed:sleeping", Duration::from_secs(2)).await);

    let timeline = client.seen.lock().unwrap().clone();
    assert_subsequence(
        &timeline,
        &[
            "voice.recording_start",
            "voice.recording_stop",
            "voice.recognition_completed",
            "grpc.request_started",
            "grpc.response.text",
            "grpc.response.audio:1:1",
            "grpc.response.audio:1:2",
            "grpc.response.audio:1:3",
            "grpc.request_completed",
            "playback.completed",
            "app.mode_changed:sleeping",
        ],
    );
    // The mode reaches PROCESSING around the request start; the exact
    // interleaving with the RPC task is not deterministic.
    assert!(timeline.contains(&"app.mode_changed:processing".to_string()));
    assert!(timeline.contains(&"screenshot.captured".to_string()));
    assert!(*client.sink.samples.lock().unwrap() > 0, "audio reached the sink");

    client.bus.shutdown();
}

/// A quick tap while idle interrupts nothing and stays in sleeping.
#[tokio::test(flavor = "multi_thread")]
async fn short_tap_while_idle_is_harmless() {
    let addr = spawn_server(vec!["Hello there. ".to_string()], Duration::ZERO, 1).await;
    let client = build_client(addr).await;

    client.input.handle(KeyTransition::Down);
    tokio::time::sleep(Duration::from_millis(30)).await;
    client.input.handle(KeyTransition::Up);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let timeline = client.seen.lock().unwrap().clone();
    assert!(timeline.iter().any(|l| l == "interrupt.request"));
    assert!(
        !timeline.iter().any(|l| l.starts_with("playback.cancelled")),
        "no playback to cancel: {timeline:#?}"
    );
    assert!(
        !timeline.iter().any(|l| l.starts_with("app.mode_changed")),
        "mode never left sleeping: {timeline:#?}"
    );

    client.bus.shutdown();
}

/// Interrupt during playback: tap the key once audio is flowing; playback
/// cancels, the RPC fails with `cancelled`, and the client sleeps again.
#[tokio::test(flavor = "multi_thread")]
async fn interrupt_during_playback_cancels_everything() {
    let fragments: Vec<String> = (0..30)
        .map(|i| format!("Sentence number {i} carries enough words to emit. "))
        .collect();
    let addr = spawn_server(fragments, Duration::from_millis(60), 2).await;
    let client = build_client(addr).await;

    client.input.handle(KeyTransition::Down);
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.input.handle(KeyTransition::Up);

    assert!(
        wait_for(&client.seen, "grpc.response.audio", Duration::from_secs(10)).await,
        "no audio arrived: {:#?}",
        client.seen.lock().unwrap()
    );

    // Short tap: interrupt.
    client.input.handle(KeyTransition::Down);
    tokio::time::sleep(Duration::from_millis(30)).await;
    client.input.handle(KeyTransition::Up);

    assert!(
        wait_for(&client.seen, "playback.cancelled:interrupt", Duration::from_secs(2)).await,
        "playback was not cancelled: {:#?}",
        client.seen.lock().unwrap()
    );
    assert!(
        wait_for(&client.seen, "grpc.request_failed:cancelled", Duration::from_secs(2)).await,
        "rpc was not cancelled: {:#?}",
        client.seen.lock().unwrap()
    );
    assert!(wait_for(&client.seen, "app.mode_changed:sleeping", Duration::from_secs(2)).await);

    // The RPC task stops translating once cancelled: no audio event may
    // follow its failure event.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let timeline = client.seen.lock().unwrap().clone();
    let failed_at = timeline
        .iter()
        .position(|l| l.starts_with("grpc.request_failed:cancelled"))
        .unwrap();
    let late_audio = timeline[failed_at..]
        .iter()
        .filter(|l| l.starts_with("grpc.response.audio"))
        .count();
    assert_eq!(late_audio, 0, "late audio after cancel: {timeline:#?}");

    assert!(*client.sink.aborted.lock().unwrap() >= 1);

    client.bus.shutdown();
}
