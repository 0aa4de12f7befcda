//! Streaming gRPC client integration.
//!
//! Collects the pieces of a session (recognised text, optional screenshot,
//! hardware id), opens one `StreamAudio` call per session, and translates
//! the inbound stream into `grpc.response.*` / `grpc.request_*` events.
//!
//! Aggregation: text is mandatory; a screenshot is included if it arrives
//! within the aggregate timeout, otherwise the request goes without one.
//! At most one RPC is in flight per session, connects are lazy, and there
//! are no retries within a session. While the network monitor reports
//! offline, sends are refused immediately.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use loqui_core::config::{GrpcClientConfig, NetworkConfig};
use loqui_core::domain::audio::AudioPayload;
use loqui_core::domain::mode::{source, Mode, ModeRequest};
use loqui_core::domain::session::SessionId;
use loqui_core::events::{
    names, Event, EventPayload, EventPriority, GrpcAudioPayload, GrpcRequestPayload,
    GrpcTextPayload, NetworkState,
};
use loqui_proto::v1::assistant_client::AssistantClient;
use loqui_proto::v1::{stream_response, ScreenInfo, StreamRequest};

use crate::bus::EventBus;

struct Pending {
    text: Option<String>,
    screenshot: Option<PathBuf>,
    screen: Option<(u32, u32)>,
    screenshot_failed: bool,
    timer: Option<tokio::task::JoinHandle<()>>,
}

impl Pending {
    fn new() -> Self {
        Self {
            text: None,
            screenshot: None,
            screen: None,
            screenshot_failed: false,
            timer: None,
        }
    }
}

struct GrpcState {
    hardware_id: Option<String>,
    network: NetworkState,
    pending: HashMap<SessionId, Pending>,
    inflight: HashMap<SessionId, CancellationToken>,
}

/// The client half of the wire protocol, wired to the bus.
#[derive(Clone)]
pub struct GrpcClientIntegration {
    bus: EventBus,
    config: GrpcClientConfig,
    network_config: NetworkConfig,
    state: Arc<Mutex<GrpcState>>,
}

impl GrpcClientIntegration {
    /// Create the integration.
    #[must_use]
    pub fn new(bus: EventBus, config: GrpcClientConfig, network_config: NetworkConfig) -> Self {
        Self {
            bus,
            config,
            network_config,
            state: Arc::new(Mutex::new(GrpcState {
                hardware_id: None,
                network: NetworkState::Unknown,
                pending: HashMap::new(),
                inflight: HashMap::new(),
            })),
        }
    }

    /// Register subscriptions.
    pub fn attach(&self) {
        let me = self.clone();
        self.bus.subscribe(
            names::VOICE_RECOGNITION_COMPLETED,
            EventPriority::High,
            move |event| {
                if let EventPayload::RecognitionCompleted(payload) = &event.payload {
                    me.on_text(payload.session_id, payload.text.clone());
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus.subscribe(
            names::SCREENSHOT_CAPTURED,
            EventPriority::High,
            move |event| {
                if let EventPayload::ScreenshotCaptured(payload) = &event.payload {
                    me.on_screenshot(
                        payload.session_id,
                        payload.image_path.clone(),
                        (payload.width, payload.height),
                    );
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus
            .subscribe(names::SCREENSHOT_ERROR, EventPriority::High, move |event| {
                if let EventPayload::ScreenshotError(payload) = &event.payload {
                    me.on_screenshot_failed(payload.session_id);
                }
                Ok(())
            });

        let me = self.clone();
        self.bus.subscribe(
            names::HARDWARE_ID_OBTAINED,
            EventPriority::High,
            move |event| {
                if let EventPayload::HardwareId(payload) = &event.payload {
                    me.state.lock().unwrap().hardware_id = Some(payload.uuid.clone());
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus.subscribe(
            names::NETWORK_STATUS_CHANGED,
            EventPriority::Medium,
            move |event| {
                if let EventPayload::NetworkStatus(payload) = &event.payload {
                    me.state.lock().unwrap().network = payload.new;
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus
            .subscribe(names::INTERRUPT_REQUEST, EventPriority::Critical, move |_| {
                me.cancel_all("cancelled");
                Ok(())
            });

        let me = self.clone();
        self.bus
            .subscribe(names::APP_MODE_CHANGED, EventPriority::High, move |event| {
                if let EventPayload::ModeChanged(payload) = &event.payload {
                    if payload.mode == Mode::Sleeping {
                        me.cancel_all("cancelled");
                    }
                }
                Ok(())
            });
    }

    // ── Aggregation ────────────────────────────────────────────────

    fn on_text(&self, session: SessionId, text: String) {
        let dispatch_now = {
            let mut state = self.state.lock().unwrap();
            let entry = state.pending.entry(session).or_insert_with(Pending::new);
            entry.text = Some(text);
            entry.screenshot.is_some() || entry.screenshot_failed
        };

        if dispatch_now {
            self.dispatch(session);
            return;
        }

        // Wait a bounded time for the screenshot, then send without it.
        let me = self.clone();
        let timeout = Duration::from_secs_f64(self.config.aggregate_timeout_sec.max(0.0));
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            me.dispatch(session);
        });

        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.pending.get_mut(&session) {
            if let Some(old) = entry.timer.replace(timer) {
                old.abort();
            }
        } else {
            timer.abort();
        }
    }

    fn on_screenshot(&self, session: SessionId, path: PathBuf, screen: (u32, u32)) {
        let ready = {
            let mut state = self.state.lock().unwrap();
            let entry = state.pending.entry(session).or_insert_with(Pending::new);
            entry.screenshot = Some(path);
            entry.screen = Some(screen);
            entry.text.is_some()
        };
        if ready {
            self.dispatch(session);
        }
    }

    fn on_screenshot_failed(&self, session: SessionId) {
        let ready = {
            let mut state = self.state.lock().unwrap();
            let entry = state.pending.entry(session).or_insert_with(Pending::new);
            entry.screenshot_failed = true;
            entry.text.is_some()
        };
        if ready {
            // No screenshot will ever arrive; send what we have.
            self.dispatch(session);
        }
    }

    /// Take the aggregated session data and open the RPC.
    fn dispatch(&self, session: SessionId) {
        let (pending, hardware_id, token) = {
            let mut state = self.state.lock().unwrap();
            let Some(pending) = state.pending.remove(&session) else {
                return; // already dispatched
            };
            if let Some(timer) = &pending.timer {
                timer.abort();
            }
            if pending.text.is_none() {
                return;
            }

            if self.config.use_network_gate && state.network == NetworkState::Disconnected {
                drop(state);
                tracing::warn!(%session, "offline, refusing send");
                self.fail(session, "offline");
                return;
            }

            if state.inflight.contains_key(&session) {
                return; // duplicate scheduling is a no-op
            }
            let token = CancellationToken::new();
            state.inflight.insert(session, token.clone());
            (pending, state.hardware_id.clone().unwrap_or_default(), token)
        };

        let me = self.clone();
        tokio::spawn(async move {
            let outcome = me.run_rpc(session, pending, hardware_id, token).await;
            me.state.lock().unwrap().inflight.remove(&session);
            if let Err(error) = outcome {
                me.fail(session, &error);
            }
        });
    }

    // ── The RPC itself ─────────────────────────────────────────────

    async fn run_rpc(
        &self,
        session: SessionId,
        pending: Pending,
        hardware_id: String,
        token: CancellationToken,
    ) -> Result<(), String> {
        let prompt = pending.text.expect("dispatch checked text");

        let screenshot_base64 = match &pending.screenshot {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
                Err(error) => {
                    tracing::warn!(%error, "screenshot unreadable, sending without");
                    String::new()
                }
            },
            None => String::new(),
        };

        self.bus.publish(Event::new(
            names::GRPC_REQUEST_STARTED,
            EventPayload::GrpcRequest(GrpcRequestPayload {
                session_id: session,
                error: None,
            }),
            EventPriority::High,
        ));

        let endpoint = Channel::from_shared(self.config.server.clone())
            .map_err(|e| format!("bad server uri: {e}"))?
            .http2_keep_alive_interval(Duration::from_secs(self.network_config.keepalive_time))
            .keep_alive_timeout(Duration::from_secs(self.network_config.keepalive_timeout))
            .connect_timeout(Duration::from_secs(5));

        let channel = tokio::select! {
            connected = endpoint.connect() => {
                connected.map_err(|e| {
                    tracing::error!(error = %e, "connect failed");
                    "connect_failed".to_string()
                })?
            }
            () = token.cancelled() => return Err("cancelled".into()),
        };

        let mut client = AssistantClient::new(channel);

        let request = StreamRequest {
            prompt,
            hardware_id,
            screenshot_base64,
            screen_info: pending.screen.map(|(width, height)| ScreenInfo {
                width: width as i32,
                height: height as i32,
            }),
        };

        // Exactly one message, then half-close.
        let outbound = tokio_stream::once(request);
        let response = tokio::select! {
            r = client.stream_audio(outbound) => {
                r.map_err(|status| status.message().to_string())?
            }
            () = token.cancelled() => return Err("cancelled".into()),
        };
        let mut inbound = response.into_inner();

        let budget = Duration::from_secs_f64(self.config.request_timeout_sec.max(1.0));
        let deadline = tokio::time::Instant::now() + budget;

        let mut sentence_index: u32 = 0;
        let mut chunk_index: u32 = 0;

        loop {
            let message = tokio::select! {
                m = inbound.message() => m,
                () = token.cancelled() => return Err("cancelled".into()),
                () = tokio::time::sleep_until(deadline) => return Err("timeout".into()),
            };

            let message = match message {
                Ok(Some(m)) => m,
                Ok(None) => return Err("stream closed without end message".into()),
                Err(status) => return Err(status.message().to_string()),
            };

            match message.payload {
                Some(stream_response::Payload::TextChunk(text)) => {
                    sentence_index += 1;
                    chunk_index = 0;
                    self.bus.publish(Event::new(
                        names::GRPC_RESPONSE_TEXT,
                        EventPayload::GrpcText(GrpcTextPayload {
                            session_id: session,
                            sentence_index,
                            text,
                        }),
                        EventPriority::High,
                    ));
                }
                Some(stream_response::Payload::AudioChunk(chunk)) => {
                    match AudioPayload::try_from(chunk) {
                        Ok(audio) => {
                            chunk_index += 1;
                            self.bus.publish(Event::new(
                                names::GRPC_RESPONSE_AUDIO,
                                EventPayload::GrpcAudio(GrpcAudioPayload {
                                    session_id: session,
                                    sentence_index: sentence_index.max(1),
                                    chunk_index,
                                    audio,
                                }),
                                EventPriority::High,
                            ));
                        }
                        Err(error) => {
                            // Decoder error: log, skip the chunk, keep the
                            // stream alive.
                            tracing::error!(%error, %session, "undecodable audio chunk");
                        }
                    }
                }
                Some(stream_response::Payload::EndMessage(_)) => {
                    tracing::info!(%session, sentences = sentence_index, "stream completed");
                    self.bus.publish(Event::new(
                        names::GRPC_REQUEST_COMPLETED,
                        EventPayload::GrpcRequest(GrpcRequestPayload {
                            session_id: session,
                            error: None,
                        }),
                        EventPriority::High,
                    ));
                    return Ok(());
                }
                Some(stream_response::Payload::ErrorMessage(message)) => {
                    return Err(if message.is_empty() {
                        "server error".to_string()
                    } else {
                        message
                    });
                }
                None => {
                    tracing::warn!(%session, "empty stream message ignored");
                }
            }
        }
    }

    // ── Failure and cancellation ───────────────────────────────────

    fn fail(&self, session: SessionId, error: &str) {
        self.bus.publish(Event::new(
            names::GRPC_REQUEST_FAILED,
            EventPayload::GrpcRequest(GrpcRequestPayload {
                session_id: session,
                error: Some(error.to_string()),
            }),
            EventPriority::High,
        ));
        self.bus.publish(Event::mode_request(
            ModeRequest::new(Mode::Sleeping, source::GRPC_FAILURE).with_session(session),
        ));
    }

    fn cancel_all(&self, reason: &str) {
        let (cancelled, pending): (Vec<_>, Vec<_>) = {
            let mut state = self.state.lock().unwrap();
            for pending in state.pending.values() {
                if let Some(timer) = &pending.timer {
                    timer.abort();
                }
            }
            let pending: Vec<_> = state.pending.drain().map(|(id, _)| id).collect();
            let cancelled: Vec<_> = state
                .inflight
                .iter()
                .map(|(id, token)| {
                    token.cancel();
                    *id
                })
                .collect();
            (cancelled, pending)
        };

        for session in cancelled {
            tracing::info!(%session, reason, "rpc cancelled");
        }
        // Sessions that never made it to the wire just evaporate.
        for session in pending {
            tracing::debug!(%session, "pending aggregation dropped");
        }
    }
}
