//! Speech playback integration.
//!
//! Feeds `grpc.response.audio` chunks for the tracked session into the
//! output sink, reports lifecycle events (`playback.started`,
//! `playback.completed`, `playback.failed`, `playback.cancelled`,
//! `playback.overflow`), and returns the client to SLEEPING once the ring
//! drains after the stream ends. Chunks from any other session are
//! discarded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use loqui_core::domain::mode::{source, Mode, ModeRequest};
use loqui_core::domain::session::SessionId;
use loqui_core::events::{
    names, Event, EventPayload, EventPriority, OverflowPayload, PlaybackPayload,
};

use crate::audio_io::OutputSink;
use crate::bus::EventBus;

const DRAIN_POLL: Duration = Duration::from_millis(50);

struct PlayState {
    session: Option<SessionId>,
    started: bool,
    end_received: bool,
}

/// Wires the output sink to the response stream.
#[derive(Clone)]
pub struct PlaybackIntegration {
    bus: EventBus,
    sink: Arc<dyn OutputSink>,
    source_rate: u32,
    state: Arc<Mutex<PlayState>>,
}

impl PlaybackIntegration {
    /// Create the integration. `source_rate` is the sample rate the server
    /// streams at.
    #[must_use]
    pub fn new(bus: EventBus, sink: Arc<dyn OutputSink>, source_rate: u32) -> Self {
        Self {
            bus,
            sink,
            source_rate,
            state: Arc::new(Mutex::new(PlayState {
                session: None,
                started: false,
                end_received: false,
            })),
        }
    }

    /// Register subscriptions.
    pub fn attach(&self) {
        let me = self.clone();
        self.bus.subscribe(
            names::GRPC_REQUEST_STARTED,
            EventPriority::High,
            move |event| {
                if let EventPayload::GrpcRequest(payload) = &event.payload {
                    let mut state = me.state.lock().unwrap();
                    state.session = Some(payload.session_id);
                    state.started = false;
                    state.end_received = false;
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus.subscribe(
            names::GRPC_RESPONSE_AUDIO,
            EventPriority::High,
            move |event| {
                if let EventPayload::GrpcAudio(payload) = &event.payload {
                    me.on_audio(payload.session_id, payload.audio.to_i16_samples());
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus.subscribe(
            names::GRPC_REQUEST_COMPLETED,
            EventPriority::High,
            move |event| {
                if let EventPayload::GrpcRequest(payload) = &event.payload {
                    me.on_stream_end(payload.session_id);
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus.subscribe(
            names::GRPC_REQUEST_FAILED,
            EventPriority::High,
            move |event| {
                if let EventPayload::GrpcRequest(payload) = &event.payload {
                    me.on_stream_failed(payload.session_id);
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus
            .subscribe(names::INTERRUPT_REQUEST, EventPriority::Critical, move |_| {
                me.on_interrupt();
                Ok(())
            });

        // Mutual exclusion: the microphone never listens over playback.
        let me = self.clone();
        self.bus
            .subscribe(names::APP_MODE_CHANGED, EventPriority::High, move |event| {
                if let EventPayload::ModeChanged(payload) = &event.payload {
                    if payload.mode == Mode::Listening {
                        me.sink.abort();
                    }
                }
                Ok(())
            });
    }

    fn on_audio(&self, session: SessionId, samples: Vec<i16>) {
        {
            let state = self.state.lock().unwrap();
            if state.session != Some(session) {
                tracing::debug!(%session, "audio chunk for foreign session dropped");
                return;
            }
        }

        // First chunk: acquire the device.
        let need_start = {
            let mut state = self.state.lock().unwrap();
            if state.started {
                false
            } else {
                state.started = true;
                true
            }
        };

        if need_start {
            if let Err(error) = self.sink.start(self.source_rate) {
                tracing::error!(%error, %session, "playback start failed");
                self.publish_lifecycle(
                    names::PLAYBACK_FAILED,
                    session,
                    Some(error.to_string()),
                );
                self.clear();
                self.bus.publish(Event::mode_request(
                    ModeRequest::new(Mode::Sleeping, source::PLAYBACK_FAILED)
                        .with_session(session),
                ));
                return;
            }
            self.publish_lifecycle(names::PLAYBACK_STARTED, session, None);
        }

        match self.sink.enqueue(samples) {
            Ok(0) => {}
            Ok(dropped) => {
                tracing::warn!(%session, dropped, "playback ring overflow");
                self.bus.publish(Event::new(
                    names::PLAYBACK_OVERFLOW,
                    EventPayload::Overflow(OverflowPayload {
                        session_id: session,
                        dropped_samples: dropped,
                    }),
                    EventPriority::Low,
                ));
            }
            Err(error) => {
                tracing::error!(%error, %session, "enqueue failed");
                self.publish_lifecycle(names::PLAYBACK_FAILED, session, Some(error.to_string()));
            }
        }
    }

    /// The stream ended; watch the ring drain, then report completion.
    fn on_stream_end(&self, session: SessionId) {
        {
            let mut state = self.state.lock().unwrap();
            if state.session != Some(session) {
                return;
            }
            state.end_received = true;

            // A stream that carried no audio completes immediately.
            if !state.started {
                drop(state);
                self.finish(session);
                return;
            }
        }

        let me = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(DRAIN_POLL).await;
                let state = me.state.lock().unwrap();
                if state.session != Some(session) || !state.end_received {
                    return; // interrupted or superseded
                }
                drop(state);
                if me.sink.buffered_samples() == 0 {
                    break;
                }
            }
            let _ = me.sink.stop(Duration::from_millis(200));
            me.finish(session);
        });
    }

    fn finish(&self, session: SessionId) {
        {
            let mut state = self.state.lock().unwrap();
            if state.session != Some(session) {
                return;
            }
            state.session = None;
            state.started = false;
            state.end_received = false;
        }

        tracing::info!(%session, "playback completed");
        self.publish_lifecycle(names::PLAYBACK_COMPLETED, session, None);
        self.bus.publish(Event::mode_request(
            ModeRequest::new(Mode::Sleeping, source::PLAYBACK_COMPLETED).with_session(session),
        ));
    }

    fn on_stream_failed(&self, session: SessionId) {
        let was_active = {
            let state = self.state.lock().unwrap();
            if state.session != Some(session) {
                return;
            }
            state.started
        };
        self.clear();
        if was_active {
            self.sink.abort();
            self.publish_lifecycle(
                names::PLAYBACK_CANCELLED,
                session,
                Some("request_failed".into()),
            );
        }
    }

    fn on_interrupt(&self) {
        let session = {
            let state = self.state.lock().unwrap();
            state.session
        };
        let Some(session) = session else {
            return; // nothing to cancel; repeated interrupts are no-ops
        };

        self.clear();
        self.sink.abort();
        tracing::info!(%session, "playback interrupted");
        self.publish_lifecycle(names::PLAYBACK_CANCELLED, session, Some("interrupt".into()));
    }

    fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.session = None;
        state.started = false;
        state.end_received = false;
    }

    fn publish_lifecycle(&self, name: &str, session: SessionId, reason: Option<String>) {
        self.bus.publish(Event::new(
            name,
            EventPayload::Playback(PlaybackPayload {
                session_id: session,
                reason,
            }),
            EventPriority::High,
        ));
    }
}
