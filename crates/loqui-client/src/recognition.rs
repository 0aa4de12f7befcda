//! Voice recognition integration.
//!
//! Owns the capture seam and the recogniser port. Recording follows the
//! `voice.recording_start` / `voice.recording_stop` events; the released
//! buffer is recognised on the task pool with language fallback and a
//! timeout budget, and the outcome is published back as
//! `voice.recognition_completed` / `voice.recognition_failed` /
//! `voice.recognition_timeout` together with the matching mode request.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use loqui_core::config::RecognitionConfig;
use loqui_core::domain::mode::{source, Mode, ModeRequest};
use loqui_core::domain::recognition::RecognitionFailure;
use loqui_core::domain::session::SessionId;
use loqui_core::events::{
    names, Event, EventPayload, EventPriority, RecognitionCompletedPayload,
    RecognitionFailedPayload,
};
use loqui_core::ports::SpeechRecognizer;

use crate::audio_io::InputCapture;
use crate::bus::EventBus;
use crate::capture::TARGET_SAMPLE_RATE;
use crate::error::ClientError;

/// Wires capture and recognition to the bus.
#[derive(Clone)]
pub struct RecognitionIntegration {
    bus: EventBus,
    capture: Arc<dyn InputCapture>,
    recognizer: Arc<dyn SpeechRecognizer>,
    config: RecognitionConfig,
    /// Session whose audio we currently own; stale results are dropped.
    active: Arc<Mutex<Option<SessionId>>>,
}

impl RecognitionIntegration {
    /// Create the integration.
    #[must_use]
    pub fn new(
        bus: EventBus,
        capture: Arc<dyn InputCapture>,
        recognizer: Arc<dyn SpeechRecognizer>,
        config: RecognitionConfig,
    ) -> Self {
        Self {
            bus,
            capture,
            recognizer,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Register subscriptions.
    pub fn attach(&self) {
        let me = self.clone();
        self.bus.subscribe(
            names::VOICE_RECORDING_START,
            EventPriority::High,
            move |event| {
                if let EventPayload::Recording(payload) = &event.payload {
                    me.on_recording_start(payload.session_id);
                }
                Ok(())
            },
        );

        let me = self.clone();
        self.bus.subscribe(
            names::VOICE_RECORDING_STOP,
            EventPriority::High,
            move |event| {
                if let EventPayload::Recording(payload) = &event.payload {
                    me.on_recording_stop(payload.session_id);
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
    }

    fn on_recording_start(&self, session: SessionId) {
        *self.active.lock().unwrap() = Some(session);

        let me = self.clone();
        tokio::spawn(async move {
            let capture = Arc::clone(&me.capture);
            let result = tokio::task::spawn_blocking(move || capture.start()).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(%error, %session, "capture failed to start");
                    me.fail_session(session, names::VOICE_RECOGNITION_FAILED, capture_tag(&error));
                }
                Err(join) => {
                    tracing::error!(%join, "capture start task panicked");
                    me.fail_session(
                        session,
                        names::VOICE_RECOGNITION_FAILED,
                        "capture_unavailable",
                    );
                }
            }
        });
    }

    fn on_recording_stop(&self, session: SessionId) {
        let me = self.clone();
        tokio::spawn(async move {
            let capture = Arc::clone(&me.capture);
            let stopped = tokio::task::spawn_blocking(move || capture.stop()).await;

            let samples = match stopped {
                Ok(Ok(samples)) => samples,
                Ok(Err(error)) => {
                    tracing::error!(%error, %session, "capture failed");
                    me.fail_session(session, names::VOICE_RECOGNITION_FAILED, capture_tag(&error));
                    return;
                }
                Err(join) => {
                    tracing::error!(%join, "capture stop task panicked");
                    me.fail_session(
                        session,
                        names::VOICE_RECOGNITION_FAILED,
                        "capture_unavailable",
                    );
                    return;
                }
            };

            if samples.is_empty() {
                // Accidental tap: no recognition attempt, straight back to
                // sleep.
                tracing::debug!(%session, "empty capture, returning to sleep");
                me.bus.publish(Event::mode_request(
                    ModeRequest::new(Mode::Sleeping, source::RECOGNITION_EMPTY)
                        .with_session(session),
                ));
                return;
            }

            me.recognize(session, samples).await;
        });
    }

    /// Try each configured language in order until one yields text.
    async fn recognize(&self, session: SessionId, samples: Vec<i16>) {
        let budget = Duration::from_secs_f64(self.config.timeout_sec.max(0.1));
        let mut last_failure = RecognitionFailure::NoSpeech;

        for language in &self.config.languages {
            let attempt = tokio::time::timeout(
                budget,
                self.recognizer.recognize(&samples, TARGET_SAMPLE_RATE, language),
            )
            .await;

            match attempt {
                Err(_) => {
                    tracing::warn!(%session, language, "recognition timed out");
                    self.fail_session(session, names::VOICE_RECOGNITION_TIMEOUT, "timeout");
                    return;
                }
                Ok(Ok(outcome)) if !outcome.text.trim().is_empty() => {
                    self.complete_session(session, outcome.text.trim().to_string(), outcome);
                    return;
                }
                Ok(Ok(_)) => {
                    last_failure = RecognitionFailure::NoSpeech;
                }
                Ok(Err(failure)) => {
                    tracing::debug!(%session, language, %failure, "recognition attempt failed");
                    last_failure = failure;
                }
            }
        }

        let tag = match &last_failure {
            RecognitionFailure::NoSpeech => "no_speech",
            RecognitionFailure::ServiceError(_) => "service_error",
            RecognitionFailure::Timeout => "timeout",
        };
        self.fail_session(session, names::VOICE_RECOGNITION_FAILED, tag);
    }

    fn complete_session(
        &self,
        session: SessionId,
        text: String,
        outcome: loqui_core::domain::recognition::RecognitionOutcome,
    ) {
        if *self.active.lock().unwrap() != Some(session) {
            tracing::debug!(%session, "dropping stale recognition result");
            return;
        }

        tracing::info!(%session, text_len = text.len(), "recognition completed");
        self.bus.publish(Event::new(
            names::VOICE_RECOGNITION_COMPLETED,
            EventPayload::RecognitionCompleted(RecognitionCompletedPayload {
                session_id: session,
                text,
                confidence: outcome.confidence,
                language: outcome.language,
            }),
            EventPriority::High,
        ));
        self.bus.publish(Event::mode_request(
            ModeRequest::new(Mode::Processing, source::KEYBOARD_RELEASE).with_session(session),
        ));
    }

    fn fail_session(&self, session: SessionId, event_name: &str, tag: &str) {
        if *self.active.lock().unwrap() != Some(session) {
            return;
        }

        self.bus.publish(Event::new(
            event_name,
            EventPayload::RecognitionFailed(RecognitionFailedPayload {
                session_id: session,
                error: tag.to_string(),
            }),
            EventPriority::High,
        ));
        self.bus.publish(Event::mode_request(
            ModeRequest::new(Mode::Sleeping, source::RECOGNITION_EMPTY).with_session(session),
        ));
    }

    fn on_interrupt(&self) {
        *self.active.lock().unwrap() = None;

        if self.capture.is_capturing() {
            let capture = Arc::clone(&self.capture);
            tokio::spawn(async move {
                // Discard whatever was recorded.
                let _ = tokio::task::spawn_blocking(move || capture.stop()).await;
            });
        }
    }
}

fn capture_tag(error: &ClientError) -> &'static str {
    match error {
        ClientError::PermissionDenied => "capture_permission_denied",
        _ => "capture_unavailable",
    }
}
