//! Screenshot integration.
//!
//! On `voice.recording_start` the screen is captured through the
//! [`ScreenshotCapture`] port, written into the screenshot cache as
//! `shot_<ms>.jpg`, and announced with `screenshot.captured`. The gRPC
//! aggregator decides whether the file makes it into the request. Stale
//! cache entries are reaped on startup.

use std::sync::Arc;

use loqui_core::domain::session::SessionId;
use loqui_core::events::{
    names, Event, EventPayload, EventPriority, ScreenshotCapturedPayload, ScreenshotErrorPayload,
};
use loqui_core::paths::{AppPaths, SCREENSHOT_MAX_AGE};
use loqui_core::ports::{ScreenshotCapture, ScreenshotCaptureError};

use crate::bus::EventBus;

/// Wires the screenshot port to the bus.
#[derive(Clone)]
pub struct ScreenshotIntegration {
    bus: EventBus,
    capture: Arc<dyn ScreenshotCapture>,
    paths: AppPaths,
}

impl ScreenshotIntegration {
    /// Create the integration and reap stale cache entries.
    #[must_use]
    pub fn new(bus: EventBus, capture: Arc<dyn ScreenshotCapture>, paths: AppPaths) -> Self {
        if let Err(error) = paths.reap_screenshots(SCREENSHOT_MAX_AGE) {
            tracing::warn!(%error, "screenshot cache reap failed");
        }
        Self { bus, capture, paths }
    }

    /// Register subscriptions.
    pub fn attach(&self) {
        let me = self.clone();
        self.bus.subscribe(
            names::VOICE_RECORDING_START,
            EventPriority::High,
            move |event| {
                if let EventPayload::Recording(payload) = &event.payload {
                    me.capture_for(payload.session_id);
                }
                Ok(())
            },
        );
    }

    fn capture_for(&self, session: SessionId) {
        let me = self.clone();
        tokio::spawn(async move {
            match me.capture.capture().await {
                Ok(frame) => {
                    let path = me.paths.screenshot_file(session.as_millis());
                    let size_bytes = frame.jpeg.len() as u64;
                    if let Err(error) = tokio::fs::write(&path, &frame.jpeg).await {
                        tracing::warn!(%error, %session, "failed to cache screenshot");
                        me.publish_error(session, &format!("cache write failed: {error}"));
                        return;
                    }

                    tracing::debug!(
                        %session,
                        width = frame.width,
                        height = frame.height,
                        size_bytes,
                        "screenshot captured"
                    );
                    me.bus.publish(Event::new(
                        names::SCREENSHOT_CAPTURED,
                        EventPayload::ScreenshotCaptured(ScreenshotCapturedPayload {
                            session_id: session,
                            image_path: path,
                            width: frame.width,
                            height: frame.height,
                            size_bytes,
                            mime_type: "image/jpeg".to_string(),
                        }),
                        EventPriority::High,
                    ));
                }
                Err(ScreenshotCaptureError::PermissionDenied) => {
                    tracing::warn!(%session, "screen capture permission denied");
                    me.publish_error(session, "permission_denied");
                }
                Err(error) => {
                    tracing::warn!(%error, %session, "screenshot capture failed");
                    me.publish_error(session, &error.to_string());
                }
            }
        });
    }

    fn publish_error(&self, session: SessionId, error: &str) {
        self.bus.publish(Event::new(
            names::SCREENSHOT_ERROR,
            EventPayload::ScreenshotError(ScreenshotErrorPayload {
                session_id: session,
                error: error.to_string(),
            }),
            EventPriority::High,
        ));
    }
}
