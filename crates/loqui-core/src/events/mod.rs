//! The reserved event vocabulary of the client process.
//!
//! Every cross-component signal on the client is an [`Event`]: a dotted
//! name from [`names`], a typed [`EventPayload`], and a priority class.
//! The server reuses the same types scoped to one request. Components may
//! not invent private synonyms for the reserved names.

pub mod names;
mod payload;

use std::time::SystemTime;

pub use payload::{
    GrpcAudioPayload, GrpcRequestPayload, GrpcTextPayload, HardwareIdPayload, KeyPressPayload,
    ModeChangedPayload, ModeRejectedPayload, NetworkState, NetworkStatusPayload, OverflowPayload,
    PermissionsPayload, PlaybackPayload, RecognitionCompletedPayload, RecognitionFailedPayload,
    RecordingPayload, ScreenshotCapturedPayload, ScreenshotErrorPayload,
};

use crate::domain::mode::ModeRequest;

/// Delivery priority class. Lower ordinal drains first; within a class,
/// delivery is FIFO in publish order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// Interrupts and mode requests carrying `source=interrupt`.
    Critical,
    /// The default for session-scoped signals.
    High,
    /// Environment changes (network, devices).
    Medium,
    /// Housekeeping.
    Low,
}

/// A single published event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Dotted name; one of [`names`].
    pub name: String,
    /// Typed payload.
    pub payload: EventPayload,
    /// Priority class used by the bus scheduler.
    pub priority: EventPriority,
    /// Wall-clock publish time.
    pub timestamp: SystemTime,
}

impl Event {
    /// Build an event stamped now.
    #[must_use]
    pub fn new(name: &str, payload: EventPayload, priority: EventPriority) -> Self {
        Self {
            name: name.to_string(),
            payload,
            priority,
            timestamp: SystemTime::now(),
        }
    }

    /// Build a `mode.request` event.
    ///
    /// Interrupt-sourced requests are always published at
    /// [`EventPriority::Critical`]; anything else travels at
    /// [`EventPriority::High`].
    #[must_use]
    pub fn mode_request(request: ModeRequest) -> Self {
        let priority = if request.is_interrupt() {
            EventPriority::Critical
        } else {
            EventPriority::High
        };
        Self::new(names::MODE_REQUEST, EventPayload::ModeRequest(request), priority)
    }
}

/// Typed payloads for the reserved event names.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Events that carry no data (`interrupt.request`, `greeting.request`).
    Empty,
    /// `keyboard.*` events.
    KeyPress(KeyPressPayload),
    /// `voice.recording_start` / `voice.recording_stop`.
    Recording(RecordingPayload),
    /// `voice.recognition_completed`.
    RecognitionCompleted(RecognitionCompletedPayload),
    /// `voice.recognition_failed` / `voice.recognition_timeout`.
    RecognitionFailed(RecognitionFailedPayload),
    /// `screenshot.captured`.
    ScreenshotCaptured(ScreenshotCapturedPayload),
    /// `screenshot.error`.
    ScreenshotError(ScreenshotErrorPayload),
    /// `hardware.id_*`.
    HardwareId(HardwareIdPayload),
    /// `network.status_changed`.
    NetworkStatus(NetworkStatusPayload),
    /// `grpc.request_*`.
    GrpcRequest(GrpcRequestPayload),
    /// `grpc.response.text`.
    GrpcText(GrpcTextPayload),
    /// `grpc.response.audio`.
    GrpcAudio(GrpcAudioPayload),
    /// `mode.request`.
    ModeRequest(ModeRequest),
    /// `app.mode_changed`.
    ModeChanged(ModeChangedPayload),
    /// `mode.request_rejected` / `interrupt.ignored`.
    ModeRejected(ModeRejectedPayload),
    /// `playback.*` lifecycle events.
    Playback(PlaybackPayload),
    /// `playback.overflow`.
    Overflow(OverflowPayload),
    /// `permissions.changed`.
    Permissions(PermissionsPayload),
    /// `audio.device_switched`; carries the new device name.
    DeviceSwitched(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mode::{source, Mode};

    #[test]
    fn priority_classes_are_ordered() {
        assert!(EventPriority::Critical < EventPriority::High);
        assert!(EventPriority::High < EventPriority::Medium);
        assert!(EventPriority::Medium < EventPriority::Low);
    }

    #[test]
    fn interrupt_mode_request_is_critical() {
        let event = Event::mode_request(ModeRequest::new(Mode::Sleeping, source::INTERRUPT));
        assert_eq!(event.priority, EventPriority::Critical);
        assert_eq!(event.name, names::MODE_REQUEST);
    }

    #[test]
    fn plain_mode_request_is_high() {
        let event = Event::mode_request(ModeRequest::new(Mode::Listening, source::KEYBOARD));
        assert_eq!(event.priority, EventPriority::High);
    }
}
