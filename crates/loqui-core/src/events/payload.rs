//! Payload structs for the reserved event names.

use serde::{Deserialize, Serialize};

use crate::domain::audio::AudioPayload;
use crate::domain::mode::Mode;
use crate::domain::session::SessionId;

/// `keyboard.long_press` / `keyboard.short_press` / `keyboard.release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPressPayload {
    /// How long the key was held, in milliseconds.
    pub duration_ms: u64,
    /// Press-down wall-clock time, epoch milliseconds.
    pub timestamp_ms: u64,
}

/// `voice.recording_start` / `voice.recording_stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingPayload {
    /// Session born at key press.
    pub session_id: SessionId,
    /// What initiated the recording edge (always "keyboard" today).
    pub source: String,
}

/// `voice.recognition_completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionCompletedPayload {
    pub session_id: SessionId,
    /// Non-empty transcribed text.
    pub text: String,
    pub confidence: f32,
    pub language: String,
}

/// `voice.recognition_failed` / `voice.recognition_timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionFailedPayload {
    pub session_id: SessionId,
    /// Stable error tag (`no_speech`, `capture_unavailable`, ...).
    pub error: String,
}

/// `screenshot.captured`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotCapturedPayload {
    pub session_id: SessionId,
    /// Path inside the screenshot cache directory.
    pub image_path: std::path::PathBuf,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    /// Always `image/jpeg` today.
    pub mime_type: String,
}

/// `screenshot.error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotErrorPayload {
    pub session_id: SessionId,
    pub error: String,
}

/// `hardware.id_request` / `hardware.id_response` / `hardware.id_obtained`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareIdPayload {
    /// The installation id; empty in a request.
    pub uuid: String,
    /// Where it came from (`cache`, `provider`, `request`).
    pub source: String,
}

/// Connectivity as the network monitor sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Connected,
    Disconnected,
    /// Not probed yet.
    Unknown,
}

/// `network.status_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatusPayload {
    pub old: NetworkState,
    pub new: NetworkState,
    /// Free-form probe detail (latency, interface).
    pub details: Option<String>,
}

/// `grpc.request_started` / `grpc.request_completed` / `grpc.request_failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcRequestPayload {
    pub session_id: SessionId,
    /// Present only on failure (`offline`, `connect_failed`, `cancelled`,
    /// or the server's error text).
    pub error: Option<String>,
}

/// `grpc.response.text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcTextPayload {
    pub session_id: SessionId,
    /// 1-based, strictly increasing per session.
    pub sentence_index: u32,
    pub text: String,
}

/// `grpc.response.audio`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcAudioPayload {
    pub session_id: SessionId,
    pub sentence_index: u32,
    /// 1-based within the sentence.
    pub chunk_index: u32,
    pub audio: AudioPayload,
}

/// `app.mode_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChangedPayload {
    pub mode: Mode,
    pub previous: Mode,
}

/// `mode.request_rejected` / `interrupt.ignored`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRejectedPayload {
    pub requested: Mode,
    pub current: Mode,
    pub source: String,
    /// Stable reject tag from the arbitration.
    pub reason: String,
}

/// `playback.started` / `playback.completed` / `playback.failed` /
/// `playback.cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackPayload {
    pub session_id: SessionId,
    /// Failure or cancellation reason when applicable.
    pub reason: Option<String>,
}

/// `playback.overflow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverflowPayload {
    pub session_id: SessionId,
    /// Samples evicted to make room.
    pub dropped_samples: usize,
}

/// `permissions.changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsPayload {
    pub microphone: bool,
    pub screen_capture: bool,
}
