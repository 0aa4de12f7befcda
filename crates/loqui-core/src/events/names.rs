//! The reserved event names.
//!
//! This table is the contract surface of the event bus; see the payload
//! types in the parent module for what each carries.

/// Activation key held past the long-press threshold.
pub const KEYBOARD_LONG_PRESS: &str = "keyboard.long_press";
/// Activation key tapped below the threshold; treated as an interrupt.
pub const KEYBOARD_SHORT_PRESS: &str = "keyboard.short_press";
/// Activation key released after a long press.
pub const KEYBOARD_RELEASE: &str = "keyboard.release";

/// Microphone capture began for a session.
pub const VOICE_RECORDING_START: &str = "voice.recording_start";
/// Microphone capture ended for a session.
pub const VOICE_RECORDING_STOP: &str = "voice.recording_stop";
/// Recognition produced text.
pub const VOICE_RECOGNITION_COMPLETED: &str = "voice.recognition_completed";
/// Recognition failed.
pub const VOICE_RECOGNITION_FAILED: &str = "voice.recognition_failed";
/// Recognition exceeded its budget.
pub const VOICE_RECOGNITION_TIMEOUT: &str = "voice.recognition_timeout";

/// A screenshot was captured for a session.
pub const SCREENSHOT_CAPTURED: &str = "screenshot.captured";
/// Screenshot capture failed.
pub const SCREENSHOT_ERROR: &str = "screenshot.error";

/// Ask the hardware-id integration to resolve the installation id.
pub const HARDWARE_ID_REQUEST: &str = "hardware.id_request";
/// Direct answer to a `hardware.id_request`.
pub const HARDWARE_ID_RESPONSE: &str = "hardware.id_response";
/// The installation id is known (broadcast on startup and on change).
pub const HARDWARE_ID_OBTAINED: &str = "hardware.id_obtained";

/// Connectivity flipped.
pub const NETWORK_STATUS_CHANGED: &str = "network.status_changed";

/// An RPC was opened for a session.
pub const GRPC_REQUEST_STARTED: &str = "grpc.request_started";
/// The server finished the stream with `end_message`.
pub const GRPC_REQUEST_COMPLETED: &str = "grpc.request_completed";
/// The RPC failed, was refused, or was cancelled.
pub const GRPC_REQUEST_FAILED: &str = "grpc.request_failed";
/// One aggregated sentence arrived.
pub const GRPC_RESPONSE_TEXT: &str = "grpc.response.text";
/// One PCM chunk arrived.
pub const GRPC_RESPONSE_AUDIO: &str = "grpc.response.audio";

/// Ask the mode controller for a transition.
pub const MODE_REQUEST: &str = "mode.request";
/// A request was refused.
pub const MODE_REQUEST_REJECTED: &str = "mode.request_rejected";
/// An interrupt asked for an unreachable mode.
pub const INTERRUPT_IGNORED: &str = "interrupt.ignored";
/// The mode actually changed.
pub const APP_MODE_CHANGED: &str = "app.mode_changed";

/// Playback pulled its first chunk.
pub const PLAYBACK_STARTED: &str = "playback.started";
/// Playback drained naturally after the stream completed.
pub const PLAYBACK_COMPLETED: &str = "playback.completed";
/// Playback failed.
pub const PLAYBACK_FAILED: &str = "playback.failed";
/// Playback was aborted.
pub const PLAYBACK_CANCELLED: &str = "playback.cancelled";
/// The ring buffer overflowed and dropped its oldest chunks.
pub const PLAYBACK_OVERFLOW: &str = "playback.overflow";

/// The default output device changed under an active stream.
pub const AUDIO_DEVICE_SWITCHED: &str = "audio.device_switched";

/// Hard interruption requested.
pub const INTERRUPT_REQUEST: &str = "interrupt.request";

/// Greeting flow requested (gates the sleeping-to-processing edge).
pub const GREETING_REQUEST: &str = "greeting.request";

/// Microphone/screen permission state changed.
pub const PERMISSIONS_CHANGED: &str = "permissions.changed";
