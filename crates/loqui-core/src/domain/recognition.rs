//! Speech-recognition results as seen by the rest of the system.

use serde::{Deserialize, Serialize};

/// A successful recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    /// Transcribed text, trimmed.
    pub text: String,
    /// Engine confidence in [0.0, 1.0].
    pub confidence: f32,
    /// BCP-47 language tag the engine settled on.
    pub language: String,
}

/// Why recognition produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RecognitionFailure {
    /// The engine heard no speech in the buffer.
    #[error("no speech detected")]
    NoSpeech,
    /// The recognition service failed.
    #[error("recognition service error: {0}")]
    ServiceError(String),
    /// The engine did not answer within the configured budget.
    #[error("recognition timed out")]
    Timeout,
}
