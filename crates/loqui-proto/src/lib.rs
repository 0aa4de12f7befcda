//! Generated wire protocol plus conversions to the core domain types.

// Generated protobuf code (from build.rs).
pub mod v1 {
    #![allow(clippy::pedantic, clippy::nursery)]
    include!(concat!(env!("OUT_DIR"), "/loqui.v1.rs"));
}

use loqui_core::domain::audio::{AudioPayload, SampleDtype, UnknownDtype};

impl From<AudioPayload> for v1::AudioChunk {
    fn from(payload: AudioPayload) -> Self {
        Self {
            dtype: payload.dtype.wire_label().to_string(),
            shape: payload.shape,
            audio_data: payload.data,
        }
    }
}

impl TryFrom<v1::AudioChunk> for AudioPayload {
    type Error = UnknownDtype;

    fn try_from(chunk: v1::AudioChunk) -> Result<Self, Self::Error> {
        Ok(Self {
            dtype: SampleDtype::from_wire_label(&chunk.dtype)?,
            shape: chunk.shape,
            data: chunk.audio_data,
        })
    }
}

impl v1::StreamResponse {
    /// Wrap a sentence.
    #[must_use]
    pub fn text(text: String) -> Self {
        Self {
            payload: Some(v1::stream_response::Payload::TextChunk(text)),
        }
    }

    /// Wrap an audio chunk.
    #[must_use]
    pub fn audio(chunk: v1::AudioChunk) -> Self {
        Self {
            payload: Some(v1::stream_response::Payload::AudioChunk(chunk)),
        }
    }

    /// Success terminator.
    #[must_use]
    pub fn end(message: String) -> Self {
        Self {
            payload: Some(v1::stream_response::Payload::EndMessage(message)),
        }
    }

    /// Failure terminator.
    #[must_use]
    pub fn error(message: String) -> Self {
        Self {
            payload: Some(v1::stream_response::Payload::ErrorMessage(message)),
        }
    }
}
