//! Disabled-collaborator adapters.
//!
//! The recogniser and the screenshot backend are external engines wired in
//! by the embedding application. These stand-ins keep the client runnable
//! without them: sessions fail cleanly instead of crashing.

use async_trait::async_trait;

use loqui_core::domain::recognition::{RecognitionFailure, RecognitionOutcome};
use loqui_core::ports::{
    CapturedFrame, ScreenshotCapture, ScreenshotCaptureError, SpeechRecognizer,
};

/// Screenshot adapter for installations without a capture backend.
#[derive(Debug, Default)]
pub struct DisabledScreenshotCapture;

#[async_trait]
impl ScreenshotCapture for DisabledScreenshotCapture {
    async fn capture(&self) -> Result<CapturedFrame, ScreenshotCaptureError> {
        Err(ScreenshotCaptureError::Backend(
            "no screenshot backend configured".into(),
        ))
    }
}

/// Recogniser adapter for installations without a speech engine.
#[derive(Debug, Default)]
pub struct DisabledRecognizer;

#[async_trait]
impl SpeechRecognizer for DisabledRecognizer {
    async fn recognize(
        &self,
        _samples: &[i16],
        _sample_rate: u32,
        _language: &str,
    ) -> Result<RecognitionOutcome, RecognitionFailure> {
        Err(RecognitionFailure::ServiceError(
            "no recognition engine configured".into(),
        ))
    }
}
