//! Screenshot capture port.

use async_trait::async_trait;
use thiserror::Error;

/// A captured frame, always JPEG.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Encoded JPEG bytes.
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Capture failed.
#[derive(Debug, Error)]
pub enum ScreenshotCaptureError {
    /// The OS refused screen-capture access.
    #[error("screen capture permission denied")]
    PermissionDenied,
    /// The backend failed.
    #[error("screenshot backend error: {0}")]
    Backend(String),
}

/// Captures the current screen.
#[async_trait]
pub trait ScreenshotCapture: Send + Sync {
    /// Capture the primary display as JPEG.
    async fn capture(&self) -> Result<CapturedFrame, ScreenshotCaptureError>;
}
