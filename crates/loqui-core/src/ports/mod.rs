//! Port traits for external collaborators.
//!
//! Every black-box dependency of the system (speech recognition, the text
//! model, speech synthesis, screenshots, the network probe, the hardware-id
//! source, memory persistence) is consumed through exactly one of these
//! traits. A component receives only the ports it needs; nothing inspects a
//! collaborator beyond its trait surface.

mod error_sink;
mod event_sink;
mod hardware;
mod interrupt;
mod memory;
mod network;
mod screenshot;
mod speech;
mod text_provider;

pub use error_sink::{ErrorSink, TracingErrorSink};
pub use event_sink::EventSink;
pub use hardware::{HardwareIdError, HardwareIdProvider};
pub use interrupt::InterruptSink;
pub use memory::{MemoryAnalyser, MemoryAnalyserError, MemoryStore, MemoryStoreError};
pub use network::NetworkProbe;
pub use screenshot::{CapturedFrame, ScreenshotCapture, ScreenshotCaptureError};
pub use speech::{SpeechRecognizer, SpeechSynthesizer, SynthesisError};
pub use text_provider::{TextProvider, TextProviderError};
