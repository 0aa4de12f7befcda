//! The loqui streaming server.
//!
//! Per incoming `StreamAudio` stream: aggregate model output into
//! sentences, synthesize each sentence as it completes, interleave text
//! and audio outbound, honour per-hardware interrupt marks between
//! writes, and maintain per-user memory off the request path.

pub mod aggregator;
pub mod error;
pub mod interrupt;
pub mod memory;
pub mod orchestrator;
pub mod providers;
pub mod service;
pub mod store;
pub mod text_filter;
pub mod workflow;

// Re-export key types for convenience
pub use aggregator::{Segment, SentenceAggregator};
pub use error::ServerError;
pub use interrupt::InterruptRegistry;
pub use memory::{MemoryCoordinator, MemoryUpdate, MemoryWriter};
pub use orchestrator::{RequestOrchestrator, ResponseSink};
pub use service::AssistantService;
pub use workflow::{StreamingWorkflow, WorkflowItem, WorkflowSummary};
