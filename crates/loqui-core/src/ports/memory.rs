//! Memory persistence and distillation ports.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::memory::{MemoryRecord, MemorySnapshot};

/// The store failed.
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    /// The underlying database failed.
    #[error("memory storage error: {0}")]
    Storage(String),
}

/// Persists one memory record per hardware id.
///
/// Writes for the same hardware id are serialised by the adapter; callers
/// never see read-your-writes guarantees and must not rely on them.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Fetch the record for `hardware_id`, if any.
    async fn fetch(&self, hardware_id: &str) -> Result<Option<MemoryRecord>, MemoryStoreError>;

    /// Overwrite the record for `record.hardware_id`.
    async fn store(&self, record: &MemoryRecord) -> Result<(), MemoryStoreError>;
}

/// The analyser failed.
#[derive(Debug, Error)]
#[error("memory analyser error: {0}")]
pub struct MemoryAnalyserError(pub String);

/// Distills an exchange into updated memory fields.
#[async_trait]
pub trait MemoryAnalyser: Send + Sync {
    /// Produce new memory fields from the user's prompt, the assistant's
    /// final text, and the previous snapshot.
    async fn distill(
        &self,
        prompt: &str,
        final_text: &str,
        previous: Option<&MemorySnapshot>,
    ) -> Result<MemorySnapshot, MemoryAnalyserError>;
}
