//! Per-user memory: bounded-budget reads, fire-and-forget writes.
//!
//! The read path fetches the stored snapshot and renders the prompt
//! prefix; if the store does not answer within the budget the request
//! proceeds without memory. The write path runs on one dedicated task,
//! decoupled from the RPC lifetime: the orchestrator enqueues an update
//! and returns immediately, and any analyser or store failure is logged
//! and swallowed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use loqui_core::domain::memory::{MemoryRecord, MemorySnapshot};
use loqui_core::ports::{MemoryAnalyser, MemoryStore};

/// One completed exchange queued for distillation.
#[derive(Debug)]
pub struct MemoryUpdate {
    pub hardware_id: String,
    pub prompt: String,
    pub final_text: String,
}

/// Read side handle used by the orchestrator.
#[derive(Clone)]
pub struct MemoryCoordinator {
    store: Arc<dyn MemoryStore>,
    read_budget: Duration,
    update_tx: mpsc::UnboundedSender<MemoryUpdate>,
}

impl MemoryCoordinator {
    /// Create the coordinator and its write-back worker. The worker must
    /// be spawned by the caller and lives for the whole process.
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        analyser: Arc<dyn MemoryAnalyser>,
        read_budget: Duration,
    ) -> (Self, MemoryWriter) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                store: Arc::clone(&store),
                read_budget,
                update_tx,
            },
            MemoryWriter {
                store,
                analyser,
                update_rx,
            },
        )
    }

    /// Render the prompt prefix for `hardware_id`, or `None` when the
    /// store does not answer in time.
    pub async fn context_block(&self, hardware_id: &str) -> Option<String> {
        let fetched =
            tokio::time::timeout(self.read_budget, self.store.fetch(hardware_id)).await;

        match fetched {
            Ok(Ok(record)) => {
                let snapshot = record.map(|r| r.snapshot).unwrap_or_default();
                Some(render_context_block(&snapshot))
            }
            Ok(Err(error)) => {
                tracing::warn!(%error, hardware_id, "memory fetch failed, proceeding without");
                None
            }
            Err(_) => {
                tracing::warn!(hardware_id, "memory fetch over budget, proceeding without");
                None
            }
        }
    }

    /// Queue a write-back; never blocks, never fails the request.
    pub fn schedule_update(&self, update: MemoryUpdate) {
        if self.update_tx.send(update).is_err() {
            tracing::warn!("memory writer gone, update dropped");
        }
    }
}

/// Render the literal context block prepended to prompts.
#[must_use]
pub fn render_context_block(snapshot: &MemorySnapshot) -> String {
    format!(
        "MEMORY CONTEXT\nSHORT-TERM MEMORY: {}\nLONG-TERM MEMORY: {}\nMEMORY USAGE INSTRUCTIONS: use this context only when relevant.\n",
        snapshot.short_term, snapshot.long_term
    )
}

/// The dedicated write-back task.
pub struct MemoryWriter {
    store: Arc<dyn MemoryStore>,
    analyser: Arc<dyn MemoryAnalyser>,
    update_rx: mpsc::UnboundedReceiver<MemoryUpdate>,
}

impl MemoryWriter {
    /// Drain updates until every coordinator handle is dropped.
    pub async fn run(mut self) {
        while let Some(update) = self.update_rx.recv().await {
            self.apply(update).await;
        }
        tracing::debug!("memory writer stopped");
    }

    async fn apply(&self, update: MemoryUpdate) {
        let previous = match self.store.fetch(&update.hardware_id).await {
            Ok(record) => record.map(|r| r.snapshot),
            Err(error) => {
                tracing::warn!(%error, "previous memory unreadable, distilling fresh");
                None
            }
        };

        let distilled = self
            .analyser
            .distill(&update.prompt, &update.final_text, previous.as_ref())
            .await;

        let snapshot = match distilled {
            Ok(snapshot) => snapshot.clamped(),
            Err(error) => {
                tracing::warn!(%error, hardware_id = %update.hardware_id, "memory distillation failed");
                return;
            }
        };

        let record = MemoryRecord::now(update.hardware_id.clone(), snapshot);
        if let Err(error) = self.store.store(&record).await {
            tracing::warn!(%error, hardware_id = %update.hardware_id, "memory write failed");
        } else {
            tracing::debug!(hardware_id = %update.hardware_id, "memory updated");
        }
    }
}
