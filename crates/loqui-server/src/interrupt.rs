//! Process-wide interrupt marks.
//!
//! One mark per hardware id, set when the client half-closes or sends an
//! explicit interrupt, consulted by the orchestrator between outbound
//! writes. Marks expire on a TTL so a stale interrupt can never kill a
//! future request.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use loqui_core::ports::InterruptSink;

/// Read-mostly map of hardware id to mark time.
pub struct InterruptRegistry {
    marks: RwLock<HashMap<String, Instant>>,
    ttl: Duration,
}

impl InterruptRegistry {
    /// Create a registry with the given mark TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            marks: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Mark `hardware_id`. Re-marking refreshes the timestamp.
    pub fn mark(&self, hardware_id: &str) {
        tracing::info!(hardware_id, "interrupt marked");
        self.marks
            .write()
            .unwrap()
            .insert(hardware_id.to_string(), Instant::now());
    }

    /// Whether a live (non-expired) mark exists.
    #[must_use]
    pub fn is_marked(&self, hardware_id: &str) -> bool {
        let marks = self.marks.read().unwrap();
        marks
            .get(hardware_id)
            .is_some_and(|at| at.elapsed() <= self.ttl)
    }

    /// Remove the mark, expired or not.
    pub fn clear(&self, hardware_id: &str) {
        if self.marks.write().unwrap().remove(hardware_id).is_some() {
            tracing::debug!(hardware_id, "interrupt cleared");
        }
    }

    /// Drop expired marks. Called opportunistically; correctness never
    /// depends on it because `is_marked` checks the age itself.
    pub fn sweep(&self) {
        let mut marks = self.marks.write().unwrap();
        marks.retain(|_, at| at.elapsed() <= self.ttl);
    }

    /// Live marks right now.
    #[must_use]
    pub fn len(&self) -> usize {
        let marks = self.marks.read().unwrap();
        marks.values().filter(|at| at.elapsed() <= self.ttl).count()
    }

    /// Whether no live marks exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InterruptSink for InterruptRegistry {
    fn mark(&self, hardware_id: &str) {
        Self::mark(self, hardware_id);
    }
}
