//! Per-installation memory records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on each stored memory field (short or long term).
pub const MEMORY_FIELD_MAX_BYTES: usize = 10 * 1024;

/// The two memory fields kept per hardware id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Recent conversational context.
    pub short_term: String,
    /// Durable facts about the user.
    pub long_term: String,
}

impl MemorySnapshot {
    /// Truncate both fields to [`MEMORY_FIELD_MAX_BYTES`] at a char
    /// boundary.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.short_term = clamp_field(self.short_term);
        self.long_term = clamp_field(self.long_term);
        self
    }

    /// Whether both fields are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty()
    }
}

fn clamp_field(mut field: String) -> String {
    if field.len() <= MEMORY_FIELD_MAX_BYTES {
        return field;
    }
    let mut cut = MEMORY_FIELD_MAX_BYTES;
    while !field.is_char_boundary(cut) {
        cut -= 1;
    }
    field.truncate(cut);
    field
}

/// A stored memory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable installation identifier.
    pub hardware_id: String,
    /// Current memory fields.
    pub snapshot: MemorySnapshot,
    /// When the record was last overwritten.
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn now(hardware_id: impl Into<String>, snapshot: MemorySnapshot) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            snapshot: snapshot.clamped(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_char_boundaries() {
        let long = "é".repeat(MEMORY_FIELD_MAX_BYTES); // 2 bytes per char
        let snapshot = MemorySnapshot {
            short_term: long,
            long_term: String::new(),
        }
        .clamped();
        assert!(snapshot.short_term.len() <= MEMORY_FIELD_MAX_BYTES);
        assert!(snapshot.short_term.chars().all(|c| c == 'é'));
    }

    #[test]
    fn short_fields_pass_through() {
        let snapshot = MemorySnapshot {
            short_term: "remember the meeting".into(),
            long_term: "prefers metric units".into(),
        };
        assert_eq!(snapshot.clone().clamped(), snapshot);
    }
}
