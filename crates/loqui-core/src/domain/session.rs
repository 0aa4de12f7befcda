//! Session identity.
//!
//! A session is the causally connected run of events produced by one
//! push-to-talk interaction. Its id is a client-assigned millisecond
//! timestamp, forced strictly monotonic so that two rapid key presses can
//! never share an id even if the wall clock stalls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identifier of a push-to-talk session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw millisecond timestamp.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// The underlying millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic generator of [`SessionId`]s.
///
/// Returns the current wall-clock millisecond, bumped past the previous id
/// when the clock has not advanced.
#[derive(Debug, Default)]
pub struct SessionClock {
    last: AtomicU64,
}

impl SessionClock {
    /// Create a clock that has issued nothing yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Issue the next session id.
    pub fn next(&self) -> SessionId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return SessionId(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let clock = SessionClock::new();
        let mut previous = clock.next();
        for _ in 0..1_000 {
            let next = clock.next();
            assert!(next > previous, "{next} should be greater than {previous}");
            previous = next;
        }
    }

    #[test]
    fn ids_track_wall_clock() {
        let clock = SessionClock::new();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id = clock.next().as_millis();
        assert!(id >= now, "session id {id} should not precede the clock {now}");
    }
}
