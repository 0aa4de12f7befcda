//! Event sink port.

use crate::events::Event;

/// Publish-only view of the event bus.
///
/// Components that only ever emit events depend on this trait instead of
/// the full bus handle, which keeps the bus type out of their signatures
/// and lets tests collect events in a plain vector.
pub trait EventSink: Send + Sync {
    /// Enqueue an event. Returns as soon as the event is queued; delivery
    /// happens on the bus executor.
    fn publish(&self, event: Event);
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn publish(&self, event: Event) {
        (**self).publish(event);
    }
}
