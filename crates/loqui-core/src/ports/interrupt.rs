//! Interrupt sink port.

/// Marks a hardware id for interruption.
///
/// The gRPC endpoint depends on this rather than on the concrete registry
/// so that half-close handling can be exercised without one.
pub trait InterruptSink: Send + Sync {
    /// Mark `hardware_id`; any active request for it must stop at its next
    /// yield boundary.
    fn mark(&self, hardware_id: &str);
}
