//! Error sink port.
//!
//! Components never raise across the event-bus boundary; anything a
//! handler cannot deal with is handed to the sink and the run continues.

/// Receiver of non-fatal component errors.
pub trait ErrorSink: Send + Sync {
    /// Report an error that occurred inside `scope`.
    ///
    /// Implementations must not block and must not panic.
    fn report(&self, scope: &str, error: &(dyn std::error::Error + 'static));
}

/// Default sink: log through `tracing` and move on.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, scope: &str, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(scope, %error, "component error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_sink_does_not_panic() {
        let sink = TracingErrorSink;
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        sink.report("test", &err);
    }
}
