//! Network status probe port.

use async_trait::async_trait;

use crate::events::NetworkState;

/// Answers "are we online right now".
///
/// Probes must be cheap; the network monitor polls on an interval and
/// publishes a `network.status_changed` event only when the answer flips.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Current connectivity as this probe sees it.
    async fn check(&self) -> NetworkState;
}
