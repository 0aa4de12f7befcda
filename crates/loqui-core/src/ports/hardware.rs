//! Hardware id port.

use async_trait::async_trait;
use thiserror::Error;

/// The provider could not produce an id.
#[derive(Debug, Error)]
#[error("hardware id unavailable: {0}")]
pub struct HardwareIdError(pub String);

/// Produces the stable installation identifier.
///
/// The client caches the first answer on disk; the provider is only asked
/// again when the cache is missing or unreadable.
#[async_trait]
pub trait HardwareIdProvider: Send + Sync {
    /// Resolve the installation id.
    async fn hardware_id(&self) -> Result<String, HardwareIdError>;
}
