//! Hardware id integration.
//!
//! The stable installation identifier is resolved once: from the cache
//! file if present, otherwise from the [`HardwareIdProvider`] port (cached
//! afterwards). The result is broadcast as `hardware.id_obtained`, and
//! `hardware.id_request` gets a direct `hardware.id_response`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use loqui_core::events::{names, Event, EventPayload, EventPriority, HardwareIdPayload};
use loqui_core::ports::{HardwareIdError, HardwareIdProvider};

use crate::bus::EventBus;

/// Resolves and answers for the installation id.
#[derive(Clone)]
pub struct HardwareIdIntegration {
    bus: EventBus,
    provider: Arc<dyn HardwareIdProvider>,
    cache_file: PathBuf,
    cached: Arc<Mutex<Option<String>>>,
}

impl HardwareIdIntegration {
    /// Create the integration.
    #[must_use]
    pub fn new(bus: EventBus, provider: Arc<dyn HardwareIdProvider>, cache_file: PathBuf) -> Self {
        Self {
            bus,
            provider,
            cache_file,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Register subscriptions and kick off the initial resolution.
    pub fn attach(&self) {
        let me = self.clone();
        self.bus
            .subscribe(names::HARDWARE_ID_REQUEST, EventPriority::High, move |_| {
                me.answer();
                Ok(())
            });

        let me = self.clone();
        tokio::spawn(async move {
            match me.resolve().await {
                Ok((uuid, source)) => {
                    *me.cached.lock().unwrap() = Some(uuid.clone());
                    tracing::info!(source, "hardware id resolved");
                    me.bus.publish(Event::new(
                        names::HARDWARE_ID_OBTAINED,
                        EventPayload::HardwareId(HardwareIdPayload {
                            uuid,
                            source: source.to_string(),
                        }),
                        EventPriority::High,
                    ));
                }
                Err(error) => {
                    tracing::error!(%error, "hardware id resolution failed");
                }
            }
        });
    }

    /// Currently known id, if resolution already finished.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.cached.lock().unwrap().clone()
    }

    async fn resolve(&self) -> Result<(String, &'static str), HardwareIdError> {
        match tokio::fs::read_to_string(&self.cache_file).await {
            Ok(raw) => {
                let cached = raw.trim().to_string();
                if !cached.is_empty() {
                    return Ok((cached, "cache"));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(error = %e, "hardware id cache unreadable, re-resolving");
            }
        }

        let uuid = self.provider.hardware_id().await?;
        if let Err(error) = tokio::fs::write(&self.cache_file, &uuid).await {
            tracing::warn!(%error, "failed to write hardware id cache");
        }
        Ok((uuid, "provider"))
    }

    fn answer(&self) {
        let me = self.clone();
        tokio::spawn(async move {
            let uuid = match me.current() {
                Some(uuid) => uuid,
                None => match me.resolve().await {
                    Ok((uuid, _)) => {
                        *me.cached.lock().unwrap() = Some(uuid.clone());
                        uuid
                    }
                    Err(error) => {
                        tracing::error!(%error, "hardware id unavailable for response");
                        return;
                    }
                },
            };
            me.bus.publish(Event::new(
                names::HARDWARE_ID_RESPONSE,
                EventPayload::HardwareId(HardwareIdPayload {
                    uuid,
                    source: "response".to_string(),
                }),
                EventPriority::High,
            ));
        });
    }
}

/// Default provider: mint a v4 UUID. Stability across launches comes from
/// the cache file, not from the provider.
#[derive(Debug, Default)]
pub struct GeneratedHardwareId;

#[async_trait]
impl HardwareIdProvider for GeneratedHardwareId {
    async fn hardware_id(&self) -> Result<String, HardwareIdError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
}
