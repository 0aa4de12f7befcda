//! Runtime permission monitor.
//!
//! The OS permission dialogs themselves are out of scope; this integration
//! only polls a probe and publishes `permissions.changed` on flips. The
//! mode controller refuses LISTENING while the microphone is blocked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use loqui_core::config::PermissionsConfig;
use loqui_core::events::{names, Event, EventPayload, EventPriority, PermissionsPayload};

use crate::bus::EventBus;

/// Answers the current microphone / screen-capture permission state.
#[async_trait]
pub trait PermissionProbe: Send + Sync {
    /// Whether microphone capture is allowed right now.
    async fn microphone(&self) -> bool;
    /// Whether screen capture is allowed right now.
    async fn screen_capture(&self) -> bool;
}

/// Probe for platforms without a runtime permission model: everything is
/// allowed.
#[derive(Debug, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionProbe for AlwaysGranted {
    async fn microphone(&self) -> bool {
        true
    }
    async fn screen_capture(&self) -> bool {
        true
    }
}

/// Polls permissions and publishes flips.
pub struct PermissionsMonitor {
    bus: EventBus,
    probe: Arc<dyn PermissionProbe>,
    config: PermissionsConfig,
}

impl PermissionsMonitor {
    /// Create the monitor.
    #[must_use]
    pub fn new(bus: EventBus, probe: Arc<dyn PermissionProbe>, config: PermissionsConfig) -> Self {
        Self { bus, probe, config }
    }

    /// Run the poll loop until aborted.
    pub async fn run(self) {
        let interval = Duration::from_secs_f64(self.config.check_interval.max(0.5));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut known: Option<PermissionsPayload> = None;

        loop {
            ticker.tick().await;
            let current = PermissionsPayload {
                microphone: self.probe.microphone().await,
                screen_capture: self.probe.screen_capture().await,
            };
            if known == Some(current) {
                continue;
            }

            if !current.microphone && self.config.show_instructions {
                tracing::warn!(
                    "microphone permission missing; grant access in the system privacy settings"
                );
            }

            self.bus.publish(Event::new(
                names::PERMISSIONS_CHANGED,
                EventPayload::Permissions(current),
                EventPriority::High,
            ));
            known = Some(current);
        }
    }
}
