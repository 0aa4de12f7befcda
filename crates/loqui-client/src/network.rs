//! Network status monitor.
//!
//! Polls the [`NetworkProbe`] port on an interval and publishes
//! `network.status_changed` whenever the answer flips. The gRPC client
//! consumes the events to refuse sends while offline; nobody else keeps
//! connectivity state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use loqui_core::events::{names, Event, EventPayload, EventPriority, NetworkState, NetworkStatusPayload};
use loqui_core::ports::NetworkProbe;

use crate::bus::EventBus;

/// Polls connectivity and publishes flips.
pub struct NetworkMonitor {
    bus: EventBus,
    probe: Arc<dyn NetworkProbe>,
    interval: Duration,
}

impl NetworkMonitor {
    /// Create the monitor.
    #[must_use]
    pub fn new(bus: EventBus, probe: Arc<dyn NetworkProbe>, interval: Duration) -> Self {
        Self { bus, probe, interval }
    }

    /// Run the poll loop until aborted.
    pub async fn run(self) {
        let mut known = NetworkState::Unknown;
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(100)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let current = self.probe.check().await;
            if current == known {
                continue;
            }

            tracing::info!(old = ?known, new = ?current, "network status changed");
            self.bus.publish(Event::new(
                names::NETWORK_STATUS_CHANGED,
                EventPayload::NetworkStatus(NetworkStatusPayload {
                    old: known,
                    new: current,
                    details: None,
                }),
                EventPriority::Medium,
            ));
            known = current;
        }
    }
}

/// Probe that tries a TCP connect to the configured server endpoint.
pub struct TcpProbe {
    authority: String,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe `host:port` extracted from the gRPC server URI.
    #[must_use]
    pub fn new(server_uri: &str, timeout: Duration) -> Self {
        Self {
            authority: authority_of(server_uri),
            timeout,
        }
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn check(&self) -> NetworkState {
        if self.authority.is_empty() {
            return NetworkState::Unknown;
        }
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.authority)).await {
            Ok(Ok(_)) => NetworkState::Connected,
            _ => NetworkState::Disconnected,
        }
    }
}

/// Strip the scheme and path from a URI, keeping `host:port`.
fn authority_of(uri: &str) -> String {
    let without_scheme = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    if authority.contains(':') {
        authority.to_string()
    } else if authority.is_empty() {
        String::new()
    } else {
        // Default gRPC plaintext port.
        format!("{authority}:50051")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loqui_core::ports::TracingErrorSink;
    use std::sync::Mutex;

    #[test]
    fn authority_extraction() {
        assert_eq!(authority_of("http://10.0.0.2:443"), "10.0.0.2:443");
        assert_eq!(authority_of("https://api.example.com/v1"), "api.example.com:50051");
        assert_eq!(authority_of("127.0.0.1:50051"), "127.0.0.1:50051");
        assert_eq!(authority_of(""), "");
    }

    struct FlippingProbe {
        responses: Mutex<Vec<NetworkState>>,
    }

    #[async_trait]
    impl NetworkProbe for FlippingProbe {
        async fn check(&self) -> NetworkState {
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0]
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_only_on_flips() {
        let (bus, driver) = EventBus::new(Arc::new(TracingErrorSink));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(names::NETWORK_STATUS_CHANGED, EventPriority::Low, move |e| {
                if let EventPayload::NetworkStatus(p) = &e.payload {
                    seen.lock().unwrap().push((p.old, p.new));
                }
                Ok(())
            });
        }

        let probe = Arc::new(FlippingProbe {
            responses: Mutex::new(vec![
                NetworkState::Connected,
                NetworkState::Connected,
                NetworkState::Disconnected,
                NetworkState::Disconnected,
            ]),
        });

        let monitor = NetworkMonitor::new(bus.clone(), probe, Duration::from_secs(1));
        let monitor_task = tokio::spawn(monitor.run());
        let driver_task = tokio::spawn(driver.run());

        tokio::time::sleep(Duration::from_secs(5)).await;
        monitor_task.abort();
        bus.shutdown();
        let _ = driver_task.await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (NetworkState::Unknown, NetworkState::Connected),
                (NetworkState::Connected, NetworkState::Disconnected),
            ]
        );
    }
}
