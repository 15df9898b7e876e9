use async_trait::async_trait;

use crate::events::{Listener, SecurityEvent};

/// Emits security events as tracing events.
///
/// Requires the `tracing` feature to be enabled.
pub struct TracingListener;

#[async_trait]
impl Listener for TracingListener {
    async fn handle(&self, event: &SecurityEvent) {
        match event {
            SecurityEvent::ThreatDetected { .. } | SecurityEvent::RateLimited { .. } => {
                tracing::warn!(
                    target: "warden::events",
                    event_name = event.name(),
                    ?event,
                    "security event"
                );
            }
            _ => {
                tracing::info!(
                    target: "warden::events",
                    event_name = event.name(),
                    ?event,
                    "security event"
                );
            }
        }
    }
}
