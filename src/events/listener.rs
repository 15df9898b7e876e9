use async_trait::async_trait;

use super::SecurityEvent;

/// Trait for handling security events asynchronously.
///
/// Implement this trait to forward events to an audit trail, a metrics
/// backend or a UI layer.
///
/// # Example
///
/// ```rust,ignore
/// use warden::events::{Listener, SecurityEvent};
/// use async_trait::async_trait;
///
/// struct AuditListener;
///
/// #[async_trait]
/// impl Listener for AuditListener {
///     async fn handle(&self, event: &SecurityEvent) {
///         if let SecurityEvent::ThreatDetected { context, threats, .. } = event {
///             // report to the audit endpoint
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Called for every dispatched event, in registration order.
    async fn handle(&self, event: &SecurityEvent);
}
