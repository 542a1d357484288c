use tokio::sync::broadcast;

use crate::events::EventEnvelope;
use crate::DomainResult;

use super::BoxFuture;

/// Cross-process broadcast channel plus the shared known-connection-id set
/// used for fan-out targeting.
///
/// Delivery is at-most-once and best-effort: a process that receives an
/// envelope for a connection it does not hold simply drops it. Clients are
/// expected to resubscribe on reconnect.
pub trait EventBus: Send + Sync {
    fn publish(&self, envelope: &EventEnvelope) -> BoxFuture<'_, DomainResult<()>>;

    /// Process-local hub fed by the cross-process channel.
    fn subscribe(&self) -> broadcast::Receiver<EventEnvelope>;

    fn register_connection(&self, connection_id: &str) -> BoxFuture<'_, DomainResult<()>>;

    fn deregister_connection(&self, connection_id: &str) -> BoxFuture<'_, DomainResult<()>>;

    fn known_connections(&self) -> BoxFuture<'_, DomainResult<Vec<String>>>;
}
