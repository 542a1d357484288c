use std::collections::HashMap;
use std::sync::Arc;

use ember_domain::events::{BoardEvent, EventEnvelope};
use ember_domain::ports::events::EventBus;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::observability;

/// The SSE connections held by this process, keyed by client-chosen
/// connection id. Envelopes addressed to an id nobody here holds are
/// dropped; another process may hold that connection.
#[derive(Clone, Default)]
pub struct LiveConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<BoardEvent>>>>,
}

impl LiveConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previous sender under the same id; a reconnecting client
    /// reuses its id and the stale half-open stream just stops receiving.
    pub async fn attach(&self, connection_id: &str) -> mpsc::UnboundedReceiver<BoardEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .write()
            .await
            .insert(connection_id.to_string(), tx);
        rx
    }

    pub async fn detach(&self, connection_id: &str) {
        self.connections.write().await.remove(connection_id);
    }

    pub async fn deliver(&self, envelope: &EventEnvelope) -> bool {
        let connections = self.connections.read().await;
        let Some(sender) = connections.get(&envelope.target) else {
            return false;
        };
        sender.send(envelope.event.clone()).is_ok()
    }

    pub async fn held_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Pumps the cross-process event hub into the local registry for the life
/// of the process.
pub fn spawn_bridge(bus: Arc<dyn EventBus>, registry: LiveConnectionRegistry) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    if registry.deliver(&envelope).await {
                        observability::register_live_stream_event(envelope.event.kind());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event bridge lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_domain::events::LocalEventBus;

    #[tokio::test]
    async fn delivers_only_to_the_targeted_connection() {
        let registry = LiveConnectionRegistry::new();
        let mut held = registry.attach("mine").await;
        let _other = registry.attach("other").await;

        let envelope = EventEnvelope {
            target: "mine".into(),
            event: BoardEvent::KeywordListUpdated { refreshed_at_ms: 7 },
        };
        assert!(registry.deliver(&envelope).await);
        assert_eq!(
            held.recv().await,
            Some(BoardEvent::KeywordListUpdated { refreshed_at_ms: 7 })
        );

        let stranger = EventEnvelope {
            target: "elsewhere".into(),
            event: BoardEvent::KeywordListUpdated { refreshed_at_ms: 8 },
        };
        assert!(!registry.deliver(&stranger).await);
    }

    #[tokio::test]
    async fn bridge_routes_bus_envelopes_into_the_registry() {
        let bus = Arc::new(LocalEventBus::new());
        let registry = LiveConnectionRegistry::new();
        let handle = spawn_bridge(bus.clone(), registry.clone());

        let mut held = registry.attach("c1").await;
        bus.publish(&EventEnvelope {
            target: "c1".into(),
            event: BoardEvent::BoardExpired {
                board_id: 4,
                name: "rust".into(),
            },
        })
        .await
        .unwrap();

        let event = held.recv().await.unwrap();
        assert_eq!(event.kind(), "boardExpired");
        handle.abort();
    }

    #[tokio::test]
    async fn detach_stops_delivery() {
        let registry = LiveConnectionRegistry::new();
        let _rx = registry.attach("c1").await;
        registry.detach("c1").await;
        assert_eq!(registry.held_count().await, 0);

        let envelope = EventEnvelope {
            target: "c1".into(),
            event: BoardEvent::KeywordListUpdated { refreshed_at_ms: 1 },
        };
        assert!(!registry.deliver(&envelope).await);
    }
}
