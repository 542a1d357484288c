use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::ports::events::EventBus;
use crate::DomainResult;

/// Typed live-state events carried over the cross-process channel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoardEvent {
    #[serde(rename_all = "camelCase")]
    KeywordListUpdated { refreshed_at_ms: i64 },
    #[serde(rename_all = "camelCase")]
    BoardExpired { board_id: i64, name: String },
    #[serde(rename_all = "camelCase")]
    BoardTimeExtended {
        board_id: i64,
        post_id: i64,
        threshold: u64,
        extended_by_seconds: i64,
    },
}

impl BoardEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BoardEvent::KeywordListUpdated { .. } => "keywordListUpdated",
            BoardEvent::BoardExpired { .. } => "boardExpired",
            BoardEvent::BoardTimeExtended { .. } => "boardTimeExtended",
        }
    }
}

/// One event addressed at one known connection id. The process holding the
/// connection delivers it; everyone else drops it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub target: String,
    pub event: BoardEvent,
}

/// Publishes `event` once per known connection id. Per-target publish
/// failures are logged and skipped; returns how many envelopes went out.
pub async fn fan_out(bus: &dyn EventBus, event: &BoardEvent) -> DomainResult<usize> {
    let targets = bus.known_connections().await?;
    let mut published = 0usize;
    for target in targets {
        let envelope = EventEnvelope {
            target,
            event: event.clone(),
        };
        match bus.publish(&envelope).await {
            Ok(()) => published += 1,
            Err(err) => {
                tracing::warn!(
                    target = %envelope.target,
                    kind = event.kind(),
                    error = %err,
                    "event publish failed for target; skipping"
                );
            }
        }
    }
    Ok(published)
}

const LOCAL_HUB_CAPACITY: usize = 256;

/// Single-process event bus: the broadcast hub is both the transport and the
/// local subscription point. Used by tests and the memory data backend.
#[derive(Clone)]
pub struct LocalEventBus {
    hub: broadcast::Sender<EventEnvelope>,
    known: Arc<RwLock<HashSet<String>>>,
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEventBus {
    pub fn new() -> Self {
        let (hub, _) = broadcast::channel(LOCAL_HUB_CAPACITY);
        Self {
            hub,
            known: Arc::new(RwLock::new(HashSet::new())),
        }
    }
}

impl EventBus for LocalEventBus {
    fn publish(&self, envelope: &EventEnvelope) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let envelope = envelope.clone();
        let hub = self.hub.clone();
        Box::pin(async move {
            // No receivers is fine; the envelope is simply dropped.
            let _ = hub.send(envelope);
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.hub.subscribe()
    }

    fn register_connection(
        &self,
        connection_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let connection_id = connection_id.to_string();
        let known = self.known.clone();
        Box::pin(async move {
            known.write().await.insert(connection_id);
            Ok(())
        })
    }

    fn deregister_connection(
        &self,
        connection_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let connection_id = connection_id.to_string();
        let known = self.known.clone();
        Box::pin(async move {
            known.write().await.remove(&connection_id);
            Ok(())
        })
    }

    fn known_connections(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<String>>> {
        let known = self.known.clone();
        Box::pin(async move { Ok(known.read().await.iter().cloned().collect()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = BoardEvent::BoardExpired {
            board_id: 3,
            name: "rust".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "boardExpired");
        assert_eq!(json["boardId"], 3);
    }

    #[tokio::test]
    async fn fan_out_targets_every_known_connection() {
        let bus = LocalEventBus::new();
        bus.register_connection("c1").await.unwrap();
        bus.register_connection("c2").await.unwrap();
        let mut receiver = bus.subscribe();

        let event = BoardEvent::KeywordListUpdated { refreshed_at_ms: 99 };
        let published = fan_out(&bus, &event).await.unwrap();
        assert_eq!(published, 2);

        let mut targets = vec![
            receiver.recv().await.unwrap().target,
            receiver.recv().await.unwrap().target,
        ];
        targets.sort();
        assert_eq!(targets, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[tokio::test]
    async fn deregistered_connections_are_not_targeted() {
        let bus = LocalEventBus::new();
        bus.register_connection("c1").await.unwrap();
        bus.deregister_connection("c1").await.unwrap();

        let event = BoardEvent::KeywordListUpdated { refreshed_at_ms: 1 };
        assert_eq!(fan_out(&bus, &event).await.unwrap(), 0);
    }
}
