use std::time::Duration;

use ember_domain::error::DomainError;
use ember_domain::events::EventEnvelope;
use ember_domain::ports::events::EventBus;
use ember_domain::DomainResult;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;

pub const EVENTS_CHANNEL: &str = "ember:events";
pub const CONNECTION_KEY_PREFIX: &str = "ember:live:connection:";

const HUB_CAPACITY: usize = 256;
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);
const CONNECTION_SCAN_COUNT: usize = 100;

/// Registrations expire unless refreshed; ids left behind by a crashed
/// process age out instead of receiving envelopes forever.
const CONNECTION_TTL: Duration = Duration::from_secs(60);

fn map_redis(err: redis::RedisError) -> DomainError {
    DomainError::Transient(err.to_string())
}

fn connection_key(connection_id: &str) -> String {
    format!("{CONNECTION_KEY_PREFIX}{connection_id}")
}

fn connection_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(CONNECTION_KEY_PREFIX)
}

/// Cross-process event bus over a Redis pub/sub channel, with the known
/// connection ids mirrored as per-id TTL keys for fan-out targeting.
/// Re-registering an id refreshes its TTL.
///
/// A background task feeds the channel into a process-local broadcast hub;
/// it resubscribes with a short delay whenever the pub/sub connection drops.
#[derive(Clone)]
pub struct RedisEventBus {
    manager: ConnectionManager,
    hub: broadcast::Sender<EventEnvelope>,
}

impl RedisEventBus {
    pub async fn connect(redis_url: &str) -> DomainResult<Self> {
        let client = redis::Client::open(redis_url).map_err(map_redis)?;
        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(map_redis)?;
        let (hub, _) = broadcast::channel(HUB_CAPACITY);
        let bus = Self { manager, hub };
        bus.spawn_listener(client);
        Ok(bus)
    }

    fn spawn_listener(&self, client: redis::Client) {
        let hub = self.hub.clone();
        tokio::spawn(async move {
            loop {
                match Self::listen_once(&client, &hub).await {
                    Ok(()) => {
                        tracing::warn!("event channel stream ended; resubscribing");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "event channel subscription failed; retrying");
                    }
                }
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
            }
        });
    }

    async fn listen_once(
        client: &redis::Client,
        hub: &broadcast::Sender<EventEnvelope>,
    ) -> Result<(), redis::RedisError> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(EVENTS_CHANNEL).await?;
        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let payload: String = match message.get_payload() {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable event payload; skipping");
                    continue;
                }
            };
            match serde_json::from_str::<EventEnvelope>(&payload) {
                Ok(envelope) => {
                    // No local receivers is fine.
                    let _ = hub.send(envelope);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "malformed event envelope; skipping");
                }
            }
        }
        Ok(())
    }
}

impl EventBus for RedisEventBus {
    fn publish(&self, envelope: &EventEnvelope) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let payload = serde_json::to_string(envelope)
            .map_err(|err| DomainError::Transient(err.to_string()));
        Box::pin(async move {
            let payload = payload?;
            let mut conn = self.manager.clone();
            let _: i64 = conn
                .publish(EVENTS_CHANNEL, payload)
                .await
                .map_err(map_redis)?;
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.hub.subscribe()
    }

    fn register_connection(
        &self,
        connection_id: &str,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let key = connection_key(connection_id);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let () = conn
                .set_ex(&key, 1, CONNECTION_TTL.as_secs())
                .await
                .map_err(map_redis)?;
            Ok(())
        })
    }

    fn deregister_connection(
        &self,
        connection_id: &str,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let key = connection_key(connection_id);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = conn.del(&key).await.map_err(map_redis)?;
            Ok(())
        })
    }

    fn known_connections(&self) -> ember_domain::ports::BoxFuture<'_, DomainResult<Vec<String>>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let pattern = format!("{CONNECTION_KEY_PREFIX}*");
            let mut cursor: u64 = 0;
            let mut ids = Vec::new();
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(CONNECTION_SCAN_COUNT)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis)?;
                ids.extend(
                    keys.iter()
                        .filter_map(|key| connection_id_from_key(key))
                        .map(str::to_string),
                );
                cursor = next;
                if cursor == 0 {
                    break;
                }
            }
            Ok(ids)
        })
    }
}
