use std::time::Duration;

use ember_domain::expiry::{ExpiryCascade, ExpiryFilter};
use futures_util::StreamExt;
use redis::aio::ConnectionManager;

use crate::rank::BOARD_KEY_PREFIX;

const EXPIRED_PATTERN: &str = "__keyevent@*__:expired";
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Default filter: board liveness keys only, with the reserved prefixes
/// explicitly denied.
pub fn default_filter() -> ExpiryFilter {
    ExpiryFilter::new(
        vec![BOARD_KEY_PREFIX.to_string()],
        vec!["ember:cooldown:".to_string(), "ember:session:".to_string()],
    )
}

/// Subscribes to native key-expiration notifications and drives the expiry
/// cascade for every board liveness key that lapses.
///
/// Runs until the process shuts down; a dropped pub/sub connection is
/// resubscribed after a short delay. Requires `notify-keyspace-events` to
/// include `Ex`, which `enable_notifications` turns on best-effort.
pub struct ExpiryListener {
    client: redis::Client,
    filter: ExpiryFilter,
    cascade: ExpiryCascade,
}

impl ExpiryListener {
    pub fn new(redis_url: &str, filter: ExpiryFilter, cascade: ExpiryCascade) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            filter,
            cascade,
        })
    }

    /// Best-effort: managed Redis offerings often reject CONFIG SET, in
    /// which case the operator must enable `Ex` notifications themselves.
    pub async fn enable_notifications(&self, manager: &ConnectionManager) {
        let mut conn = manager.clone();
        let result: redis::RedisResult<String> = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async(&mut conn)
            .await;
        if let Err(err) = result {
            tracing::warn!(
                error = %err,
                "could not enable keyspace notifications; expecting them preconfigured"
            );
        }
    }

    pub async fn run(self) {
        loop {
            match self.listen_once().await {
                Ok(()) => tracing::warn!("expiry notification stream ended; resubscribing"),
                Err(err) => {
                    tracing::warn!(error = %err, "expiry notification subscribe failed; retrying")
                }
            }
            tokio::time::sleep(RESUBSCRIBE_DELAY).await;
        }
    }

    async fn listen_once(&self) -> redis::RedisResult<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(EXPIRED_PATTERN).await?;
        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let expired_key: String = match message.get_payload() {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable expiry notification; skipping");
                    continue;
                }
            };
            if !self.filter.accepts(&expired_key) {
                continue;
            }
            let Some(rank_key) = expired_key.strip_prefix(BOARD_KEY_PREFIX) else {
                continue;
            };
            if let Err(err) = self.cascade.handle_expired(rank_key).await {
                tracing::error!(key = %expired_key, error = %err, "expiry cascade failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_accepts_board_keys_only() {
        let filter = default_filter();
        assert!(filter.accepts("ember:board:rust:3"));
        assert!(!filter.accepts("ember:cooldown:actor:9"));
        assert!(!filter.accepts("ember:session:abc"));
        assert!(!filter.accepts("other:board:rust:3"));
    }
}
