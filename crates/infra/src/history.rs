use ember_domain::error::DomainError;
use ember_domain::ports::history::KeywordHistoryStore;
use ember_domain::rank::KeywordHistoryEntry;
use ember_domain::DomainResult;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

pub const HISTORY_KEY: &str = "ember:keyword:history";
pub const REFRESHED_AT_KEY: &str = "ember:keyword:refreshed_at";

fn map_redis(err: redis::RedisError) -> DomainError {
    DomainError::Transient(err.to_string())
}

/// Keyword history as a Redis list of encoded entries, replaced wholesale
/// each poll cycle. Entries that fail to decode are dropped on load rather
/// than poisoning the diff.
#[derive(Clone)]
pub struct RedisKeywordHistoryStore {
    manager: ConnectionManager,
}

impl RedisKeywordHistoryStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

impl KeywordHistoryStore for RedisKeywordHistoryStore {
    fn load(&self) -> ember_domain::ports::BoxFuture<'_, DomainResult<Vec<KeywordHistoryEntry>>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let raw: Vec<String> = conn
                .lrange(HISTORY_KEY, 0, -1)
                .await
                .map_err(map_redis)?;
            let mut entries = Vec::with_capacity(raw.len());
            for encoded in raw {
                match KeywordHistoryEntry::decode(&encoded) {
                    Some(entry) => entries.push(entry),
                    None => {
                        tracing::warn!(encoded = %encoded, "dropping undecodable history entry");
                    }
                }
            }
            Ok(entries)
        })
    }

    fn replace(
        &self,
        entries: &[KeywordHistoryEntry],
        cap: usize,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let encoded: Vec<String> = entries.iter().map(KeywordHistoryEntry::encode).collect();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let mut pipeline = redis::pipe();
            pipeline.atomic();
            pipeline.cmd("DEL").arg(HISTORY_KEY);
            if !encoded.is_empty() {
                pipeline.cmd("RPUSH").arg(HISTORY_KEY).arg(&encoded);
                pipeline
                    .cmd("LTRIM")
                    .arg(HISTORY_KEY)
                    .arg(0)
                    .arg(cap.saturating_sub(1) as i64);
            }
            let _: Vec<redis::Value> =
                pipeline.query_async(&mut conn).await.map_err(map_redis)?;
            Ok(())
        })
    }

    fn stamp_refreshed(&self, epoch_ms: i64) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: () = conn
                .set(REFRESHED_AT_KEY, epoch_ms)
                .await
                .map_err(map_redis)?;
            Ok(())
        })
    }

    fn last_refreshed_ms(&self) -> ember_domain::ports::BoxFuture<'_, DomainResult<Option<i64>>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let value: Option<i64> = conn.get(REFRESHED_AT_KEY).await.map_err(map_redis)?;
            Ok(value)
        })
    }
}
