use std::time::Duration;

use ember_domain::error::DomainError;
use ember_domain::ports::rank::{BoardPage, RankEntry, RankStore};
use ember_domain::rank_store::paginate_by_recency;
use ember_domain::DomainResult;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

pub const RANKS_KEY: &str = "ember:ranks";
pub const BOARD_KEY_PREFIX: &str = "ember:board:";

fn map_redis(err: redis::RedisError) -> DomainError {
    DomainError::Transient(err.to_string())
}

/// Leaderboard zset paired with one TTL-bearing liveness key per member.
/// The zset carries the score; the liveness key carries the lifetime, since
/// zset members cannot expire individually.
#[derive(Clone)]
pub struct RedisRankStore {
    manager: ConnectionManager,
    ranks_key: String,
    board_prefix: String,
}

impl RedisRankStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            ranks_key: RANKS_KEY.to_string(),
            board_prefix: BOARD_KEY_PREFIX.to_string(),
        }
    }

    fn liveness_key(&self, key: &str) -> String {
        format!("{}{key}", self.board_prefix)
    }
}

impl RankStore for RedisRankStore {
    fn upsert(
        &self,
        key: &str,
        score: f64,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let ranks_key = self.ranks_key.clone();
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = conn
                .zadd(&ranks_key, &key, score)
                .await
                .map_err(map_redis)?;
            Ok(())
        })
    }

    fn ensure_ttl(
        &self,
        key: &str,
        initial: Duration,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<bool>> {
        let liveness_key = self.liveness_key(key);
        let ttl_ms = initial.as_millis().max(1) as u64;
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let result: Option<String> = redis::cmd("SET")
                .arg(&liveness_key)
                .arg(1)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(map_redis)?;
            Ok(result.is_some())
        })
    }

    fn extend_ttl(
        &self,
        key: &str,
        delta_seconds: i64,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<i64>> {
        let liveness_key = self.liveness_key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            // A clamped-to-zero result keeps the key alive for 1ms so the
            // native expiry notification still fires.
            let script = redis::Script::new(
                r#"
                    local pttl = redis.call('PTTL', KEYS[1])
                    if pttl < 0 then
                        pttl = 0
                    end
                    local next_ms = pttl + tonumber(ARGV[1]) * 1000
                    if next_ms <= 0 then
                        redis.call('SET', KEYS[1], '1', 'PX', 1)
                        return 0
                    end
                    redis.call('SET', KEYS[1], '1', 'PX', next_ms)
                    return math.floor(next_ms / 1000)
                "#,
            );
            let remaining: i64 = script
                .key(&liveness_key)
                .arg(delta_seconds)
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis)?;
            Ok(remaining)
        })
    }

    fn remove(&self, key: &str) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let ranks_key = self.ranks_key.clone();
        let liveness_key = self.liveness_key(key);
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let mut pipeline = redis::pipe();
            pipeline.atomic();
            pipeline.cmd("ZREM").arg(&ranks_key).arg(&key);
            pipeline.cmd("DEL").arg(&liveness_key);
            let _: Vec<redis::Value> =
                pipeline.query_async(&mut conn).await.map_err(map_redis)?;
            Ok(())
        })
    }

    fn page_by_recency(
        &self,
        page: u64,
        size: u64,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<BoardPage>> {
        let ranks_key = self.ranks_key.clone();
        let board_prefix = self.board_prefix.clone();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
                .arg(&ranks_key)
                .arg(0)
                .arg(-1)
                .arg("WITHSCORES")
                .query_async(&mut conn)
                .await
                .map_err(map_redis)?;

            let mut entries = Vec::with_capacity(members.len());
            for (key, score) in members {
                let pttl: i64 = conn
                    .pttl(format!("{board_prefix}{key}"))
                    .await
                    .map_err(map_redis)?;
                if pttl <= 0 {
                    continue;
                }
                entries.push(RankEntry {
                    key,
                    score,
                    ttl_seconds: pttl / 1000,
                });
            }
            paginate_by_recency(entries, page, size)
        })
    }

    fn dead_keys(&self) -> ember_domain::ports::BoxFuture<'_, DomainResult<Vec<String>>> {
        let ranks_key = self.ranks_key.clone();
        let board_prefix = self.board_prefix.clone();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let members: Vec<String> = redis::cmd("ZRANGE")
                .arg(&ranks_key)
                .arg(0)
                .arg(-1)
                .query_async(&mut conn)
                .await
                .map_err(map_redis)?;

            let mut dead = Vec::new();
            for key in members {
                let exists: bool = conn
                    .exists(format!("{board_prefix}{key}"))
                    .await
                    .map_err(map_redis)?;
                if !exists {
                    dead.push(key);
                }
            }
            Ok(dead)
        })
    }
}
