use std::collections::HashSet;

use ember_domain::error::DomainError;
use ember_domain::ports::engagement::{EngagementStore, ThresholdStore};
use ember_domain::DomainResult;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

pub const LIKES_KEY_PREFIX: &str = "ember:likes:";
pub const VIEWS_KEY_PREFIX: &str = "ember:views:";
pub const THRESHOLDS_KEY_PREFIX: &str = "ember:thresholds:";

const LIKE_SCAN_COUNT: usize = 100;

fn map_redis(err: redis::RedisError) -> DomainError {
    DomainError::Transient(err.to_string())
}

/// Like membership sets and view counters. An absent set key is meaningful
/// (the cache lost the entry), so reads distinguish it from an empty set.
#[derive(Clone)]
pub struct RedisEngagementStore {
    manager: ConnectionManager,
}

impl RedisEngagementStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    fn like_key(board_id: i64, post_id: i64) -> String {
        format!("{LIKES_KEY_PREFIX}{board_id}:{post_id}")
    }

    fn view_key(board_id: i64, post_id: i64) -> String {
        format!("{VIEWS_KEY_PREFIX}{board_id}:{post_id}")
    }

    fn parse_like_key(key: &str) -> Option<(i64, i64)> {
        let rest = key.strip_prefix(LIKES_KEY_PREFIX)?;
        let (board, post) = rest.split_once(':')?;
        Some((board.parse().ok()?, post.parse().ok()?))
    }
}

impl EngagementStore for RedisEngagementStore {
    fn actors(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<Option<HashSet<String>>>> {
        let key = Self::like_key(board_id, post_id);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let exists: bool = conn.exists(&key).await.map_err(map_redis)?;
            if !exists {
                return Ok(None);
            }
            let members: HashSet<String> = conn.smembers(&key).await.map_err(map_redis)?;
            Ok(Some(members))
        })
    }

    fn contains(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<bool>> {
        let key = Self::like_key(board_id, post_id);
        let actor = actor.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let member: bool = conn.sismember(&key, &actor).await.map_err(map_redis)?;
            Ok(member)
        })
    }

    fn add(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<u64>> {
        let key = Self::like_key(board_id, post_id);
        let actor = actor.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let script = redis::Script::new(
                r#"
                    redis.call('SADD', KEYS[1], ARGV[1])
                    return redis.call('SCARD', KEYS[1])
                "#,
            );
            let count: u64 = script
                .key(&key)
                .arg(&actor)
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis)?;
            Ok(count)
        })
    }

    fn remove(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<u64>> {
        let key = Self::like_key(board_id, post_id);
        let actor = actor.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let script = redis::Script::new(
                r#"
                    redis.call('SREM', KEYS[1], ARGV[1])
                    return redis.call('SCARD', KEYS[1])
                "#,
            );
            let count: u64 = script
                .key(&key)
                .arg(&actor)
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis)?;
            Ok(count)
        })
    }

    fn count(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<Option<u64>>> {
        let key = Self::like_key(board_id, post_id);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let script = redis::Script::new(
                r#"
                    if redis.call('EXISTS', KEYS[1]) == 0 then
                        return -1
                    end
                    return redis.call('SCARD', KEYS[1])
                "#,
            );
            let count: i64 = script.key(&key).invoke_async(&mut conn).await.map_err(map_redis)?;
            if count < 0 {
                Ok(None)
            } else {
                Ok(Some(count as u64))
            }
        })
    }

    fn seed(
        &self,
        board_id: i64,
        post_id: i64,
        actors: &[String],
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let key = Self::like_key(board_id, post_id);
        let actors = actors.to_vec();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let mut pipeline = redis::pipe();
            pipeline.atomic();
            pipeline.cmd("DEL").arg(&key);
            if !actors.is_empty() {
                pipeline.cmd("SADD").arg(&key).arg(&actors);
            }
            let _: Vec<redis::Value> =
                pipeline.query_async(&mut conn).await.map_err(map_redis)?;
            Ok(())
        })
    }

    fn like_keys(&self) -> ember_domain::ports::BoxFuture<'_, DomainResult<Vec<(i64, i64)>>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let pattern = format!("{LIKES_KEY_PREFIX}*");
            let mut cursor: u64 = 0;
            let mut pairs = Vec::new();
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(LIKE_SCAN_COUNT)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis)?;
                pairs.extend(keys.iter().filter_map(|key| Self::parse_like_key(key)));
                cursor = next;
                if cursor == 0 {
                    break;
                }
            }
            Ok(pairs)
        })
    }

    fn increment_views(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<u64>> {
        let key = Self::view_key(board_id, post_id);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let count: u64 = conn.incr(&key, 1).await.map_err(map_redis)?;
            Ok(count)
        })
    }
}

/// Threshold markers as one set per board, member `{post_id}:{threshold}`.
/// SADD's return value is the atomic was-it-absent signal; the per-board set
/// makes cleanup on expiry a single DEL.
#[derive(Clone)]
pub struct RedisThresholdStore {
    manager: ConnectionManager,
}

impl RedisThresholdStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    fn board_key(board_id: i64) -> String {
        format!("{THRESHOLDS_KEY_PREFIX}{board_id}")
    }
}

impl ThresholdStore for RedisThresholdStore {
    fn mark_if_absent(
        &self,
        board_id: i64,
        post_id: i64,
        threshold: u64,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<bool>> {
        let key = Self::board_key(board_id);
        let member = format!("{post_id}:{threshold}");
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let added: i64 = conn.sadd(&key, &member).await.map_err(map_redis)?;
            Ok(added == 1)
        })
    }

    fn purge_board(&self, board_id: i64) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let key = Self::board_key(board_id);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = conn.del(&key).await.map_err(map_redis)?;
            Ok(())
        })
    }
}
