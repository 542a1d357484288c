use std::time::Duration;

use ember_domain::ports::lock::{DistributedLock, LockError, LockLease};
use redis::aio::ConnectionManager;
use tokio::time::Instant;
use uuid::Uuid;

pub const LOCK_KEY_PREFIX: &str = "ember:lock:";

const ACQUIRE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// SET NX PX advisory lock. The lease auto-expires if the holder dies, and
/// release only deletes the key when the stored token still matches.
#[derive(Clone)]
pub struct RedisDistributedLock {
    manager: ConnectionManager,
}

impl RedisDistributedLock {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    fn lock_key(name: &str) -> String {
        format!("{LOCK_KEY_PREFIX}{name}")
    }
}

impl DistributedLock for RedisDistributedLock {
    fn acquire(
        &self,
        name: &str,
        wait: Duration,
        lease: Duration,
    ) -> ember_domain::ports::BoxFuture<'_, Result<LockLease, LockError>> {
        let name = name.to_string();
        let key = Self::lock_key(&name);
        let lease_ms = lease.as_millis().max(1) as u64;
        Box::pin(async move {
            let token = Uuid::now_v7().to_string();
            let deadline = Instant::now() + wait;
            loop {
                let mut conn = self.manager.clone();
                let claimed: Option<String> = redis::cmd("SET")
                    .arg(&key)
                    .arg(&token)
                    .arg("NX")
                    .arg("PX")
                    .arg(lease_ms)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| LockError::Unavailable(err.to_string()))?;
                if claimed.is_some() {
                    return Ok(LockLease { name, token });
                }
                if Instant::now() + ACQUIRE_RETRY_DELAY > deadline {
                    return Err(LockError::Timeout(name));
                }
                tokio::time::sleep(ACQUIRE_RETRY_DELAY).await;
            }
        })
    }

    fn release(
        &self,
        lease: &LockLease,
    ) -> ember_domain::ports::BoxFuture<'_, Result<(), LockError>> {
        let key = Self::lock_key(&lease.name);
        let token = lease.token.clone();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let script = redis::Script::new(
                r#"
                    if redis.call('GET', KEYS[1]) == ARGV[1] then
                        return redis.call('DEL', KEYS[1])
                    end
                    return 0
                "#,
            );
            let _: i64 = script
                .key(&key)
                .arg(&token)
                .invoke_async(&mut conn)
                .await
                .map_err(|err| LockError::Unavailable(err.to_string()))?;
            Ok(())
        })
    }
}
