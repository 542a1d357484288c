use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::DomainError;
use crate::ports::lock::{DistributedLock, LockError, LockLease};
use crate::DomainResult;

/// Runs `op` while holding the named lock. The lease is released on every
/// exit path; if the release itself fails the lease simply times out.
pub async fn with_lock<T, F, Fut>(
    lock: &dyn DistributedLock,
    name: &str,
    wait: Duration,
    lease: Duration,
    op: F,
) -> DomainResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let lease = lock.acquire(name, wait, lease).await.map_err(|err| match err {
        LockError::Timeout(name) => DomainError::LockUnavailable(name),
        LockError::Unavailable(message) => DomainError::Transient(message),
    })?;

    let result = op().await;

    if let Err(err) = lock.release(&lease).await {
        tracing::warn!(
            lock = %lease.name,
            error = %err,
            "lock release failed; lease will expire on its own"
        );
    }

    result
}

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Default)]
struct Holders {
    by_name: HashMap<String, (String, Instant)>,
}

/// Process-local lock with the same acquire/lease/release contract as the
/// distributed implementation. Used by tests and the memory data backend.
#[derive(Clone, Default)]
pub struct InMemoryDistributedLock {
    inner: Arc<Mutex<Holders>>,
}

impl InMemoryDistributedLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_claim(&self, name: &str, lease: Duration) -> Option<LockLease> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lock table");
        match inner.by_name.get(name) {
            Some((_, deadline)) if *deadline > now => None,
            _ => {
                let token = Uuid::now_v7().to_string();
                inner
                    .by_name
                    .insert(name.to_string(), (token.clone(), now + lease));
                Some(LockLease {
                    name: name.to_string(),
                    token,
                })
            }
        }
    }
}

impl DistributedLock for InMemoryDistributedLock {
    fn acquire(
        &self,
        name: &str,
        wait: Duration,
        lease: Duration,
    ) -> crate::ports::BoxFuture<'_, Result<LockLease, LockError>> {
        let name = name.to_string();
        let this = self.clone();
        Box::pin(async move {
            let deadline = Instant::now() + wait;
            loop {
                if let Some(claimed) = this.try_claim(&name, lease) {
                    return Ok(claimed);
                }
                if Instant::now() >= deadline {
                    return Err(LockError::Timeout(name));
                }
                tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
            }
        })
    }

    fn release(&self, lease: &LockLease) -> crate::ports::BoxFuture<'_, Result<(), LockError>> {
        let lease = lease.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.lock().expect("lock table");
            // Holder-only release: a stale token must not evict a new holder.
            if let Some((token, _)) = inner.by_name.get(&lease.name) {
                if *token == lease.token {
                    inner.by_name.remove(&lease.name);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_lock_releases_on_success_and_error() {
        let lock = InMemoryDistributedLock::new();
        let wait = Duration::from_millis(100);
        let lease = Duration::from_secs(5);

        let ok: DomainResult<u32> = with_lock(&lock, "k", wait, lease, || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: DomainResult<u32> = with_lock(&lock, "k", wait, lease, || async {
            Err(DomainError::NotFound)
        })
        .await;
        assert!(matches!(err, Err(DomainError::NotFound)));

        // Both paths released: a third acquisition succeeds immediately.
        let again: DomainResult<u32> = with_lock(&lock, "k", wait, lease, || async { Ok(1) }).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn contended_lock_times_out_as_lock_unavailable() {
        let lock = InMemoryDistributedLock::new();
        let holder = lock
            .acquire("busy", Duration::from_millis(50), Duration::from_secs(10))
            .await
            .unwrap();

        let blocked: DomainResult<()> = with_lock(
            &lock,
            "busy",
            Duration::from_millis(30),
            Duration::from_secs(10),
            || async { Ok(()) },
        )
        .await;
        assert!(matches!(blocked, Err(DomainError::LockUnavailable(_))));

        lock.release(&holder).await.unwrap();
    }

    #[tokio::test]
    async fn lease_expiry_frees_a_crashed_holder() {
        let lock = InMemoryDistributedLock::new();
        let _abandoned = lock
            .acquire("leased", Duration::from_millis(10), Duration::from_millis(20))
            .await
            .unwrap();

        let reclaimed = lock
            .acquire("leased", Duration::from_millis(200), Duration::from_secs(5))
            .await;
        assert!(reclaimed.is_ok());
    }

    #[tokio::test]
    async fn stale_token_cannot_release_the_new_holder() {
        let lock = InMemoryDistributedLock::new();
        let stale = lock
            .acquire("slot", Duration::from_millis(10), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = lock
            .acquire("slot", Duration::from_millis(100), Duration::from_secs(5))
            .await
            .unwrap();

        lock.release(&stale).await.unwrap();
        // Still held by the fresh lease.
        let blocked = lock
            .acquire("slot", Duration::from_millis(30), Duration::from_secs(5))
            .await;
        assert!(matches!(blocked, Err(LockError::Timeout(_))));

        lock.release(&fresh).await.unwrap();
    }
}
