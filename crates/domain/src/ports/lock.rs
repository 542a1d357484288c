use std::time::Duration;

use thiserror::Error;

use super::BoxFuture;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock '{0}' not acquired within wait timeout")]
    Timeout(String),
    #[error("lock backend unavailable: {0}")]
    Unavailable(String),
}

/// Proof of acquisition. Release is restricted to the holder carrying the
/// matching token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockLease {
    pub name: String,
    pub token: String,
}

/// Named advisory lock shared by all processes.
///
/// The lease auto-expires after its timeout even if the holder crashes, so
/// guarded operations must be idempotent (liveness over strict safety).
pub trait DistributedLock: Send + Sync {
    /// Blocks up to `wait` for exclusivity, holding it for at most `lease`.
    fn acquire(
        &self,
        name: &str,
        wait: Duration,
        lease: Duration,
    ) -> BoxFuture<'_, Result<LockLease, LockError>>;

    fn release(&self, lease: &LockLease) -> BoxFuture<'_, Result<(), LockError>>;
}
