use std::time::Duration;

use crate::DomainResult;

use super::BoxFuture;

/// One live board on the leaderboard. `ttl_seconds` is the remaining
/// lifetime of the board's liveness key at read time.
#[derive(Clone, Debug, PartialEq)]
pub struct RankEntry {
    pub key: String,
    pub score: f64,
    pub ttl_seconds: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoardPage {
    pub total_count: u64,
    pub total_pages: u64,
    pub entries: Vec<RankEntry>,
}

/// Sorted leaderboard plus one TTL-bearing liveness key per board.
///
/// Presence of a liveness key is the authoritative signal that a board is
/// alive; the durable active flag only mirrors it, lagging behind.
/// Backing-store unavailability surfaces as `DomainError::Transient` and is
/// never retried here.
pub trait RankStore: Send + Sync {
    /// Idempotent insert/update of the leaderboard score.
    fn upsert(&self, key: &str, score: f64) -> BoxFuture<'_, DomainResult<()>>;

    /// Creates the liveness key with `initial` lifetime iff it does not
    /// already exist. Returns true when the key was created.
    fn ensure_ttl(&self, key: &str, initial: Duration) -> BoxFuture<'_, DomainResult<bool>>;

    /// Additive TTL adjustment, clamped at >= 0. Never resets an existing
    /// lifetime downward on its own. Returns the new remaining seconds.
    fn extend_ttl(&self, key: &str, delta_seconds: i64) -> BoxFuture<'_, DomainResult<i64>>;

    fn remove(&self, key: &str) -> BoxFuture<'_, DomainResult<()>>;

    /// Boards ordered by descending remaining TTL, score ascending as the
    /// tie-break. `page` is zero-indexed.
    fn page_by_recency(&self, page: u64, size: u64) -> BoxFuture<'_, DomainResult<BoardPage>>;

    /// Leaderboard members whose liveness key has already vanished.
    fn dead_keys(&self) -> BoxFuture<'_, DomainResult<Vec<String>>>;
}
