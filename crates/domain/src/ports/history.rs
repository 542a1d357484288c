use crate::rank::KeywordHistoryEntry;
use crate::DomainResult;

use super::BoxFuture;

/// Bounded ordered top-N keyword history, fully replaced each poll cycle.
pub trait KeywordHistoryStore: Send + Sync {
    fn load(&self) -> BoxFuture<'_, DomainResult<Vec<KeywordHistoryEntry>>>;

    /// Replaces the stored history with `entries`, trimmed to `cap`.
    fn replace(
        &self,
        entries: &[KeywordHistoryEntry],
        cap: usize,
    ) -> BoxFuture<'_, DomainResult<()>>;

    fn stamp_refreshed(&self, epoch_ms: i64) -> BoxFuture<'_, DomainResult<()>>;

    fn last_refreshed_ms(&self) -> BoxFuture<'_, DomainResult<Option<i64>>>;
}
