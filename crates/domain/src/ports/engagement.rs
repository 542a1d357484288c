use std::collections::HashSet;

use crate::DomainResult;

use super::BoxFuture;

/// Fast membership/counter cache for likes and views.
///
/// The membership set is the source of truth while it exists; an absent key
/// (`None` from `actors`/`count`) means the cache lost the entry and a
/// read-through reseed from durable storage is required.
pub trait EngagementStore: Send + Sync {
    /// Full actor set, or `None` when the key is absent (distinct from an
    /// existing empty set).
    fn actors(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> BoxFuture<'_, DomainResult<Option<HashSet<String>>>>;

    fn contains(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> BoxFuture<'_, DomainResult<bool>>;

    /// Adds the actor and returns the resulting member count.
    fn add(&self, board_id: i64, post_id: i64, actor: &str) -> BoxFuture<'_, DomainResult<u64>>;

    /// Removes the actor and returns the resulting member count.
    fn remove(&self, board_id: i64, post_id: i64, actor: &str)
        -> BoxFuture<'_, DomainResult<u64>>;

    /// Member count, or `None` when the key is absent.
    fn count(&self, board_id: i64, post_id: i64) -> BoxFuture<'_, DomainResult<Option<u64>>>;

    /// Replaces the cached set with the given actors (read-through repair).
    fn seed(
        &self,
        board_id: i64,
        post_id: i64,
        actors: &[String],
    ) -> BoxFuture<'_, DomainResult<()>>;

    /// Every (board, post) pair currently holding a membership set.
    fn like_keys(&self) -> BoxFuture<'_, DomainResult<Vec<(i64, i64)>>>;

    /// Unguarded monotonic increment; approximate counting is acceptable.
    fn increment_views(&self, board_id: i64, post_id: i64) -> BoxFuture<'_, DomainResult<u64>>;
}

/// One-shot markers preventing double-crediting of engagement milestones.
pub trait ThresholdStore: Send + Sync {
    /// Atomic conditional insert of the (board, post, threshold) marker.
    /// Returns true iff the marker was absent and is now set.
    fn mark_if_absent(
        &self,
        board_id: i64,
        post_id: i64,
        threshold: u64,
    ) -> BoxFuture<'_, DomainResult<bool>>;

    /// Drops every marker for the board so re-provisioning starts clean.
    fn purge_board(&self, board_id: i64) -> BoxFuture<'_, DomainResult<()>>;
}
