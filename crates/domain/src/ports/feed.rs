use crate::DomainResult;

use super::BoxFuture;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    /// One-indexed leaderboard position as delivered by the upstream feed.
    pub rank: u32,
    pub keyword: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub now_ms: i64,
    pub items: Vec<FeedItem>,
}

/// External trending-keyword ranking. A fetch failure aborts only the
/// current poll cycle.
pub trait TrendFeed: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, DomainResult<FeedSnapshot>>;
}
