use std::sync::Arc;
use std::time::Duration;

use crate::board::{rank_key, BoardCategory};
use crate::events::{fan_out, BoardEvent};
use crate::expiry::ExpiryCascade;
use crate::ports::boards::BoardDirectory;
use crate::ports::events::EventBus;
use crate::ports::feed::TrendFeed;
use crate::ports::history::KeywordHistoryStore;
use crate::ports::rank::RankStore;
use crate::rank::{compute_diff, KeywordHistoryEntry};
use crate::DomainResult;

#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub top_n: usize,
    /// Lifetime granted to a freshly provisioned board.
    pub initial_ttl: Duration,
    /// Additive refresh for a board still trending in a later cycle; never
    /// truncates engagement-funded time.
    pub poll_extension_seconds: i64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            initial_ttl: Duration::from_secs(1_800),
            poll_extension_seconds: 15,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollOutcome {
    pub provisioned: usize,
    pub refreshed: usize,
    pub cleaned: usize,
    pub entries: Vec<KeywordHistoryEntry>,
}

/// Scheduled orchestration of one polling cycle: fetch the external
/// ranking, provision boards, write the rank store, and persist the
/// rank-change history. A fetch failure aborts only the current cycle.
#[derive(Clone)]
pub struct KeywordPoller {
    feed: Arc<dyn TrendFeed>,
    boards: Arc<dyn BoardDirectory>,
    ranks: Arc<dyn RankStore>,
    history: Arc<dyn KeywordHistoryStore>,
    bus: Arc<dyn EventBus>,
    cascade: ExpiryCascade,
    config: PollerConfig,
}

impl KeywordPoller {
    pub fn new(
        feed: Arc<dyn TrendFeed>,
        boards: Arc<dyn BoardDirectory>,
        ranks: Arc<dyn RankStore>,
        history: Arc<dyn KeywordHistoryStore>,
        bus: Arc<dyn EventBus>,
        cascade: ExpiryCascade,
        config: PollerConfig,
    ) -> Self {
        Self {
            feed,
            boards,
            ranks,
            history,
            bus,
            cascade,
            config,
        }
    }

    pub async fn run_cycle(&self) -> DomainResult<PollOutcome> {
        let snapshot = self.feed.fetch().await?;

        // Members whose liveness key vanished without a cascade run (missed
        // notification) get the full cascade here, keeping the durable
        // mirror convergent.
        let dead = self.ranks.dead_keys().await?;
        for key in &dead {
            if let Err(err) = self.cascade.handle_expired(key).await {
                tracing::warn!(key = %key, error = %err, "cleanup cascade failed");
            }
        }

        let mut items = snapshot.items;
        items.sort_by_key(|item| item.rank);
        items.truncate(self.config.top_n);

        let mut outcome = PollOutcome {
            cleaned: dead.len(),
            ..PollOutcome::default()
        };
        let mut current = Vec::with_capacity(items.len());
        for item in &items {
            let board = self
                .boards
                .find_or_create(&item.keyword, BoardCategory::Realtime)
                .await?;
            let key = rank_key(&board.name, board.id);
            self.ranks.upsert(&key, f64::from(item.rank)).await?;
            if self.ranks.ensure_ttl(&key, self.config.initial_ttl).await? {
                outcome.provisioned += 1;
            } else {
                self.ranks
                    .extend_ttl(&key, self.config.poll_extension_seconds)
                    .await?;
                outcome.refreshed += 1;
            }
            current.push((item.rank, item.keyword.clone(), board.id));
        }

        let previous = self.history.load().await?;
        outcome.entries = compute_diff(&previous, &current);
        self.history
            .replace(&outcome.entries, self.config.top_n)
            .await?;
        self.history.stamp_refreshed(snapshot.now_ms).await?;

        let event = BoardEvent::KeywordListUpdated {
            refreshed_at_ms: snapshot.now_ms,
        };
        if let Err(err) = fan_out(self.bus.as_ref(), &event).await {
            tracing::warn!(error = %err, "keywordListUpdated fan-out failed");
        }

        tracing::debug!(
            provisioned = outcome.provisioned,
            refreshed = outcome.refreshed,
            cleaned = outcome.cleaned,
            "poll cycle complete"
        );
        Ok(outcome)
    }
}
