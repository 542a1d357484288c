use std::sync::Arc;

use crate::board::parse_rank_key;
use crate::events::{fan_out, BoardEvent};
use crate::ports::boards::BoardDirectory;
use crate::ports::engagement::ThresholdStore;
use crate::ports::events::EventBus;
use crate::ports::rank::RankStore;
use crate::DomainResult;

/// Allow/deny prefix filter applied to native expiration notifications, so
/// reserved keys (cooldowns, sessions) never trigger the cascade.
#[derive(Clone, Debug)]
pub struct ExpiryFilter {
    allowed_prefixes: Vec<String>,
    denied_prefixes: Vec<String>,
}

impl ExpiryFilter {
    pub fn new(allowed_prefixes: Vec<String>, denied_prefixes: Vec<String>) -> Self {
        Self {
            allowed_prefixes,
            denied_prefixes,
        }
    }

    pub fn accepts(&self, key: &str) -> bool {
        if self
            .denied_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix))
        {
            return false;
        }
        self.allowed_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix))
    }
}

/// Reacts to a board liveness key expiring: freeze dependent content, flip
/// the durable mirror, clean the rank store, purge threshold markers, and
/// broadcast exactly one boardExpired event.
///
/// Each step is fire-and-forget relative to the others; a failed freeze is
/// logged and never blocks cleanup or the event. Whatever slips through is
/// corrected by the next poll cycle.
#[derive(Clone)]
pub struct ExpiryCascade {
    boards: Arc<dyn BoardDirectory>,
    ranks: Arc<dyn RankStore>,
    thresholds: Arc<dyn ThresholdStore>,
    bus: Arc<dyn EventBus>,
}

impl ExpiryCascade {
    pub fn new(
        boards: Arc<dyn BoardDirectory>,
        ranks: Arc<dyn RankStore>,
        thresholds: Arc<dyn ThresholdStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            boards,
            ranks,
            thresholds,
            bus,
        }
    }

    /// `rank_key` is the `{name}:{id}` member whose liveness key expired.
    pub async fn handle_expired(&self, rank_key: &str) -> DomainResult<()> {
        let Some((name, board_id)) = parse_rank_key(rank_key) else {
            tracing::warn!(key = rank_key, "ignoring unparseable expired board key");
            return Ok(());
        };
        tracing::info!(board_id, name = %name, "board lifetime expired; cascading");

        if let Err(err) = self.boards.freeze_content(board_id).await {
            tracing::warn!(board_id, error = %err, "content freeze failed; continuing");
        }
        if let Err(err) = self.boards.mark_deleted(board_id, true).await {
            tracing::warn!(
                board_id,
                error = %err,
                "durable deactivation failed; next poll cycle converges"
            );
        }
        if let Err(err) = self.ranks.remove(rank_key).await {
            tracing::warn!(board_id, error = %err, "rank entry removal failed");
        }
        if let Err(err) = self.thresholds.purge_board(board_id).await {
            tracing::warn!(board_id, error = %err, "threshold marker purge failed");
        }

        let event = BoardEvent::BoardExpired { board_id, name };
        if let Err(err) = fan_out(self.bus.as_ref(), &event).await {
            tracing::warn!(board_id, error = %err, "boardExpired fan-out failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardCategory, InMemoryBoardDirectory};
    use crate::engagement::InMemoryThresholdStore;
    use crate::events::LocalEventBus;
    use crate::ports::engagement::ThresholdStore as _;
    use crate::rank_store::InMemoryRankStore;
    use std::time::Duration;

    struct Fixture {
        cascade: ExpiryCascade,
        directory: InMemoryBoardDirectory,
        ranks: InMemoryRankStore,
        thresholds: InMemoryThresholdStore,
        bus: LocalEventBus,
    }

    fn fixture() -> Fixture {
        let directory = InMemoryBoardDirectory::new();
        let ranks = InMemoryRankStore::new();
        let thresholds = InMemoryThresholdStore::new();
        let bus = LocalEventBus::new();
        let cascade = ExpiryCascade::new(
            Arc::new(directory.clone()),
            Arc::new(ranks.clone()),
            Arc::new(thresholds.clone()),
            Arc::new(bus.clone()),
        );
        Fixture {
            cascade,
            directory,
            ranks,
            thresholds,
            bus,
        }
    }

    #[test]
    fn filter_denies_reserved_prefixes() {
        let filter = ExpiryFilter::new(
            vec!["ember:board:".to_string()],
            vec!["ember:cooldown:".to_string(), "ember:session:".to_string()],
        );
        assert!(filter.accepts("ember:board:rust:1"));
        assert!(!filter.accepts("ember:cooldown:user-1"));
        assert!(!filter.accepts("ember:session:abc"));
        assert!(!filter.accepts("other:key"));
    }

    #[tokio::test]
    async fn cascade_cleans_up_and_emits_one_event() {
        let fx = fixture();
        let board = fx
            .directory
            .find_or_create("rust", BoardCategory::Realtime)
            .await
            .unwrap();
        let key = crate::board::rank_key(&board.name, board.id);
        fx.ranks.upsert(&key, 1.0).await.unwrap();
        fx.ranks
            .ensure_ttl(&key, Duration::from_secs(60))
            .await
            .unwrap();
        fx.thresholds
            .mark_if_absent(board.id, 10, 50)
            .await
            .unwrap();
        fx.bus.register_connection("conn-1").await.unwrap();
        let mut receiver = fx.bus.subscribe();

        fx.cascade.handle_expired(&key).await.unwrap();

        // Rank entry gone from the leaderboard.
        assert_eq!(fx.ranks.page_by_recency(0, 10).await.unwrap().total_count, 0);
        assert!(fx.ranks.dead_keys().await.unwrap().is_empty());
        // Marker purged so re-provisioning starts clean.
        assert!(fx.thresholds.mark_if_absent(board.id, 10, 50).await.unwrap());
        // Durable mirror deactivated, content frozen.
        let stored = fx.directory.find_by_id(board.id).await.unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(fx.directory.frozen_boards().await, vec![board.id]);

        // Exactly one boardExpired envelope for the one known connection.
        let envelope = receiver.recv().await.unwrap();
        assert!(matches!(envelope.event, BoardEvent::BoardExpired { board_id, .. } if board_id == board.id));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_freeze_still_cleans_and_emits() {
        let fx = fixture();
        // Board unknown to the directory: freeze and deactivate both fail.
        fx.ranks.upsert("ghost:42", 3.0).await.unwrap();
        fx.ranks
            .ensure_ttl("ghost:42", Duration::from_secs(60))
            .await
            .unwrap();
        fx.bus.register_connection("conn-1").await.unwrap();
        let mut receiver = fx.bus.subscribe();

        fx.cascade.handle_expired("ghost:42").await.unwrap();

        assert_eq!(fx.ranks.page_by_recency(0, 10).await.unwrap().total_count, 0);
        let envelope = receiver.recv().await.unwrap();
        assert_eq!(envelope.event.kind(), "boardExpired");
    }

    #[tokio::test]
    async fn unparseable_key_is_ignored() {
        let fx = fixture();
        fx.bus.register_connection("conn-1").await.unwrap();
        let mut receiver = fx.bus.subscribe();
        fx.cascade.handle_expired("garbage").await.unwrap();
        assert!(receiver.try_recv().is_err());
    }
}
