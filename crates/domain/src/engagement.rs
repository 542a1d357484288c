use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::board::{rank_key, Board};
use crate::events::{fan_out, BoardEvent};
use crate::lock::with_lock;
use crate::ports::engagement::{EngagementStore, ThresholdStore};
use crate::ports::events::EventBus;
use crate::ports::likes::LikeArchive;
use crate::ports::lock::DistributedLock;
use crate::ports::rank::RankStore;
use crate::DomainResult;

/// First engagement milestone, rewarded with the small extension.
pub const SMALL_THRESHOLD: u64 = 50;
/// Every multiple of this step from 100 upward earns the large extension.
pub const LARGE_THRESHOLD_STEP: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdKind {
    Small,
    Large,
}

/// Milestone crossed when the like count lands exactly on `count`.
/// Oscillation below and back across a value is handled by the one-shot
/// marker, not here.
pub fn crossed_threshold(count: u64) -> Option<ThresholdKind> {
    if count == SMALL_THRESHOLD {
        Some(ThresholdKind::Small)
    } else if count > 0 && count % LARGE_THRESHOLD_STEP == 0 {
        Some(ThresholdKind::Large)
    } else {
        None
    }
}

#[derive(Clone, Debug)]
pub struct EngagementConfig {
    pub lock_wait: Duration,
    pub lock_lease: Duration,
    pub small_extension_seconds: i64,
    pub large_extension_seconds: i64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(3),
            lock_lease: Duration::from_secs(5),
            small_extension_seconds: 600,
            large_extension_seconds: 3_600,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub liked: bool,
    pub like_count: u64,
}

/// Engagement state machine: per (actor, board, post) the actor is either
/// LIKED or NOT_LIKED, and toggling flips the state. All toggles for one
/// (board, post) serialize through the distributed mutex so the
/// read-check-then-write sequence cannot lose updates.
#[derive(Clone)]
pub struct EngagementService {
    cache: Arc<dyn EngagementStore>,
    archive: Arc<dyn LikeArchive>,
    thresholds: Arc<dyn ThresholdStore>,
    ranks: Arc<dyn RankStore>,
    lock: Arc<dyn DistributedLock>,
    bus: Arc<dyn EventBus>,
    config: EngagementConfig,
}

impl EngagementService {
    pub fn new(
        cache: Arc<dyn EngagementStore>,
        archive: Arc<dyn LikeArchive>,
        thresholds: Arc<dyn ThresholdStore>,
        ranks: Arc<dyn RankStore>,
        lock: Arc<dyn DistributedLock>,
        bus: Arc<dyn EventBus>,
        config: EngagementConfig,
    ) -> Self {
        Self {
            cache,
            archive,
            thresholds,
            ranks,
            lock,
            bus,
            config,
        }
    }

    pub async fn toggle_like(
        &self,
        board: &Board,
        post_id: i64,
        actor: &str,
    ) -> DomainResult<LikeToggle> {
        let lock_name = format!("like:{}:{post_id}", board.id);
        with_lock(
            self.lock.as_ref(),
            &lock_name,
            self.config.lock_wait,
            self.config.lock_lease,
            || self.toggle_locked(board, post_id, actor),
        )
        .await
    }

    async fn toggle_locked(
        &self,
        board: &Board,
        post_id: i64,
        actor: &str,
    ) -> DomainResult<LikeToggle> {
        if self.cache.actors(board.id, post_id).await?.is_none() {
            let durable = self.archive.actor_names_by_post(board.id, post_id).await?;
            self.cache.seed(board.id, post_id, &durable).await?;
        }

        if self.cache.contains(board.id, post_id, actor).await? {
            let like_count = self.cache.remove(board.id, post_id, actor).await?;
            return Ok(LikeToggle {
                liked: false,
                like_count,
            });
        }

        let like_count = self.cache.add(board.id, post_id, actor).await?;
        if let Some(kind) = crossed_threshold(like_count) {
            self.apply_threshold(board, post_id, like_count, kind).await?;
        }
        Ok(LikeToggle {
            liked: true,
            like_count,
        })
    }

    /// One extension per (board, post, threshold), guarded by the marker's
    /// atomic conditional insert. Decrements never revoke applied time.
    async fn apply_threshold(
        &self,
        board: &Board,
        post_id: i64,
        threshold: u64,
        kind: ThresholdKind,
    ) -> DomainResult<()> {
        if !self
            .thresholds
            .mark_if_absent(board.id, post_id, threshold)
            .await?
        {
            return Ok(());
        }

        let delta = match kind {
            ThresholdKind::Small => self.config.small_extension_seconds,
            ThresholdKind::Large => self.config.large_extension_seconds,
        };
        let key = rank_key(&board.name, board.id);
        let remaining = self.ranks.extend_ttl(&key, delta).await?;
        tracing::info!(
            board_id = board.id,
            post_id,
            threshold,
            extended_by_seconds = delta,
            remaining_seconds = remaining,
            "engagement threshold extended board lifetime"
        );

        let event = BoardEvent::BoardTimeExtended {
            board_id: board.id,
            post_id,
            threshold,
            extended_by_seconds: delta,
        };
        if let Err(err) = fan_out(self.bus.as_ref(), &event).await {
            tracing::warn!(error = %err, "boardTimeExtended fan-out failed");
        }
        Ok(())
    }

    /// Cache-first count; on a miss or a cache failure the durable store
    /// answers and the cache is reseeded best-effort. Never waits for
    /// reconciliation.
    pub async fn like_count(&self, board_id: i64, post_id: i64) -> DomainResult<u64> {
        match self.cache.count(board_id, post_id).await {
            Ok(Some(count)) => return Ok(count),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    board_id,
                    post_id,
                    error = %err,
                    "engagement cache read failed; falling back to durable storage"
                );
            }
        }

        let actors = self.archive.actor_names_by_post(board_id, post_id).await?;
        if let Err(err) = self.cache.seed(board_id, post_id, &actors).await {
            tracing::warn!(board_id, post_id, error = %err, "cache reseed failed");
        }
        Ok(actors.len() as u64)
    }

    pub async fn record_view(&self, board_id: i64, post_id: i64) -> DomainResult<u64> {
        self.cache.increment_views(board_id, post_id).await
    }
}

#[derive(Default)]
struct EngagementInner {
    likes: HashMap<(i64, i64), HashSet<String>>,
    views: HashMap<(i64, i64), u64>,
}

/// In-memory engagement cache for tests and the memory data backend.
#[derive(Clone, Default)]
pub struct InMemoryEngagementStore {
    inner: Arc<RwLock<EngagementInner>>,
}

impl InMemoryEngagementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evicts a membership set, simulating cache loss.
    pub async fn evict(&self, board_id: i64, post_id: i64) {
        self.inner.write().await.likes.remove(&(board_id, post_id));
    }
}

impl EngagementStore for InMemoryEngagementStore {
    fn actors(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<HashSet<String>>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner.read().await.likes.get(&(board_id, post_id)).cloned())
        })
    }

    fn contains(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>> {
        let actor = actor.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .read()
                .await
                .likes
                .get(&(board_id, post_id))
                .is_some_and(|set| set.contains(&actor)))
        })
    }

    fn add(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<u64>> {
        let actor = actor.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.write().await;
            let set = inner.likes.entry((board_id, post_id)).or_default();
            set.insert(actor);
            Ok(set.len() as u64)
        })
    }

    fn remove(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<u64>> {
        let actor = actor.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.write().await;
            let Some(set) = inner.likes.get_mut(&(board_id, post_id)) else {
                return Ok(0);
            };
            set.remove(&actor);
            let remaining = set.len() as u64;
            // An emptied set key is gone, same as the backing store.
            if remaining == 0 {
                inner.likes.remove(&(board_id, post_id));
            }
            Ok(remaining)
        })
    }

    fn count(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<u64>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .read()
                .await
                .likes
                .get(&(board_id, post_id))
                .map(|set| set.len() as u64))
        })
    }

    fn seed(
        &self,
        board_id: i64,
        post_id: i64,
        actors: &[String],
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let actors: HashSet<String> = actors.iter().cloned().collect();
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.likes.insert((board_id, post_id), actors);
            Ok(())
        })
    }

    fn like_keys(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<(i64, i64)>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.likes.keys().copied().collect()) })
    }

    fn increment_views(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.write().await;
            let counter = inner.views.entry((board_id, post_id)).or_insert(0);
            *counter += 1;
            Ok(*counter)
        })
    }
}

/// In-memory one-shot markers.
#[derive(Clone, Default)]
pub struct InMemoryThresholdStore {
    inner: Arc<RwLock<HashSet<(i64, i64, u64)>>>,
}

impl InMemoryThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThresholdStore for InMemoryThresholdStore {
    fn mark_if_absent(
        &self,
        board_id: i64,
        post_id: i64,
        threshold: u64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.write().await.insert((board_id, post_id, threshold))) })
    }

    fn purge_board(&self, board_id: i64) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.retain(|(board, _, _)| *board != board_id);
            Ok(())
        })
    }
}

/// In-memory durable like archive.
#[derive(Clone, Default)]
pub struct InMemoryLikeArchive {
    inner: Arc<RwLock<HashMap<(i64, i64), BTreeSet<String>>>>,
}

impl InMemoryLikeArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LikeArchive for InMemoryLikeArchive {
    fn exists_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>> {
        let actor = actor.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .read()
                .await
                .get(&(board_id, post_id))
                .is_some_and(|set| set.contains(&actor)))
        })
    }

    fn save_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let actor = actor.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            inner
                .write()
                .await
                .entry((board_id, post_id))
                .or_default()
                .insert(actor);
            Ok(())
        })
    }

    fn delete_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let actor = actor.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            if let Some(set) = inner.write().await.get_mut(&(board_id, post_id)) {
                set.remove(&actor);
            }
            Ok(())
        })
    }

    fn actor_names_by_post(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<String>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .read()
                .await
                .get(&(board_id, post_id))
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default())
        })
    }
}
