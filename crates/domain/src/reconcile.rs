use std::collections::HashSet;
use std::sync::Arc;

use crate::ports::engagement::EngagementStore;
use crate::ports::likes::LikeArchive;
use crate::DomainResult;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub keys: usize,
    pub saved: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Periodic write-back of the engagement cache into durable storage.
///
/// The cache wins at reconciliation time: cache-only actors are inserted
/// durably, durable-only actors are deleted. Cache entries are never drained
/// here; one key's failure never aborts the rest of the batch.
#[derive(Clone)]
pub struct Reconciler {
    cache: Arc<dyn EngagementStore>,
    archive: Arc<dyn LikeArchive>,
}

impl Reconciler {
    pub fn new(cache: Arc<dyn EngagementStore>, archive: Arc<dyn LikeArchive>) -> Self {
        Self { cache, archive }
    }

    pub async fn run_once(&self) -> DomainResult<ReconcileReport> {
        let keys = self.cache.like_keys().await?;
        let mut report = ReconcileReport {
            keys: keys.len(),
            ..ReconcileReport::default()
        };

        for (board_id, post_id) in keys {
            match self.sync_key(board_id, post_id).await {
                Ok((saved, deleted)) => {
                    report.saved += saved;
                    report.deleted += deleted;
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        board_id,
                        post_id,
                        error = %err,
                        "reconciliation failed for key; continuing with batch"
                    );
                }
            }
        }

        tracing::debug!(
            keys = report.keys,
            saved = report.saved,
            deleted = report.deleted,
            failed = report.failed,
            "reconciliation pass complete"
        );
        Ok(report)
    }

    async fn sync_key(&self, board_id: i64, post_id: i64) -> DomainResult<(usize, usize)> {
        let Some(cached) = self.cache.actors(board_id, post_id).await? else {
            return Ok((0, 0));
        };
        let durable: HashSet<String> = self
            .archive
            .actor_names_by_post(board_id, post_id)
            .await?
            .into_iter()
            .collect();

        let mut saved = 0usize;
        for actor in cached.difference(&durable) {
            self.archive.save_like(board_id, post_id, actor).await?;
            saved += 1;
        }
        let mut deleted = 0usize;
        for actor in durable.difference(&cached) {
            self.archive.delete_like(board_id, post_id, actor).await?;
            deleted += 1;
        }
        Ok((saved, deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::{InMemoryEngagementStore, InMemoryLikeArchive};
    use crate::error::DomainError;
    use crate::ports::BoxFuture;

    #[tokio::test]
    async fn durable_set_matches_cache_after_sync() {
        let cache = InMemoryEngagementStore::new();
        let archive = InMemoryLikeArchive::new();

        cache.add(1, 10, "alice").await.unwrap();
        cache.add(1, 10, "bob").await.unwrap();
        // Stale durable row the cache no longer holds.
        archive.save_like(1, 10, "carol").await.unwrap();
        archive.save_like(1, 10, "alice").await.unwrap();

        let reconciler = Reconciler::new(Arc::new(cache.clone()), Arc::new(archive.clone()));
        let report = reconciler.run_once().await.unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);

        let mut durable = archive.actor_names_by_post(1, 10).await.unwrap();
        durable.sort();
        assert_eq!(durable, vec!["alice".to_string(), "bob".to_string()]);

        // Cache left intact, never drained.
        assert_eq!(cache.count(1, 10).await.unwrap(), Some(2));
    }

    struct FlakyArchive {
        inner: InMemoryLikeArchive,
        poisoned_board: i64,
    }

    impl LikeArchive for FlakyArchive {
        fn exists_like(
            &self,
            board_id: i64,
            post_id: i64,
            actor: &str,
        ) -> BoxFuture<'_, DomainResult<bool>> {
            self.inner.exists_like(board_id, post_id, actor)
        }

        fn save_like(
            &self,
            board_id: i64,
            post_id: i64,
            actor: &str,
        ) -> BoxFuture<'_, DomainResult<()>> {
            if board_id == self.poisoned_board {
                return Box::pin(async { Err(DomainError::Transient("archive down".into())) });
            }
            self.inner.save_like(board_id, post_id, actor)
        }

        fn delete_like(
            &self,
            board_id: i64,
            post_id: i64,
            actor: &str,
        ) -> BoxFuture<'_, DomainResult<()>> {
            self.inner.delete_like(board_id, post_id, actor)
        }

        fn actor_names_by_post(
            &self,
            board_id: i64,
            post_id: i64,
        ) -> BoxFuture<'_, DomainResult<Vec<String>>> {
            self.inner.actor_names_by_post(board_id, post_id)
        }
    }

    #[tokio::test]
    async fn one_failing_key_does_not_abort_the_batch() {
        let cache = InMemoryEngagementStore::new();
        cache.add(1, 10, "alice").await.unwrap();
        cache.add(2, 20, "bob").await.unwrap();

        let archive = FlakyArchive {
            inner: InMemoryLikeArchive::new(),
            poisoned_board: 1,
        };
        let inner = archive.inner.clone();
        let reconciler = Reconciler::new(Arc::new(cache), Arc::new(archive));

        let report = reconciler.run_once().await.unwrap();
        assert_eq!(report.keys, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.saved, 1);
        assert_eq!(
            inner.actor_names_by_post(2, 20).await.unwrap(),
            vec!["bob".to_string()]
        );
    }
}
