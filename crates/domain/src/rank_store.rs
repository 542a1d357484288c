use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::DomainError;
use crate::ports::rank::{BoardPage, RankEntry, RankStore};
use crate::DomainResult;

#[derive(Clone, Debug)]
struct MemoryEntry {
    score: f64,
    /// None until `ensure_ttl` provisions the liveness key.
    expires_at: Option<Instant>,
}

/// In-memory rank store for tests and the memory data backend. Mirrors the
/// production semantics: the leaderboard membership and the TTL-bearing
/// liveness key are tracked separately, so a member can outlive its key and
/// show up in `dead_keys`.
#[derive(Clone, Default)]
pub struct InMemoryRankStore {
    inner: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl InMemoryRankStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the liveness key while keeping the leaderboard member, the
    /// state a native TTL expiry leaves behind.
    pub fn expire_key(&self, key: &str) {
        let mut inner = self.inner.lock().expect("rank store lock");
        if let Some(entry) = inner.get_mut(key) {
            entry.expires_at = None;
        }
    }

    fn remaining_seconds(entry: &MemoryEntry, now: Instant) -> Option<i64> {
        let deadline = entry.expires_at?;
        if deadline <= now {
            return None;
        }
        Some((deadline - now).as_secs() as i64)
    }
}

/// Recency ordering shared with the production store: longer remaining TTL
/// first, ascending score as the tie-break, key as the final stabilizer.
pub fn compare_by_recency(a: &RankEntry, b: &RankEntry) -> Ordering {
    b.ttl_seconds
        .cmp(&a.ttl_seconds)
        .then_with(|| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
        .then_with(|| a.key.cmp(&b.key))
}

/// Paginates an already-collected entry list, sorting by recency.
pub fn paginate_by_recency(mut entries: Vec<RankEntry>, page: u64, size: u64) -> DomainResult<BoardPage> {
    if size == 0 {
        return Err(DomainError::Validation("page size must be positive".into()));
    }
    entries.sort_by(compare_by_recency);
    let total_count = entries.len() as u64;
    let total_pages = total_count.div_ceil(size);
    let start = page.saturating_mul(size) as usize;
    let entries = if start >= entries.len() {
        Vec::new()
    } else {
        let end = (start + size as usize).min(entries.len());
        entries[start..end].to_vec()
    };
    Ok(BoardPage {
        total_count,
        total_pages,
        entries,
    })
}

impl RankStore for InMemoryRankStore {
    fn upsert(&self, key: &str, score: f64) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let key = key.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.lock().expect("rank store lock");
            inner
                .entry(key)
                .and_modify(|entry| entry.score = score)
                .or_insert(MemoryEntry {
                    score,
                    expires_at: None,
                });
            Ok(())
        })
    }

    fn ensure_ttl(
        &self,
        key: &str,
        initial: Duration,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>> {
        let key = key.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let now = Instant::now();
            let mut inner = inner.lock().expect("rank store lock");
            let entry = inner.entry(key).or_insert(MemoryEntry {
                score: 0.0,
                expires_at: None,
            });
            match entry.expires_at {
                Some(deadline) if deadline > now => Ok(false),
                _ => {
                    entry.expires_at = Some(now + initial);
                    Ok(true)
                }
            }
        })
    }

    fn extend_ttl(
        &self,
        key: &str,
        delta_seconds: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<i64>> {
        let key = key.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let now = Instant::now();
            let mut inner = inner.lock().expect("rank store lock");
            let entry = inner.entry(key).or_insert(MemoryEntry {
                score: 0.0,
                expires_at: None,
            });
            let remaining = Self::remaining_seconds(entry, now).unwrap_or(0);
            let next = (remaining + delta_seconds).max(0);
            entry.expires_at = if next > 0 {
                Some(now + Duration::from_secs(next as u64))
            } else {
                // Clamped to zero: leave the key on the edge of expiry.
                Some(now + Duration::from_millis(1))
            };
            Ok(next)
        })
    }

    fn remove(&self, key: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let key = key.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.lock().expect("rank store lock").remove(&key);
            Ok(())
        })
    }

    fn page_by_recency(
        &self,
        page: u64,
        size: u64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<BoardPage>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let now = Instant::now();
            let entries: Vec<RankEntry> = {
                let inner = inner.lock().expect("rank store lock");
                inner
                    .iter()
                    .filter_map(|(key, entry)| {
                        let ttl_seconds = Self::remaining_seconds(entry, now)?;
                        Some(RankEntry {
                            key: key.clone(),
                            score: entry.score,
                            ttl_seconds,
                        })
                    })
                    .collect()
            };
            paginate_by_recency(entries, page, size)
        })
    }

    fn dead_keys(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<String>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let now = Instant::now();
            let inner = inner.lock().expect("rank store lock");
            Ok(inner
                .iter()
                .filter(|(_, entry)| match entry.expires_at {
                    Some(deadline) => deadline <= now,
                    None => true,
                })
                .map(|(key, _)| key.clone())
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn longer_ttl_sorts_first_regardless_of_score() {
        let store = InMemoryRankStore::new();
        store.upsert("fresh:1", 9.0).await.unwrap();
        store.ensure_ttl("fresh:1", Duration::from_secs(600)).await.unwrap();
        store.upsert("stale:2", 1.0).await.unwrap();
        store.ensure_ttl("stale:2", Duration::from_secs(60)).await.unwrap();

        let page = store.page_by_recency(0, 10).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.entries[0].key, "fresh:1");
        assert_eq!(page.entries[1].key, "stale:2");
    }

    #[tokio::test]
    async fn equal_ttl_breaks_ties_by_ascending_score() {
        let entries = vec![
            RankEntry { key: "b:2".into(), score: 5.0, ttl_seconds: 100 },
            RankEntry { key: "a:1".into(), score: 2.0, ttl_seconds: 100 },
        ];
        let page = paginate_by_recency(entries, 0, 10).unwrap();
        assert_eq!(page.entries[0].key, "a:1");
        assert_eq!(page.entries[1].key, "b:2");
    }

    #[tokio::test]
    async fn pagination_reports_totals_and_slices() {
        let entries: Vec<RankEntry> = (0..5)
            .map(|i| RankEntry {
                key: format!("k:{i}"),
                score: i as f64,
                ttl_seconds: 1000 - i,
            })
            .collect();
        let page = paginate_by_recency(entries.clone(), 1, 2).unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].key, "k:2");

        let beyond = paginate_by_recency(entries, 9, 2).unwrap();
        assert!(beyond.entries.is_empty());
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let store = InMemoryRankStore::new();
        assert!(matches!(
            store.page_by_recency(0, 0).await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn extend_is_additive_and_clamped() {
        let store = InMemoryRankStore::new();
        store.ensure_ttl("b:1", Duration::from_secs(100)).await.unwrap();

        let extended = store.extend_ttl("b:1", 50).await.unwrap();
        assert!((145..=150).contains(&extended));

        let clamped = store.extend_ttl("b:1", -10_000).await.unwrap();
        assert_eq!(clamped, 0);
    }

    #[tokio::test]
    async fn ensure_ttl_does_not_reset_a_live_key() {
        let store = InMemoryRankStore::new();
        assert!(store.ensure_ttl("b:1", Duration::from_secs(100)).await.unwrap());
        store.extend_ttl("b:1", 500).await.unwrap();
        assert!(!store.ensure_ttl("b:1", Duration::from_secs(100)).await.unwrap());

        let page = store.page_by_recency(0, 10).await.unwrap();
        assert!(page.entries[0].ttl_seconds > 100);
    }

    #[tokio::test]
    async fn expired_members_surface_as_dead_keys() {
        let store = InMemoryRankStore::new();
        store.upsert("gone:1", 1.0).await.unwrap();
        store.ensure_ttl("gone:1", Duration::from_secs(600)).await.unwrap();
        store.expire_key("gone:1");

        assert_eq!(store.dead_keys().await.unwrap(), vec!["gone:1".to_string()]);
        let page = store.page_by_recency(0, 10).await.unwrap();
        assert_eq!(page.total_count, 0);
    }
}
