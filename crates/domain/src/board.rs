use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DomainError;
use crate::ports::boards::BoardDirectory;
use crate::DomainResult;

pub const RANK_KEY_DELIMITER: char = ':';

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BoardCategory {
    /// Permanent curated board; exempt from TTL-driven expiry.
    Fixed,
    /// Ephemeral board provisioned around a trending keyword. Deactivated on
    /// expiry, never hard-deleted.
    Realtime,
}

impl BoardCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            BoardCategory::Fixed => "fixed",
            BoardCategory::Realtime => "realtime",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fixed" => Some(BoardCategory::Fixed),
            "realtime" => Some(BoardCategory::Realtime),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Board {
    pub id: i64,
    pub name: String,
    pub category: BoardCategory,
    pub active: bool,
}

/// Leaderboard member key: `{name}:{id}`.
pub fn rank_key(name: &str, id: i64) -> String {
    format!("{name}{RANK_KEY_DELIMITER}{id}")
}

/// Splits a rank key back into (name, id). The board id is the final
/// segment, so keyword names containing the delimiter stay intact.
pub fn parse_rank_key(key: &str) -> Option<(String, i64)> {
    let (name, id) = key.rsplit_once(RANK_KEY_DELIMITER)?;
    if name.is_empty() {
        return None;
    }
    let id = id.parse::<i64>().ok()?;
    Some((name.to_string(), id))
}

#[derive(Default)]
struct DirectoryInner {
    by_id: HashMap<i64, Board>,
    frozen: Vec<i64>,
    next_id: i64,
}

/// In-memory board directory for tests and the memory data backend.
#[derive(Clone, Default)]
pub struct InMemoryBoardDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl InMemoryBoardDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn frozen_boards(&self) -> Vec<i64> {
        self.inner.read().await.frozen.clone()
    }
}

impl BoardDirectory for InMemoryBoardDirectory {
    fn find_or_create(
        &self,
        name: &str,
        category: BoardCategory,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Board>> {
        let name = name.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            if name.is_empty() {
                return Err(DomainError::Validation("board name must not be empty".into()));
            }
            let mut inner = inner.write().await;
            if let Some(existing) = inner.by_id.values_mut().find(|board| board.name == name) {
                existing.active = true;
                return Ok(existing.clone());
            }
            inner.next_id += 1;
            let board = Board {
                id: inner.next_id,
                name,
                category,
                active: true,
            };
            inner.by_id.insert(board.id, board.clone());
            Ok(board)
        })
    }

    fn find_by_id(&self, id: i64) -> crate::ports::BoxFuture<'_, DomainResult<Option<Board>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.by_id.get(&id).cloned()) })
    }

    fn mark_deleted(&self, id: i64, deleted: bool) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.write().await;
            match inner.by_id.get_mut(&id) {
                Some(board) => {
                    board.active = !deleted;
                    Ok(())
                }
                None => Err(DomainError::NotFound),
            }
        })
    }

    fn freeze_content(&self, board_id: i64) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.write().await;
            if !inner.by_id.contains_key(&board_id) {
                return Err(DomainError::NotFound);
            }
            inner.frozen.push(board_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_key_round_trips() {
        let key = rank_key("breaking news", 42);
        assert_eq!(key, "breaking news:42");
        assert_eq!(parse_rank_key(&key), Some(("breaking news".to_string(), 42)));
    }

    #[test]
    fn rank_key_keeps_delimiters_inside_names() {
        let key = rank_key("a:b:c", 7);
        assert_eq!(parse_rank_key(&key), Some(("a:b:c".to_string(), 7)));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_rank_key("no-id"), None);
        assert_eq!(parse_rank_key(":7"), None);
        assert_eq!(parse_rank_key("name:notanumber"), None);
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent_and_reactivates() {
        let directory = InMemoryBoardDirectory::new();
        let first = directory
            .find_or_create("rust", BoardCategory::Realtime)
            .await
            .unwrap();
        directory.mark_deleted(first.id, true).await.unwrap();

        let second = directory
            .find_or_create("rust", BoardCategory::Realtime)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.active);
    }
}
