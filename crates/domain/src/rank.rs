use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::ports::history::KeywordHistoryStore;
use crate::DomainResult;

pub const HISTORY_FIELD_DELIMITER: char = ':';

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    New,
    Up,
    Down,
    Same,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::New => "NEW",
            ChangeType::Up => "UP",
            ChangeType::Down => "DOWN",
            ChangeType::Same => "SAME",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(ChangeType::New),
            "UP" => Some(ChangeType::Up),
            "DOWN" => Some(ChangeType::Down),
            "SAME" => Some(ChangeType::Same),
            _ => None,
        }
    }
}

/// One row of the stored keyword history. `rank` is the one-indexed position
/// delivered by the upstream feed; it is the only rank representation used
/// anywhere, never a structural list index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeywordHistoryEntry {
    pub rank: u32,
    pub keyword: String,
    pub board_id: i64,
    pub change: ChangeType,
    pub magnitude: u32,
}

impl KeywordHistoryEntry {
    /// Wire form: `rank:keyword:boardId:changeType:magnitude`.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.rank,
            self.keyword,
            self.board_id,
            self.change.as_str(),
            self.magnitude
        )
    }

    /// The keyword may itself contain the delimiter, so the leading field is
    /// split from the left and the trailing three from the right.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (rank, rest) = encoded.split_once(HISTORY_FIELD_DELIMITER)?;
        let rank = rank.parse::<u32>().ok()?;
        let mut tail = rest.rsplitn(4, HISTORY_FIELD_DELIMITER);
        let magnitude = tail.next()?.parse::<u32>().ok()?;
        let change = ChangeType::parse(tail.next()?)?;
        let board_id = tail.next()?.parse::<i64>().ok()?;
        let keyword = tail.next()?;
        if keyword.is_empty() {
            return None;
        }
        Some(Self {
            rank,
            keyword: keyword.to_string(),
            board_id,
            change,
            magnitude,
        })
    }
}

/// Computes per-keyword rank changes between two polling cycles.
///
/// `current` carries (one-indexed rank, keyword, board id) for the new cycle.
/// A keyword absent from the previous list is NEW with magnitude 0; a
/// previous list that is empty (cold start) therefore yields all NEW.
pub fn compute_diff(
    previous: &[KeywordHistoryEntry],
    current: &[(u32, String, i64)],
) -> Vec<KeywordHistoryEntry> {
    current
        .iter()
        .map(|(rank, keyword, board_id)| {
            let prior = previous.iter().find(|entry| entry.keyword == *keyword);
            let (change, magnitude) = match prior {
                None => (ChangeType::New, 0),
                Some(entry) => {
                    let magnitude = entry.rank.abs_diff(*rank);
                    let change = if *rank < entry.rank {
                        ChangeType::Up
                    } else if *rank > entry.rank {
                        ChangeType::Down
                    } else {
                        ChangeType::Same
                    };
                    (change, magnitude)
                }
            };
            KeywordHistoryEntry {
                rank: *rank,
                keyword: keyword.clone(),
                board_id: *board_id,
                change,
                magnitude,
            }
        })
        .collect()
}

#[derive(Default)]
struct HistoryInner {
    entries: Vec<KeywordHistoryEntry>,
    refreshed_at_ms: Option<i64>,
}

/// In-memory history store for tests and the memory data backend.
#[derive(Clone, Default)]
pub struct InMemoryKeywordHistoryStore {
    inner: Arc<RwLock<HistoryInner>>,
}

impl InMemoryKeywordHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeywordHistoryStore for InMemoryKeywordHistoryStore {
    fn load(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<KeywordHistoryEntry>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.entries.clone()) })
    }

    fn replace(
        &self,
        entries: &[KeywordHistoryEntry],
        cap: usize,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let mut entries = entries.to_vec();
        entries.truncate(cap);
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.entries = entries;
            Ok(())
        })
    }

    fn stamp_refreshed(&self, epoch_ms: i64) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.refreshed_at_ms = Some(epoch_ms);
            Ok(())
        })
    }

    fn last_refreshed_ms(&self) -> crate::ports::BoxFuture<'_, DomainResult<Option<i64>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.refreshed_at_ms) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rank: u32, keyword: &str, change: ChangeType, magnitude: u32) -> KeywordHistoryEntry {
        KeywordHistoryEntry {
            rank,
            keyword: keyword.to_string(),
            board_id: rank as i64,
            change,
            magnitude,
        }
    }

    #[test]
    fn cold_start_marks_everything_new() {
        let current = vec![(1, "X".to_string(), 1), (2, "Y".to_string(), 2)];
        let diff = compute_diff(&[], &current);
        assert_eq!(diff.len(), 2);
        for row in &diff {
            assert_eq!(row.change, ChangeType::New);
            assert_eq!(row.magnitude, 0);
        }
    }

    #[test]
    fn movement_is_measured_against_previous_rank() {
        let previous = vec![
            entry(1, "A", ChangeType::Same, 0),
            entry(2, "B", ChangeType::Same, 0),
            entry(3, "C", ChangeType::Same, 0),
        ];
        let current = vec![
            (1, "B".to_string(), 2),
            (2, "A".to_string(), 1),
            (3, "D".to_string(), 4),
        ];
        let diff = compute_diff(&previous, &current);

        assert_eq!(diff[0].keyword, "B");
        assert_eq!(diff[0].change, ChangeType::Up);
        assert_eq!(diff[0].magnitude, 1);

        assert_eq!(diff[1].keyword, "A");
        assert_eq!(diff[1].change, ChangeType::Down);
        assert_eq!(diff[1].magnitude, 1);

        assert_eq!(diff[2].keyword, "D");
        assert_eq!(diff[2].change, ChangeType::New);
        assert_eq!(diff[2].magnitude, 0);
    }

    #[test]
    fn unchanged_position_is_same_with_zero_magnitude() {
        let previous = vec![entry(5, "steady", ChangeType::New, 0)];
        let current = vec![(5, "steady".to_string(), 5)];
        let diff = compute_diff(&previous, &current);
        assert_eq!(diff[0].change, ChangeType::Same);
        assert_eq!(diff[0].magnitude, 0);
    }

    #[test]
    fn codec_round_trips() {
        let original = KeywordHistoryEntry {
            rank: 3,
            keyword: "hot topic".to_string(),
            board_id: 17,
            change: ChangeType::Up,
            magnitude: 2,
        };
        let decoded = KeywordHistoryEntry::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn codec_tolerates_delimiters_in_keywords() {
        let original = KeywordHistoryEntry {
            rank: 1,
            keyword: "k:pop:news".to_string(),
            board_id: 9,
            change: ChangeType::New,
            magnitude: 0,
        };
        let decoded = KeywordHistoryEntry::decode(&original.encode()).unwrap();
        assert_eq!(decoded.keyword, "k:pop:news");
        assert_eq!(decoded.board_id, 9);
    }

    #[test]
    fn decode_rejects_malformed_rows() {
        assert!(KeywordHistoryEntry::decode("").is_none());
        assert!(KeywordHistoryEntry::decode("1:only:two").is_none());
        assert!(KeywordHistoryEntry::decode("x:kw:1:NEW:0").is_none());
        assert!(KeywordHistoryEntry::decode("1:kw:1:SIDEWAYS:0").is_none());
    }
}
