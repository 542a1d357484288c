use std::time::Duration;

use ember_domain::error::DomainError;
use ember_domain::ports::feed::{FeedItem, FeedSnapshot, TrendFeed};
use ember_domain::DomainResult;
use serde::Deserialize;

use crate::config::AppConfig;

#[derive(Debug, Deserialize)]
struct FeedPayload {
    now: i64,
    top10: Vec<FeedPayloadItem>,
}

#[derive(Debug, Deserialize)]
struct FeedPayloadItem {
    rank: u32,
    keyword: String,
}

/// Client for the upstream trending-keyword endpoint. One GET per poll
/// cycle; transport failures are transient, decode failures are malformed.
#[derive(Clone)]
pub struct HttpTrendFeed {
    http: reqwest::Client,
    url: String,
}

impl HttpTrendFeed {
    pub fn from_config(config: &AppConfig) -> Self {
        let timeout = Duration::from_millis(config.feed_timeout_ms.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            url: config.feed_url.clone(),
        }
    }

    fn validate(payload: FeedPayload) -> DomainResult<FeedSnapshot> {
        let mut items = Vec::with_capacity(payload.top10.len());
        for item in payload.top10 {
            if item.rank == 0 {
                return Err(DomainError::MalformedFeed(format!(
                    "rank 0 for keyword '{}'",
                    item.keyword
                )));
            }
            if item.keyword.trim().is_empty() {
                return Err(DomainError::MalformedFeed(format!(
                    "empty keyword at rank {}",
                    item.rank
                )));
            }
            items.push(FeedItem {
                rank: item.rank,
                keyword: item.keyword,
            });
        }
        Ok(FeedSnapshot {
            now_ms: payload.now,
            items,
        })
    }
}

impl TrendFeed for HttpTrendFeed {
    fn fetch(&self) -> ember_domain::ports::BoxFuture<'_, DomainResult<FeedSnapshot>> {
        Box::pin(async move {
            let response = self
                .http
                .get(&self.url)
                .header("accept", "application/json")
                .send()
                .await
                .map_err(|err| DomainError::Transient(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(DomainError::Transient(format!(
                    "feed returned status {}",
                    status.as_u16()
                )));
            }

            let payload = response
                .json::<FeedPayload>()
                .await
                .map_err(|err| DomainError::MalformedFeed(err.to_string()))?;
            Self::validate(payload)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_payload_validates() {
        let payload: FeedPayload = serde_json::from_str(
            r#"{"now": 1700000000000, "top10": [{"rank": 1, "keyword": "rust"}]}"#,
        )
        .unwrap();
        let snapshot = HttpTrendFeed::validate(payload).unwrap();
        assert_eq!(snapshot.now_ms, 1_700_000_000_000);
        assert_eq!(snapshot.items[0].keyword, "rust");
    }

    #[test]
    fn zero_rank_is_rejected() {
        let payload: FeedPayload =
            serde_json::from_str(r#"{"now": 1, "top10": [{"rank": 0, "keyword": "x"}]}"#).unwrap();
        assert!(matches!(
            HttpTrendFeed::validate(payload),
            Err(DomainError::MalformedFeed(_))
        ));
    }

    #[test]
    fn blank_keyword_is_rejected() {
        let payload: FeedPayload =
            serde_json::from_str(r#"{"now": 1, "top10": [{"rank": 2, "keyword": "  "}]}"#).unwrap();
        assert!(matches!(
            HttpTrendFeed::validate(payload),
            Err(DomainError::MalformedFeed(_))
        ));
    }
}
