use std::sync::Arc;

use ember_domain::board::{Board, BoardCategory};
use ember_domain::error::DomainError;
use ember_domain::ports::boards::BoardDirectory;
use ember_domain::DomainResult;
use serde::Deserialize;
use surrealdb::engine::remote::ws::Client;
use surrealdb::Surreal;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::map_surreal_error;

#[derive(Debug, Deserialize)]
struct BoardRow {
    board_id: i64,
    name: String,
    category: String,
    active: bool,
}

#[derive(Debug, Deserialize)]
struct CounterRow {
    value: i64,
}

/// Durable board records in the `board` table, with numeric ids handed out
/// by an atomic counter upsert.
#[derive(Clone)]
pub struct SurrealBoardDirectory {
    client: Arc<Surreal<Client>>,
}

impl SurrealBoardDirectory {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    fn now_rfc3339() -> String {
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }

    fn row_to_board(row: BoardRow) -> DomainResult<Board> {
        let category = BoardCategory::parse(&row.category).ok_or_else(|| {
            DomainError::Validation(format!("unknown board category '{}'", row.category))
        })?;
        Ok(Board {
            id: row.board_id,
            name: row.name,
            category,
            active: row.active,
        })
    }

    async fn next_board_id(&self) -> DomainResult<i64> {
        let mut response = self
            .client
            .query("UPSERT counter:board SET value += 1 RETURN AFTER")
            .await
            .map_err(map_surreal_error)?;
        let rows: Vec<CounterRow> = response.take(0).map_err(map_surreal_error)?;
        rows.into_iter()
            .next()
            .map(|row| row.value)
            .ok_or_else(|| DomainError::Transient("board id counter returned no row".into()))
    }

    async fn find_by_name(
        &self,
        name: &str,
        category: BoardCategory,
    ) -> DomainResult<Option<Board>> {
        let mut response = self
            .client
            .query("SELECT * FROM board WHERE name = $name AND category = $category LIMIT 1")
            .bind(("name", name.to_string()))
            .bind(("category", category.as_str().to_string()))
            .await
            .map_err(map_surreal_error)?;
        let rows: Vec<BoardRow> = response.take(0).map_err(map_surreal_error)?;
        rows.into_iter().next().map(Self::row_to_board).transpose()
    }
}

impl BoardDirectory for SurrealBoardDirectory {
    fn find_or_create(
        &self,
        name: &str,
        category: BoardCategory,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<Board>> {
        let name = name.to_string();
        Box::pin(async move {
            if let Some(board) = self.find_by_name(&name, category).await? {
                if board.active {
                    return Ok(board);
                }
                let mut reactivated = board;
                reactivated.active = true;
                self.mark_deleted(reactivated.id, false).await?;
                return Ok(reactivated);
            }

            let board_id = self.next_board_id().await?;
            let now = Self::now_rfc3339();
            let mut response = self
                .client
                .query(
                    "CREATE board CONTENT { \
                        board_id: $board_id, \
                        name: $name, \
                        category: $category, \
                        active: true, \
                        created_at: $now, \
                        updated_at: $now \
                    }",
                )
                .bind(("board_id", board_id))
                .bind(("name", name.clone()))
                .bind(("category", category.as_str().to_string()))
                .bind(("now", now))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<BoardRow> = response.take(0).map_err(map_surreal_error)?;
            rows.into_iter()
                .next()
                .map(Self::row_to_board)
                .transpose()?
                .ok_or_else(|| DomainError::Transient("board create returned no row".into()))
        })
    }

    fn find_by_id(&self, id: i64) -> ember_domain::ports::BoxFuture<'_, DomainResult<Option<Board>>> {
        Box::pin(async move {
            let mut response = self
                .client
                .query("SELECT * FROM board WHERE board_id = $board_id LIMIT 1")
                .bind(("board_id", id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<BoardRow> = response.take(0).map_err(map_surreal_error)?;
            rows.into_iter().next().map(Self::row_to_board).transpose()
        })
    }

    fn mark_deleted(
        &self,
        id: i64,
        deleted: bool,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        Box::pin(async move {
            let now = Self::now_rfc3339();
            self.client
                .query("UPDATE board SET active = $active, updated_at = $now WHERE board_id = $board_id")
                .bind(("active", !deleted))
                .bind(("now", now))
                .bind(("board_id", id))
                .await
                .map_err(map_surreal_error)?;
            Ok(())
        })
    }

    fn freeze_content(&self, board_id: i64) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        Box::pin(async move {
            let now = Self::now_rfc3339();
            self.client
                .query("UPDATE post SET frozen = true, updated_at = $now WHERE board_id = $board_id")
                .bind(("now", now))
                .bind(("board_id", board_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(())
        })
    }
}
