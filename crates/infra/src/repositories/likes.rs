use std::sync::Arc;

use ember_domain::ports::likes::LikeArchive;
use ember_domain::DomainResult;
use surrealdb::engine::remote::ws::Client;
use surrealdb::Surreal;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::map_surreal_error;

/// Durable like rows in the `likes` table. Saves are exists-then-create so
/// repeated reconciliation passes stay idempotent.
#[derive(Clone)]
pub struct SurrealLikeArchive {
    client: Arc<Surreal<Client>>,
}

impl SurrealLikeArchive {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    fn now_rfc3339() -> String {
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

impl LikeArchive for SurrealLikeArchive {
    fn exists_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<bool>> {
        let actor = actor.to_string();
        Box::pin(async move {
            let mut response = self
                .client
                .query(
                    "SELECT VALUE actor FROM likes \
                     WHERE board_id = $board_id AND post_id = $post_id AND actor = $actor \
                     LIMIT 1",
                )
                .bind(("board_id", board_id))
                .bind(("post_id", post_id))
                .bind(("actor", actor))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<String> = response.take(0).map_err(map_surreal_error)?;
            Ok(!rows.is_empty())
        })
    }

    fn save_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let actor = actor.to_string();
        Box::pin(async move {
            if self.exists_like(board_id, post_id, &actor).await? {
                return Ok(());
            }
            let now = Self::now_rfc3339();
            self.client
                .query(
                    "CREATE likes CONTENT { \
                        board_id: $board_id, \
                        post_id: $post_id, \
                        actor: $actor, \
                        created_at: $now \
                    }",
                )
                .bind(("board_id", board_id))
                .bind(("post_id", post_id))
                .bind(("actor", actor))
                .bind(("now", now))
                .await
                .map_err(map_surreal_error)?;
            Ok(())
        })
    }

    fn delete_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let actor = actor.to_string();
        Box::pin(async move {
            self.client
                .query(
                    "DELETE likes \
                     WHERE board_id = $board_id AND post_id = $post_id AND actor = $actor",
                )
                .bind(("board_id", board_id))
                .bind(("post_id", post_id))
                .bind(("actor", actor))
                .await
                .map_err(map_surreal_error)?;
            Ok(())
        })
    }

    fn actor_names_by_post(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> ember_domain::ports::BoxFuture<'_, DomainResult<Vec<String>>> {
        Box::pin(async move {
            let mut response = self
                .client
                .query(
                    "SELECT VALUE actor FROM likes \
                     WHERE board_id = $board_id AND post_id = $post_id",
                )
                .bind(("board_id", board_id))
                .bind(("post_id", post_id))
                .await
                .map_err(map_surreal_error)?;
            let actors: Vec<String> = response.take(0).map_err(map_surreal_error)?;
            Ok(actors)
        })
    }
}
