use crate::DomainResult;

use super::BoxFuture;

/// Durable like records. The engagement cache wins at reconciliation time;
/// this store is the write-back target and the read-through fallback.
pub trait LikeArchive: Send + Sync {
    fn exists_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> BoxFuture<'_, DomainResult<bool>>;

    fn save_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> BoxFuture<'_, DomainResult<()>>;

    fn delete_like(
        &self,
        board_id: i64,
        post_id: i64,
        actor: &str,
    ) -> BoxFuture<'_, DomainResult<()>>;

    fn actor_names_by_post(
        &self,
        board_id: i64,
        post_id: i64,
    ) -> BoxFuture<'_, DomainResult<Vec<String>>>;
}
