use crate::board::{Board, BoardCategory};
use crate::DomainResult;

use super::BoxFuture;

/// Durable board records, owned by an external collaborator.
pub trait BoardDirectory: Send + Sync {
    /// Idempotent provisioning; an existing inactive board is reactivated.
    fn find_or_create(
        &self,
        name: &str,
        category: BoardCategory,
    ) -> BoxFuture<'_, DomainResult<Board>>;

    fn find_by_id(&self, id: i64) -> BoxFuture<'_, DomainResult<Option<Board>>>;

    /// Flips the lagging durable mirror of board liveness. Realtime boards
    /// are only ever deactivated, never hard-deleted.
    fn mark_deleted(&self, id: i64, deleted: bool) -> BoxFuture<'_, DomainResult<()>>;

    /// Marks the board's dependent content non-modifiable.
    fn freeze_content(&self, board_id: i64) -> BoxFuture<'_, DomainResult<()>>;
}
