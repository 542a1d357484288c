pub mod boards;
pub mod likes;

pub use boards::SurrealBoardDirectory;
pub use likes::SurrealLikeArchive;

use ember_domain::error::DomainError;

fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    DomainError::Transient(format!("surreal query failed: {err}"))
}
