use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("transient infrastructure failure: {0}")]
    Transient(String),
    #[error("lock '{0}' unavailable")]
    LockUnavailable(String),
    #[error("not found")]
    NotFound,
    #[error("malformed upstream feed: {0}")]
    MalformedFeed(String),
    #[error("validation failed: {0}")]
    Validation(String),
}
