pub mod board;
pub mod engagement;
pub mod error;
pub mod events;
pub mod expiry;
pub mod lock;
pub mod poller;
pub mod ports;
pub mod rank;
pub mod rank_store;
pub mod reconcile;

pub type DomainResult<T> = Result<T, error::DomainError>;
