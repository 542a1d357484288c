use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod boards;
pub mod engagement;
pub mod events;
pub mod feed;
pub mod history;
pub mod likes;
pub mod lock;
pub mod rank;
