pub mod bus;
pub mod config;
pub mod db;
pub mod engagement;
pub mod expiry_listener;
pub mod feed;
pub mod history;
pub mod lock;
pub mod logging;
pub mod rank;
pub mod repositories;
pub mod scheduler;
