use crate::config::AppConfig;
use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// Used when `log_level` fails to parse: the ember crates stay at info
/// while the chattier transport layers are capped at warn.
const FALLBACK_DIRECTIVES: &str =
    "info,ember_api=info,ember_infra=info,ember_worker=info,hyper=warn,surrealdb_core=warn";

pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVES));

    if config.is_production() {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    Ok(())
}
