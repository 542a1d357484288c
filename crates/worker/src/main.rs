mod observability;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use ember_domain::board::InMemoryBoardDirectory;
use ember_domain::engagement::{InMemoryEngagementStore, InMemoryLikeArchive, InMemoryThresholdStore};
use ember_domain::events::LocalEventBus;
use ember_domain::expiry::ExpiryCascade;
use ember_domain::poller::{KeywordPoller, PollerConfig};
use ember_domain::ports::boards::BoardDirectory;
use ember_domain::ports::engagement::{EngagementStore, ThresholdStore};
use ember_domain::ports::events::EventBus;
use ember_domain::ports::feed::TrendFeed;
use ember_domain::ports::history::KeywordHistoryStore;
use ember_domain::ports::likes::LikeArchive;
use ember_domain::ports::rank::RankStore;
use ember_domain::rank::InMemoryKeywordHistoryStore;
use ember_domain::rank_store::InMemoryRankStore;
use ember_infra::bus::RedisEventBus;
use ember_infra::config::AppConfig;
use ember_infra::db::{self, DbConfig};
use ember_infra::engagement::{RedisEngagementStore, RedisThresholdStore};
use ember_infra::expiry_listener::{self, ExpiryListener};
use ember_infra::feed::HttpTrendFeed;
use ember_infra::history::RedisKeywordHistoryStore;
use ember_infra::logging::init_tracing;
use ember_infra::rank::RedisRankStore;
use ember_infra::repositories::{SurrealBoardDirectory, SurrealLikeArchive};
use ember_infra::scheduler::spawn_periodic;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::tasks::{PollerTask, ReconcilerTask};

fn poller_config(config: &AppConfig) -> PollerConfig {
    PollerConfig {
        top_n: config.rank_top_n,
        initial_ttl: Duration::from_secs(config.board_initial_ttl_seconds.max(1)),
        poll_extension_seconds: config.board_poll_extension_seconds,
    }
}

struct Backend {
    boards: Arc<dyn BoardDirectory>,
    ranks: Arc<dyn RankStore>,
    engagement: Arc<dyn EngagementStore>,
    archive: Arc<dyn LikeArchive>,
    thresholds: Arc<dyn ThresholdStore>,
    history: Arc<dyn KeywordHistoryStore>,
    bus: Arc<dyn EventBus>,
}

async fn redis_backend(config: &AppConfig) -> anyhow::Result<(Backend, ConnectionManager)> {
    let client = redis::Client::open(config.redis_url.as_str())?;
    let manager = ConnectionManager::new(client).await?;

    let db = db::connect(&DbConfig::from_app_config(config)).await?;
    let backend = Backend {
        boards: Arc::new(SurrealBoardDirectory::with_client(db.clone())),
        ranks: Arc::new(RedisRankStore::new(manager.clone())),
        engagement: Arc::new(RedisEngagementStore::new(manager.clone())),
        archive: Arc::new(SurrealLikeArchive::with_client(db)),
        thresholds: Arc::new(RedisThresholdStore::new(manager.clone())),
        history: Arc::new(RedisKeywordHistoryStore::new(manager.clone())),
        bus: Arc::new(RedisEventBus::connect(&config.redis_url).await?),
    };
    Ok((backend, manager))
}

/// Process-local stores for `data_backend = memory`. No expiry listener in
/// this mode; the poll cycle's dead-key sweep covers the cascade.
fn memory_backend() -> Backend {
    Backend {
        boards: Arc::new(InMemoryBoardDirectory::new()),
        ranks: Arc::new(InMemoryRankStore::new()),
        engagement: Arc::new(InMemoryEngagementStore::new()),
        archive: Arc::new(InMemoryLikeArchive::new()),
        thresholds: Arc::new(InMemoryThresholdStore::new()),
        history: Arc::new(InMemoryKeywordHistoryStore::new()),
        bus: Arc::new(LocalEventBus::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    observability::init_metrics()?;

    let use_memory = config.data_backend.eq_ignore_ascii_case("memory");
    let (backend, manager) = if use_memory {
        (memory_backend(), None)
    } else {
        let (backend, manager) = redis_backend(&config).await?;
        (backend, Some(manager))
    };

    let cascade = ExpiryCascade::new(
        backend.boards.clone(),
        backend.ranks.clone(),
        backend.thresholds.clone(),
        backend.bus.clone(),
    );

    if let Some(manager) = manager {
        let listener = ExpiryListener::new(
            &config.redis_url,
            expiry_listener::default_filter(),
            cascade.clone(),
        )?;
        listener.enable_notifications(&manager).await;
        tokio::spawn(listener.run());
    }

    let feed: Arc<dyn TrendFeed> = Arc::new(HttpTrendFeed::from_config(&config));
    let poller = KeywordPoller::new(
        feed,
        backend.boards,
        backend.ranks,
        backend.history,
        backend.bus,
        cascade,
        poller_config(&config),
    );
    let reconciler = ember_domain::reconcile::Reconciler::new(backend.engagement, backend.archive);

    let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
    let reconcile_interval = Duration::from_millis(config.reconcile_interval_ms.max(1));
    spawn_periodic(Arc::new(PollerTask::new(poller, poll_interval)));
    spawn_periodic(Arc::new(ReconcilerTask::new(reconciler, reconcile_interval)));

    info!(
        backend = if use_memory { "memory" } else { "redis" },
        "worker started"
    );
    let _ = tokio::signal::ctrl_c().await;
    info!("worker shutdown");

    Ok(())
}
