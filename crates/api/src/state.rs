use std::sync::Arc;
use std::time::Duration;

use ember_domain::board::InMemoryBoardDirectory;
use ember_domain::engagement::{
    EngagementConfig, EngagementService, InMemoryEngagementStore, InMemoryLikeArchive,
    InMemoryThresholdStore,
};
use ember_domain::events::LocalEventBus;
use ember_domain::lock::InMemoryDistributedLock;
use ember_domain::ports::boards::BoardDirectory;
use ember_domain::ports::events::EventBus;
use ember_domain::ports::rank::RankStore;
use ember_domain::rank_store::InMemoryRankStore;
use ember_infra::bus::RedisEventBus;
use ember_infra::config::AppConfig;
use ember_infra::db::{self, DbConfig};
use ember_infra::engagement::{RedisEngagementStore, RedisThresholdStore};
use ember_infra::lock::RedisDistributedLock;
use ember_infra::rank::RedisRankStore;
use ember_infra::repositories::{SurrealBoardDirectory, SurrealLikeArchive};
use redis::aio::ConnectionManager;

use crate::registry::{spawn_bridge, LiveConnectionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub boards: Arc<dyn BoardDirectory>,
    pub ranks: Arc<dyn RankStore>,
    pub engagement: EngagementService,
    pub bus: Arc<dyn EventBus>,
    pub registry: LiveConnectionRegistry,
}

fn engagement_config(config: &AppConfig) -> EngagementConfig {
    EngagementConfig {
        lock_wait: Duration::from_millis(config.lock_wait_ms.max(1)),
        lock_lease: Duration::from_millis(config.lock_lease_ms.max(1)),
        small_extension_seconds: config.like_small_extension_seconds,
        large_extension_seconds: config.like_large_extension_seconds,
    }
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        if config.data_backend.eq_ignore_ascii_case("memory") {
            return Ok(Self::with_memory_backend(config));
        }

        let client = redis::Client::open(config.redis_url.as_str())?;
        let manager = ConnectionManager::new(client).await?;

        let db = db::connect(&DbConfig::from_app_config(&config)).await?;
        let boards: Arc<dyn BoardDirectory> =
            Arc::new(SurrealBoardDirectory::with_client(db.clone()));
        let archive = Arc::new(SurrealLikeArchive::with_client(db));

        let ranks: Arc<dyn RankStore> = Arc::new(RedisRankStore::new(manager.clone()));
        let bus: Arc<dyn EventBus> = Arc::new(RedisEventBus::connect(&config.redis_url).await?);
        let engagement = EngagementService::new(
            Arc::new(RedisEngagementStore::new(manager.clone())),
            archive,
            Arc::new(RedisThresholdStore::new(manager.clone())),
            ranks.clone(),
            Arc::new(RedisDistributedLock::new(manager)),
            bus.clone(),
            engagement_config(&config),
        );

        let registry = LiveConnectionRegistry::new();
        spawn_bridge(bus.clone(), registry.clone());

        Ok(Self {
            config,
            boards,
            ranks,
            engagement,
            bus,
            registry,
        })
    }

    /// Memory data backend: same wiring, process-local stores. Used by the
    /// test suite and by `data_backend = memory`.
    pub fn with_memory_backend(config: AppConfig) -> Self {
        let boards: Arc<dyn BoardDirectory> = Arc::new(InMemoryBoardDirectory::new());
        let ranks: Arc<dyn RankStore> = Arc::new(InMemoryRankStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new());
        let engagement = EngagementService::new(
            Arc::new(InMemoryEngagementStore::new()),
            Arc::new(InMemoryLikeArchive::new()),
            Arc::new(InMemoryThresholdStore::new()),
            ranks.clone(),
            Arc::new(InMemoryDistributedLock::new()),
            bus.clone(),
            engagement_config(&config),
        );

        let registry = LiveConnectionRegistry::new();
        spawn_bridge(bus.clone(), registry.clone());

        Self {
            config,
            boards,
            ranks,
            engagement,
            bus,
            registry,
        }
    }
}
