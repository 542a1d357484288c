use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub redis_url: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub feed_url: String,
    pub feed_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub rank_top_n: usize,
    pub board_initial_ttl_seconds: u64,
    pub board_poll_extension_seconds: i64,
    pub like_small_extension_seconds: i64,
    pub like_large_extension_seconds: i64,
    pub lock_wait_ms: u64,
    pub lock_lease_ms: u64,
    pub reconcile_interval_ms: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("redis_url", "redis://127.0.0.1:6379")?
            .set_default("surreal_endpoint", "ws://127.0.0.1:8000")?
            .set_default("surreal_ns", "ember")?
            .set_default("surreal_db", "boards")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("feed_url", "http://127.0.0.1:9100/trends")?
            .set_default("feed_timeout_ms", 5000)?
            .set_default("poll_interval_ms", 10000)?
            .set_default("rank_top_n", 10)?
            .set_default("board_initial_ttl_seconds", 1800)?
            .set_default("board_poll_extension_seconds", 15)?
            .set_default("like_small_extension_seconds", 600)?
            .set_default("like_large_extension_seconds", 3600)?
            .set_default("lock_wait_ms", 3000)?
            .set_default("lock_lease_ms", 5000)?
            .set_default("reconcile_interval_ms", 60000)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}
