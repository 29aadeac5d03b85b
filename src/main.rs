use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use eventra::{
    app,
    cache::CacheService,
    config::Config,
    init_tracing,
    models::Role,
    redis_client::RedisClient,
    store::{MemoryStore, PgStore},
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEV_ADMIN_EMAIL: &str = "admin@eventra.local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.app);

    info!("Starting Eventra API ({})", config.app.environment);

    // Redis опционален: без него публичная выдача просто не кешируется
    let cache = match &config.redis.url {
        Some(url) => match RedisClient::connect(url).await {
            Ok(redis) => {
                info!("Redis connected");
                Some(CacheService::new(redis, config.redis.cache_ttl_seconds))
            }
            Err(e) => {
                warn!("Redis unavailable, continuing without cache: {}", e);
                None
            }
        },
        None => None,
    };

    let state = match &config.database.url {
        Some(url) => {
            let store = PgStore::connect(url, config.database.pool_size)
                .await
                .context("Failed to connect to database")?;
            store.run_migrations().await.context("Failed to run migrations")?;
            AppState::new(config.clone(), Arc::new(store), cache)
        }
        None => {
            if config.is_production() {
                anyhow::bail!("DATABASE_URL is required in production");
            }
            warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
            AppState::new(config.clone(), Arc::new(dev_store(&config)?), cache)
        }
    };

    // --- Фоновые задачи ---
    if config.scheduler.enabled {
        let interval = Duration::from_secs(config.scheduler.interval_secs.max(1));
        info!("⏰ In-process schedule notifier every {:?}", interval);
        state.scheduler.clone().spawn_interval(interval, config.app.utc_offset_minutes);
    }

    // --- Веб-сервер ---
    let router = app(state);
    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Хранилище для локальной разработки с одним админом.
fn dev_store(config: &Config) -> anyhow::Result<MemoryStore> {
    let store = MemoryStore::new();
    let password = std::env::var("DEV_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST).context("Failed to hash dev admin password")?;
    store.seed_account(DEV_ADMIN_EMAIL, hash, Role::Admin, config.notifications.admin_id);
    info!("Seeded dev admin {}", DEV_ADMIN_EMAIL);
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
