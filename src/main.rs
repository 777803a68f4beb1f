use anyhow::Context;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticket_inventory::{
    cache::CachedCatalog,
    config::{Config, LogFormat, StoreBackend},
    controllers,
    database::Database,
    redis_client::RedisClient,
    services::ReservationSweeper,
    store::{CatalogStore, MemoryCatalog},
    AppState,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    let registry = tracing_subscriber::registry().with(filter);
    match config.app.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wraps the catalog in the Redis cache when REDIS_URL is set and reachable.
async fn with_cache(config: &Config, catalog: Arc<dyn CatalogStore>) -> Arc<dyn CatalogStore> {
    let Some(url) = config.redis.url.as_deref() else {
        info!("REDIS_URL not set, catalog cache disabled");
        return catalog;
    };
    let redis = match RedisClient::new(url).await {
        Ok(redis) => redis,
        Err(e) => {
            warn!("Redis unavailable, catalog cache disabled: {}", e);
            return catalog;
        }
    };
    if let Err(e) = redis.ping().await {
        warn!("Redis did not answer PING, catalog cache disabled: {}", e);
        return catalog;
    }
    info!("Redis connected");

    let cached = Arc::new(CachedCatalog::new(catalog, redis, &config.redis));
    let warm = cached.clone();
    tokio::spawn(async move {
        warm.warmup().await;
    });
    cached
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    info!("Starting Seat Inventory API ({})", config.app.environment);

    let state = match config.store.backend {
        StoreBackend::Postgres => {
            let url = config.database.url.as_deref().context("DATABASE_URL must be set")?;
            let db = Database::new(url, config.database.pool_size)
                .await
                .context("failed to connect to database")?;
            db.run_migrations().await.context("failed to run migrations")?;
            info!("Database connected");

            let store = Arc::new(db.inventory_store());
            let catalog = with_cache(&config, Arc::new(db.catalog())).await;
            AppState::new(config.clone(), store.clone(), store, catalog)
        }
        StoreBackend::Memory => {
            warn!("memory backend: state is lost on exit and the catalog starts empty");
            AppState::in_memory(config.clone(), Arc::new(MemoryCatalog::new()))
        }
    };

    // --- Background tasks ---
    if config.reservation.sweep_interval_seconds > 0 {
        ReservationSweeper::new(
            state.inventory.clone(),
            Duration::from_secs(config.reservation.sweep_interval_seconds),
        )
        .spawn();
    }

    // --- Web server ---
    let app = controllers::router(state);
    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("HOST/PORT do not form a socket address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("Server stopped");
    Ok(())
}
