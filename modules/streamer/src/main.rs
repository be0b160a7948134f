use event_bus::{EventBus, InMemoryBus, NatsBus};
use std::sync::Arc;
use streamer_rs::cache::{NoopProductDetailCache, ProductDetailCache, RedisProductDetailCache};
use streamer_rs::config::{BusType, CacheType, Config};
use streamer_rs::consumer::{self, BatchHandler};
use streamer_rs::db;
use streamer_rs::ledger::PgHandledEventStore;
use streamer_rs::metrics::PgProductMetricsStore;
use streamer_rs::{CatalogEventConsumer, OrderEventConsumer, ProductMetricsService};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting streamer consumer service...");

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!("Configuration loaded: {:?}", config.bus_type);

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection established");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Database migrations completed");

    let bus: Arc<dyn EventBus> = match config.bus_type {
        BusType::Nats => {
            let nats_url = config
                .nats_url
                .as_deref()
                .expect("NATS_URL required for NATS bus");
            tracing::info!("Connecting to NATS at {}", nats_url);
            Arc::new(
                NatsBus::connect(nats_url)
                    .await
                    .expect("Failed to connect to NATS"),
            )
        }
        BusType::InMemory => {
            tracing::info!("Using in-memory event bus");
            Arc::new(InMemoryBus::new())
        }
    };

    let cache: Arc<dyn ProductDetailCache> = match config.cache_type {
        CacheType::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .expect("REDIS_URL required for Redis cache");
            tracing::info!("Connecting to Redis at {}", redis_url);
            Arc::new(
                RedisProductDetailCache::connect(redis_url)
                    .await
                    .expect("Failed to connect to Redis"),
            )
        }
        CacheType::Noop => {
            tracing::info!("Cache eviction disabled");
            Arc::new(NoopProductDetailCache::new())
        }
    };

    let catalog: Arc<dyn BatchHandler> = Arc::new(CatalogEventConsumer::new(
        PgHandledEventStore::new(pool.clone()),
        ProductMetricsService::new(PgProductMetricsStore::new(pool.clone())),
    ));
    let order: Arc<dyn BatchHandler> = Arc::new(OrderEventConsumer::new(
        PgHandledEventStore::new(pool.clone()),
        ProductMetricsService::new(PgProductMetricsStore::new(pool)),
        cache,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let catalog_task = tokio::spawn(consumer::run_consumer(
        catalog,
        bus.clone(),
        config.consumer.clone(),
        shutdown_rx.clone(),
    ));
    let order_task = tokio::spawn(consumer::run_consumer(
        order,
        bus,
        config.consumer.clone(),
        shutdown_rx,
    ));

    tracing::info!("Consumer loops started");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received, stopping consumers");

    let _ = shutdown_tx.send(true);
    let _ = catalog_task.await;
    let _ = order_task.await;

    tracing::info!("Streamer consumer service stopped");
}
