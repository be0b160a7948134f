use commerce_rs::config::{BusType, Config};
use commerce_rs::db;
use commerce_rs::events::PgOutboxStore;
use commerce_rs::OutboxRelay;
use event_bus::{EventBus, InMemoryBus, NatsBus};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting commerce relay service...");

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

    let relay = Arc::new(OutboxRelay::new(
        PgOutboxStore::new(pool.clone()),
        bus,
        config.relay.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pending_task = {
        let relay = relay.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { relay.run_pending_loop(shutdown).await })
    };
    let failed_task = {
        let relay = relay.clone();
        let shutdown = shutdown_rx;
        tokio::spawn(async move { relay.run_failed_retry_loop(shutdown).await })
    };

    tracing::info!("Outbox relay loops started");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received, stopping relay loops");

    let _ = shutdown_tx.send(true);
    let _ = pending_task.await;
    let _ = failed_task.await;

    tracing::info!("Commerce relay service stopped");
}
