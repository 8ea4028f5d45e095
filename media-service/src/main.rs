use anyhow::{Context, Result};
use media_service::{router, subscription_spec, MediaServiceContext};
use murmur_config::{Config, StorageBackend};
use murmur_redis::RedisClient;
use murmur_shared::assets::{object_store_from_config, AssetCleanupHandler};
use murmur_shared::broker::{
    AmqpConnector, CircuitBreakerConfig, ConnectionManager, EventPublisher,
    RedisRedeliveryTracker, Subscriber, SubscriberConfig,
};
use murmur_shared::catalog::{create_pool, run_migrations, PgAssetCatalog};
use murmur_shared::utils::shutdown_on_signal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STARTUP_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Media Service Starting ===");
    info!("Broker: {} (exchange {})", config.broker_url_safe(), config.broker.exchange);
    info!("Storage backend: {:?}", config.media.backend);

    if config.media.backend == StorageBackend::Filesystem {
        tokio::fs::create_dir_all(&config.media.storage_dir)
            .await
            .context("Failed to create media storage directory")?;
        info!("Storage: {}", config.media.storage_dir.display());
    }
    let store = object_store_from_config(&config.media).context("Failed to build object store")?;

    let pool = create_pool(&config.database_url, &config.db).await?;
    run_migrations(&pool).await?;
    info!("Connected to database");

    info!("Connecting to Redis at: {}", config.redis_url_safe());
    let redis = RedisClient::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;

    let connections = Arc::new(ConnectionManager::new(
        AmqpConnector::new(config.broker.url.clone()),
        config.broker.exchange.clone(),
        config.broker.connect_timeout(),
    ));
    let dead_letters = Arc::new(EventPublisher::new(
        connections.clone(),
        CircuitBreakerConfig::from(&config.broker),
    ));
    let subscriber = Subscriber::new(
        connections.clone(),
        dead_letters,
        Arc::new(RedisRedeliveryTracker::new(redis)),
        SubscriberConfig::from(&config.broker),
    );

    let assets = Arc::new(PgAssetCatalog::new(pool));
    let handler = Arc::new(AssetCleanupHandler::new(
        assets.clone(),
        store,
        config.db.catalog_timeout(),
        config.media.timeout(),
        config.logging.hash_salt.clone(),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    // The queue must exist before the HTTP surface reports ready
    let spec = subscription_spec(&config.broker);
    let worker = loop {
        match subscriber
            .subscribe(spec.clone(), handler.clone(), shutdown.clone())
            .await
        {
            Ok(worker) => break worker,
            Err(e) => {
                warn!(error = %e, subscription = %spec.describe(), "Subscribe failed, retrying");
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(STARTUP_RETRY_DELAY) => {}
                }
            }
        }
    };

    let app = router(Arc::new(MediaServiceContext::new(
        connections,
        spec.describe(),
        assets,
        config.db.catalog_timeout(),
    )));

    info!("Media Service listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .context("Failed to bind to address")?;

    let http_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
        .await
        .context("Failed to start server")?;

    // Let the in-flight delivery settle before exiting
    shutdown.cancel();
    if let Err(e) = worker.await {
        error!(error = %e, "Consumer task panicked");
    }

    info!("Media Service stopped");
    Ok(())
}
