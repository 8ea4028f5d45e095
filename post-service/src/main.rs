use anyhow::{Context, Result};
use murmur_config::Config;
use murmur_shared::broker::{AmqpConnector, CircuitBreakerConfig, ConnectionManager, EventPublisher};
use murmur_shared::cache::{CacheInvalidator, NoopCache, ReadCache, ReadThrough, RedisCache};
use murmur_shared::catalog::{create_pool, run_migrations, PgPostCatalog};
use murmur_shared::content::ContentService;
use murmur_shared::utils::shutdown_on_signal;
use post_service::{router, PostServiceContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Post Service Starting ===");
    info!("Broker: {} (exchange {})", config.broker_url_safe(), config.broker.exchange);

    let pool = create_pool(&config.database_url, &config.db).await?;
    run_migrations(&pool).await?;
    info!("Connected to database");

    let cache: Arc<dyn ReadCache> = if config.cache.enabled {
        info!("Connecting to Redis at: {}", config.redis_url_safe());
        Arc::new(
            RedisCache::connect(&config.redis_url)
                .await
                .context("Failed to connect to Redis")?,
        )
    } else {
        warn!("Read cache disabled (CACHE_ENABLED=false)");
        Arc::new(NoopCache)
    };

    let connections = Arc::new(ConnectionManager::new(
        AmqpConnector::new(config.broker.url.clone()),
        config.broker.exchange.clone(),
        config.broker.connect_timeout(),
    ));
    // Declare the exchange early; a broker that is down now is retried on
    // the first publish.
    if let Err(e) = connections.ensure_channel().await {
        warn!(error = %e, "Broker not reachable at start-up, continuing");
    }
    let publisher = Arc::new(EventPublisher::new(
        connections,
        CircuitBreakerConfig::from(&config.broker),
    ));

    let content = ContentService::new(
        Arc::new(PgPostCatalog::new(pool)),
        ReadThrough::new(cache.clone(), &config.cache),
        CacheInvalidator::new(cache, config.cache.op_timeout()),
        publisher,
        config.db.catalog_timeout(),
        config.logging.hash_salt.clone(),
    );
    let app = router(Arc::new(PostServiceContext::new(content)));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    info!("Post Service listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Failed to start server")?;

    info!("Post Service stopped");
    Ok(())
}
