// Dispatcher binary entry point

use anyhow::Result;
use common::config::Settings;
use common::db::{DbPool, NotificationRepository, NotificationStore, RedisPool};
use common::dispatch::{DispatchConfig, DispatchEngine, Dispatcher};
use common::lock::{DistributedLock, RedLock};
use common::push::{FcmPushSender, PushSender};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize structured logging
    telemetry::init_logging(&settings.observability.log_level)?;

    info!("Starting notification dispatcher");

    // Initialize Prometheus metrics exporter
    telemetry::init_metrics(settings.observability.metrics_port)?;

    // Initialize database connection pool
    let db_pool = DbPool::new(&settings.database).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        anyhow::anyhow!("Database initialization error: {}", e)
    })?;
    info!("Database connection pool initialized");

    // Initialize Redis connection pool for the dispatch lock
    let redis_pool = RedisPool::new(&settings.redis).await.map_err(|e| {
        error!(error = %e, "Failed to initialize Redis pool");
        anyhow::anyhow!("Redis initialization error: {}", e)
    })?;
    info!("Redis connection pool initialized");

    // Wire the collaborators
    let store =
        Arc::new(NotificationRepository::new(db_pool.clone())) as Arc<dyn NotificationStore>;
    let sender = Arc::new(
        FcmPushSender::new(&settings.push)
            .map_err(|e| anyhow::anyhow!("Push sender initialization error: {}", e))?,
    ) as Arc<dyn PushSender>;
    let lock = Arc::new(RedLock::new(redis_pool)) as Arc<dyn DistributedLock>;
    info!("Store, push sender, and dispatch lock initialized");

    // Create the dispatch engine
    let dispatch_config = DispatchConfig {
        poll_interval_seconds: settings.dispatcher.poll_interval_seconds,
        lock_ttl_seconds: settings.dispatcher.lock_ttl_seconds,
        max_notifications_per_poll: settings.dispatcher.max_notifications_per_poll,
    };
    let engine = Arc::new(DispatchEngine::new(dispatch_config, store, sender, lock));
    info!("Dispatch engine created");

    // Set up graceful shutdown on Ctrl+C
    let engine_for_shutdown = engine.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        if let Err(e) = engine_for_shutdown.stop().await {
            error!(error = %e, "Error during dispatcher shutdown");
        }
    });

    // Start the polling loop
    info!("Starting dispatch polling loop");
    if let Err(e) = engine.start().await {
        error!(error = %e, "Dispatcher error");
        return Err(anyhow::anyhow!("Dispatcher error: {}", e));
    }

    db_pool.close().await;
    info!("Dispatcher stopped");
    Ok(())
}
