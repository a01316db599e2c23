// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vendora Core - Vendor Performance Engine
//!
//! Connects to the database, applies migrations, selects the aggregate cache
//! and runs the statistics audit worker until interrupted.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use vendora_core::audit_worker::{AuditWorker, AuditWorkerConfig};
use vendora_core::cache::{AggregateCache, InMemoryAggregateCache};
use vendora_core::clock::SystemClock;
use vendora_core::config::Config;
use vendora_core::handlers::{self, HandlerState};
use vendora_core::persistence;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vendora_core=info".parse()?),
        )
        .init();

    info!("Starting Vendora Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        cache_ttl_secs = config.cache_ttl.as_secs(),
        db_max_connections = config.db_max_connections,
        redis = config.redis_url.is_some(),
        "Configuration loaded"
    );

    // Connect to database and run migrations
    info!("Connecting to database...");
    let persistence = persistence::connect(&config.database_url, config.db_max_connections).await?;
    info!("Database connection established, migrations applied");

    let cache = build_cache(&config).await;
    let state = HandlerState::new(persistence.clone(), cache, config.cache_ttl);

    let health = handlers::handle_health_check(&state).await?;
    info!(
        healthy = health.healthy,
        vendors = health.vendor_count,
        version = %health.version,
        "Database health check completed"
    );

    // Start the statistics audit worker
    let audit_worker = Arc::new(AuditWorker::new(
        persistence.clone(),
        state.engine.clone(),
        Arc::new(SystemClock),
        AuditWorkerConfig::from_env(),
    ));
    let audit_shutdown = audit_worker.shutdown_handle();
    let audit_handle = {
        let worker = audit_worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    info!("Vendora Core initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    audit_shutdown.notify_one();
    if let Err(e) = audit_handle.await {
        warn!(error = %e, "Audit worker task ended abnormally");
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "redis-cache")]
async fn build_cache(config: &Config) -> Arc<dyn AggregateCache> {
    use vendora_core::cache::RedisAggregateCache;

    if let Some(url) = &config.redis_url {
        match RedisAggregateCache::connect(url).await {
            Ok(cache) => return Arc::new(cache),
            Err(e) => warn!(error = %e, "Redis unavailable, using in-process aggregate cache"),
        }
    }

    info!("Using in-process aggregate cache");
    Arc::new(InMemoryAggregateCache::new())
}

#[cfg(not(feature = "redis-cache"))]
async fn build_cache(config: &Config) -> Arc<dyn AggregateCache> {
    if config.redis_url.is_some() {
        warn!("VENDORA_REDIS_URL is set but the redis-cache feature is disabled");
    }

    info!("Using in-process aggregate cache");
    Arc::new(InMemoryAggregateCache::new())
}
