use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod testing;

use services::{
    object_store_client::CloudObjectStore,
    progress_cache::{MemoryProgressCache, ProgressCache, RedisProgressCache},
    progress_store::ProgressStore,
    progress_sync::{ProgressSyncConfig, ProgressSyncEngine},
    range_relay::RangeStreamRelay,
    upload_tickets::UploadTicketIssuer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting media-relay on {} (bucket {}, endpoint {:?}, flush every {}ms)",
        cfg.addr(),
        cfg.s3.bucket,
        cfg.s3.endpoint,
        cfg.flush_interval_ms
    );

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Object store: missing credentials are fatal ---
    let media = Arc::new(
        CloudObjectStore::s3(&cfg.s3, cfg.store_timeout).context("configuring object store")?,
    );

    // --- Progress cache ---
    let cache: Arc<dyn ProgressCache> = match &cfg.redis_url {
        Some(url) => Arc::new(
            RedisProgressCache::connect(url)
                .await
                .with_context(|| format!("connecting to redis at {}", url))?,
        ),
        None => {
            tracing::warn!(
                "MEDIA_RELAY_REDIS_URL not set; progress cache is in-process and not shared"
            );
            Arc::new(MemoryProgressCache::new())
        }
    };
    tracing::info!("Progress cache backend: {}", cache.backend());

    // --- Initialize core services ---
    let store = ProgressStore::new(db.clone());
    let state = routes::AppState {
        relay: RangeStreamRelay::new(media.clone(), cfg.store_timeout),
        uploads: UploadTicketIssuer::new(media, cfg.public_url.clone()),
        progress: ProgressSyncEngine::new(
            cache,
            store.clone(),
            ProgressSyncConfig {
                flush_interval_ms: cfg.flush_interval_ms,
                ..Default::default()
            },
        ),
    };

    // --- Build router ---
    let app: Router = routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
