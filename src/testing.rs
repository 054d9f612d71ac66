//! Fixtures shared by the unit tests.

use crate::{
    db,
    routes::AppState,
    services::{
        object_store_client::{CloudObjectStore, ObjectStoreClient},
        progress_cache::MemoryProgressCache,
        progress_store::ProgressStore,
        progress_sync::{ProgressSyncConfig, ProgressSyncEngine},
        range_relay::RangeStreamRelay,
        upload_tickets::UploadTicketIssuer,
    },
};
use object_store::{aws::AmazonS3Builder, memory::InMemory};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

pub const PUBLIC_URL: &str = "https://cdn.example.com";

/// Fresh in-memory database with the schema applied.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    Arc::new(pool)
}

/// Objects live in an `InMemory` store; URLs are signed by an S3 client,
/// which needs no network to sign.
pub fn media_store() -> Arc<dyn ObjectStoreClient> {
    let signer = AmazonS3Builder::new()
        .with_endpoint("http://localhost:9000")
        .with_region("us-east-1")
        .with_bucket_name("media")
        .with_access_key_id("AKIDEXAMPLE")
        .with_secret_access_key("secret")
        .with_allow_http(true)
        .with_virtual_hosted_style_request(false)
        .build()
        .unwrap();

    Arc::new(CloudObjectStore::new(
        Arc::new(InMemory::new()),
        Some(Arc::new(signer)),
        "media",
        Duration::from_secs(5),
    ))
}

/// Application state over in-memory backends.
pub async fn app_state() -> (AppState, Arc<dyn ObjectStoreClient>) {
    let media = media_store();
    let state = AppState {
        relay: RangeStreamRelay::new(media.clone(), Duration::from_secs(5)),
        uploads: UploadTicketIssuer::new(media.clone(), PUBLIC_URL),
        progress: ProgressSyncEngine::new(
            Arc::new(MemoryProgressCache::new()),
            ProgressStore::new(memory_pool().await),
            ProgressSyncConfig::default(),
        ),
    };
    (state, media)
}
