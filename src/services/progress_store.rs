//! src/services/progress_store.rs
//!
//! Durable tier for watch progress, backed by SQLite. Holds decimated
//! snapshots and becomes the source of truth once the cache entry expires.

use crate::{
    errors::{MediaError, MediaResult},
    models::progress::{ProgressRecord, ProgressRow},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct ProgressStore {
    db: Arc<SqlitePool>,
}

impl ProgressStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert or overwrite the snapshot for `(user_id, movie_id)`.
    ///
    /// Writing the same record twice leaves a single row.
    pub async fn upsert(&self, record: &ProgressRecord) -> MediaResult<()> {
        let position_ms = to_sql_int(record.position_ms, "positionMs")?;
        let duration_ms = to_sql_int(record.duration_ms, "durationMs")?;

        sqlx::query(
            r#"
            INSERT INTO watch_progress (
                id, user_id, movie_id, position_ms, duration_ms, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, movie_id) DO UPDATE SET
                position_ms = excluded.position_ms,
                duration_ms = excluded.duration_ms,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.user_id)
        .bind(&record.movie_id)
        .bind(position_ms)
        .bind(duration_ms)
        .bind(record.updated_at)
        .execute(&*self.db)
        .await?;

        debug!(
            "flushed progress {}/{} at {}ms",
            record.user_id, record.movie_id, record.position_ms
        );
        Ok(())
    }

    pub async fn get(&self, user_id: &str, movie_id: &str) -> MediaResult<Option<ProgressRecord>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            "SELECT user_id, movie_id, position_ms, duration_ms, updated_at
             FROM watch_progress
             WHERE user_id = ? AND movie_id = ?",
        )
        .bind(user_id)
        .bind(movie_id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(ProgressRecord::try_from).transpose()
    }

    /// Readiness probe.
    pub async fn ping(&self) -> MediaResult<()> {
        match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?
        {
            1 => Ok(()),
            other => Err(MediaError::StoreUnavailable(format!(
                "unexpected probe result: {}",
                other
            ))),
        }
    }

    /// Close the pool; later queries fail with `PoolClosed`.
    pub async fn close(&self) {
        self.db.close().await;
    }
}

fn to_sql_int(value: u64, field: &str) -> MediaResult<i64> {
    i64::try_from(value)
        .map_err(|_| MediaError::InvalidInput(format!("{} {} is out of range", field, value)))
}
