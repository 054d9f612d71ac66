//! Watch-progress records shared by the ephemeral and durable tiers.

use crate::errors::{MediaError, MediaResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Latest known playback position of one user in one movie.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub user_id: String,
    pub movie_id: String,

    /// Playback position in milliseconds.
    pub position_ms: u64,

    /// Total runtime in milliseconds as reported by the player.
    pub duration_ms: u64,

    /// When this value was written.
    pub updated_at: DateTime<Utc>,
}

/// Row shape of the `watch_progress` table. SQLite integers are signed.
#[derive(FromRow, Debug)]
pub struct ProgressRow {
    pub user_id: String,
    pub movie_id: String,
    pub position_ms: i64,
    pub duration_ms: i64,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProgressRow> for ProgressRecord {
    type Error = MediaError;

    /// Negative offsets mean the row was written by something else; they are
    /// reported, never reset to zero.
    fn try_from(row: ProgressRow) -> MediaResult<Self> {
        let offset = |value: i64, field: &str| {
            u64::try_from(value).map_err(|_| {
                tracing::warn!(
                    "corrupt {} {} for {}/{}",
                    field,
                    value,
                    row.user_id,
                    row.movie_id
                );
                MediaError::StoreUnavailable(format!(
                    "stored {} {} for {}/{} is negative",
                    field, value, row.user_id, row.movie_id
                ))
            })
        };
        let position_ms = offset(row.position_ms, "positionMs")?;
        let duration_ms = offset(row.duration_ms, "durationMs")?;

        Ok(Self {
            user_id: row.user_id,
            movie_id: row.movie_id,
            position_ms,
            duration_ms,
            updated_at: row.updated_at,
        })
    }
}

/// Body of `PUT /api/progress/{user_id}/{movie_id}`.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// Outcome of recording a position.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record: ProgressRecord,

    /// Whether this position also reached the durable tier.
    pub flushed: bool,
}

/// Pushed to live subscribers after every recorded position.
pub type ProgressEvent = ProgressRecord;
