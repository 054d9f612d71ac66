//! src/services/progress_sync.rs
//!
//! ProgressSyncEngine — keeps the ephemeral and durable progress tiers in
//! step under continuous position updates from players.
//!
//! - Every update is written through to the cache (TTL refreshed).
//! - An update reaches the durable store only when the reported position is
//!   a multiple of the flush interval. The decision depends on the position
//!   alone, never on wall-clock time, so repeated or concurrent updates with
//!   the same position make the same decision and the flush is idempotent.
//! - Reads are cache-first with a durable fallback.
//!
//! The durable tier may lag the cache, never lead it: both writes of one
//! update share a timestamp and the cache is written first. Concurrent
//! sessions of the same user/movie are last-writer-wins and not told apart.

use crate::{
    errors::{MediaError, MediaResult},
    models::progress::{ProgressEvent, ProgressRecord, RecordOutcome},
    services::{progress_cache::ProgressCache, progress_store::ProgressStore},
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Durable flush happens at positions that are multiples of this.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;

/// Cache entries live this long after their last update.
pub const CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Buffered events per subscriber before the slowest one starts skipping.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct ProgressSyncConfig {
    pub flush_interval_ms: u64,
    pub cache_ttl: Duration,
}

impl Default for ProgressSyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            cache_ttl: CACHE_TTL,
        }
    }
}

/// Decimation rule: flush iff the position is an exact multiple of the
/// interval. A zero interval never flushes.
pub fn should_flush(position_ms: u64, flush_interval_ms: u64) -> bool {
    position_ms
        .checked_rem(flush_interval_ms)
        .is_some_and(|rem| rem == 0)
}

#[derive(Clone)]
pub struct ProgressSyncEngine {
    cache: Arc<dyn ProgressCache>,
    store: ProgressStore,
    events: broadcast::Sender<ProgressEvent>,
    config: ProgressSyncConfig,
}

impl ProgressSyncEngine {
    pub fn new(
        cache: Arc<dyn ProgressCache>,
        store: ProgressStore,
        config: ProgressSyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            cache,
            store,
            events,
            config,
        }
    }

    pub fn cache(&self) -> &dyn ProgressCache {
        self.cache.as_ref()
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Record a reported playback position.
    pub async fn record(
        &self,
        user_id: &str,
        movie_id: &str,
        position_ms: u64,
        duration_ms: u64,
    ) -> MediaResult<RecordOutcome> {
        ensure_id("userId", user_id)?;
        ensure_id("movieId", movie_id)?;

        let record = ProgressRecord {
            user_id: user_id.to_string(),
            movie_id: movie_id.to_string(),
            position_ms,
            duration_ms,
            updated_at: Utc::now(),
        };

        self.cache.put(&record, self.config.cache_ttl).await?;

        let flushed = should_flush(position_ms, self.config.flush_interval_ms);
        if flushed {
            self.store.upsert(&record).await?;
        }

        // at-most-once: no subscribers is not an error, and a lost event is
        // superseded by the next update
        if self.events.send(record.clone()).is_err() {
            trace!("no progress subscribers for {}/{}", user_id, movie_id);
        }

        Ok(RecordOutcome { record, flushed })
    }

    /// Latest known position: cache first, then the durable snapshot.
    /// `None` means the player should start from zero.
    pub async fn fetch(&self, user_id: &str, movie_id: &str) -> MediaResult<Option<ProgressRecord>> {
        ensure_id("userId", user_id)?;
        ensure_id("movieId", movie_id)?;

        if let Some(record) = self.cache.get(user_id, movie_id).await? {
            return Ok(Some(record));
        }

        let record = self.store.get(user_id, movie_id).await?;
        if record.is_some() {
            debug!("progress {}/{} served from durable tier", user_id, movie_id);
        }
        Ok(record)
    }

    /// Live feed of every recorded position.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }
}

fn ensure_id(field: &str, value: &str) -> MediaResult<()> {
    if value.trim().is_empty() {
        return Err(MediaError::InvalidInput(format!("{} is empty", field)));
    }
    Ok(())
}
