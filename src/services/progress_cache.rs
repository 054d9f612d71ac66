//! src/services/progress_cache.rs
//!
//! Ephemeral tier for watch progress: the latest position per user/movie,
//! expiring after a TTL that every write refreshes.
//!
//! Redis is the shared backend so every server instance sees the same value.
//! `MemoryProgressCache` keeps the same contract inside one process and is
//! only suitable for a single instance (and for tests).

use crate::{errors::MediaResult, models::progress::ProgressRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::warn;

#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Backend name for logs and readiness output.
    fn backend(&self) -> &'static str;

    /// Overwrite the cached record and restart its TTL.
    async fn put(&self, record: &ProgressRecord, ttl: Duration) -> MediaResult<()>;

    /// Cached record, if present and not expired.
    async fn get(&self, user_id: &str, movie_id: &str) -> MediaResult<Option<ProgressRecord>>;

    /// Cheap reachability check.
    async fn ping(&self) -> MediaResult<()>;
}

/// `progress:{user}:{movie}` with `%` and `:` escaped inside each id, so
/// distinct pairs never share a key.
fn cache_key(user_id: &str, movie_id: &str) -> String {
    format!("progress:{}:{}", escape_id(user_id), escape_id(movie_id))
}

fn escape_id(id: &str) -> String {
    id.replace('%', "%25").replace(':', "%3A")
}

/// Redis hash per record: `position`, `duration`, `updatedAt`.
#[derive(Clone)]
pub struct RedisProgressCache {
    conn: ConnectionManager,
}

impl RedisProgressCache {
    pub async fn connect(url: &str) -> MediaResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ProgressCache for RedisProgressCache {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn put(&self, record: &ProgressRecord, ttl: Duration) -> MediaResult<()> {
        let key = cache_key(&record.user_id, &record.movie_id);
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("position")
            .arg(record.position_ms)
            .arg("duration")
            .arg(record.duration_ms)
            .arg("updatedAt")
            .arg(record.updated_at.to_rfc3339())
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl.as_secs())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, user_id: &str, movie_id: &str) -> MediaResult<Option<ProgressRecord>> {
        let key = cache_key(user_id, movie_id);
        let mut conn = self.conn.clone();

        let fields: HashMap<String, String> =
            redis::cmd("HGETALL").arg(&key).query_async(&mut conn).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let record = decode_fields(user_id, movie_id, &fields);
        if record.is_none() {
            warn!("ignoring unreadable cache entry `{}`: {:?}", key, fields);
        }
        Ok(record)
    }

    async fn ping(&self) -> MediaResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn decode_fields(
    user_id: &str,
    movie_id: &str,
    fields: &HashMap<String, String>,
) -> Option<ProgressRecord> {
    let position_ms = fields.get("position")?.parse().ok()?;
    let duration_ms = fields.get("duration")?.parse().ok()?;
    let updated_at = DateTime::parse_from_rfc3339(fields.get("updatedAt")?)
        .ok()?
        .with_timezone(&Utc);

    Some(ProgressRecord {
        user_id: user_id.to_string(),
        movie_id: movie_id.to_string(),
        position_ms,
        duration_ms,
        updated_at,
    })
}

/// In-process TTL map with the Redis cache's semantics.
#[derive(Default)]
pub struct MemoryProgressCache {
    entries: RwLock<HashMap<String, (ProgressRecord, Instant)>>,
}

impl MemoryProgressCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressCache for MemoryProgressCache {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, record: &ProgressRecord, ttl: Duration) -> MediaResult<()> {
        let key = cache_key(&record.user_id, &record.movie_id);
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        // sweep on write so keys that are never read again still expire
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key, (record.clone(), now + ttl));
        Ok(())
    }

    async fn get(&self, user_id: &str, movie_id: &str) -> MediaResult<Option<ProgressRecord>> {
        let key = cache_key(user_id, movie_id);
        let now = Instant::now();

        if let Some((record, expires_at)) = self.entries.read().await.get(&key) {
            if *expires_at > now {
                return Ok(Some(record.clone()));
            }
        } else {
            return Ok(None);
        }

        // expired
        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(|(_, expires_at)| *expires_at <= now) {
            entries.remove(&key);
        }
        Ok(None)
    }

    async fn ping(&self) -> MediaResult<()> {
        Ok(())
    }
}
