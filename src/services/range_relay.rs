//! src/services/range_relay.rs
//!
//! RangeStreamRelay — turns `(key, Range header)` into a response descriptor
//! whose body streams straight from the object store. Nothing is buffered or
//! cached; a slow client slows the upstream read through hyper's backpressure.

use crate::{
    errors::{MediaError, MediaResult},
    models::media::{RangeRequest, RangeStatus, ResolvedRange},
    services::object_store_client::{ByteStream, ObjectStoreClient},
};
use futures::{StreamExt, stream};
use std::{io, sync::Arc, time::Duration};
use tracing::{debug, warn};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Everything the HTTP layer needs to answer a streaming request.
pub struct RangeResponse {
    pub status: RangeStatus,

    /// Present for `Partial` responses only.
    pub content_range: Option<ResolvedRange>,

    pub content_length: u64,
    pub content_type: String,
    pub body: ByteStream,
}

#[derive(Clone)]
pub struct RangeStreamRelay {
    store: Arc<dyn ObjectStoreClient>,

    /// Longest wait for a single upstream chunk before the stream is cut.
    idle_timeout: Duration,
}

impl RangeStreamRelay {
    pub fn new(store: Arc<dyn ObjectStoreClient>, idle_timeout: Duration) -> Self {
        Self {
            store,
            idle_timeout,
        }
    }

    /// Serve `key`, honoring at most one byte range.
    ///
    /// An unparseable or unsatisfiable range is an error; it never degrades
    /// into a full-object response.
    pub async fn relay(&self, key: &str, range_header: Option<&str>) -> MediaResult<RangeResponse> {
        let Some(raw) = range_header else {
            return self.relay_full(key).await;
        };

        let request = RangeRequest::parse(raw)?;
        if request.end.is_some_and(|end| end < request.start) {
            let inverted = MediaError::MalformedRange(format!("inverted range `{}`", raw));
            return Err(self.classify_refused(key, &request, inverted).await);
        }

        // one round trip: the ranged read reports the object size
        let body = match self.store.get_range(key, request.start, request.end).await {
            Ok(body) => body,
            Err(err @ MediaError::StoreUnavailable(_)) => {
                return Err(self.classify_refused(key, &request, err).await);
            }
            Err(err) => return Err(err),
        };

        let range = request.resolve(body.total_size)?;
        if body.range != (range.start..range.end + 1) {
            return Err(MediaError::StoreUnavailable(format!(
                "`{}` served {}..{} for range {}",
                key,
                body.range.start,
                body.range.end,
                range.content_range()
            )));
        }

        let content_type = body
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(RangeResponse {
            status: RangeStatus::Partial,
            content_range: Some(range),
            content_length: range.len(),
            content_type,
            body: self.guard(key, body.stream),
        })
    }

    /// The store refused a range read. Stores reject a start past EOF
    /// without reporting the size, so HEAD decides between 416 and `cause`.
    async fn classify_refused(
        &self,
        key: &str,
        request: &RangeRequest,
        cause: MediaError,
    ) -> MediaError {
        match self.store.head(key).await {
            Ok(object) => match request.resolve(object.content_length) {
                Err(err) => err,
                Ok(_) => cause,
            },
            Err(err) => err,
        }
    }

    async fn relay_full(&self, key: &str) -> MediaResult<RangeResponse> {
        let body = self.store.get_range(key, 0, None).await?;

        Ok(RangeResponse {
            status: RangeStatus::Full,
            content_range: None,
            content_length: body.total_size,
            content_type: body
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body: self.guard(key, body.stream),
        })
    }

    /// Wrap the upstream read so it is released on every exit path and a
    /// stalled upstream ends the response instead of hanging it.
    fn guard(&self, key: &str, upstream: ByteStream) -> ByteStream {
        let read = ScopedRead {
            key: key.to_string(),
            upstream,
            sent: 0,
        };
        let idle_timeout = self.idle_timeout;

        stream::unfold(Some(read), move |state| async move {
            let mut read = state?;
            match tokio::time::timeout(idle_timeout, read.upstream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    read.sent += chunk.len() as u64;
                    Some((Ok(chunk), Some(read)))
                }
                Ok(Some(Err(err))) => {
                    warn!("upstream read of `{}` failed: {}", read.key, err);
                    Some((Err(err), None))
                }
                Ok(None) => None,
                Err(_) => {
                    warn!(
                        "upstream read of `{}` stalled for {:?}",
                        read.key, idle_timeout
                    );
                    Some((
                        Err(io::Error::new(io::ErrorKind::TimedOut, "upstream read stalled")),
                        None,
                    ))
                }
            }
        })
        .boxed()
    }
}

/// One outbound object read, owned for the lifetime of a response body.
struct ScopedRead {
    key: String,
    upstream: ByteStream,
    sent: u64,
}

impl Drop for ScopedRead {
    fn drop(&mut self) {
        debug!("released read of `{}` after {} bytes", self.key, self.sent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::media::MediaObjectRef,
        services::object_store_client::{CloudObjectStore, ObjectBody},
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use object_store::memory::InMemory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls that reach the store.
    struct CountingStore {
        inner: CloudObjectStore,
        heads: AtomicUsize,
        gets: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> (usize, usize) {
            (
                self.heads.load(Ordering::SeqCst),
                self.gets.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl ObjectStoreClient for CountingStore {
        fn bucket(&self) -> &str {
            self.inner.bucket()
        }

        async fn head(&self, key: &str) -> MediaResult<MediaObjectRef> {
            self.heads.fetch_add(1, Ordering::SeqCst);
            self.inner.head(key).await
        }

        async fn get_range(
            &self,
            key: &str,
            start: u64,
            end: Option<u64>,
        ) -> MediaResult<ObjectBody> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get_range(key, start, end).await
        }

        async fn put_object(
            &self,
            key: &str,
            body: ByteStream,
            content_type: &str,
        ) -> MediaResult<u64> {
            self.inner.put_object(key, body, content_type).await
        }

        async fn presign_put(
            &self,
            key: &str,
            content_type: &str,
            ttl: Duration,
        ) -> MediaResult<String> {
            self.inner.presign_put(key, content_type, ttl).await
        }
    }

    async fn counting_store(key: &str, data: Vec<u8>) -> Arc<CountingStore> {
        let inner = CloudObjectStore::new(
            Arc::new(InMemory::new()),
            None,
            "media",
            Duration::from_secs(5),
        );
        inner
            .put_object(
                key,
                stream::iter(vec![Ok(Bytes::from(data))]).boxed(),
                "video/mp4",
            )
            .await
            .unwrap();
        Arc::new(CountingStore {
            inner,
            heads: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
        })
    }

    async fn relay_with(key: &str, data: Vec<u8>) -> RangeStreamRelay {
        let store = CloudObjectStore::new(
            Arc::new(InMemory::new()),
            None,
            "media",
            Duration::from_secs(5),
        );
        store
            .put_object(
                key,
                stream::iter(vec![Ok(Bytes::from(data))]).boxed(),
                "video/mp4",
            )
            .await
            .unwrap();
        RangeStreamRelay::new(Arc::new(store), Duration::from_secs(5))
    }

    fn thousand_bytes() -> Vec<u8> {
        (0..1000u32).map(|i| (i % 251) as u8).collect()
    }

    async fn collect(body: ByteStream) -> Vec<u8> {
        body.try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn no_range_serves_whole_object() {
        let data = thousand_bytes();
        let relay = relay_with("movie.mp4", data.clone()).await;

        let resp = relay.relay("movie.mp4", None).await.unwrap();
        assert_eq!(resp.status, RangeStatus::Full);
        assert_eq!(resp.content_length, 1000);
        assert!(resp.content_range.is_none());
        assert_eq!(resp.content_type, "video/mp4");
        assert_eq!(collect(resp.body).await, data);
    }

    #[tokio::test]
    async fn single_byte_range() {
        let data = thousand_bytes();
        let relay = relay_with("movie.mp4", data.clone()).await;

        let resp = relay.relay("movie.mp4", Some("bytes=0-0")).await.unwrap();
        assert_eq!(resp.status, RangeStatus::Partial);
        assert_eq!(resp.content_length, 1);
        assert_eq!(resp.content_range.unwrap().content_range(), "bytes 0-0/1000");
        assert_eq!(collect(resp.body).await, &data[..1]);
    }

    #[tokio::test]
    async fn open_range_serves_tail() {
        let data = thousand_bytes();
        let relay = relay_with("movie.mp4", data.clone()).await;

        let resp = relay.relay("movie.mp4", Some("bytes=500-")).await.unwrap();
        assert_eq!(resp.status, RangeStatus::Partial);
        assert_eq!(resp.content_length, 500);
        assert_eq!(
            resp.content_range.unwrap().content_range(),
            "bytes 500-999/1000"
        );
        assert_eq!(collect(resp.body).await, &data[500..]);
    }

    #[tokio::test]
    async fn overlong_end_is_clamped() {
        let data = thousand_bytes();
        let relay = relay_with("movie.mp4", data.clone()).await;

        let resp = relay
            .relay("movie.mp4", Some("bytes=990-5000"))
            .await
            .unwrap();
        assert_eq!(resp.content_length, 10);
        assert_eq!(collect(resp.body).await, &data[990..]);
    }

    #[tokio::test]
    async fn invalid_ranges_never_fall_back_to_full() {
        let relay = relay_with("movie.mp4", thousand_bytes()).await;

        for header in ["bytes=0-1,5-6", "bytes=-100", "bytes=x-", "bytes=10-5"] {
            assert!(matches!(
                relay.relay("movie.mp4", Some(header)).await,
                Err(MediaError::MalformedRange(_))
            ));
        }
        assert!(matches!(
            relay.relay("movie.mp4", Some("bytes=1000-")).await,
            Err(MediaError::RangeNotSatisfiable { total_size: 1000 })
        ));
    }

    #[tokio::test]
    async fn seek_is_a_single_store_read() {
        let data = thousand_bytes();
        let store = counting_store("movie.mp4", data.clone()).await;
        let relay = RangeStreamRelay::new(store.clone(), Duration::from_secs(5));

        let resp = relay.relay("movie.mp4", Some("bytes=200-299")).await.unwrap();
        assert_eq!(store.calls(), (0, 1));
        assert_eq!(
            resp.content_range.unwrap().content_range(),
            "bytes 200-299/1000"
        );
        assert_eq!(resp.content_type, "video/mp4");
        assert_eq!(collect(resp.body).await, &data[200..300]);

        let resp = relay.relay("movie.mp4", Some("bytes=990-5000")).await.unwrap();
        assert_eq!(store.calls(), (0, 2));
        assert_eq!(resp.content_length, 10);
    }

    #[tokio::test]
    async fn refused_ranges_are_classified_by_size() {
        let store = counting_store("movie.mp4", thousand_bytes()).await;
        let relay = RangeStreamRelay::new(store.clone(), Duration::from_secs(5));

        // start past EOF wins over an inverted range
        assert!(matches!(
            relay.relay("movie.mp4", Some("bytes=2000-5")).await,
            Err(MediaError::RangeNotSatisfiable { total_size: 1000 })
        ));
        assert!(matches!(
            relay.relay("movie.mp4", Some("bytes=5000-")).await,
            Err(MediaError::RangeNotSatisfiable { total_size: 1000 })
        ));
        assert!(matches!(
            relay.relay("movie.mp4", Some("bytes=10-5")).await,
            Err(MediaError::MalformedRange(_))
        ));
    }

    #[tokio::test]
    async fn range_on_empty_object_is_unsatisfiable() {
        let relay = relay_with("empty.mp4", Vec::new()).await;
        assert!(matches!(
            relay.relay("empty.mp4", Some("bytes=0-")).await,
            Err(MediaError::RangeNotSatisfiable { total_size: 0 })
        ));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let relay = relay_with("movie.mp4", thousand_bytes()).await;
        assert!(matches!(
            relay.relay("other.mp4", Some("bytes=0-")).await,
            Err(MediaError::NotFound(_))
        ));
        assert!(matches!(
            relay.relay("other.mp4", None).await,
            Err(MediaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stalled_upstream_ends_the_stream() {
        let relay = relay_with("movie.mp4", thousand_bytes()).await;
        let relay = RangeStreamRelay::new(relay.store.clone(), Duration::from_millis(20));
        let upstream: ByteStream = stream::pending().boxed();

        let mut body = relay.guard("stuck.mp4", upstream);
        let err = body.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(body.next().await.is_none());
    }
}
