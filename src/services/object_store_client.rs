//! src/services/object_store_client.rs
//!
//! ObjectStoreClient — the only surface through which the relay and the
//! upload issuer touch the remote object store. The production implementation
//! wraps the `object_store` crate (S3 / R2 compatible); tests run the same
//! code against `object_store::memory::InMemory`.
//!
//! Every call is bounded by a deadline and nothing is retried here.

use crate::{
    errors::{MediaError, MediaResult},
    models::media::MediaObjectRef,
};
use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use object_store::{
    Attribute, Attributes, GetOptions, GetRange, ObjectStore, PutMultipartOptions,
    WriteMultipart,
    aws::AmazonS3Builder,
    path::Path,
    signer::Signer,
};
use std::{future::Future, io, ops::Range, sync::Arc, time::Duration};
use tracing::debug;

/// Streamed object payload. Dropping it releases the upstream connection.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Number of multipart parts allowed in flight while streaming an upload.
const MAX_INFLIGHT_PARTS: usize = 4;

/// Body of a (possibly ranged) read.
pub struct ObjectBody {
    pub stream: ByteStream,

    /// Size of the whole object, not of the served slice.
    pub total_size: u64,

    pub content_type: Option<String>,

    /// Byte range the store actually served, end exclusive.
    pub range: Range<u64>,
}

#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Bucket this client reads from and writes to.
    fn bucket(&self) -> &str;

    /// Metadata only.
    async fn head(&self, key: &str) -> MediaResult<MediaObjectRef>;

    /// Read `[start, end]` inclusive; `end = None` reads through EOF.
    async fn get_range(&self, key: &str, start: u64, end: Option<u64>) -> MediaResult<ObjectBody>;

    /// Stream `body` into `key`, returning the number of bytes written.
    async fn put_object(&self, key: &str, body: ByteStream, content_type: &str) -> MediaResult<u64>;

    /// Signed URL allowing one PUT to `key` until `ttl` elapses.
    async fn presign_put(&self, key: &str, content_type: &str, ttl: Duration)
    -> MediaResult<String>;
}

/// Connection settings for an S3-compatible store.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// `ObjectStoreClient` over any `object_store` backend.
#[derive(Clone)]
pub struct CloudObjectStore {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    bucket: String,
    timeout: Duration,
}

impl CloudObjectStore {
    /// Wrap an existing backend. Without a `signer`, `presign_put` fails with
    /// `ConfigError`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        signer: Option<Arc<dyn Signer>>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            signer,
            bucket: bucket.into(),
            timeout,
        }
    }

    /// Build an S3 / R2 client. Missing credentials are a configuration
    /// error, not something to discover per request.
    pub fn s3(settings: &S3Settings, timeout: Duration) -> MediaResult<Self> {
        let access_key = settings
            .access_key_id
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MediaError::ConfigError("missing S3 access key id".into()))?;
        let secret_key = settings
            .secret_access_key
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MediaError::ConfigError("missing S3 secret access key".into()))?;

        let mut builder = AmazonS3Builder::new()
            .with_region(&settings.region)
            .with_bucket_name(&settings.bucket)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            // Path-style URLs (http://host/bucket/key) work for R2 and MinIO alike
            .with_virtual_hosted_style_request(false);
        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let s3 = Arc::new(
            builder
                .build()
                .map_err(|err| MediaError::ConfigError(err.to_string()))?,
        );

        Ok(Self::new(
            s3.clone(),
            Some(s3),
            settings.bucket.clone(),
            timeout,
        ))
    }

    /// Run a store call under the deadline and classify its failure.
    async fn bounded<T, F>(&self, op: &str, key: &str, fut: F) -> MediaResult<T>
    where
        F: Future<Output = object_store::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(object_store::Error::NotFound { .. })) => {
                Err(MediaError::NotFound(key.to_string()))
            }
            Ok(Err(err)) => Err(MediaError::StoreUnavailable(format!(
                "{} `{}`: {}",
                op, key, err
            ))),
            Err(_) => Err(MediaError::StoreUnavailable(format!(
                "{} `{}` exceeded {:?}",
                op, key, self.timeout
            ))),
        }
    }
}

#[async_trait]
impl ObjectStoreClient for CloudObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head(&self, key: &str) -> MediaResult<MediaObjectRef> {
        let path = Path::from(key);
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self
            .bounded("head", key, self.store.get_opts(&path, options))
            .await?;

        Ok(MediaObjectRef {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_length: result.meta.size,
            content_type: content_type_of(&result.attributes),
        })
    }

    async fn get_range(&self, key: &str, start: u64, end: Option<u64>) -> MediaResult<ObjectBody> {
        let range = match (start, end) {
            (0, None) => None,
            (start, None) => Some(GetRange::Offset(start)),
            (start, Some(end)) => Some(GetRange::Bounded(start..end.saturating_add(1))),
        };
        let path = Path::from(key);
        let options = GetOptions {
            range,
            ..Default::default()
        };
        let result = self
            .bounded("get", key, self.store.get_opts(&path, options))
            .await?;

        let total_size = result.meta.size;
        let content_type = content_type_of(&result.attributes);
        let served = result.range.clone();
        debug!(
            "opened read of `{}` bytes {}..{} of {}",
            key, served.start, served.end, total_size
        );

        let stream = result
            .into_stream()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
            .boxed();

        Ok(ObjectBody {
            stream,
            total_size,
            content_type,
            range: served,
        })
    }

    async fn put_object(
        &self,
        key: &str,
        mut body: ByteStream,
        content_type: &str,
    ) -> MediaResult<u64> {
        let path = Path::from(key);
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutMultipartOptions {
            attributes,
            ..Default::default()
        };

        let upload = self
            .bounded(
                "put",
                key,
                self.store.put_multipart_opts(&path, options),
            )
            .await?;
        let mut writer = WriteMultipart::new(upload);

        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = writer.abort().await;
                    return Err(MediaError::StoreUnavailable(format!(
                        "upload body for `{}` failed: {}",
                        key, err
                    )));
                }
            };
            if let Err(err) = self
                .bounded("put", key, writer.wait_for_capacity(MAX_INFLIGHT_PARTS))
                .await
            {
                let _ = writer.abort().await;
                return Err(err);
            }
            written += chunk.len() as u64;
            writer.write(&chunk);
        }

        self.bounded("put", key, writer.finish()).await?;
        debug!("stored `{}` ({} bytes, {})", key, written, content_type);
        Ok(written)
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> MediaResult<String> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            MediaError::ConfigError("object store has no signing credentials".into())
        })?;

        let path = Path::from(key);
        let url = self
            .bounded("presign", key, signer.signed_url(Method::PUT, &path, ttl))
            .await?;
        debug!("presigned PUT for `{}` ({}) valid {:?}", key, content_type, ttl);
        Ok(url.to_string())
    }
}

fn content_type_of(attributes: &Attributes) -> Option<String> {
    attributes
        .get(&Attribute::ContentType)
        .map(|value| value.to_string())
}
