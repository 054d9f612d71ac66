//! src/services/upload_tickets.rs
//!
//! UploadTicketIssuer — hands out presigned PUT URLs so large media goes
//! straight to the object store. The issuer never sees the payload and does
//! not track whether an upload ever happens.

use crate::{
    errors::{MediaError, MediaResult},
    models::upload::{StoredObject, UploadTicket},
    services::object_store_client::{ByteStream, ObjectStoreClient},
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::info;
use uuid::Uuid;

/// Lifetime of a presigned upload URL.
pub const UPLOAD_TICKET_TTL: Duration = Duration::from_secs(15 * 60);

/// Folder used when the caller does not name one.
pub const DEFAULT_UPLOAD_FOLDER: &str = "uploads";

const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Clone)]
pub struct UploadTicketIssuer {
    store: Arc<dyn ObjectStoreClient>,
    public_base_url: String,
}

impl UploadTicketIssuer {
    pub fn new(store: Arc<dyn ObjectStoreClient>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            store,
            public_base_url,
        }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// Issue a ticket for one direct upload of `file_name` into `folder`.
    pub async fn issue(
        &self,
        file_name: &str,
        content_type: &str,
        folder: &str,
    ) -> MediaResult<UploadTicket> {
        ensure_content_type(content_type)?;
        let key = object_key(folder, file_name)?;

        let issued_at = Utc::now();
        let upload_url = self
            .store
            .presign_put(&key, content_type, UPLOAD_TICKET_TTL)
            .await?;
        let expires_at = issued_at
            + chrono::Duration::from_std(UPLOAD_TICKET_TTL)
                .map_err(|err| MediaError::ConfigError(err.to_string()))?;

        info!("issued upload ticket for `{}` until {}", key, expires_at);

        Ok(UploadTicket {
            public_url: self.public_url(&key),
            object_key: key,
            upload_url,
            expires_at,
        })
    }

    /// Upload through the server instead of a ticket. Meant for small assets
    /// such as thumbnails; keys follow the same rules as tickets.
    pub async fn store_object(
        &self,
        file_name: &str,
        content_type: &str,
        folder: &str,
        body: ByteStream,
    ) -> MediaResult<StoredObject> {
        ensure_content_type(content_type)?;
        let key = object_key(folder, file_name)?;

        let size = self.store.put_object(&key, body, content_type).await?;
        info!("stored `{}` ({} bytes)", key, size);

        Ok(StoredObject {
            url: self.public_url(&key),
            key,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

/// Build `folder/<uuid>/<file_name>`. The UUID segment makes keys
/// collision-free without consulting the store.
fn object_key(folder: &str, file_name: &str) -> MediaResult<String> {
    ensure_folder_safe(folder)?;
    ensure_file_name_safe(file_name)?;
    Ok(format!("{}/{}/{}", folder, Uuid::new_v4(), file_name))
}

/// A file name is a single path segment: no separators, no traversal.
fn ensure_file_name_safe(file_name: &str) -> MediaResult<()> {
    if file_name.trim().is_empty() {
        return Err(MediaError::InvalidInput("file name is empty".into()));
    }
    if file_name.len() > MAX_FILE_NAME_LEN {
        return Err(MediaError::InvalidInput("file name is too long".into()));
    }
    if file_name.contains("..") || file_name.contains('/') || file_name.contains('\\') {
        return Err(MediaError::InvalidInput(format!(
            "file name `{}` must not contain path separators or `..`",
            file_name
        )));
    }
    if file_name.chars().any(char::is_control) {
        return Err(MediaError::InvalidInput(
            "file name contains control characters".into(),
        ));
    }
    Ok(())
}

/// Folders may nest (`videos/raw`) but must stay relative and normalized.
fn ensure_folder_safe(folder: &str) -> MediaResult<()> {
    if folder.is_empty() {
        return Err(MediaError::InvalidInput("folder is empty".into()));
    }
    if folder.starts_with('/') || folder.ends_with('/') {
        return Err(MediaError::InvalidInput(format!(
            "folder `{}` must not start or end with `/`",
            folder
        )));
    }
    if folder.contains('\\') || folder.chars().any(char::is_control) {
        return Err(MediaError::InvalidInput(format!(
            "folder `{}` contains invalid characters",
            folder
        )));
    }
    if folder
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment.contains(".."))
    {
        return Err(MediaError::InvalidInput(format!(
            "folder `{}` is not a normalized relative path",
            folder
        )));
    }
    Ok(())
}

fn ensure_content_type(content_type: &str) -> MediaResult<()> {
    if content_type.trim().is_empty() {
        return Err(MediaError::InvalidInput("content type is empty".into()));
    }
    Ok(())
}
