//! Upload descriptors handed to trusted callers for direct-to-store uploads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scoped, time-limited permission to PUT one object.
///
/// Never persisted: once the caller uploads, the object store itself is the
/// record that the upload happened.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    /// Key the caller must upload to (`folder/<uuid>/<file name>`).
    pub object_key: String,

    /// Signed PUT URL.
    pub upload_url: String,

    /// Where the object will be readable once uploaded.
    pub public_url: String,

    /// After this instant the signed URL is rejected by the store.
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /api/upload/presigned`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicketRequest {
    pub file_name: String,
    pub content_type: String,
    pub folder: Option<String>,
}

/// Result of a server-side upload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}
