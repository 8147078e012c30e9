//! Blob storage for notice documents.
//!
//! Layout inside the bucket:
//! ```text
//! {source_external_id}/metadados.json
//! {source_external_id}/{hash8}_{safe_name}.pdf
//! ```
//! Filenames are ASCII-only after Unicode decomposition.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

/// Storage operation result type.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage client build failed: {0}")]
    Build(reqwest::Error),

    #[error("Storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upload of '{path}' rejected with HTTP {status}")]
    Upload { path: String, status: u16 },

    #[error("Storage is not configured")]
    NotConfigured,
}

/// Supabase Storage REST client. Uploads are idempotent (`x-upsert`), so a
/// reprocessed notice simply overwrites its previous blobs.
pub struct StorageClient {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl StorageClient {
    pub fn new(supabase_url: &str, service_key: &str, bucket: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(StorageError::Build)?;
        Ok(Self {
            client,
            base_url: supabase_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
        })
    }

    /// Uploads are silently skipped (returning `NotConfigured`) when the
    /// credentials are absent; local runs work without a bucket.
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.service_key.is_empty()
    }

    /// Upload the main PDF; returns the storage path recorded on the row.
    pub async fn upload_pdf(
        &self,
        source_external_id: &str,
        hash_hex: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let path = pdf_object_path(source_external_id, hash_hex, file_name);
        self.put_object(&path, "application/pdf", bytes).await?;
        Ok(path)
    }

    /// Upload the companion `metadados.json` for a notice.
    pub async fn upload_metadata(
        &self,
        source_external_id: &str,
        metadata: &Value,
    ) -> Result<String> {
        let path = format!("{}/metadados.json", sanitize_segment(source_external_id));
        let body = serde_json::to_vec(metadata).unwrap_or_default();
        self.put_object(&path, "application/json", body).await?;
        Ok(path)
    }

    async fn put_object(&self, path: &str, content_type: &str, body: Vec<u8>) -> Result<()> {
        if !self.is_configured() {
            return Err(StorageError::NotConfigured);
        }
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(path, status = status.as_u16(), "storage upload rejected");
            return Err(StorageError::Upload {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(path, "object stored");
        Ok(())
    }
}

/// `{external_id}/{hash8}_{safe_name}.pdf`
pub fn pdf_object_path(source_external_id: &str, hash_hex: &str, file_name: &str) -> String {
    let hash8 = &hash_hex[..hash_hex.len().min(8)];
    let mut safe = sanitize_segment(file_name);
    if !safe.to_lowercase().ends_with(".pdf") {
        safe.push_str(".pdf");
    }
    format!("{}/{}_{}", sanitize_segment(source_external_id), hash8, safe)
}

/// ASCII-only object path segment: decompose, drop combining marks, map
/// anything outside `[A-Za-z0-9._-]` to `_`.
pub fn sanitize_segment(raw: &str) -> String {
    let decomposed: String = raw
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();
    let sanitized: String = decomposed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
