//! Object storage client for published artifacts.
//!
//! The pipeline stores episode audio, cover images, and rendered RSS feeds in
//! an S3-compatible bucket. Internally every call resolves to a tri-state
//! [`StorageCode`], but the trait surface only exposes success/failure: the
//! pipeline never branches on the failure class, it just aborts the attempt.
//!
//! The client is an explicitly constructed, injected instance (one per
//! [`crate::PodcastDl`]); there is deliberately no global singleton.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};

/// Internal outcome classification for storage calls
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageCode {
    /// Request succeeded
    Ok,
    /// The backend rejected the request (4xx)
    ClientError,
    /// The request never completed (connect failure, timeout)
    TransportError,
}

impl StorageCode {
    /// Whether the call succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, StorageCode::Ok)
    }
}

/// Metadata returned by a HEAD request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object size in bytes
    pub size: i64,
    /// Entity tag, if the backend provides one
    pub etag: Option<String>,
}

/// Remote object storage operations used by the pipeline
///
/// Implementations must be cheap to share behind an `Arc` across concurrent
/// pipeline jobs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload a local file under `remote_dir`, optionally renaming it
    ///
    /// Returns the resulting remote path, or `None` if the upload failed.
    async fn upload(
        &self,
        local_path: &Path,
        remote_dir: &str,
        filename: Option<&str>,
    ) -> Option<String>;

    /// Copy an object within the bucket
    ///
    /// Returns the destination path, or `None` if the copy failed.
    async fn copy(&self, src_path: &str, dst_path: &str) -> Option<String>;

    /// Delete a remote object
    async fn delete(&self, remote_path: &str) -> StorageCode;

    /// Fetch object metadata, or `None` if the object does not exist
    async fn head(&self, remote_path: &str) -> Option<ObjectMeta>;

    /// Object size in bytes; 0 if the object is missing
    async fn size(&self, remote_path: &str) -> i64 {
        self.head(remote_path).await.map(|m| m.size).unwrap_or(0)
    }
}

/// Join a remote directory and filename into a bucket-relative path
pub fn remote_path(remote_dir: &str, filename: &str) -> String {
    let dir = remote_dir.trim_end_matches('/');
    if dir.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", dir, filename)
    }
}

/// reqwest-based client speaking plain PUT/HEAD/DELETE against an
/// S3-compatible HTTP endpoint
#[derive(Debug)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    endpoint_url: String,
}

impl HttpObjectStorage {
    /// Create a client against the given bucket endpoint
    ///
    /// The endpoint must be an absolute URL, including the bucket segment.
    pub fn new(endpoint_url: &str, request_timeout: Duration) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint_url).map_err(|e| Error::Config {
            message: format!("invalid storage endpoint {}: {}", endpoint_url, e),
            key: Some("storage.endpoint_url".to_string()),
        })?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent("podcast-dl storage client")
            .build()
            .map_err(|e| Error::Other(format!("Failed to create storage HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint_url: endpoint.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, remote: &str) -> String {
        format!("{}/{}", self.endpoint_url, remote.trim_start_matches('/'))
    }

    fn classify(status: reqwest::StatusCode) -> StorageCode {
        if status.is_success() {
            StorageCode::Ok
        } else if status.is_client_error() {
            StorageCode::ClientError
        } else {
            StorageCode::TransportError
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(
        &self,
        local_path: &Path,
        remote_dir: &str,
        filename: Option<&str>,
    ) -> Option<String> {
        let name = match filename {
            Some(name) => name.to_string(),
            None => local_path.file_name()?.to_string_lossy().into_owned(),
        };
        let dst = remote_path(remote_dir, &name);

        // Stream the body; episode audio is far too large to buffer whole
        let file = match tokio::fs::File::open(local_path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(path = %local_path.display(), error = %e, "Failed to open upload source");
                return None;
            }
        };
        let size = match file.metadata().await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::error!(path = %local_path.display(), error = %e, "Failed to stat upload source");
                return None;
            }
        };

        let response = self
            .client
            .put(self.object_url(&dst))
            .header(reqwest::header::CONTENT_TYPE, guess_mime(&name))
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await;

        match response {
            Ok(resp) if Self::classify(resp.status()).is_ok() => {
                tracing::info!(remote = %dst, "File uploaded");
                Some(dst)
            }
            Ok(resp) => {
                tracing::error!(remote = %dst, status = %resp.status(), "Upload rejected by storage backend");
                None
            }
            Err(e) => {
                tracing::error!(remote = %dst, error = %e, "Upload transport error");
                None
            }
        }
    }

    async fn copy(&self, src_path: &str, dst_path: &str) -> Option<String> {
        let response = self
            .client
            .put(self.object_url(dst_path))
            .header("x-amz-copy-source", format!("/{}", src_path))
            .send()
            .await;

        match response {
            Ok(resp) if Self::classify(resp.status()).is_ok() => {
                tracing::info!(src = %src_path, dst = %dst_path, "File copied");
                Some(dst_path.to_string())
            }
            Ok(resp) => {
                tracing::error!(src = %src_path, dst = %dst_path, status = %resp.status(), "Copy rejected by storage backend");
                None
            }
            Err(e) => {
                tracing::error!(src = %src_path, dst = %dst_path, error = %e, "Copy transport error");
                None
            }
        }
    }

    async fn delete(&self, remote_path: &str) -> StorageCode {
        match self.client.delete(self.object_url(remote_path)).send().await {
            Ok(resp) => {
                let code = Self::classify(resp.status());
                if !code.is_ok() {
                    tracing::warn!(remote = %remote_path, status = %resp.status(), "Delete failed");
                }
                code
            }
            Err(e) => {
                tracing::warn!(remote = %remote_path, error = %e, "Delete transport error");
                StorageCode::TransportError
            }
        }
    }

    async fn head(&self, remote_path: &str) -> Option<ObjectMeta> {
        let response = self
            .client
            .head(self.object_url(remote_path))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(remote = %remote_path, status = %response.status(), "Object not found on storage");
            return None;
        }

        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());

        Some(ObjectMeta { size, etag })
    }
}

fn guess_mime(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("mp3") => "audio/mpeg",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("xml") => "application/rss+xml",
        _ => "application/octet-stream",
    }
}
