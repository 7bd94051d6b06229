//! CLI-based media provider using the external yt-dlp binary.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::error::ProviderError;

use super::{MediaProvider, ProgressHook};

/// Interval between output-size polls while yt-dlp runs
const FETCH_WATCH_INTERVAL: Duration = Duration::from_millis(500);

/// Media provider shelling out to yt-dlp
///
/// yt-dlp handles both YouTube and Yandex Music URLs, extracting the best
/// available audio stream. Cover thumbnails are plain HTTP downloads.
pub struct YtDlpProvider {
    binary_path: PathBuf,
    http_client: reqwest::Client,
}

impl YtDlpProvider {
    /// Create a provider with an explicit yt-dlp path
    pub fn new(binary_path: PathBuf) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("podcast-dl cover fetcher")
            .build()
            .map_err(|e| ProviderError::FetchFailed {
                source_id: String::new(),
                details: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            binary_path,
            http_client,
        })
    }

    /// Discover yt-dlp in PATH, or use the explicit path when configured
    pub fn from_config(explicit_path: Option<&Path>) -> Result<Self, ProviderError> {
        let binary_path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => which::which("yt-dlp")
                .map_err(|e| ProviderError::BinaryNotFound(format!("yt-dlp: {}", e)))?,
        };
        Self::new(binary_path)
    }
}

#[async_trait]
impl MediaProvider for YtDlpProvider {
    async fn fetch_audio(
        &self,
        watch_url: &str,
        source_id: &str,
        dest: &Path,
        cookie_file: Option<&Path>,
        hook: ProgressHook,
    ) -> Result<(), ProviderError> {
        tracing::info!(source_id = %source_id, url = %watch_url, "Fetching audio via yt-dlp");

        let mut command = Command::new(&self.binary_path);
        command
            .arg("--format")
            .arg("bestaudio/best")
            .arg("--output")
            .arg(dest)
            .arg("--no-part")
            .arg("--no-progress")
            .arg("--no-playlist");
        if let Some(cookie) = cookie_file {
            command.arg("--cookies").arg(cookie);
        }
        command.arg(watch_url);

        let mut child = command
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ProviderError::FetchFailed {
                source_id: source_id.to_string(),
                details: format!("failed to spawn yt-dlp: {}", e),
            })?;

        // With --no-part the destination grows in place, so byte progress is
        // observable by polling its size while we wait for the child.
        let mut interval = tokio::time::interval(FETCH_WATCH_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let output = loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status.map_err(|e| ProviderError::FetchFailed {
                        source_id: source_id.to_string(),
                        details: format!("failed to wait for yt-dlp: {}", e),
                    })?;
                    break status;
                }
                _ = interval.tick() => {
                    if let Ok(meta) = tokio::fs::metadata(dest).await {
                        hook(meta.len(), 0);
                    }
                }
            }
        };

        if !output.success() {
            let mut details = format!("yt-dlp exited with {}", output);
            if let Some(mut stderr) = child.stderr.take() {
                use tokio::io::AsyncReadExt;
                let mut buf = String::new();
                if stderr.read_to_string(&mut buf).await.is_ok() && !buf.is_empty() {
                    details.push_str(": ");
                    details.push_str(buf.trim());
                }
            }
            return Err(ProviderError::FetchFailed {
                source_id: source_id.to_string(),
                details,
            });
        }

        let size = tokio::fs::metadata(dest)
            .await
            .map(|m| m.len())
            .map_err(|e| ProviderError::FetchFailed {
                source_id: source_id.to_string(),
                details: format!("yt-dlp produced no output file: {}", e),
            })?;
        hook(size, size);

        tracing::info!(source_id = %source_id, bytes = size, "Audio fetch complete");
        Ok(())
    }

    async fn fetch_cover(&self, image_url: &str, dest: &Path) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .get(image_url)
            .send()
            .await
            .map_err(|e| ProviderError::FetchFailed {
                source_id: String::new(),
                details: format!("cover request failed: {}", e),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(image_url.to_string()));
        }
        if !response.status().is_success() {
            return Err(ProviderError::FetchFailed {
                source_id: String::new(),
                details: format!("cover request returned HTTP {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::FetchFailed {
                source_id: String::new(),
                details: format!("cover body read failed: {}", e),
            })?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ProviderError::FetchFailed {
                source_id: String::new(),
                details: format!("failed to write cover file: {}", e),
            })?;

        Ok(())
    }
}
