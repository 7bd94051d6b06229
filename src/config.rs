//! Configuration types for podcast-dl

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Object storage configuration
///
/// Remote paths are deterministic: audio under `audio_dir`, episode covers
/// under `images_dir`, RSS feeds under `rss_dir`, all relative to the bucket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the S3-compatible HTTP endpoint, including the bucket
    #[serde(default = "default_storage_url")]
    pub endpoint_url: String,

    /// Remote directory for published episode audio (default: "audio")
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,

    /// Remote directory for episode cover images (default: "images")
    #[serde(default = "default_images_dir")]
    pub images_dir: String,

    /// Remote directory for podcast RSS feeds (default: "rss")
    #[serde(default = "default_rss_dir")]
    pub rss_dir: String,

    /// HTTP request timeout for storage calls
    #[serde(default = "default_storage_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
}

impl StorageConfig {
    /// Public URL for a stored object, joined onto the endpoint
    pub fn public_url(&self, remote_path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint_url.trim_end_matches('/'),
            remote_path.trim_start_matches('/')
        )
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_storage_url(),
            audio_dir: default_audio_dir(),
            images_dir: default_images_dir(),
            rss_dir: default_rss_dir(),
            request_timeout: default_storage_timeout(),
        }
    }
}

/// Download behavior configuration (local scratch space, provider tooling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Local directory for in-flight audio files (default: "./tmp/audio")
    #[serde(default = "default_tmp_audio_dir")]
    pub tmp_audio_dir: PathBuf,

    /// Local directory for in-flight cover images (default: "./tmp/images")
    #[serde(default = "default_tmp_images_dir")]
    pub tmp_images_dir: PathBuf,

    /// Local directory for rendered RSS files (default: "./tmp/rss")
    #[serde(default = "default_tmp_rss_dir")]
    pub tmp_rss_dir: PathBuf,

    /// Path to the yt-dlp executable (auto-detected from PATH if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Optional cookie file handed to yt-dlp for protected sources
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            tmp_audio_dir: default_tmp_audio_dir(),
            tmp_images_dir: default_tmp_images_dir(),
            tmp_rss_dir: default_tmp_rss_dir(),
            ytdlp_path: None,
            cookie_file: None,
        }
    }
}

/// ffmpeg post-processing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Path to the ffmpeg executable (auto-detected from PATH if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Hard wall-clock timeout for one ffmpeg run
    #[serde(default = "default_ffmpeg_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Interval between output-size polls while ffmpeg runs
    #[serde(default = "default_watch_interval", with = "duration_secs")]
    pub watch_interval: Duration,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            timeout: default_ffmpeg_timeout(),
            watch_interval: default_watch_interval(),
        }
    }
}

/// Bounded retry settings for the cover upload loop
///
/// The delay grows linearly: attempt N sleeps `base_delay * N` before the
/// next try. Exhausting `max_attempts` raises a max-attempts error for that
/// episode without aborting the batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoverRetryConfig {
    /// Maximum number of upload attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay, multiplied by the attempt number (default: 1s)
    #[serde(default = "default_base_delay", with = "duration_secs")]
    pub base_delay: Duration,
}

impl Default for CoverRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
        }
    }
}

/// Progress channel / reporting configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// TTL for ephemeral per-episode progress records (default: 10 min)
    #[serde(default = "default_progress_ttl", with = "duration_secs")]
    pub record_ttl: Duration,

    /// Poll timeout for the WebSocket subscription loop (default: 1s)
    ///
    /// Each cycle waits at most this long for a signal so that external
    /// cancellation is observed cooperatively.
    #[serde(default = "default_poll_timeout", with = "duration_secs")]
    pub poll_timeout: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            record_ttl: default_progress_ttl(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

/// Job queue configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum concurrently running tasks (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Wall-clock timeout applied to every task, regardless of kind
    #[serde(default = "default_task_timeout", with = "duration_secs")]
    pub task_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            task_timeout: default_task_timeout(),
        }
    }
}

/// Progress API server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Whether to start the progress API server
    #[serde(default)]
    pub enabled: bool,

    /// Bind address for the progress API (default: 127.0.0.1:8300)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
        }
    }
}

/// Top-level configuration for [`crate::PodcastDl`]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path (default: in-memory)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Object storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Download / provider settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// ffmpeg settings
    #[serde(default)]
    pub transcode: TranscodeConfig,

    /// Cover upload retry settings
    #[serde(default)]
    pub cover_retry: CoverRetryConfig,

    /// Progress channel settings
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Job queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Progress API settings
    #[serde(default)]
    pub api: ApiConfig,
}

fn default_storage_url() -> String {
    "http://localhost:9000/podcast".to_string()
}

fn default_audio_dir() -> String {
    "audio".to_string()
}

fn default_images_dir() -> String {
    "images".to_string()
}

fn default_rss_dir() -> String {
    "rss".to_string()
}

fn default_storage_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_tmp_audio_dir() -> PathBuf {
    PathBuf::from("./tmp/audio")
}

fn default_tmp_images_dir() -> PathBuf {
    PathBuf::from("./tmp/images")
}

fn default_tmp_rss_dir() -> PathBuf {
    PathBuf::from("./tmp/rss")
}

fn default_ffmpeg_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_watch_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_progress_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_max_concurrent() -> usize {
    3
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_bind_address() -> SocketAddr {
    // Safe: literal always parses
    "127.0.0.1:8300".parse().unwrap_or_else(|_| {
        SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 8300)
    })
}

/// Serialize Durations as whole seconds in config files
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable() {
        let config = Config::default();
        assert_eq!(config.cover_retry.max_attempts, 5);
        assert_eq!(config.queue.max_concurrent_tasks, 3);
        assert_eq!(config.storage.audio_dir, "audio");
        assert!(!config.api.enabled);
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let json = r#"{"queue": {"max_concurrent_tasks": 8}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.queue.max_concurrent_tasks, 8);
        assert_eq!(config.queue.task_timeout, Duration::from_secs(1800));
        assert_eq!(config.transcode.timeout, Duration::from_secs(600));
    }

    #[test]
    fn durations_roundtrip_as_seconds() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.progress.poll_timeout, config.progress.poll_timeout);
    }
}
