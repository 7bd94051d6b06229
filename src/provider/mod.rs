//! Media providers: resolving and fetching episode source media.
//!
//! A provider turns an external track (YouTube video, Yandex Music track)
//! into a local audio file. Direct uploads never reach a provider: their
//! bytes already live in object storage.

use regex::Regex;
use std::path::Path;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::types::SourceType;

mod ytdlp;

pub use ytdlp::YtDlpProvider;

/// Byte-progress callback invoked by providers while fetching
/// (processed bytes, total bytes; total may be 0 when unknown)
pub type ProgressHook = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Resolved source identity for a submitted URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    /// Stable identifier of the origin track
    pub id: String,
    /// Origin kind
    pub source_type: SourceType,
    /// The submitted URL, absent for direct uploads
    pub url: Option<String>,
}

/// Recognize a source URL and extract its stable track identifier
///
/// No URL means a direct upload: a random `U-<hash>` identifier is
/// generated so uploads get unique source groups.
pub fn extract_source_info(source_url: Option<&str>) -> Result<SourceInfo, ProviderError> {
    let Some(url) = source_url else {
        return Ok(SourceInfo {
            id: format!("U-{}", random_hash(6)),
            source_type: SourceType::Upload,
            url: None,
        });
    };

    for (source_type, pattern) in source_patterns() {
        if let Some(captures) = pattern.captures(url) {
            if let Some(source_id) = captures.name("source_id") {
                return Ok(SourceInfo {
                    id: source_id.as_str().to_string(),
                    source_type,
                    url: Some(url.to_string()),
                });
            }
        }
    }

    Err(ProviderError::FetchFailed {
        source_id: String::new(),
        details: format!("requested domain is not supported: {}", url),
    })
}

fn source_patterns() -> Vec<(SourceType, Regex)> {
    // Patterns are static literals; compilation cannot fail
    [
        (
            SourceType::Youtube,
            r"^https://(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)(?P<source_id>[0-9a-zA-Z_-]{11})",
        ),
        (
            SourceType::Yandex,
            r"^https?://music\.yandex\.ru/[a-z/0-9]+/track/(?P<source_id>[0-9]+)",
        ),
    ]
    .into_iter()
    .filter_map(|(ty, pattern)| Regex::new(pattern).ok().map(|re| (ty, re)))
    .collect()
}

fn random_hash(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let n: u8 = rng.gen_range(0..16);
            char::from_digit(n as u32, 16).unwrap_or('0')
        })
        .collect()
}

/// Fetching of episode media and cover thumbnails from external sources
#[async_trait::async_trait]
pub trait MediaProvider: Send + Sync {
    /// Fetch raw audio for the given track into `dest`
    ///
    /// A failure here is fatal to the pipeline attempt: the caller moves the
    /// episode group to `error` and does not retry.
    async fn fetch_audio(
        &self,
        watch_url: &str,
        source_id: &str,
        dest: &Path,
        cookie_file: Option<&Path>,
        hook: ProgressHook,
    ) -> Result<(), ProviderError>;

    /// Fetch a cover thumbnail into `dest`
    ///
    /// A missing thumbnail (404) is reported as [`ProviderError::NotFound`]
    /// so the caller can skip the episode without failing the batch.
    async fn fetch_cover(&self, image_url: &str, dest: &Path) -> Result<(), ProviderError>;
}
