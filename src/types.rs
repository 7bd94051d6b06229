//! Core types for podcast-dl

use serde::{Deserialize, Serialize};

/// Unique identifier for an episode
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub i64);

impl EpisodeId {
    /// Create a new EpisodeId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for EpisodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<EpisodeId> for i64 {
    fn from(id: EpisodeId) -> Self {
        id.0
    }
}

impl std::fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EpisodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl sqlx::Type<sqlx::Sqlite> for EpisodeId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for EpisodeId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for EpisodeId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Unique identifier for a podcast
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodcastId(pub i64);

impl PodcastId {
    /// Create a new PodcastId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for PodcastId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PodcastId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for PodcastId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for PodcastId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for PodcastId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Persisted episode lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    /// Row created, downloading not yet started
    New,
    /// Pipeline in progress (umbrella for all working stages)
    Downloading,
    /// Terminal success -- included in RSS feeds
    Published,
    /// Terminal, excluded from group updates and regenerations
    Archived,
    /// Terminal failure, eligible for manual re-enqueue
    Error,
}

impl EpisodeStatus {
    /// Convert integer status code to EpisodeStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => EpisodeStatus::New,
            1 => EpisodeStatus::Downloading,
            2 => EpisodeStatus::Published,
            3 => EpisodeStatus::Archived,
            _ => EpisodeStatus::Error,
        }
    }

    /// Convert EpisodeStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            EpisodeStatus::New => 0,
            EpisodeStatus::Downloading => 1,
            EpisodeStatus::Published => 2,
            EpisodeStatus::Archived => 3,
            EpisodeStatus::Error => 4,
        }
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EpisodeStatus::New => "new",
            EpisodeStatus::Downloading => "downloading",
            EpisodeStatus::Published => "published",
            EpisodeStatus::Archived => "archived",
            EpisodeStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// External origin of an episode's media
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// YouTube video (fetched and transcoded)
    Youtube,
    /// Yandex Music track (fetched, already mp3)
    Yandex,
    /// Direct user upload (bytes already in storage)
    Upload,
}

/// Static per-source behavior flags consulted by the pipeline
#[derive(Clone, Copy, Debug)]
pub struct SourceCapabilities {
    /// Whether the media must be fetched from the provider
    pub need_downloading: bool,
    /// Whether the fetched media must be normalized via ffmpeg
    pub need_postprocessing: bool,
}

impl SourceType {
    /// Behavior flags for this source type
    pub fn capabilities(&self) -> SourceCapabilities {
        match self {
            SourceType::Youtube => SourceCapabilities {
                need_downloading: true,
                need_postprocessing: true,
            },
            SourceType::Yandex => SourceCapabilities {
                need_downloading: true,
                need_postprocessing: false,
            },
            SourceType::Upload => SourceCapabilities {
                need_downloading: false,
                need_postprocessing: false,
            },
        }
    }

    /// Convert integer source code to SourceType
    pub fn from_i32(source: i32) -> Self {
        match source {
            0 => SourceType::Youtube,
            1 => SourceType::Yandex,
            _ => SourceType::Upload,
        }
    }

    /// Convert SourceType to integer source code
    pub fn to_i32(&self) -> i32 {
        match self {
            SourceType::Youtube => 0,
            SourceType::Yandex => 1,
            SourceType::Upload => 2,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::Youtube => "youtube",
            SourceType::Yandex => "yandex",
            SourceType::Upload => "upload",
        };
        write!(f, "{}", s)
    }
}

/// Job-level outcome reported to the queue runner
///
/// `Skip` is a deliberate early exit (work already done) and is logged at
/// info level; only `Error` is logged at error level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishCode {
    /// Task completed its work
    Ok,
    /// Nothing to do, prior work already correct
    Skip,
    /// Task failed
    Error,
}

/// A unit of background work dispatched by the job queue
///
/// Tagged union replacing subclass-based task dispatch: equality for test
/// assertions is by kind, via [`TaskKind::same_kind`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskKind {
    /// Full acquisition pipeline for one episode
    DownloadEpisode {
        /// Target episode
        episode_id: EpisodeId,
    },
    /// Finalize an episode whose bytes were uploaded directly
    FinalizeUploadedEpisode {
        /// Target episode
        episode_id: EpisodeId,
    },
    /// Fetch and store cover images (one episode, or all lacking covers)
    FetchEpisodeCover {
        /// Target episode; None processes every episode needing a cover
        episode_id: Option<EpisodeId>,
    },
    /// Re-render and re-upload RSS feeds (empty = all podcasts)
    RegenerateRss {
        /// Podcasts to regenerate
        podcast_ids: Vec<PodcastId>,
    },
}

impl TaskKind {
    /// Stable name of the task kind, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::DownloadEpisode { .. } => "download_episode",
            TaskKind::FinalizeUploadedEpisode { .. } => "finalize_uploaded_episode",
            TaskKind::FetchEpisodeCover { .. } => "fetch_episode_cover",
            TaskKind::RegenerateRss { .. } => "regenerate_rss",
        }
    }

    /// Kind-only equality, ignoring payload
    pub fn same_kind(&self, other: &TaskKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Transient downloading stage, reported to progress consumers only
///
/// Never persisted: the episode row stays in [`EpisodeStatus::Downloading`]
/// while these stages cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// Queued, no bytes moved yet
    Pending,
    /// Fetching audio from the provider
    EpisodeDownloading,
    /// ffmpeg normalization in progress
    EpisodePostprocessing,
    /// Pushing audio to object storage
    EpisodeUploading,
    /// Fetching the cover thumbnail
    CoverDownloading,
    /// Pushing the cover to object storage
    CoverUploading,
    /// Attempt failed
    Error,
}

/// Ephemeral per-episode byte progress, produced by pipeline I/O callbacks
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Current stage
    pub stage: ProgressStage,
    /// Total bytes expected (0 if unknown)
    pub total_bytes: u64,
    /// Bytes handled so far
    pub processed_bytes: u64,
}

impl Progress {
    /// A fresh pending record with no byte counts
    pub fn pending() -> Self {
        Self {
            stage: ProgressStage::Pending,
            total_bytes: 0,
            processed_bytes: 0,
        }
    }
}

/// Episode summary embedded in progress responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Episode id
    pub id: EpisodeId,
    /// Episode title
    pub title: String,
    /// Cover image URL, if available
    pub image_url: Option<String>,
    /// Persisted status
    pub status: EpisodeStatus,
}

/// Podcast summary embedded in progress responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodcastSummary {
    /// Podcast id
    pub id: PodcastId,
    /// Podcast name
    pub name: String,
    /// Podcast image URL, if available
    pub image_url: Option<String>,
}

/// Client-facing progress item combining identity and byte counters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressItem {
    /// Current stage
    pub status: ProgressStage,
    /// Total bytes expected
    pub total_bytes: u64,
    /// Bytes handled so far
    pub processed_bytes: u64,
    /// Episode identity
    pub episode: EpisodeSummary,
    /// Owning podcast identity
    pub podcast: PodcastSummary,
}

/// Envelope pushed to WebSocket clients and returned by the pull endpoints
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEnvelope {
    /// All progress items in this snapshot
    #[serde(rename = "progressItems")]
    pub progress_items: Vec<ProgressItem>,
}

/// Pub/sub message indicating that progress changed for the named episodes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSignal {
    /// Episodes whose progress should be re-fetched
    pub episode_ids: Vec<EpisodeId>,
}
