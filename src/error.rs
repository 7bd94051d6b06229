//! Error types for podcast-dl
//!
//! Domain-specific error types for the episode pipeline (provider fetch,
//! transcoding, object storage, persistence), plus the crate-wide [`Result`]
//! alias. Every pipeline stage propagates these with `?` up to the task
//! boundary, where they are converted into a [`crate::types::FinishCode`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for podcast-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for podcast-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "tmp_audio_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Media provider error (fetch from the external source failed)
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Transcoding error (ffmpeg failed or timed out)
    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    /// Object storage error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP transport error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Episode/podcast/file record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Bounded retry loop gave up
    #[error("max attempts reached: {0}")]
    MaxAttemptsReached(String),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// RSS feed rendering error
    #[error("RSS rendering failed: {0}")]
    RssRender(String),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress, new work rejected
    #[error("shutting down")]
    ShuttingDown,

    /// Unclassified error
    #[error("{0}")]
    Other(String),
}

/// Database-layer errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A query failed to execute
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Connection pool could not be created
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Errors from external media providers (yt-dlp and friends)
///
/// All provider errors are fatal for the current pipeline attempt: the
/// episode group moves to `error` and no automatic retry happens.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider tool exited non-zero
    #[error("provider fetch failed for {source_id}: {details}")]
    FetchFailed {
        /// Source identifier of the episode being fetched
        source_id: String,
        /// Tool output / failure description
        details: String,
    },

    /// Remote resource does not exist (404 on a cover thumbnail)
    #[error("remote content not found: {0}")]
    NotFound(String),

    /// The provider binary is not installed / not discoverable
    #[error("provider binary not found: {0}")]
    BinaryNotFound(String),

    /// An uploaded-source episode has no resolvable audio path
    #[error("episode [source: upload] does not contain audio with predefined path")]
    MissingUploadPath,
}

/// Errors from the ffmpeg post-processing step
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// ffmpeg exited with a non-zero status
    #[error("ffmpeg failed for {path}: {details}")]
    CommandFailed {
        /// Input file that was being processed
        path: PathBuf,
        /// Captured stderr/stdout tail
        details: String,
    },

    /// ffmpeg exceeded the configured wall-clock timeout
    #[error("ffmpeg timed out after {timeout_secs}s for {path}")]
    Timeout {
        /// Input file that was being processed
        path: PathBuf,
        /// Configured timeout in seconds
        timeout_secs: u64,
    },

    /// The expected output file was not produced or could not replace the source
    #[error("failed to finalize transcoded file {path}: {details}")]
    OutputMissing {
        /// Expected output path
        path: PathBuf,
        /// Failure description
        details: String,
    },

    /// The ffmpeg binary is not installed / not discoverable
    #[error("ffmpeg binary not found: {0}")]
    BinaryNotFound(String),
}

/// Errors surfaced by the object storage client
#[derive(Debug, Error)]
pub enum StorageError {
    /// Upload did not complete
    #[error("upload failed for {path}")]
    UploadFailed {
        /// Local file that failed to upload
        path: PathBuf,
    },

    /// Remote-to-remote copy did not complete
    #[error("copy failed: {src} -> {dst}")]
    CopyFailed {
        /// Source remote path
        src: String,
        /// Destination remote path
        dst: String,
    },

    /// Remote object size does not match the recorded size
    #[error("remote size mismatch for {path}: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Remote path that was checked
        path: String,
        /// Size recorded on the file row
        expected: i64,
        /// Size reported by the storage backend
        actual: i64,
    },

    /// Transport-level failure talking to the storage backend
    #[error("storage transport error: {0}")]
    Transport(String),
}
