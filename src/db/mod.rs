//! Database layer for podcast-dl
//!
//! Handles SQLite persistence for podcasts, episodes, and stored-file
//! records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`episodes`]: Episode CRUD and batched source-group updates
//! - [`podcasts`]: Podcast lookups and RSS file linkage
//! - [`files`]: Stored-artifact (audio/image/RSS) records
//! - [`cookies`]: Access-cookie records for protected sources

use crate::error::{DatabaseError, Error, Result};
use crate::types::{EpisodeId, EpisodeStatus, PodcastId, SourceType};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::Path;

mod cookies;
mod episodes;
mod files;
mod migrations;
mod podcasts;

#[cfg(test)]
mod tests;

pub use cookies::NewCookie;
pub use episodes::{EpisodeUpdate, NewEpisode};
pub use files::{FileUpdate, NewFile};
pub use podcasts::NewPodcast;

/// Episode record from database
#[derive(Debug, Clone, FromRow)]
pub struct Episode {
    /// Unique database ID
    pub id: EpisodeId,
    /// Owning podcast
    pub podcast_id: PodcastId,
    /// Stable identifier of the origin track (shared across podcasts)
    pub source_id: String,
    /// Origin kind (0=youtube, 1=yandex, 2=upload)
    pub source_type: i32,
    /// Public URL of the origin track, if any
    pub watch_url: Option<String>,
    /// Episode title
    pub title: String,
    /// Episode author
    pub author: Option<String>,
    /// Episode description
    pub description: Option<String>,
    /// Lifecycle status (see [`EpisodeStatus`])
    pub status: i32,
    /// Creation timestamp (unix seconds)
    pub created_at: i64,
    /// Publish timestamp (unix seconds); set when the episode goes live
    pub published_at: Option<i64>,
    /// Owned audio file record
    pub audio_file_id: i64,
    /// Owned cover image file record
    pub image_file_id: i64,
    /// Access cookie for protected sources, if one is attached
    pub cookie_id: Option<i64>,
}

impl Episode {
    /// Typed lifecycle status
    pub fn status(&self) -> EpisodeStatus {
        EpisodeStatus::from_i32(self.status)
    }

    /// Typed source kind
    pub fn source_type(&self) -> SourceType {
        SourceType::from_i32(self.source_type)
    }

    /// Canonical audio filename derived from the source id
    pub fn audio_filename(&self) -> String {
        format!("{}.mp3", self.source_id)
    }

    /// Canonical cover filename derived from the source id
    pub fn image_filename(&self) -> String {
        format!("{}_cover.jpg", self.source_id)
    }
}

/// Stored-artifact record (episode audio, episode cover, or podcast RSS)
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    /// Unique database ID
    pub id: i64,
    /// Remote path within the bucket; empty until uploaded
    pub path: String,
    /// Size in bytes (0 if unknown)
    pub size: i64,
    /// Whether the remote object is live and servable
    pub available: bool,
    /// Optional SHA-256 of the stored content
    pub content_hash: Option<String>,
    /// Original URL the content was fetched from, if any
    pub source_url: Option<String>,
}

/// Access-cookie record handed to providers for protected sources
#[derive(Debug, Clone, FromRow)]
pub struct Cookie {
    /// Unique database ID
    pub id: i64,
    /// Source kind the cookie authenticates against
    pub source_type: i32,
    /// Raw cookie text in Netscape format
    pub data: String,
    /// Creation timestamp (unix seconds)
    pub created_at: i64,
}

/// Podcast record from database
#[derive(Debug, Clone, FromRow)]
pub struct Podcast {
    /// Unique database ID
    pub id: PodcastId,
    /// Stable public identifier, used to name the RSS object
    pub publish_id: String,
    /// Podcast name
    pub name: String,
    /// Podcast description
    pub description: Option<String>,
    /// Podcast image URL
    pub image_url: Option<String>,
    /// RSS file record, created on first regeneration
    pub rss_file_id: Option<i64>,
    /// Whether new episodes are queued for download immediately
    pub download_automatically: bool,
}

/// SQLite-backed persistence handle
///
/// Cheap to clone via the inner pool; constructed once and injected into the
/// pipeline context.
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) a database at the given path and run migrations
    pub async fn open(path: &Path) -> Result<Self> {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to open database at {}: {}",
                path.display(),
                e
            )))
        })?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database (tests, ephemeral deployments)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to open in-memory database: {}",
                e
            )))
        })?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
