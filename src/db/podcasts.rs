//! Podcast lookups and RSS file linkage.

use crate::error::{DatabaseError, Error, Result};
use crate::types::PodcastId;

use super::{Database, Podcast};

/// New podcast to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewPodcast {
    /// Stable public identifier, used to name the RSS object
    pub publish_id: String,
    /// Podcast name
    pub name: String,
    /// Podcast description
    pub description: Option<String>,
    /// Podcast image URL
    pub image_url: Option<String>,
    /// Whether new episodes are queued for download immediately
    pub download_automatically: bool,
}

impl Database {
    /// Insert a new podcast record
    pub async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<PodcastId> {
        let result = sqlx::query(
            r#"
            INSERT INTO podcasts (publish_id, name, description, image_url, download_automatically)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&podcast.publish_id)
        .bind(&podcast.name)
        .bind(&podcast.description)
        .bind(&podcast.image_url)
        .bind(podcast.download_automatically)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert podcast: {}",
                e
            )))
        })?;

        Ok(PodcastId(result.last_insert_rowid()))
    }

    /// Get a podcast by ID
    pub async fn get_podcast(&self, id: PodcastId) -> Result<Option<Podcast>> {
        let row = sqlx::query_as::<_, Podcast>(
            r#"
            SELECT id, publish_id, name, description, image_url, rss_file_id,
                   download_automatically
            FROM podcasts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get podcast: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a podcast by ID, failing if it does not exist
    pub async fn get_podcast_required(&self, id: PodcastId) -> Result<Podcast> {
        self.get_podcast(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("podcast {} not found", id)))
    }

    /// List all podcasts
    pub async fn list_podcasts(&self) -> Result<Vec<Podcast>> {
        let rows = sqlx::query_as::<_, Podcast>(
            r#"
            SELECT id, publish_id, name, description, image_url, rss_file_id,
                   download_automatically
            FROM podcasts
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list podcasts: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Link a podcast to its RSS file record (first regeneration)
    pub async fn set_podcast_rss_file(&self, id: PodcastId, rss_file_id: i64) -> Result<()> {
        sqlx::query("UPDATE podcasts SET rss_file_id = ? WHERE id = ?")
            .bind(rss_file_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set podcast RSS file: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
