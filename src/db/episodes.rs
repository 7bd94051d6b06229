//! Episode CRUD and batched source-group updates.

use crate::error::{DatabaseError, Error, Result};
use crate::types::{EpisodeId, EpisodeStatus, PodcastId, SourceType};

use super::{Database, Episode};

/// New episode to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewEpisode {
    /// Owning podcast
    pub podcast_id: PodcastId,
    /// Stable identifier of the origin track
    pub source_id: String,
    /// Origin kind
    pub source_type: SourceType,
    /// Public URL of the origin track, if any
    pub watch_url: Option<String>,
    /// Episode title
    pub title: String,
    /// Episode author
    pub author: Option<String>,
    /// Episode description
    pub description: Option<String>,
    /// Owned audio file record
    pub audio_file_id: i64,
    /// Owned cover image file record
    pub image_file_id: i64,
    /// Access cookie for protected sources, if one is attached
    pub cookie_id: Option<i64>,
}

/// Typed change-set applied to one episode or a whole source group
///
/// `None` fields are left untouched. This replaces ad-hoc filter/update
/// keyword maps with an explicit structure the query layer consumes.
#[derive(Debug, Clone, Default)]
pub struct EpisodeUpdate {
    /// New lifecycle status
    pub status: Option<EpisodeStatus>,
    /// New publish timestamp (unix seconds)
    pub published_at: Option<i64>,
}

impl EpisodeUpdate {
    /// Change-set that only moves the status
    pub fn status(status: EpisodeStatus) -> Self {
        Self {
            status: Some(status),
            published_at: None,
        }
    }

    /// Change-set publishing an episode at the given timestamp
    pub fn published(published_at: i64) -> Self {
        Self {
            status: Some(EpisodeStatus::Published),
            published_at: Some(published_at),
        }
    }
}

impl Database {
    /// Insert a new episode record (status `new`, created now)
    pub async fn insert_episode(&self, episode: &NewEpisode) -> Result<EpisodeId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO episodes (
                podcast_id, source_id, source_type, watch_url, title,
                author, description, status, created_at,
                audio_file_id, image_file_id, cookie_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(episode.podcast_id)
        .bind(&episode.source_id)
        .bind(episode.source_type.to_i32())
        .bind(&episode.watch_url)
        .bind(&episode.title)
        .bind(&episode.author)
        .bind(&episode.description)
        .bind(EpisodeStatus::New.to_i32())
        .bind(now)
        .bind(episode.audio_file_id)
        .bind(episode.image_file_id)
        .bind(episode.cookie_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert episode: {}",
                e
            )))
        })?;

        Ok(EpisodeId(result.last_insert_rowid()))
    }

    /// Get an episode by ID
    pub async fn get_episode(&self, id: EpisodeId) -> Result<Option<Episode>> {
        let row = sqlx::query_as::<_, Episode>(
            r#"
            SELECT
                id, podcast_id, source_id, source_type, watch_url, title,
                author, description, status, created_at, published_at,
                audio_file_id, image_file_id, cookie_id
            FROM episodes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get episode: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get an episode by ID, failing if it does not exist
    pub async fn get_episode_required(&self, id: EpisodeId) -> Result<Episode> {
        self.get_episode(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("episode {} not found", id)))
    }

    /// List all episodes sharing a (source_id, source_type) pair
    pub async fn list_episodes_by_source(
        &self,
        source_id: &str,
        source_type: SourceType,
    ) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(
            r#"
            SELECT
                id, podcast_id, source_id, source_type, watch_url, title,
                author, description, status, created_at, published_at,
                audio_file_id, image_file_id, cookie_id
            FROM episodes
            WHERE source_id = ? AND source_type = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(source_id)
        .bind(source_type.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list episodes by source: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List all episodes (cover batch processing)
    pub async fn list_episodes(&self) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(
            r#"
            SELECT
                id, podcast_id, source_id, source_type, watch_url, title,
                author, description, status, created_at, published_at,
                audio_file_id, image_file_id, cookie_id
            FROM episodes
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list episodes: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List episodes currently in the downloading state
    pub async fn list_in_progress_episodes(&self) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(
            r#"
            SELECT
                id, podcast_id, source_id, source_type, watch_url, title,
                author, description, status, created_at, published_at,
                audio_file_id, image_file_id, cookie_id
            FROM episodes
            WHERE status = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(EpisodeStatus::Downloading.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list in-progress episodes: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List episodes included in a podcast's feed
    ///
    /// Only `published` episodes with a non-null publish timestamp qualify;
    /// ordered newest first for feed rendering.
    pub async fn list_published_episodes(&self, podcast_id: PodcastId) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(
            r#"
            SELECT
                id, podcast_id, source_id, source_type, watch_url, title,
                author, description, status, created_at, published_at,
                audio_file_id, image_file_id, cookie_id
            FROM episodes
            WHERE podcast_id = ? AND status = ? AND published_at IS NOT NULL
            ORDER BY published_at DESC
            "#,
        )
        .bind(podcast_id)
        .bind(EpisodeStatus::Published.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list published episodes: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Apply a change-set to one episode row
    pub async fn update_episode(&self, id: EpisodeId, update: &EpisodeUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE episodes SET
                status = COALESCE(?, status),
                published_at = COALESCE(?, published_at)
            WHERE id = ?
            "#,
        )
        .bind(update.status.map(|s| s.to_i32()))
        .bind(update.published_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update episode: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Apply a change-set to every non-archived episode sharing a source
    ///
    /// One batched UPDATE so concurrent readers never observe the group
    /// half-updated. Archived rows are never touched.
    pub async fn update_episode_group(
        &self,
        source_id: &str,
        source_type: SourceType,
        update: &EpisodeUpdate,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE episodes SET
                status = COALESCE(?, status),
                published_at = COALESCE(?, published_at)
            WHERE source_id = ? AND source_type = ? AND status != ?
            "#,
        )
        .bind(update.status.map(|s| s.to_i32()))
        .bind(update.published_at)
        .bind(source_id)
        .bind(source_type.to_i32())
        .bind(EpisodeStatus::Archived.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update episode group: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }

    /// Distinct podcasts containing any episode with the given source id
    pub async fn list_podcast_ids_by_source(&self, source_id: &str) -> Result<Vec<PodcastId>> {
        let rows: Vec<(PodcastId,)> = sqlx::query_as(
            "SELECT DISTINCT podcast_id FROM episodes WHERE source_id = ? ORDER BY podcast_id",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list podcasts by source: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
