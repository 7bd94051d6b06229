//! Stored-artifact (audio/image/RSS) record operations.

use crate::error::{DatabaseError, Error, Result};

use super::{Database, FileRecord};

/// New file record to be inserted into the database
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    /// Remote path within the bucket; empty until uploaded
    pub path: String,
    /// Size in bytes (0 if unknown)
    pub size: i64,
    /// Whether the remote object is live
    pub available: bool,
    /// Optional SHA-256 of the stored content
    pub content_hash: Option<String>,
    /// Original URL the content was fetched from
    pub source_url: Option<String>,
}

/// Typed change-set for file records; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    /// New remote path (empty string clears it)
    pub path: Option<String>,
    /// New size in bytes
    pub size: Option<i64>,
    /// New availability flag
    pub available: Option<bool>,
    /// New content hash
    pub content_hash: Option<String>,
}

impl Database {
    /// Insert a new file record
    pub async fn insert_file(&self, file: &NewFile) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO files (path, size, available, content_hash, source_url)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.path)
        .bind(file.size)
        .bind(file.available)
        .bind(&file.content_hash)
        .bind(&file.source_url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert file: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Get a file record by ID
    pub async fn get_file(&self, id: i64) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecord>(
            "SELECT id, path, size, available, content_hash, source_url FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get file: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a file record by ID, failing if it does not exist
    pub async fn get_file_required(&self, id: i64) -> Result<FileRecord> {
        self.get_file(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {} not found", id)))
    }

    /// Apply a change-set to one file record
    pub async fn update_file(&self, id: i64, update: &FileUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files SET
                path = COALESCE(?, path),
                size = COALESCE(?, size),
                available = COALESCE(?, available),
                content_hash = COALESCE(?, content_hash)
            WHERE id = ?
            "#,
        )
        .bind(&update.path)
        .bind(update.size)
        .bind(update.available)
        .bind(&update.content_hash)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update file: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Apply a change-set to every file fetched from the given source URL
    ///
    /// Sibling episodes sharing one origin track also share the audio source
    /// URL, so this is the batched counterpart of the episode group update.
    pub async fn update_files_by_source_url(
        &self,
        source_url: &str,
        update: &FileUpdate,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE files SET
                path = COALESCE(?, path),
                size = COALESCE(?, size),
                available = COALESCE(?, available),
                content_hash = COALESCE(?, content_hash)
            WHERE source_url = ?
            "#,
        )
        .bind(&update.path)
        .bind(update.size)
        .bind(update.available)
        .bind(&update.content_hash)
        .bind(source_url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update files by source URL: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
