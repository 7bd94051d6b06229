//! Database lifecycle and schema migrations.

use crate::error::{DatabaseError, Error, Result};

use super::Database;

/// Current schema version, stored in `PRAGMA user_version`
const SCHEMA_VERSION: i64 = 2;

impl Database {
    /// Apply pending schema migrations
    ///
    /// Idempotent: safe to call on every startup. Each version bump appends a
    /// block below and raises [`SCHEMA_VERSION`].
    pub(crate) async fn migrate(&self) -> Result<()> {
        let current: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to read schema version: {}",
                    e
                )))
            })?;

        if current >= SCHEMA_VERSION {
            return Ok(());
        }

        if current < 1 {
            self.apply_initial_schema().await?;
        }
        if current < 2 {
            self.apply_cookies_schema().await?;
        }

        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to set schema version: {}",
                    e
                )))
            })?;

        tracing::info!(
            from = current,
            to = SCHEMA_VERSION,
            "Database migrations applied"
        );
        Ok(())
    }

    async fn apply_initial_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                available INTEGER NOT NULL DEFAULT 0,
                content_hash TEXT,
                source_url TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS podcasts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                publish_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT,
                image_url TEXT,
                rss_file_id INTEGER REFERENCES files(id),
                download_automatically INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                podcast_id INTEGER NOT NULL REFERENCES podcasts(id) ON DELETE CASCADE,
                source_id TEXT NOT NULL,
                source_type INTEGER NOT NULL,
                watch_url TEXT,
                title TEXT NOT NULL,
                author TEXT,
                description TEXT,
                status INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                published_at INTEGER,
                audio_file_id INTEGER NOT NULL REFERENCES files(id),
                image_file_id INTEGER NOT NULL REFERENCES files(id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_episodes_source ON episodes(source_id, source_type)",
            "CREATE INDEX IF NOT EXISTS idx_episodes_status ON episodes(status)",
            "CREATE INDEX IF NOT EXISTS idx_episodes_podcast ON episodes(podcast_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::MigrationFailed(format!(
                        "Failed to apply initial schema: {}",
                        e
                    )))
                })?;
        }
        Ok(())
    }

    /// Version 2: per-episode access cookies for protected sources
    async fn apply_cookies_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS cookies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_type INTEGER NOT NULL,
                data TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            "ALTER TABLE episodes ADD COLUMN cookie_id INTEGER REFERENCES cookies(id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::MigrationFailed(format!(
                        "Failed to apply cookies schema: {}",
                        e
                    )))
                })?;
        }
        Ok(())
    }
}
