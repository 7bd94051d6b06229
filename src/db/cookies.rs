//! Access-cookie records for protected sources.

use crate::error::{DatabaseError, Error, Result};
use crate::types::SourceType;

use super::{Cookie, Database};

/// New cookie to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewCookie {
    /// Source kind the cookie authenticates against
    pub source_type: SourceType,
    /// Raw cookie text in Netscape format
    pub data: String,
}

impl Database {
    /// Insert a new cookie record
    pub async fn insert_cookie(&self, cookie: &NewCookie) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO cookies (source_type, data, created_at) VALUES (?, ?, ?)",
        )
        .bind(cookie.source_type.to_i32())
        .bind(&cookie.data)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert cookie: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Get a cookie by ID
    pub async fn get_cookie(&self, id: i64) -> Result<Option<Cookie>> {
        let row = sqlx::query_as::<_, Cookie>(
            "SELECT id, source_type, data, created_at FROM cookies WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get cookie: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a cookie by ID, failing if it does not exist
    pub async fn get_cookie_required(&self, id: i64) -> Result<Cookie> {
        self.get_cookie(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("cookie {} not found", id)))
    }
}
