use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Repository
// ============================================================================

pub struct EventRepository;

const EVENT_COLUMNS: &str =
    "id, gallery_id, image_id, requestor, filename, size, bytes, created_at";

impl EventRepository {
    pub async fn create(pool: &SqlitePool, event: &CreateEvent) -> AppResult<Event> {
        sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (gallery_id, image_id, requestor, filename, size, bytes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(event.gallery_id)
        .bind(event.image_id)
        .bind(&event.requestor)
        .bind(&event.filename)
        .bind(&event.size)
        .bind(event.bytes)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Newest first, optionally restricted to one gallery.
    pub async fn list(
        pool: &SqlitePool,
        gallery_id: Option<i64>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<Event>> {
        let limit_val = limit.unwrap_or(100);
        let offset_val = offset.unwrap_or(0);

        sqlx::query_as::<_, Event>(&format!(
            r#"
            SELECT {} FROM events
            WHERE (? IS NULL OR gallery_id = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            OFFSET ?
            "#,
            EVENT_COLUMNS
        ))
        .bind(gallery_id)
        .bind(gallery_id)
        .bind(limit_val)
        .bind(offset_val)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
