use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Settings Repository
// ============================================================================

pub struct SettingsRepository;

impl SettingsRepository {
    /// The singleton row, recreated if it was removed by hand.
    pub async fn get(pool: &SqlitePool) -> AppResult<Settings> {
        sqlx::query("INSERT OR IGNORE INTO settings (id, update_pending, updated_at) VALUES (1, 0, ?)")
            .bind(Utc::now())
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        sqlx::query_as::<_, Settings>(
            "SELECT id, update_pending, client_webhook_url, updated_at FROM settings WHERE id = 1",
        )
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Flip the "client needs a redeploy" flag.
    pub async fn set_update_pending(pool: &SqlitePool, pending: bool) -> AppResult<()> {
        sqlx::query("UPDATE settings SET update_pending = ?, updated_at = ? WHERE id = 1")
            .bind(pending)
            .bind(Utc::now())
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn set_client_webhook_url(pool: &SqlitePool, url: Option<&str>) -> AppResult<()> {
        sqlx::query("UPDATE settings SET client_webhook_url = ?, updated_at = ? WHERE id = 1")
            .bind(url)
            .bind(Utc::now())
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
