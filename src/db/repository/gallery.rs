use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::db::repository::ImageRepository;
use crate::error::{AppError, AppResult};

// ============================================================================
// Gallery Repository
// ============================================================================

pub struct GalleryRepository;

const GALLERY_COLUMNS: &str = r#"
    id, title, path, event_date, live, expiration, public, protected, password,
    reminder, reminder_emails, zips_ready, created_at, updated_at
"#;

fn map_gallery(r: SqliteRow) -> Gallery {
    Gallery {
        id: r.get("id"),
        title: r.get("title"),
        path: r.get("path"),
        event_date: r.get("event_date"),
        live: r.get("live"),
        expiration: r.get("expiration"),
        public: r.get("public"),
        protected: r.get("protected"),
        password: r.get("password"),
        reminder: r.get("reminder"),
        reminder_emails: r.get("reminder_emails"),
        zips_ready: r.get("zips_ready"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        images: Vec::new(),
        featured_image: None,
        images_count: None,
    }
}

/// Unique constraint violations surface as `Conflict` instead of a generic
/// database error.
fn map_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::Conflict(
                "A gallery with this title or path already exists".to_string(),
            );
        }
    }
    AppError::Database(e)
}

impl GalleryRepository {
    /// Insert a gallery. `password` must already be hashed.
    pub async fn create(pool: &SqlitePool, gallery: &CreateGallery) -> AppResult<Gallery> {
        let now = Utc::now();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO galleries (
                title, path, event_date, live, expiration, public, protected,
                password, reminder, reminder_emails, zips_ready, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&gallery.title)
        .bind(&gallery.path)
        .bind(gallery.event_date)
        .bind(gallery.live)
        .bind(gallery.expiration)
        .bind(gallery.public)
        .bind(gallery.protected)
        .bind(&gallery.password)
        .bind(gallery.reminder)
        .bind(&gallery.reminder_emails)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(map_write_error)?;

        Self::find_row(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gallery not found".to_string()))
    }

    /// Bare row, no images attached.
    pub async fn find_row(pool: &SqlitePool, id: i64) -> AppResult<Option<Gallery>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM galleries WHERE id = ?",
            GALLERY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(map_gallery))
    }

    /// Gallery with its images in position order, featured image and count.
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Gallery>> {
        match Self::find_row(pool, id).await? {
            Some(gallery) => Ok(Some(Self::with_images(pool, gallery).await?)),
            None => Ok(None),
        }
    }

    /// Gallery by its client path with images attached. Lifecycle filtering
    /// is left to the caller.
    pub async fn find_by_path(pool: &SqlitePool, path: &str) -> AppResult<Option<Gallery>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM galleries WHERE path = ?",
            GALLERY_COLUMNS
        ))
        .bind(path)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        match row {
            Some(r) => Ok(Some(Self::with_images(pool, map_gallery(r)).await?)),
            None => Ok(None),
        }
    }

    /// All galleries, most recent live date first, without images.
    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Gallery>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM galleries ORDER BY live DESC, id DESC",
            GALLERY_COLUMNS
        ))
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(map_gallery).collect())
    }

    /// Attach featured image (falling back to a random one) and image count,
    /// as shown on gallery cards.
    pub async fn with_summary(pool: &SqlitePool, mut gallery: Gallery) -> AppResult<Gallery> {
        gallery.images_count = Some(Self::count_images(pool, gallery.id).await?);
        gallery.featured_image = match ImageRepository::find_featured(pool, gallery.id).await? {
            Some(image) => Some(image),
            None => ImageRepository::find_random(pool, gallery.id).await?,
        };
        Ok(gallery)
    }

    async fn with_images(pool: &SqlitePool, gallery: Gallery) -> AppResult<Gallery> {
        let mut gallery = Self::with_summary(pool, gallery).await?;
        gallery.images = ImageRepository::find_by_gallery(pool, gallery.id).await?;
        Ok(gallery)
    }

    pub async fn count_images(pool: &SqlitePool, gallery_id: i64) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE gallery_id = ?")
            .bind(gallery_id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Persist every mutable column of `gallery`.
    pub async fn save(pool: &SqlitePool, gallery: &Gallery) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE galleries SET
                title = ?, path = ?, event_date = ?, live = ?, expiration = ?,
                public = ?, protected = ?, password = ?, reminder = ?,
                reminder_emails = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&gallery.title)
        .bind(&gallery.path)
        .bind(gallery.event_date)
        .bind(gallery.live)
        .bind(gallery.expiration)
        .bind(gallery.public)
        .bind(gallery.protected)
        .bind(&gallery.password)
        .bind(gallery.reminder)
        .bind(&gallery.reminder_emails)
        .bind(Utc::now())
        .bind(gallery.id)
        .execute(pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Gallery not found".to_string()));
        }
        Ok(())
    }

    pub async fn set_zips_ready(pool: &SqlitePool, gallery_id: i64, ready: bool) -> AppResult<()> {
        sqlx::query("UPDATE galleries SET zips_ready = ? WHERE id = ?")
            .bind(ready)
            .bind(gallery_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Delete the row; images and events go with it.
    pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM galleries WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
