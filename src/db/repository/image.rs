use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Image Repository
// ============================================================================

pub struct ImageRepository;

const IMAGE_COLUMNS: &str =
    "id, gallery_id, featured_gallery_id, size, width, height, position, filename, created_at";

impl ImageRepository {
    /// Insert an image at the end of its gallery's ordering.
    pub async fn create(pool: &SqlitePool, image: &CreateImage) -> AppResult<Image> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO images (gallery_id, size, width, height, position, filename, created_at)
            VALUES (
                ?, ?, ?, ?,
                (SELECT COUNT(*) FROM images WHERE gallery_id = ?),
                ?, ?
            )
            RETURNING id
            "#,
        )
        .bind(image.gallery_id)
        .bind(image.size)
        .bind(image.width)
        .bind(image.height)
        .bind(image.gallery_id)
        .bind(&image.filename)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Image>> {
        sqlx::query_as::<_, Image>(&format!("SELECT {} FROM images WHERE id = ?", IMAGE_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Image>> {
        sqlx::query_as::<_, Image>(&format!(
            "SELECT {} FROM images ORDER BY gallery_id, position, id",
            IMAGE_COLUMNS
        ))
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Images with the given ids, in the order of `ids`. Unknown ids are
    /// simply absent from the result.
    pub async fn find_many(pool: &SqlitePool, ids: &[i64]) -> AppResult<Vec<Image>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM images WHERE id IN ({})",
            IMAGE_COLUMNS, placeholders
        );
        let mut query = sqlx::query_as::<_, Image>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        let mut images = query.fetch_all(pool).await.map_err(AppError::Database)?;
        images.sort_by_key(|image| ids.iter().position(|id| *id == image.id));
        Ok(images)
    }

    /// Images of a gallery in display order.
    pub async fn find_by_gallery(pool: &SqlitePool, gallery_id: i64) -> AppResult<Vec<Image>> {
        sqlx::query_as::<_, Image>(&format!(
            "SELECT {} FROM images WHERE gallery_id = ? ORDER BY position, id",
            IMAGE_COLUMNS
        ))
        .bind(gallery_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_featured(pool: &SqlitePool, gallery_id: i64) -> AppResult<Option<Image>> {
        sqlx::query_as::<_, Image>(&format!(
            "SELECT {} FROM images WHERE featured_gallery_id = ?",
            IMAGE_COLUMNS
        ))
        .bind(gallery_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Any image of the gallery, landscape ones first.
    pub async fn find_random(pool: &SqlitePool, gallery_id: i64) -> AppResult<Option<Image>> {
        sqlx::query_as::<_, Image>(&format!(
            r#"
            SELECT {} FROM images
            WHERE gallery_id = ?
            ORDER BY CASE WHEN width > height THEN 0 ELSE 1 END, RANDOM()
            LIMIT 1
            "#,
            IMAGE_COLUMNS
        ))
        .bind(gallery_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Move an image within its gallery. Returns false when the image does
    /// not belong to the gallery.
    /// Write `position = index` for each id in one transaction.
    pub async fn set_positions(pool: &SqlitePool, gallery_id: i64, ids: &[i64]) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        for (position, image_id) in ids.iter().enumerate() {
            let result =
                sqlx::query("UPDATE images SET position = ? WHERE id = ? AND gallery_id = ?")
                    .bind(position as i64)
                    .bind(*image_id)
                    .bind(gallery_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(AppError::Database)?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound(format!(
                    "Image {} not found in gallery {}",
                    image_id, gallery_id
                )));
            }
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Make `image_id` the one featured image of `gallery_id`.
    pub async fn set_featured(pool: &SqlitePool, gallery_id: i64, image_id: i64) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query("UPDATE images SET featured_gallery_id = NULL WHERE featured_gallery_id = ?")
            .bind(gallery_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        let result = sqlx::query(
            "UPDATE images SET featured_gallery_id = ? WHERE id = ? AND gallery_id = ?",
        )
        .bind(gallery_id)
        .bind(image_id)
        .bind(gallery_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "No image with the given ID in this gallery".to_string(),
            ));
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
