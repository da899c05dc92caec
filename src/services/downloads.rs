//! Public downloads: single images, whole-gallery zips and bulk selections.
//! Each successful download appends an audit event.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::{CreateEvent, EventRepository, Gallery, GalleryRepository, ImageRepository, ImageTier};
use crate::error::{AppError, AppResult};
use crate::services::archive::ArchiveService;
use crate::services::storage::content_type_for;
use crate::AppState;

/// A file ready to be sent as an attachment.
#[derive(Debug)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    /// Seconds the response may be cached for.
    pub cache_ttl: u64,
}

pub fn parse_tier(size: &str) -> AppResult<ImageTier> {
    ImageTier::from_str(size).ok_or_else(|| {
        AppError::Validation(format!(
            "Invalid size '{}'; expected 'original' or 'web'",
            size
        ))
    })
}

pub struct DownloadService;

impl DownloadService {
    async fn live_gallery(
        state: &Arc<AppState>,
        gallery_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Gallery> {
        GalleryRepository::find_row(&state.db, gallery_id)
            .await?
            .filter(|g| g.is_live_at(now))
            .ok_or_else(|| AppError::NotFound("Gallery not found".to_string()))
    }

    async fn record(
        state: &Arc<AppState>,
        gallery: &Gallery,
        image_id: Option<i64>,
        requestor: &str,
        tier: ImageTier,
        download: &Download,
    ) -> AppResult<()> {
        EventRepository::create(
            &state.db,
            &CreateEvent {
                gallery_id: gallery.id,
                image_id,
                requestor: requestor.to_string(),
                filename: download.filename.clone(),
                size: tier.as_str().to_string(),
                bytes: download.bytes.len() as i64,
            },
        )
        .await?;
        tracing::info!(
            "Download of {} ({}, {} bytes) by {}",
            download.filename,
            tier,
            download.bytes.len(),
            requestor
        );
        Ok(())
    }

    pub async fn image(
        state: &Arc<AppState>,
        tier: ImageTier,
        image_id: i64,
        requestor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Download> {
        let image = ImageRepository::find_by_id(&state.db, image_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
        let gallery = Self::live_gallery(state, image.gallery_id, now).await?;

        let bytes = state.store.read(gallery.id, tier, &image.filename).await?;
        let download = Download {
            content_type: content_type_for(&image.filename),
            filename: image.filename,
            bytes,
            cache_ttl: gallery.cache_ttl_at(now),
        };
        Self::record(state, &gallery, Some(image.id), requestor, tier, &download).await?;
        Ok(download)
    }

    /// Whole gallery: the pre-built archive when usable, otherwise one built
    /// in memory from the gallery's images in display order.
    pub async fn gallery(
        state: &Arc<AppState>,
        tier: ImageTier,
        gallery_id: i64,
        requestor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Download> {
        let gallery = Self::live_gallery(state, gallery_id, now).await?;

        let bytes = match ArchiveService::usable_zip(&state.store, gallery.id, gallery.zips_ready, tier).await {
            Some(path) => tokio::fs::read(&path).await?,
            None => {
                let filenames = ImageRepository::find_by_gallery(&state.db, gallery.id)
                    .await?
                    .into_iter()
                    .map(|i| i.filename)
                    .collect();
                ArchiveService::build_on_demand(&state.store, gallery.id, tier, filenames).await?
            }
        };

        let download = Download {
            filename: format!("{}.zip", gallery.path),
            content_type: "application/zip",
            bytes,
            cache_ttl: gallery.cache_ttl_at(now),
        };
        Self::record(state, &gallery, None, requestor, tier, &download).await?;
        Ok(download)
    }

    /// Zip of a selection, in request order. The first requested id that
    /// exists decides the gallery; ids that are unknown or belong elsewhere
    /// are skipped.
    pub async fn images(
        state: &Arc<AppState>,
        tier: ImageTier,
        ids: &[i64],
        requestor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Download> {
        let images = ImageRepository::find_many(&state.db, ids).await?;
        let first = images
            .first()
            .ok_or_else(|| AppError::NotFound("No images found".to_string()))?;
        let gallery = Self::live_gallery(state, first.gallery_id, now).await?;

        let filenames: Vec<String> = images
            .into_iter()
            .filter(|i| i.gallery_id == gallery.id)
            .map(|i| i.filename)
            .collect();
        let bytes = ArchiveService::build_on_demand(&state.store, gallery.id, tier, filenames).await?;

        let download = Download {
            filename: format!("{}.zip", gallery.path),
            content_type: "application/zip",
            bytes,
            cache_ttl: gallery.cache_ttl_at(now),
        };
        Self::record(state, &gallery, None, requestor, tier, &download).await?;
        Ok(download)
    }
}
