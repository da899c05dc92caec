//! Gallery management.
//!
//! Every mutation that changes what a visitor of a live gallery would see
//! raises the settings `update` flag, and every change to a gallery's image
//! set invalidates its pre-built zips.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::{
    CreateGallery, CreateImage, Gallery, GalleryRepository, GalleryUpdate, Image, ImageRepository,
    SettingsRepository, RESERVED_PATH,
};
use crate::error::{AppError, AppErrorWithDetails, AppResult};
use crate::services::archive::ArchiveService;
use crate::services::auth::{hash_password, verify_password, GALLERY_PASSWORD_COST};
use crate::AppState;

fn field_error(field: &str, message: &str) -> AppErrorWithDetails {
    AppError::Validation(message.to_string()).with_details(serde_json::json!({ "field": field }))
}

fn validate_title(title: &str) -> Result<(), AppErrorWithDetails> {
    if title.trim().is_empty() {
        return Err(field_error("title", "Title is required"));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), AppErrorWithDetails> {
    let path = path.trim();
    if path.is_empty() {
        return Err(field_error("path", "Path is required"));
    }
    if path.eq_ignore_ascii_case(RESERVED_PATH) {
        return Err(field_error("path", "Path 'admin' is reserved"));
    }
    if path.contains('/') {
        return Err(field_error("path", "Path must be a single segment"));
    }
    Ok(())
}

pub fn validate_new(gallery: &CreateGallery) -> Result<(), AppErrorWithDetails> {
    validate_title(&gallery.title)?;
    validate_path(&gallery.path)
}

/// Apply a partial update in place. `password` must already be hashed;
/// an empty string clears it, as does an empty `reminder_emails`.
/// Returns the image to feature, if one was requested.
pub fn apply_update(
    gallery: &mut Gallery,
    update: GalleryUpdate,
) -> Result<Option<i64>, AppErrorWithDetails> {
    if let Some(title) = update.title {
        validate_title(&title)?;
        gallery.title = title.trim().to_string();
    }
    if let Some(path) = update.path {
        validate_path(&path)?;
        gallery.path = path.trim().to_string();
    }
    gallery.event_date = update.event_date;
    if let Some(live) = update.live {
        gallery.live = live;
    }
    if let Some(expiration) = update.expiration {
        gallery.expiration = expiration;
    }
    if let Some(public) = update.public {
        gallery.public = public;
    }
    if let Some(protected) = update.protected {
        gallery.protected = protected;
    }
    if let Some(password) = update.password {
        gallery.password = (!password.is_empty()).then_some(password);
    }
    if let Some(reminder) = update.reminder {
        gallery.reminder = reminder;
    }
    if let Some(emails) = update.reminder_emails {
        gallery.reminder_emails = (!emails.trim().is_empty()).then_some(emails);
    }
    Ok(update.featured_image_id)
}

/// `requested` must be a permutation of `current`. Unknown ids are NotFound;
/// duplicates or omissions are rejected so positions stay distinct.
pub fn check_order(current: &[i64], requested: &[i64]) -> AppResult<()> {
    if let Some(unknown) = requested.iter().find(|id| !current.contains(id)) {
        return Err(AppError::NotFound(format!(
            "Image {} not found in gallery",
            unknown
        )));
    }

    let mut sorted_current = current.to_vec();
    let mut sorted_requested = requested.to_vec();
    sorted_current.sort_unstable();
    sorted_requested.sort_unstable();
    if sorted_current != sorted_requested {
        return Err(AppError::Validation(
            "Order must list every image of the gallery exactly once".to_string(),
        ));
    }
    Ok(())
}

pub struct GalleryService;

impl GalleryService {
    async fn flag_update(state: &Arc<AppState>) -> AppResult<()> {
        SettingsRepository::set_update_pending(&state.db, true).await
    }

    async fn flag_update_if_live(state: &Arc<AppState>, gallery: &Gallery) -> AppResult<()> {
        if gallery.is_live_at(Utc::now()) {
            Self::flag_update(state).await?;
        }
        Ok(())
    }

    async fn find_row(state: &Arc<AppState>, id: i64) -> AppResult<Gallery> {
        GalleryRepository::find_row(&state.db, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gallery not found".to_string()))
    }

    pub async fn get(state: &Arc<AppState>, id: i64) -> AppResult<Gallery> {
        GalleryRepository::find_by_id(&state.db, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gallery not found".to_string()))
    }

    pub async fn create(
        state: &Arc<AppState>,
        mut input: CreateGallery,
    ) -> Result<Gallery, AppErrorWithDetails> {
        validate_new(&input)?;
        input.title = input.title.trim().to_string();
        input.path = input.path.trim().to_string();
        input.password = match input.password.filter(|p| !p.is_empty()) {
            Some(p) => Some(hash_password(&p, GALLERY_PASSWORD_COST)?),
            None => None,
        };
        input.reminder_emails = input.reminder_emails.filter(|e| !e.trim().is_empty());

        let gallery = GalleryRepository::create(&state.db, &input).await?;
        Self::flag_update(state).await?;
        tracing::info!("Gallery {} created at /{}", gallery.id, gallery.path);
        Ok(gallery)
    }

    pub async fn update(
        state: &Arc<AppState>,
        id: i64,
        mut update: GalleryUpdate,
    ) -> Result<Gallery, AppErrorWithDetails> {
        let mut gallery = Self::find_row(state, id).await?;
        let was_live = gallery.is_live_at(Utc::now());

        update.password = match update.password {
            Some(p) if !p.is_empty() => Some(hash_password(&p, GALLERY_PASSWORD_COST)?),
            other => other,
        };
        let featured = apply_update(&mut gallery, update)?;

        GalleryRepository::save(&state.db, &gallery).await?;
        if let Some(image_id) = featured {
            ImageRepository::set_featured(&state.db, gallery.id, image_id).await?;
        }

        // a gallery moved into or out of its live window changes the client too
        if was_live || gallery.is_live_at(Utc::now()) {
            Self::flag_update(state).await?;
        }
        Ok(Self::get(state, id).await?)
    }

    /// Remove the gallery's files, then its row (images and events cascade).
    pub async fn delete(state: &Arc<AppState>, id: i64) -> AppResult<()> {
        let gallery = Self::find_row(state, id).await?;
        state.store.remove_gallery(gallery.id).await?;
        GalleryRepository::delete(&state.db, gallery.id).await?;
        Self::flag_update_if_live(state, &gallery).await?;
        tracing::info!("Gallery {} deleted", gallery.id);
        Ok(())
    }

    pub async fn upload_image(
        state: &Arc<AppState>,
        gallery_id: i64,
        bytes: Vec<u8>,
    ) -> AppResult<Image> {
        let gallery = Self::find_row(state, gallery_id).await?;
        let stored = state.store.save_upload(gallery.id, bytes).await?;

        let image = match ImageRepository::create(
            &state.db,
            &CreateImage {
                gallery_id: gallery.id,
                size: stored.size as i64,
                width: stored.width as i64,
                height: stored.height as i64,
                filename: stored.filename.clone(),
            },
        )
        .await
        {
            Ok(image) => image,
            Err(e) => {
                let _ = state.store.remove_image(gallery.id, &stored.filename).await;
                return Err(e);
            }
        };

        GalleryRepository::set_zips_ready(&state.db, gallery.id, false).await?;
        Self::flag_update_if_live(state, &gallery).await?;
        Ok(image)
    }

    /// Positions follow the order of `ids`, which must list every image of
    /// the gallery exactly once. Nothing is written unless the list is valid.
    pub async fn reorder(
        state: &Arc<AppState>,
        gallery_id: i64,
        ids: &[i64],
    ) -> AppResult<Vec<Image>> {
        let gallery = Self::find_row(state, gallery_id).await?;
        let current: Vec<i64> = ImageRepository::find_by_gallery(&state.db, gallery.id)
            .await?
            .iter()
            .map(|i| i.id)
            .collect();
        check_order(&current, ids)?;

        ImageRepository::set_positions(&state.db, gallery.id, ids).await?;
        GalleryRepository::set_zips_ready(&state.db, gallery.id, false).await?;
        Self::flag_update_if_live(state, &gallery).await?;
        ImageRepository::find_by_gallery(&state.db, gallery.id).await
    }

    pub async fn delete_image(state: &Arc<AppState>, image_id: i64) -> AppResult<()> {
        let image = ImageRepository::find_by_id(&state.db, image_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

        state.store.remove_image(image.gallery_id, &image.filename).await?;
        ImageRepository::delete(&state.db, image.id).await?;
        GalleryRepository::set_zips_ready(&state.db, image.gallery_id, false).await?;
        Self::flag_update(state).await?;
        Ok(())
    }

    pub async fn build_zips(state: &Arc<AppState>, gallery_id: i64) -> AppResult<Gallery> {
        let gallery = Self::find_row(state, gallery_id).await?;
        ArchiveService::build_gallery_zips(&state.db, &state.store, gallery.id).await?;
        Self::get(state, gallery.id).await
    }

    /// Every gallery with its card summary, most recent first.
    pub async fn list(state: &Arc<AppState>) -> AppResult<Vec<Gallery>> {
        let mut out = Vec::new();
        for gallery in GalleryRepository::list_all(&state.db).await? {
            out.push(GalleryRepository::with_summary(&state.db, gallery).await?);
        }
        Ok(out)
    }

    pub async fn list_live(state: &Arc<AppState>, now: DateTime<Utc>) -> AppResult<Vec<Gallery>> {
        let mut out = Vec::new();
        for gallery in GalleryRepository::list_all(&state.db).await? {
            if gallery.is_live_at(now) {
                out.push(GalleryRepository::with_summary(&state.db, gallery).await?);
            }
        }
        Ok(out)
    }

    /// Live galleries listed on the client home page.
    pub async fn list_public(state: &Arc<AppState>, now: DateTime<Utc>) -> AppResult<Vec<Gallery>> {
        Ok(Self::list_live(state, now)
            .await?
            .into_iter()
            .filter(|g| g.public && !g.protected)
            .collect())
    }

    /// Live gallery by client path. Protected galleries come back without
    /// their images until unlocked.
    pub async fn get_live_by_path(
        state: &Arc<AppState>,
        path: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Gallery> {
        let mut gallery = GalleryRepository::find_by_path(&state.db, path)
            .await?
            .filter(|g| g.is_live_at(now))
            .ok_or_else(|| AppError::NotFound("Gallery not found".to_string()))?;
        if gallery.protected {
            gallery.images.clear();
        }
        Ok(gallery)
    }

    pub async fn unlock(
        state: &Arc<AppState>,
        path: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Gallery> {
        let gallery = GalleryRepository::find_by_path(&state.db, path)
            .await?
            .filter(|g| g.is_live_at(now))
            .ok_or_else(|| AppError::NotFound("Gallery not found".to_string()))?;

        if gallery.protected {
            let ok = gallery
                .password
                .as_deref()
                .map(|hash| verify_password(password, hash))
                .unwrap_or(false);
            if !ok {
                return Err(AppError::Unauthorized);
            }
        }
        Ok(gallery)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::email::tests::RecordingMailer;
    use crate::services::init::tests::test_state;
    use crate::services::redeploy::tests::CountingRedeployer;
    use crate::services::storage::tests::png_bytes;
    use chrono::Duration;
    use sqlx::SqlitePool;

    /// Gallery going live `live_offset_minutes` from now, expiring in 30 days.
    pub(crate) async fn insert_gallery(
        pool: &SqlitePool,
        name: &str,
        live_offset_minutes: i64,
    ) -> Gallery {
        let now = Utc::now();
        GalleryRepository::create(
            pool,
            &CreateGallery {
                title: name.to_string(),
                path: name.to_string(),
                event_date: None,
                live: now + Duration::minutes(live_offset_minutes),
                expiration: now + Duration::days(30),
                public: true,
                protected: false,
                password: None,
                reminder: false,
                reminder_emails: None,
            },
        )
        .await
        .unwrap()
    }

    async fn state() -> Arc<AppState> {
        test_state(
            Arc::new(RecordingMailer::default()),
            Arc::new(CountingRedeployer::default()),
        )
        .await
    }

    async fn update_pending(state: &Arc<AppState>) -> bool {
        SettingsRepository::get(&state.db).await.unwrap().update_pending
    }

    fn new_gallery(path: &str) -> CreateGallery {
        let now = Utc::now();
        CreateGallery {
            title: format!("Title {}", path),
            path: path.to_string(),
            event_date: None,
            live: now - Duration::hours(1),
            expiration: now + Duration::days(10),
            public: true,
            protected: true,
            password: Some("letmein".to_string()),
            reminder: false,
            reminder_emails: Some("   ".to_string()),
        }
    }

    #[test]
    fn update_semantics() {
        let now = Utc::now();
        let mut gallery = Gallery {
            id: 1,
            title: "t".into(),
            path: "p".into(),
            event_date: Some(now),
            live: now,
            expiration: now,
            public: false,
            protected: true,
            password: Some("hash".into()),
            reminder: true,
            reminder_emails: Some("a@example.com".into()),
            zips_ready: true,
            created_at: now,
            updated_at: now,
            images: Vec::new(),
            featured_image: None,
            images_count: None,
        };

        let featured = apply_update(
            &mut gallery,
            GalleryUpdate {
                title: Some("New".into()),
                password: Some(String::new()),
                reminder_emails: Some(String::new()),
                featured_image_id: Some(9),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(featured, Some(9));
        assert_eq!(gallery.title, "New");
        assert_eq!(gallery.path, "p");
        assert!(gallery.password.is_none());
        assert!(gallery.reminder_emails.is_none());
        // event_date is always overwritten
        assert!(gallery.event_date.is_none());
        assert!(gallery.protected);

        let err = apply_update(
            &mut gallery,
            GalleryUpdate {
                path: Some("Admin".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err.error, AppError::Validation(_)));
        assert_eq!(err.details, Some(serde_json::json!({ "field": "path" })));
    }

    #[tokio::test]
    async fn create_hashes_password_and_flags_update() {
        let state = state().await;
        let gallery = GalleryService::create(&state, new_gallery("smith")).await.unwrap();

        let stored = gallery.password.clone().unwrap();
        assert_ne!(stored, "letmein");
        assert!(verify_password("letmein", &stored));
        assert!(gallery.reminder_emails.is_none());
        assert!(update_pending(&state).await);

        assert!(GalleryService::create(&state, new_gallery("admin")).await.is_err());
        let dup = GalleryService::create(&state, new_gallery("smith")).await.unwrap_err();
        assert!(matches!(dup.error, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn image_changes_invalidate_zips() {
        let state = state().await;
        let gallery = insert_gallery(&state.db, "wedding", -5).await;

        let first = GalleryService::upload_image(&state, gallery.id, png_bytes(80, 40)).await.unwrap();
        let second = GalleryService::upload_image(&state, gallery.id, png_bytes(40, 80)).await.unwrap();
        assert_eq!((first.position, second.position), (0, 1));
        assert!(update_pending(&state).await);

        GalleryService::build_zips(&state, gallery.id).await.unwrap();
        assert!(GalleryService::get(&state, gallery.id).await.unwrap().zips_ready);

        let reordered = GalleryService::reorder(&state, gallery.id, &[second.id, first.id])
            .await
            .unwrap();
        assert_eq!(reordered[0].id, second.id);
        assert!(!GalleryService::get(&state, gallery.id).await.unwrap().zips_ready);

        GalleryService::build_zips(&state, gallery.id).await.unwrap();
        SettingsRepository::set_update_pending(&state.db, false).await.unwrap();
        GalleryService::delete_image(&state, first.id).await.unwrap();
        let reloaded = GalleryService::get(&state, gallery.id).await.unwrap();
        assert!(!reloaded.zips_ready);
        assert_eq!(reloaded.images.len(), 1);
        assert!(update_pending(&state).await);
        assert!(!state
            .store
            .image_path(gallery.id, crate::db::ImageTier::Web, &first.filename)
            .exists());

        assert!(matches!(
            GalleryService::reorder(&state, gallery.id, &[first.id]).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn order_must_be_a_permutation() {
        assert!(check_order(&[1, 2, 3], &[3, 1, 2]).is_ok());
        assert!(check_order(&[], &[]).is_ok());
        assert!(matches!(check_order(&[1, 2], &[2, 9]), Err(AppError::NotFound(_))));
        assert!(matches!(check_order(&[1, 2], &[2]), Err(AppError::Validation(_))));
        assert!(matches!(check_order(&[1, 2], &[2, 2]), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn rejected_reorder_writes_nothing() {
        let state = state().await;
        let gallery = insert_gallery(&state.db, "ordered", -5).await;
        let a = GalleryService::upload_image(&state, gallery.id, png_bytes(20, 10)).await.unwrap();
        let b = GalleryService::upload_image(&state, gallery.id, png_bytes(10, 20)).await.unwrap();
        GalleryService::build_zips(&state, gallery.id).await.unwrap();

        assert!(matches!(
            GalleryService::reorder(&state, gallery.id, &[b.id, 9999]).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            GalleryService::reorder(&state, gallery.id, &[b.id]).await,
            Err(AppError::Validation(_))
        ));

        let reloaded = GalleryService::get(&state, gallery.id).await.unwrap();
        let order: Vec<(i64, i64)> = reloaded.images.iter().map(|i| (i.id, i.position)).collect();
        assert_eq!(order, vec![(a.id, 0), (b.id, 1)]);
        assert!(reloaded.zips_ready);
    }

    #[tokio::test]
    async fn pending_gallery_upload_does_not_flag_update() {
        let state = state().await;
        let gallery = insert_gallery(&state.db, "later", 60).await;
        GalleryService::upload_image(&state, gallery.id, png_bytes(10, 10)).await.unwrap();
        assert!(!update_pending(&state).await);
    }

    #[tokio::test]
    async fn public_listing_and_unlock() {
        let state = state().await;
        let now = Utc::now();
        let open = insert_gallery(&state.db, "open", -5).await;
        insert_gallery(&state.db, "future", 5).await;
        let locked = GalleryService::create(&state, new_gallery("locked")).await.unwrap();

        let public: Vec<i64> = GalleryService::list_public(&state, now)
            .await
            .unwrap()
            .iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(public, vec![open.id]);
        assert_eq!(GalleryService::list_live(&state, now).await.unwrap().len(), 2);

        assert!(matches!(
            GalleryService::get_live_by_path(&state, "future", now).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            GalleryService::unlock(&state, "locked", "nope", now).await,
            Err(AppError::Unauthorized)
        ));
        let unlocked = GalleryService::unlock(&state, "locked", "letmein", now).await.unwrap();
        assert_eq!(unlocked.id, locked.id);
    }

    #[tokio::test]
    async fn delete_removes_files_and_rows() {
        let state = state().await;
        let gallery = insert_gallery(&state.db, "gone", -5).await;
        let image = GalleryService::upload_image(&state, gallery.id, png_bytes(10, 10)).await.unwrap();

        GalleryService::delete(&state, gallery.id).await.unwrap();
        assert!(!state.store.gallery_dir(gallery.id).exists());
        assert!(ImageRepository::find_by_id(&state.db, image.id).await.unwrap().is_none());
        assert!(matches!(
            GalleryService::delete(&state, gallery.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
