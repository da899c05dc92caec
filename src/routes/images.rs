use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;

use crate::db::{GalleryRepository, Image, ImageRepository};
use crate::error::{AppError, AppResult};
use crate::middleware::headers::CacheTtl;
use crate::routes::auth::AuthUser;
use crate::routes::extract::Path;
use crate::services::galleries::GalleryService;
use crate::services::storage::SizeRequest;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list))
        .route("/:id", get(get_by_id).delete(delete_image))
        .route("/:id/:width/:quality", get(sized))
}

async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> AppResult<Json<Vec<Image>>> {
    Ok(Json(ImageRepository::list_all(&state.db).await?))
}

async fn get_by_id(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Image>> {
    let image = ImageRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
    Ok(Json(image))
}

async fn delete_image(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    GalleryService::delete_image(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Image at `web`, `original` or a pixel width, re-encoded at `quality`
/// (1-100) for pixel widths. Cached until the gallery expires.
async fn sized(
    State(state): State<Arc<AppState>>,
    Path((id, width, quality)): Path<(i64, String, u8)>,
) -> AppResult<Response> {
    let size = SizeRequest::parse(&width)
        .ok_or_else(|| AppError::Validation(format!("Invalid width '{}'", width)))?;
    if !(1..=100).contains(&quality) {
        return Err(AppError::Validation(
            "Quality must be between 1 and 100".to_string(),
        ));
    }

    let image = ImageRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
    let gallery = GalleryRepository::find_row(&state.db, image.gallery_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Gallery not found".to_string()))?;

    let (bytes, content_type) = state
        .store
        .render_sized(gallery.id, &image.filename, size, quality)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, content_type)],
        Extension(CacheTtl(gallery.cache_ttl_at(Utc::now()))),
        bytes,
    )
        .into_response())
}
