use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{CreateGallery, Gallery, GalleryUpdate, Image};
use crate::error::{AppError, AppErrorWithDetails, AppResult};
use crate::routes::auth::AuthUser;
use crate::routes::extract::Path;
use crate::services::galleries::GalleryService;
use crate::AppState;

/// Multipart field carrying uploaded image files.
const UPLOAD_FIELD: &str = "src";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // public
        .route("/public", get(list_public))
        .route("/live", get(list_live))
        .route("/path/:path", get(get_by_path).post(unlock))
        // admin
        .route("/", get(list).post(create))
        .route(
            "/id/:id",
            get(get_by_id).put(update).delete(delete_gallery),
        )
        .route("/id/:id/images", post(upload_images).put(reorder_images))
        .route("/id/:id/images/zip", post(build_zips))
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub password: String,
}

// ============================================================================
// Public handlers
// ============================================================================

async fn list_public(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Gallery>>> {
    Ok(Json(GalleryService::list_public(&state, Utc::now()).await?))
}

async fn list_live(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Gallery>>> {
    Ok(Json(GalleryService::list_live(&state, Utc::now()).await?))
}

async fn get_by_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> AppResult<Json<Gallery>> {
    Ok(Json(
        GalleryService::get_live_by_path(&state, &path, Utc::now()).await?,
    ))
}

async fn unlock(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(request): Json<UnlockRequest>,
) -> AppResult<Json<Gallery>> {
    Ok(Json(
        GalleryService::unlock(&state, &path, &request.password, Utc::now()).await?,
    ))
}

// ============================================================================
// Admin handlers
// ============================================================================

async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> AppResult<Json<Vec<Gallery>>> {
    Ok(Json(GalleryService::list(&state).await?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Json(input): Json<CreateGallery>,
) -> Result<(StatusCode, Json<Gallery>), AppErrorWithDetails> {
    let gallery = GalleryService::create(&state, input).await?;
    Ok((StatusCode::CREATED, Json(gallery)))
}

async fn get_by_id(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Gallery>> {
    Ok(Json(GalleryService::get(&state, id).await?))
}

async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
    Json(input): Json<GalleryUpdate>,
) -> Result<Json<Gallery>, AppErrorWithDetails> {
    Ok(Json(GalleryService::update(&state, id, input).await?))
}

async fn delete_gallery(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    GalleryService::delete(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Every `src` part is stored as one image, in upload order.
async fn upload_images(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Vec<Image>>)> {
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
        images.push(GalleryService::upload_image(&state, id, bytes.to_vec()).await?);
    }

    if images.is_empty() {
        return Err(AppError::BadRequest(format!(
            "No file found in form field '{}'",
            UPLOAD_FIELD
        )));
    }
    Ok((StatusCode::CREATED, Json(images)))
}

async fn reorder_images(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
    Json(ids): Json<Vec<i64>>,
) -> AppResult<Json<Vec<Image>>> {
    Ok(Json(GalleryService::reorder(&state, id, &ids).await?))
}

async fn build_zips(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Gallery>> {
    Ok(Json(GalleryService::build_zips(&state, id).await?))
}
