use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::db::{CreateEvent, Event, EventRepository, GalleryRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::routes::extract::Path;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_by_id).delete(delete_event))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub gallery_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Client-reported download event.
async fn create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateEvent>,
) -> AppResult<(StatusCode, Json<Event>)> {
    if GalleryRepository::find_row(&state.db, input.gallery_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Gallery not found".to_string()));
    }
    let event = EventRepository::create(&state.db, &input).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Query(query): Query<EventsQuery>,
) -> AppResult<Json<Vec<Event>>> {
    let limit = query.limit.map(|l| l.clamp(1, 1000));
    let events = EventRepository::list(&state.db, query.gallery_id, limit, query.offset).await?;
    Ok(Json(events))
}

async fn get_by_id(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Event>> {
    let event = EventRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
    Ok(Json(event))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !EventRepository::delete(&state.db, id).await? {
        return Err(AppError::NotFound("Event not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
