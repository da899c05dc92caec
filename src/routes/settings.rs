use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::settings::{PublicSettings, SettingsService, SettingsView, UpdateSettings};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_settings).put(update_settings))
        .route("/public", get(public_settings))
        .route("/redeploy", post(redeploy))
}

async fn public_settings(State(state): State<Arc<AppState>>) -> AppResult<Json<PublicSettings>> {
    Ok(Json(SettingsService::public(&state).await?))
}

async fn get_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> AppResult<Json<SettingsView>> {
    Ok(Json(SettingsService::get(&state).await?))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(input): Json<UpdateSettings>,
) -> AppResult<Json<SettingsView>> {
    tracing::debug!("Settings updated by user {}", user.id);
    Ok(Json(SettingsService::update(&state, input).await?))
}

async fn redeploy(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<SettingsView>> {
    tracing::info!("Manual redeploy requested by user {}", user.id);
    Ok(Json(SettingsService::redeploy(&state).await?))
}
