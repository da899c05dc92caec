use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::db::User;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::routes::extract::Path;
use crate::services::auth::AuthService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/create", post(create_admin))
        .route("/:id", put(update_user))
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub password: Option<String>,
}

/// First-run account creation; refused once any user exists.
async fn create_admin(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAdminRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = AuthService::create_admin(&state, &request.email, &request.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    let user =
        AuthService::update_user(&state, id, &request.email, request.password.as_deref()).await?;
    Ok(Json(user))
}
