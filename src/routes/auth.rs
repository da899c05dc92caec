use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::User;
use crate::error::{AppError, AppResult};
use crate::services::auth::{AuthService, LoginOutcome};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(login).get(me).put(update_me))
        .route("/2fa", post(verify_two_factor))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub email: String,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Token(TokenResponse),
    Message { message: &'static str },
}

// ============================================================================
// Handlers
// ============================================================================

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let response = match AuthService::login(&state, request.email.trim(), &request.password).await? {
        LoginOutcome::Authenticated { user, token } => {
            LoginResponse::Token(TokenResponse { user, token })
        }
        LoginOutcome::CodeSent => LoginResponse::Message {
            message: "2FA code sent to email",
        },
    };
    Ok(Json(response))
}

async fn verify_two_factor(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TwoFactorRequest>,
) -> AppResult<Json<TokenResponse>> {
    let (user, token) =
        AuthService::verify_code(&state, request.email.trim(), request.code.trim()).await?;
    Ok(Json(TokenResponse { user, token }))
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<UpdateMeRequest>,
) -> AppResult<Json<User>> {
    let updated = AuthService::update_user(
        &state,
        user.id,
        &request.email,
        request.password.as_deref(),
    )
    .await?;
    Ok(Json(updated))
}

// ============================================================================
// Extractor
// ============================================================================

/// Authenticated administrator, from an `Authorization: Bearer <jwt>` header.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() {
            tracing::debug!("Empty bearer token in Authorization header");
            return Err(AppError::Unauthorized);
        }

        let user = AuthService::get_user_from_token(state, token)
            .await
            .map_err(|e| {
                tracing::debug!("Failed to get user from token: {:?}", e);
                AppError::Unauthorized
            })?;

        tracing::debug!("Authenticated user: {}", user.id);
        Ok(AuthUser(user))
    }
}
