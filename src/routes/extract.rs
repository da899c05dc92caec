use axum::extract::FromRequestParts;

use crate::error::AppError;

/// `axum::extract::Path` with rejections in the API error format.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);
