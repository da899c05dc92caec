use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::headers::CacheTtl;
use crate::routes::extract::Path;
use crate::services::downloads::{parse_tier, Download, DownloadService};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:size/image/:id", get(download_image))
        .route("/:size/gallery/:id", get(download_gallery))
        .route("/:size/images", post(download_images))
}

#[derive(Debug, Deserialize)]
pub struct BulkDownloadRequest {
    pub ids: Vec<i64>,
}

/// Client address for the audit log: first `X-Forwarded-For` hop when
/// behind a proxy, otherwise the peer address.
pub fn requestor(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|p| p.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn attachment(download: Download) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.filename.replace('"', "")
    );
    (
        [
            (header::CONTENT_TYPE, download.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Extension(CacheTtl(download.cache_ttl)),
        download.bytes,
    )
        .into_response()
}

async fn download_image(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Path((size, id)): Path<(String, i64)>,
) -> AppResult<Response> {
    let tier = parse_tier(&size)?;
    let who = requestor(&headers, peer.map(|c| c.0));
    let download = DownloadService::image(&state, tier, id, &who, Utc::now()).await?;
    Ok(attachment(download))
}

async fn download_gallery(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Path((size, id)): Path<(String, i64)>,
) -> AppResult<Response> {
    let tier = parse_tier(&size)?;
    let who = requestor(&headers, peer.map(|c| c.0));
    let download = DownloadService::gallery(&state, tier, id, &who, Utc::now()).await?;
    Ok(attachment(download))
}

async fn download_images(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Path(size): Path<String>,
    Json(request): Json<BulkDownloadRequest>,
) -> AppResult<Response> {
    let tier = parse_tier(&size)?;
    let who = requestor(&headers, peer.map(|c| c.0));
    let download = DownloadService::images(&state, tier, &request.ids, &who, Utc::now()).await?;
    Ok(attachment(download))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn requestor_prefers_forwarded_for() {
        let peer: SocketAddr = "10.0.0.2:41000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(requestor(&headers, Some(peer)), "10.0.0.2:41000");
        assert_eq!(requestor(&headers, None), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(requestor(&headers, Some(peer)), "203.0.113.9");
    }
}
