use std::sync::Arc;

use axum::{routing::get, Router};

use crate::middleware::headers::headers_middleware;
use crate::AppState;

pub mod auth;
pub mod downloads;
pub mod events;
pub mod extract;
pub mod galleries;
pub mod health;
pub mod images;
pub mod settings;
pub mod users;

/// Everything served under `/api`. The auth router is passed in so the
/// caller can wrap it in a rate limiter.
pub fn api(auth_router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/health", get(health::health_check))
        .route("/live", get(health::live))
        .route("/ready", get(health::ready))
        .nest("/v1/auth", auth_router)
        .nest("/v1/users", users::router())
        .nest("/v1/galleries", galleries::router())
        .nest("/v1/images", images::router())
        .nest("/v1/download", downloads::router())
        .nest("/v1/events", events::router())
        .nest("/v1/settings", settings::router())
        .layer(axum::middleware::from_fn(headers_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::tests::RecordingMailer;
    use crate::services::init::tests::test_state;
    use crate::services::redeploy::tests::CountingRedeployer;
    use crate::services::storage::tests::png_bytes;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn app() -> (Router, Arc<AppState>) {
        let state = test_state(
            Arc::new(RecordingMailer::default()),
            Arc::new(CountingRedeployer::default()),
        )
        .await;
        let router = Router::new()
            .nest("/api", api(auth::router()))
            .with_state(state.clone());
        (router, state)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn multipart_upload(uri: &str, token: &str, file: Vec<u8>) -> Request<Body> {
        let boundary = "gallery-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"src\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n",
                b = boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn bootstrap_token(app: &Router) -> String {
        let (status, _, _) = send(
            app,
            json_request(
                "POST",
                "/api/v1/users/admin/create",
                None,
                serde_json::json!({ "email": "admin@example.com", "password": "secret" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _, body) = send(
            app,
            json_request(
                "POST",
                "/api/v1/auth",
                None,
                serde_json::json!({ "email": "admin@example.com", "password": "secret" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        value["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoints() {
        let (app, _) = app().await;
        let (status, headers, body) = send(&app, get("/api/ping", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"pong");
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");

        let (status, _, _) = send(&app, get("/api/ready", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let (app, _) = app().await;
        for uri in ["/api/v1/galleries", "/api/v1/images", "/api/v1/events", "/api/v1/settings"] {
            let (status, _, body) = send(&app, get(uri, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value["error"]["code"], "UNAUTHORIZED");
        }
        let (status, _, _) = send(&app, get("/api/v1/galleries", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bootstrap_is_single_use() {
        let (app, _) = app().await;
        bootstrap_token(&app).await;
        let (status, _, _) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/users/admin/create",
                None,
                serde_json::json!({ "email": "x@example.com", "password": "secret" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, _, body) = send(&app, get("/api/v1/settings/public", None)).await;
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["new_application"], false);
    }

    #[tokio::test]
    async fn gallery_upload_and_download_flow() {
        let (app, state) = app().await;
        let token = bootstrap_token(&app).await;
        let now = chrono::Utc::now();

        let (status, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/galleries",
                Some(&token),
                serde_json::json!({
                    "title": "Smith Wedding",
                    "path": "smith-wedding",
                    "live": (now - chrono::Duration::hours(1)).to_rfc3339(),
                    "expiration": (now + chrono::Duration::days(7)).to_rfc3339(),
                    "public": true
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let gallery: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let id = gallery["id"].as_i64().unwrap();
        assert!(gallery.get("password").is_none());

        let (status, _, body) = send(
            &app,
            multipart_upload(&format!("/api/v1/galleries/id/{}/images", id), &token, png_bytes(120, 60)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let images: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let image_id = images[0]["id"].as_i64().unwrap();

        let (status, headers, body) =
            send(&app, get(&format!("/api/v1/download/web/gallery/{}", id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/zip");
        assert_eq!(
            headers.get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"smith-wedding.zip\""
        );
        let cache = headers.get(header::CACHE_CONTROL).unwrap().to_str().unwrap();
        assert!(cache.starts_with("public, max-age="));
        let archive = zip::ZipArchive::new(std::io::Cursor::new(body)).unwrap();
        assert_eq!(archive.len(), 1);

        let (status, headers, _) =
            send(&app, get(&format!("/api/v1/images/{}/32/80", image_id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/jpeg");

        let (status, _, _) =
            send(&app, get(&format!("/api/v1/download/huge/image/{}", image_id), None)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, _, body) = send(&app, get("/api/v1/events", Some(&token))).await;
        let events: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(events.as_array().unwrap().len(), 1);

        let (_, _, body) = send(&app, get("/api/v1/galleries/public", None)).await;
        let public: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(public[0]["path"], "smith-wedding");
        assert_eq!(public[0]["images_count"], 1);

        let _ = std::fs::remove_dir_all(&state.config.storage.images_dir);
    }

    #[tokio::test]
    async fn reserved_path_reports_field() {
        let (app, _) = app().await;
        let token = bootstrap_token(&app).await;
        let now = chrono::Utc::now();
        let (status, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/galleries",
                Some(&token),
                serde_json::json!({
                    "title": "Admin",
                    "path": "admin",
                    "live": now.to_rfc3339(),
                    "expiration": now.to_rfc3339()
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["details"]["field"], "path");
    }

    #[tokio::test]
    async fn malformed_ids_are_json_not_found() {
        let (app, _) = app().await;
        let token = bootstrap_token(&app).await;

        for (uri, token) in [
            ("/api/v1/download/web/image/abc", None),
            ("/api/v1/download/web/gallery/1x", None),
            ("/api/v1/galleries/id/abc", Some(token.as_str())),
            ("/api/v1/events/abc", Some(token.as_str())),
        ] {
            let (status, headers, body) = send(&app, get(uri, token)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json", "{}", uri);
            let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value["error"]["code"], "NOT_FOUND");
        }
    }
}
