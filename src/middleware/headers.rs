use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, Response},
    middleware::Next,
};

/// Response extension carrying how long a response may be cached, in seconds.
/// Turned into a `Cache-Control` header on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl(pub u64);

pub fn cache_control_value(ttl: u64) -> HeaderValue {
    if ttl == 0 {
        HeaderValue::from_static("no-store")
    } else {
        HeaderValue::from_str(&format!("public, max-age={}", ttl))
            .unwrap_or_else(|_| HeaderValue::from_static("no-store"))
    }
}

// Security headers on every response plus Cache-Control for responses that
// carry a `CacheTtl`.
pub async fn headers_middleware(req: Request<Body>, next: Next) -> Response<Body> {
    let mut res = next.run(req).await;

    const CSP: &str = "default-src 'none'; img-src 'self'; frame-ancestors 'none'";

    if let Some(CacheTtl(ttl)) = res.extensions().get::<CacheTtl>().copied() {
        res.headers_mut()
            .insert(header::CACHE_CONTROL, cache_control_value(ttl));
    }

    if res.headers().get("content-security-policy").is_none() {
        res.headers_mut().insert(
            HeaderName::from_static("content-security-policy"),
            HeaderValue::from_static(CSP),
        );
    }
    if res.headers().get("referrer-policy").is_none() {
        res.headers_mut().insert(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("no-referrer"),
        );
    }
    if res.headers().get("x-content-type-options").is_none() {
        res.headers_mut().insert(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        );
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_is_not_cached() {
        assert_eq!(cache_control_value(0), "no-store");
        assert_eq!(cache_control_value(3600), "public, max-age=3600");
    }
}
