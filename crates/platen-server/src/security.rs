use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::json_error;
use crate::state::AppState;

const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "authorization, content-type, x-identity";

fn request_origin(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn origin_is_allowed(allowlist: &Option<Vec<String>>, origin: &str) -> bool {
    match allowlist {
        None => true,
        Some(list) => list.iter().any(|a| a == origin),
    }
}

fn apply_cors_headers(resp: &mut Response, origin: &str) {
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, v);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}

/// CORS enforcement for browser clients. A missing Origin header is a
/// non-browser caller (curl, printer firmware) and passes through.
pub async fn cors(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(origin) = request_origin(req.headers()) else {
        return next.run(req).await;
    };

    if !origin_is_allowed(&state.cfg.cors_allowed_origins, &origin) {
        return json_error(StatusCode::FORBIDDEN, "origin not allowed");
    }

    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(&mut resp, &origin);
        return resp;
    }

    let mut resp = next.run(req).await;
    apply_cors_headers(&mut resp, &origin);
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_origin_when_unconfigured() {
        assert!(origin_is_allowed(&None, "https://anywhere.example"));
    }

    #[test]
    fn allowlist_is_exact_match() {
        let list = Some(vec!["https://panel.example".to_string()]);
        assert!(origin_is_allowed(&list, "https://panel.example"));
        assert!(!origin_is_allowed(&list, "https://panel.example.evil"));
        assert!(!origin_is_allowed(&list, "http://panel.example"));
    }
}
