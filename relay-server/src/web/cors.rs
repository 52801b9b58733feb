//! Cross-origin policy for the form endpoint.
//!
//! The tower-http [`CorsLayer`] decorates actual submissions. It is attached
//! to the POST handler only, because it answers every `OPTIONS` request on
//! its own; preflights go to the manual [`preflight`] handler instead, which
//! also serves hosting setups that forward a bare `OPTIONS` without the CORS
//! request headers.

use axum::{
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
        },
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    response::IntoResponse,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::config::Config;
use crate::web::AppState;

const WILDCARD: &str = "*";

fn is_wildcard(list: &[String]) -> bool {
    list.iter().any(|item| item == WILDCARD)
}

/// Create the CORS layer from the configured allow-lists.
///
/// A `*` entry in either list allows any origin or header.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let mut cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]);

    if is_wildcard(&config.allowed_origins) {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "cors_origin_invalid");
                    None
                }
            })
            .collect();
        cors = cors.allow_origin(origins);
    }

    if is_wildcard(&config.allowed_headers) {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    cors
}

/// Pick the origin to echo: the caller's when allowed, else the first configured one.
///
/// With a wildcard allow-list any caller origin is echoed, and `*` is
/// returned when the request carries none.
fn resolve_origin<'a>(request_origin: Option<&'a str>, allowed: &'a [String]) -> Option<&'a str> {
    if is_wildcard(allowed) {
        return Some(request_origin.unwrap_or(WILDCARD));
    }

    match request_origin {
        Some(origin) if allowed.iter().any(|a| a == origin) => Some(origin),
        _ => allowed.first().map(String::as_str),
    }
}

/// Manual `OPTIONS /api/submit` response with fixed CORS headers.
pub async fn preflight(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let request_origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());

    let mut response_headers = HeaderMap::new();

    if let Some(origin) = resolve_origin(request_origin, &state.config.allowed_origins)
        .and_then(|o| HeaderValue::from_str(o).ok())
    {
        response_headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }

    response_headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );

    if let Ok(allowed) = HeaderValue::from_str(&state.config.allowed_headers.join(", ")) {
        response_headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allowed);
    }

    response_headers.insert(VARY, HeaderValue::from_static("origin"));

    (StatusCode::OK, response_headers)
}
