//! Web server module for the contact form endpoint.
//!
//! This module provides a small axum surface that:
//! - Accepts form submissions on `POST /api/submit`
//! - Answers CORS preflights itself and adds CORS headers to submissions
//! - Bounds every request with a server-side timeout
//!
//! Verification and relay logic live in [`crate::submission`].

pub mod cors;
pub mod extract;
pub mod handlers;

use axum::{
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use cors::{cors_layer, preflight};
pub use extract::{client_ip, SubmissionBody};
pub use handlers::{health, submit, AppState, HealthResponse};

/// Build the application router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// caller IP is available to the verification step.
pub fn router(state: AppState) -> Router {
    let submit_route: MethodRouter<AppState> = post(submit).layer(cors_layer(&state.config));

    Router::new()
        .route("/health", get(health))
        .route("/api/submit", submit_route.options(preflight))
        .layer(TimeoutLayer::new(state.config.handler_timeout()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
