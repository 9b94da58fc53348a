//! Periospot site library.
//!
//! The JSON API behind periospot.com: the WordPress content export, the
//! visitor cart, forms that send email through Resend, the WooCommerce shop
//! proxy, and the admin email-marketing tools backed by Supabase.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod content;
pub mod emails;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::get,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
///
/// Form endpoints get the strict rate limiter and the rest of `/api` the
/// relaxed one. Sentry layers sit outermost so they see every request.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::content_routes())
        .merge(routes::form_routes().layer(middleware::form_rate_limiter()))
        .merge(routes::api_routes().layer(middleware::api_rate_limiter()))
        .layer(from_fn(middleware::security_headers_middleware))
        .layer(session_layer)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if Supabase is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state
        .supabase()
        .table("posts")
        .select("id")
        .limit(1)
        .fetch::<Value>()
        .await
    {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
