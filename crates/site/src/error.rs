//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error renders as JSON: `{"success": false, "error": "..."}`, with
//! `requiresEmail` or `requiresLogin` set on the two ebook gate errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::{MailerLiteError, ResendError, SupabaseError, WooCommerceError};

/// Application-level error type for the site.
#[derive(Debug, Error)]
pub enum AppError {
    /// Supabase operation failed.
    #[error("Supabase error: {0}")]
    Supabase(#[from] SupabaseError),

    /// Resend operation failed.
    #[error("Resend error: {0}")]
    Resend(#[from] ResendError),

    /// WooCommerce operation failed.
    #[error("WooCommerce error: {0}")]
    WooCommerce(#[from] WooCommerceError),

    /// MailerLite operation failed.
    #[error("MailerLite error: {0}")]
    MailerLite(#[from] MailerLiteError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Anonymous download of a free ebook without an email.
    #[error("Email required for download")]
    EmailRequired,

    /// Anonymous download of a paid ebook.
    #[error("Login required for paid ebooks")]
    LoginRequired,

    /// A backing service is not configured.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Operation failed; the message is safe to show.
    #[error("{0}")]
    Failed(String),

    /// An upstream API refused the call; its status is passed through.
    #[error("{1}")]
    Upstream(StatusCode, String),

    /// Email template failed to render.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Supabase(SupabaseError::NotFound(_))
            | Self::WooCommerce(WooCommerceError::NotFound(_))
            | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Supabase(_) | Self::Failed(_) | Self::Template(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Resend(_) | Self::WooCommerce(_) | Self::MailerLite(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Unauthorized(_) | Self::EmailRequired | Self::LoginRequired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(status, _) => *status,
        }
    }

    // Don't expose internal error details to clients
    fn public_message(&self) -> String {
        match self {
            Self::Supabase(SupabaseError::NotFound(_)) => "Not found".to_string(),
            Self::Supabase(_) | Self::Template(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::Resend(_) => "Email service error".to_string(),
            Self::WooCommerce(
                err @ (WooCommerceError::Api { .. } | WooCommerceError::NotFound(_)),
            ) => err.to_string(),
            Self::WooCommerce(_) | Self::MailerLite(_) => "External service error".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::ServiceUnavailable(msg)
            | Self::Failed(msg)
            | Self::Upstream(_, msg) => msg.clone(),
            Self::EmailRequired | Self::LoginRequired => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let mut body = serde_json::Map::new();
        body.insert("success".to_string(), json!(false));
        body.insert("error".to_string(), json!(self.public_message()));
        match self {
            Self::EmailRequired => {
                body.insert("requiresEmail".to_string(), json!(true));
            }
            Self::LoginRequired => {
                body.insert("requiresLogin".to_string(), json!(true));
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("ebooks", "Download requested", Some(&[("slug", "atlas")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("Ebook not found".to_string());
        assert_eq!(err.to_string(), "Not found: Ebook not found");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::ServiceUnavailable("test".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Supabase(SupabaseError::NotFound("row".to_string()))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Upstream(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_gate_errors_carry_flags() {
        let (status, body) = body_json(AppError::EmailRequired).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["requiresEmail"], true);
        assert_eq!(body["error"], "Email required for download");

        let (_, body) = body_json(AppError::LoginRequired).await;
        assert_eq!(body["requiresLogin"], true);
        assert!(body.get("requiresEmail").is_none());
    }

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let (status, body) =
            body_json(AppError::Internal("connection refused at 10.0.0.3".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["success"], false);
    }
}
