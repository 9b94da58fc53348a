//! Supabase client for the PostgREST, Auth, and Storage APIs.
//!
//! Supabase is the primary datastore: every table read or written by the
//! site and the migration tools goes through this client.
//!
//! # API Reference
//!
//! - Tables: `{url}/rest/v1/{table}` (PostgREST filter syntax, e.g. `slug=eq.foo`)
//! - Auth: `{url}/auth/v1/user` with the user's access token
//! - Storage: `{url}/storage/v1/object/...` and `{url}/storage/v1/bucket`
//!
//! Every request carries the project key in `apikey`. The bearer token is the
//! service role key when one is configured, the anon key otherwise, or a user
//! access token for requests made on a user's behalf.

mod auth;
mod query;
mod storage;

pub use auth::AuthUser;
pub use query::Query;
pub use storage::BucketSpec;

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::config::SupabaseConfig;

/// Errors that can occur when interacting with Supabase.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Missing or rejected credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Row or object not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Supabase API client.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    client: reqwest::Client,
    url: String,
    server_key: SecretString,
}

impl SupabaseClient {
    /// Create a new Supabase client.
    ///
    /// # Errors
    ///
    /// Returns error if a key cannot be used as a header value or the HTTP
    /// client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, SupabaseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(config.anon_key.expose_secret())
                .map_err(|e| SupabaseError::Parse(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let server_key = config
            .service_role_key
            .clone()
            .unwrap_or_else(|| config.anon_key.clone());

        Ok(Self {
            inner: Arc::new(SupabaseClientInner {
                client,
                url: config.url.clone(),
                server_key,
            }),
        })
    }

    /// Project URL without a trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Start a PostgREST request against `table`.
    #[must_use]
    pub fn table(&self, table: &str) -> Query<'_> {
        Query::new(self, table)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.client
    }

    /// Bearer token for server-side requests.
    pub(crate) fn server_token(&self) -> &str {
        self.inner.server_key.expose_secret()
    }

    /// Turn a non-success response into a typed error.
    pub(crate) async fn parse_error(response: reqwest::Response) -> SupabaseError {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return SupabaseError::RateLimited(retry_after);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("msg"))
                    .or_else(|| v.get("error_description"))
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str().map(str::to_string))
            })
            .unwrap_or(body);

        match status {
            401 | 403 => SupabaseError::Unauthorized(message),
            404 => SupabaseError::NotFound(message),
            _ => SupabaseError::Api { status, message },
        }
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn test_client(url: &str) -> SupabaseClient {
    SupabaseClient::new(&SupabaseConfig {
        url: url.to_string(),
        anon_key: SecretString::from("anon-test-key"),
        service_role_key: Some(SecretString::from("service-test-key")),
    })
    .unwrap()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_error_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"message": "relation does not exist"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());

        let err = client
            .table("missing")
            .fetch::<serde_json::Value>()
            .await
            .unwrap_err();
        assert!(matches!(err, SupabaseError::NotFound(ref m) if m == "relation does not exist"));

        let err = client
            .table("limited")
            .fetch::<serde_json::Value>()
            .await
            .unwrap_err();
        assert!(matches!(err, SupabaseError::RateLimited(7)));
    }

    #[test]
    fn test_debug_hides_keys() {
        let client = test_client("https://project.supabase.co");
        let debug = format!("{client:?}");
        assert!(debug.contains("project.supabase.co"));
        assert!(!debug.contains("service-test-key"));
    }
}
