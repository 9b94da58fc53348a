//! MailerLite API client for reading the legacy newsletter list.
//!
//! # API Reference
//!
//! - Base URL: `https://connect.mailerlite.com/api`
//! - Authentication: `Authorization: Bearer <token>`
//! - `GET /subscribers?limit=&cursor=` is cursor-paginated
//!
//! Rate-limited requests are retried after `Retry-After` (5 s when the header
//! is missing), up to three attempts in total.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

/// MailerLite API base URL.
const BASE_URL: &str = "https://connect.mailerlite.com/api";

const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_SECS: u64 = 5;

/// Errors that can occur when interacting with MailerLite.
#[derive(Debug, Error)]
pub enum MailerLiteError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Still rate limited after every retry.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Unauthorized (invalid API token).
    #[error("Unauthorized: invalid API token")]
    Unauthorized,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl MailerLiteError {
    /// Upstream HTTP status, when MailerLite answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            Self::Unauthorized => Some(401),
            Self::Http(_) | Self::Parse(_) => None,
        }
    }
}

/// Custom fields MailerLite stores on a subscriber.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriberFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub email: String,
    pub status: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub opens_count: u64,
    #[serde(default)]
    pub clicks_count: u64,
    #[serde(default)]
    pub open_rate: f64,
    #[serde(default)]
    pub click_rate: f64,
    #[serde(default)]
    pub subscribed_at: Option<String>,
    #[serde(default)]
    pub fields: SubscriberFields,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Subscriber {
    #[must_use]
    pub fn is_unsubscribed(&self) -> bool {
        self.status == "unsubscribed"
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        self.fields.name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn last_name(&self) -> &str {
        self.fields.last_name.as_deref().unwrap_or_default()
    }
}

/// One page of subscribers.
#[derive(Debug, Clone)]
pub struct SubscriberPage {
    pub subscribers: Vec<Subscriber>,
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ListResponse {
    data: Vec<Subscriber>,
    meta: ListMeta,
}

#[derive(Deserialize)]
struct ListMeta {
    #[serde(default)]
    next_cursor: Option<String>,
}

/// MailerLite API client.
#[derive(Clone)]
pub struct MailerLiteClient {
    inner: Arc<MailerLiteClientInner>,
}

struct MailerLiteClientInner {
    client: reqwest::Client,
    base_url: String,
}

impl MailerLiteClient {
    /// Create a new MailerLite API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(api_key: &SecretString) -> Result<Self, MailerLiteError> {
        Self::with_base_url(api_key, BASE_URL)
    }

    /// Create a client against a different API host.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn with_base_url(api_key: &SecretString, base_url: &str) -> Result<Self, MailerLiteError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|e| MailerLiteError::Parse(format!("Invalid API key format: {e}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(MailerLiteClientInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            }),
        })
    }

    /// Fetch one page of subscribers.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or is still rate limited after
    /// three attempts.
    #[instrument(skip(self))]
    pub async fn list_subscribers(
        &self,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<SubscriberPage, MailerLiteError> {
        let url = format!("{}/subscribers", self.inner.base_url);
        let mut params = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            params.push(("cursor", cursor.to_string()));
        }

        let mut attempt = 1;
        loop {
            let response = self.inner.client.get(&url).query(&params).send().await?;
            let status = response.status().as_u16();

            if status == 429 {
                let wait = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_SECS);
                if attempt >= MAX_ATTEMPTS {
                    return Err(MailerLiteError::RateLimited(wait));
                }
                warn!(attempt, wait_secs = wait, "MailerLite rate limit hit, retrying");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                attempt += 1;
                continue;
            }

            if status == 401 || status == 403 {
                return Err(MailerLiteError::Unauthorized);
            }

            if !response.status().is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(MailerLiteError::Api { status, message });
            }

            let list: ListResponse = response
                .json()
                .await
                .map_err(|e| MailerLiteError::Parse(format!("Failed to parse subscribers: {e}")))?;

            return Ok(SubscriberPage {
                subscribers: list.data,
                next_cursor: list.meta.next_cursor,
            });
        }
    }
}

impl std::fmt::Debug for MailerLiteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailerLiteClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn test_client(base_url: &str) -> MailerLiteClient {
    MailerLiteClient::with_base_url(&SecretString::from("ml_test"), base_url).unwrap()
}
