//! Resend API client for transactional email and audience contacts.
//!
//! # API Reference
//!
//! - Base URL: `https://api.resend.com`
//! - Authentication: `Authorization: Bearer <key>`
//! - `POST /emails` sends one message
//! - `POST /audiences/{id}/contacts` adds a contact (422 when it exists)
//! - `GET /audiences/{id}/contacts` lists an audience

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::ResendConfig;

/// Resend API base URL.
const BASE_URL: &str = "https://api.resend.com";

/// Errors that can occur when interacting with the Resend API.
#[derive(Debug, Error)]
pub enum ResendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limited by Resend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Unauthorized (invalid API key).
    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// An outgoing email.
#[derive(Debug, Clone, Serialize)]
pub struct SendEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl SendEmail {
    /// A message to a single recipient.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: vec![to.into()],
            subject: subject.into(),
            html: html.into(),
            reply_to: None,
        }
    }

    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }
}

/// Id Resend assigns to an accepted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentEmail {
    pub id: String,
}

/// A contact to add to an audience.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewContact {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub unsubscribed: bool,
}

/// A contact as stored in a Resend audience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub unsubscribed: bool,
}

#[derive(Deserialize)]
struct ContactList {
    #[serde(default)]
    data: Vec<Contact>,
}

/// Result of adding a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    Created,
    AlreadyExists,
}

/// Resend API client.
#[derive(Clone)]
pub struct ResendClient {
    inner: Arc<ResendClientInner>,
}

struct ResendClientInner {
    client: reqwest::Client,
    base_url: String,
    audience_id: String,
}

impl ResendClient {
    /// Create a new Resend API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ResendConfig) -> Result<Self, ResendError> {
        Self::with_base_url(config, BASE_URL)
    }

    /// Create a client against a different API host.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn with_base_url(config: &ResendConfig, base_url: &str) -> Result<Self, ResendError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| ResendError::Parse(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(ResendClientInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                audience_id: config.audience_id.clone(),
            }),
        })
    }

    /// The configured newsletter audience.
    #[must_use]
    pub fn audience_id(&self) -> &str {
        &self.inner.audience_id
    }

    /// Send one email.
    ///
    /// # Errors
    ///
    /// Returns error if Resend rejects the message or the request fails.
    #[instrument(skip(self, email), fields(subject = %email.subject, recipients = email.to.len()))]
    pub async fn send_email(&self, email: &SendEmail) -> Result<SentEmail, ResendError> {
        let url = format!("{}/emails", self.inner.base_url);
        let response = self.inner.client.post(&url).json(email).send().await?;
        self.handle_response(response).await
    }

    /// Add a contact to an audience. An existing contact is not an error.
    ///
    /// # Errors
    ///
    /// Returns error for any rejection other than "already exists".
    #[instrument(skip(self, contact), fields(email = %contact.email))]
    pub async fn create_contact(
        &self,
        audience_id: &str,
        contact: &NewContact,
    ) -> Result<ContactOutcome, ResendError> {
        let url = format!("{}/audiences/{audience_id}/contacts", self.inner.base_url);
        let response = self.inner.client.post(&url).json(contact).send().await?;

        if response.status().is_success() {
            return Ok(ContactOutcome::Created);
        }

        match self.parse_error(response).await {
            ResendError::Api { status, .. } if status == 409 || status == 422 => {
                Ok(ContactOutcome::AlreadyExists)
            }
            ResendError::Api { message, .. } if message.contains("already exists") => {
                Ok(ContactOutcome::AlreadyExists)
            }
            err => Err(err),
        }
    }

    /// Every contact in an audience.
    ///
    /// # Errors
    ///
    /// Returns error if the audience cannot be read.
    #[instrument(skip(self))]
    pub async fn list_contacts(&self, audience_id: &str) -> Result<Vec<Contact>, ResendError> {
        let url = format!("{}/audiences/{audience_id}/contacts", self.inner.base_url);
        let response = self.inner.client.get(&url).send().await?;
        let list: ContactList = self.handle_response(response).await?;
        Ok(list.data)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ResendError> {
        if response.status().is_success() {
            return response
                .json()
                .await
                .map_err(|e| ResendError::Parse(format!("Failed to parse response: {e}")));
        }

        Err(self.parse_error(response).await)
    }

    async fn parse_error(&self, response: reqwest::Response) -> ResendError {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            return ResendError::RateLimited(retry_after);
        }

        if status == 401 || status == 403 {
            return ResendError::Unauthorized;
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or(body);

        ResendError::Api { status, message }
    }
}

impl std::fmt::Debug for ResendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendClient")
            .field("audience_id", &self.inner.audience_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn test_client(base_url: &str) -> ResendClient {
    let config = ResendConfig {
        api_key: secrecy::SecretString::from("re_test_key"),
        audience_id: "aud-1".to_string(),
    };
    ResendClient::with_base_url(&config, base_url).unwrap()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_send_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("Authorization", "Bearer re_test_key"))
            .and(body_partial_json(json!({
                "to": ["reader@periospot.com"],
                "reply_to": "sender@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "em_1"})))
            .mount(&server)
            .await;

        let email = SendEmail::new(
            "Periospot <hello@periospot.com>",
            "reader@periospot.com",
            "Hi",
            "<p>Hi</p>",
        )
        .reply_to("sender@example.com");
        let sent = test_client(&server.uri()).send_email(&email).await.unwrap();
        assert_eq!(sent.id, "em_1");
    }

    #[tokio::test]
    async fn test_create_contact_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audiences/aud-1/contacts"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(json!({"message": "Contact already exists"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let contact = NewContact {
            email: "a@b.co".to_string(),
            ..NewContact::default()
        };
        let outcome = client
            .create_contact(client.audience_id(), &contact)
            .await
            .unwrap();
        assert_eq!(outcome, ContactOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_contact_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audiences/aud-1/contacts"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .create_contact("aud-1", &NewContact::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResendError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_list_contacts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/audiences/aud-1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    {"id": "c1", "email": "a@b.co", "first_name": "Ana", "unsubscribed": false},
                    {"id": "c2", "email": "c@d.co", "unsubscribed": true}
                ]
            })))
            .mount(&server)
            .await;

        let contacts = test_client(&server.uri())
            .list_contacts("aud-1")
            .await
            .unwrap();
        assert_eq!(contacts.len(), 2);
        assert!(contacts.iter().any(|c| c.unsubscribed));
    }
}
