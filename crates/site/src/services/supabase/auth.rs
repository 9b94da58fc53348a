//! Supabase Auth: resolving an access token to its user.

use serde::Deserialize;
use serde_json::Value;

use super::{SupabaseClient, SupabaseError};

/// The authenticated user behind an access token.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// First name from sign-up metadata, if the user gave one.
    #[must_use]
    pub fn first_name(&self) -> Option<&str> {
        self.user_metadata
            .get("first_name")
            .or_else(|| self.user_metadata.get("full_name"))
            .and_then(Value::as_str)
    }
}

impl SupabaseClient {
    /// Look up the user for an access token.
    ///
    /// Returns `Ok(None)` when the token is expired or invalid.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or an unexpected API response.
    pub async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>, SupabaseError> {
        let url = format!("{}/auth/v1/user", self.url());
        let response = self
            .http()
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::parse_error(response).await);
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| SupabaseError::Parse(format!("Failed to parse user: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::services::supabase::test_client;

    #[tokio::test]
    async fn test_get_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("Authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "0b6c",
                "email": "reader@periospot.com",
                "user_metadata": {"first_name": "Ana"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("Authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let user = client.get_user("good").await.unwrap().unwrap();
        assert_eq!(user.id, "0b6c");
        assert_eq!(user.first_name(), Some("Ana"));

        assert!(client.get_user("expired").await.unwrap().is_none());
    }
}
