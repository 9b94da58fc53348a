//! Authentication extractors.
//!
//! Members sign in with Supabase Auth in the browser. Requests carry the
//! access token either as `Authorization: Bearer <token>` or in the
//! `sb-access-token` cookie; the token is resolved to a user through
//! `/auth/v1/user` and the result cached for a minute.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Deserialize;

use crate::error::{AppError, set_sentry_user};
use crate::models::SessionUser;
use crate::state::AppState;

/// Cookie holding the Supabase access token.
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";

/// Extractor that requires a signed-in member.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireUser(user): RequireUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireUser(pub SessionUser);

/// Extractor that optionally gets the signed-in member.
///
/// Unlike `RequireUser`, this does not reject anonymous requests.
pub struct OptionalUser(pub Option<SessionUser>);

/// Extractor that requires a member whose profile has `is_admin` set.
pub struct RequireAdmin(pub SessionUser);

impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = access_token(parts) else {
            return Ok(Self(None));
        };
        resolve_user(state, token).await.map(Self)
    }
}

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let OptionalUser(user) = OptionalUser::from_request_parts(parts, state).await?;
        let user = user.ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;
        set_sentry_user(&user.id, user.email.as_deref());
        Ok(Self(user))
    }
}

#[derive(Deserialize)]
struct AdminFlag {
    #[serde(default)]
    is_admin: bool,
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireUser(user) = RequireUser::from_request_parts(parts, state).await?;

        let flag: Option<AdminFlag> = state
            .supabase()
            .table("profiles")
            .select("is_admin")
            .eq("id", &user.id)
            .limit(1)
            .fetch_optional()
            .await?;

        if flag.is_some_and(|f| f.is_admin) {
            Ok(Self(user))
        } else {
            tracing::warn!(user_id = %user.id, "Admin route denied");
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }
}

/// Token from the `Authorization` header, else from the access token cookie.
fn access_token(parts: &Parts) -> Option<&str> {
    let headers = &parts.headers;

    if let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token);
    }

    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

async fn resolve_user(state: &AppState, token: &str) -> Result<Option<SessionUser>, AppError> {
    if let Some(user) = state.user_cache().get(token).await {
        tracing::debug!("Cache hit for session user");
        return Ok(Some(user));
    }

    let Some(auth_user) = state.supabase().get_user(token).await? else {
        return Ok(None);
    };

    let user = SessionUser {
        first_name: auth_user.first_name().map(str::to_string),
        id: auth_user.id,
        email: auth_user.email,
    };
    state
        .user_cache()
        .insert(token.to_string(), user.clone())
        .await;
    Ok(Some(user))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::content::ContentStore;
    use crate::state::test_state;

    fn parts(header_name: &str, value: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .uri("/api/profile/update")
            .header(header_name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_access_token_sources() {
        assert_eq!(access_token(&parts("authorization", "Bearer abc")), Some("abc"));
        assert_eq!(
            access_token(&parts("cookie", "theme=dark; sb-access-token=xyz")),
            Some("xyz")
        );
        assert_eq!(access_token(&parts("cookie", "theme=dark")), None);
        assert_eq!(access_token(&parts("authorization", "Basic abc")), None);
    }

    async fn mock_user(server: &MockServer, is_admin: bool) {
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u-1",
                "email": "member@periospot.com",
                "user_metadata": {}
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"is_admin": is_admin}])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_require_user_caches_token() {
        let server = MockServer::start().await;
        mock_user(&server, false).await;
        let state = test_state(ContentStore::default(), &server.uri());

        let mut request = parts("authorization", "Bearer tok");
        let RequireUser(user) = RequireUser::from_request_parts(&mut request, &state)
            .await
            .unwrap();
        assert_eq!(user.id, "u-1");

        // Second lookup is served from the cache; the mock expects one call.
        let OptionalUser(again) = OptionalUser::from_request_parts(&mut request, &state)
            .await
            .unwrap();
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn test_require_admin_rejects_members() {
        let server = MockServer::start().await;
        mock_user(&server, false).await;
        let state = test_state(ContentStore::default(), &server.uri());

        let mut request = parts("authorization", "Bearer tok");
        let err = RequireAdmin::from_request_parts(&mut request, &state)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_anonymous_is_unauthorized() {
        let server = MockServer::start().await;
        let state = test_state(ContentStore::default(), &server.uri());

        let mut request = parts("accept", "application/json");
        let err = RequireUser::from_request_parts(&mut request, &state)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
