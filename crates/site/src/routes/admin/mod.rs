//! Admin dashboard API.
//!
//! Every handler takes [`RequireAdmin`](crate::middleware::RequireAdmin), so
//! only members whose profile has `is_admin` set get through.

pub mod campaigns;
pub mod import;
pub mod subscribers;
pub mod templates;

use axum::{
    Router,
    routing::{get, post},
};
use serde_json::Value;

use crate::state::AppState;

/// Routes nested under `/api/admin`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/email-marketing/campaigns",
            get(campaigns::list).post(campaigns::create),
        )
        .route("/email-marketing/campaigns/{id}/send", post(campaigns::send))
        .route(
            "/email-marketing/subscribers",
            get(subscribers::list).post(subscribers::add),
        )
        .route(
            "/email-marketing/templates",
            get(templates::list)
                .post(templates::create)
                .put(templates::update)
                .delete(templates::delete),
        )
        .route(
            "/import/mailerlite",
            get(import::preview).post(import::import),
        )
}

/// A row id as text, whether the column is a uuid or a number.
fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::routes::test_support::{app, call, parse};
    use crate::state::AppState;

    /// Mount an access token `admin-token` for an admin member.
    pub async fn mount_admin(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "admin-1",
                "email": "cisco@periospot.com",
                "user_metadata": {"first_name": "Cisco"}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.admin-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"is_admin": true}])))
            .mount(server)
            .await;
    }

    /// Send `body` as the admin member.
    pub async fn admin_send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<&Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", "Bearer admin-token");
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, _, bytes) = call(&app(state.clone()), request).await;
        (status, parse(&bytes))
    }
}
