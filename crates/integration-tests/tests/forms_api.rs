//! Integration tests for validation on the public form endpoints.
//!
//! Only invalid submissions are sent, so nothing reaches Resend or Supabase.
//! Run with `-- --ignored` against a running site.

#![allow(clippy::indexing_slicing)]

use periospot_integration_tests::TestContext;
use reqwest::StatusCode;
use serde_json::{Value, json};

fn ctx() -> TestContext {
    TestContext::new().expect("Failed to create HTTP client")
}

async fn post_json(ctx: &TestContext, path: &str, body: &Value) -> (StatusCode, Value) {
    let resp = ctx
        .client
        .post(ctx.url(path))
        .json(body)
        .send()
        .await
        .expect("Failed to post form");
    let status = resp.status();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
#[ignore = "Requires running site"]
async fn test_contact_requires_fields() {
    let (status, body) = post_json(&ctx(), "/api/contact", &json!({"name": "Ana"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
#[ignore = "Requires running site"]
async fn test_newsletter_rejects_bad_email() {
    let (status, body) =
        post_json(&ctx(), "/api/newsletter", &json!({"email": "not-an-email"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
#[ignore = "Requires running site"]
async fn test_admin_routes_require_login() {
    let ctx = ctx();
    let resp = ctx
        .client
        .get(ctx.url("/api/admin/email-marketing/campaigns"))
        .send()
        .await
        .expect("Failed to reach admin route");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
