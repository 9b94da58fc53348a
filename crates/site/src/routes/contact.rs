//! Contact form route handler.
//!
//! Each submission emails the Periospot inboxes (reply-to the sender) and
//! sends the sender a confirmation. Without Resend the submission is only
//! logged.

use askama::Template;
use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use periospot_core::is_plausible_email;

use crate::emails::{ContactConfirmation, ContactNotification};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::routes::Ack;
use crate::services::resend::SendEmail;
use crate::state::AppState;

const NOTIFICATION_FROM: &str = "Periospot Contact <contact@periospot.com>";
const CONFIRMATION_FROM: &str = "Periospot <contact@periospot.com>";
const CONFIRMATION_SUBJECT: &str = "We received your message! 🦷";

/// Contact form data.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl ContactForm {
    /// The explicit subject, or one derived from the inquiry type.
    fn subject_line(&self) -> String {
        if let Some(subject) = self.subject.as_deref().filter(|s| !s.trim().is_empty()) {
            return subject.to_string();
        }
        let name = self.name.trim();
        match self.kind.as_deref() {
            Some("business") => format!("[Business Inquiry] from {name}"),
            Some("collaboration") => format!("[Collaboration Request] from {name}"),
            Some("support") => format!("[Support Request] from {name}"),
            _ => format!("[Contact Form] Message from {name}"),
        }
    }
}

/// Submit the contact form.
///
/// POST /api/contact
#[instrument(skip(state, form), fields(email = %form.email, kind = ?form.kind))]
pub async fn submit(
    State(state): State<AppState>,
    Json(form): Json<ContactForm>,
) -> Result<Json<Ack>> {
    let name = form.name.trim();
    let email = form.email.trim();
    let message = form.message.trim();

    if name.is_empty() || email.is_empty() || message.is_empty() {
        return Err(AppError::BadRequest(
            "Name, email, and message are required".to_string(),
        ));
    }
    if !is_plausible_email(email) {
        return Err(AppError::BadRequest("Invalid email format".to_string()));
    }

    let subject = form.subject_line();

    let Some(resend) = state.resend() else {
        tracing::info!(
            name,
            email,
            subject = %subject,
            body = message,
            "Contact form submission (Resend not configured)"
        );
        return Ok(Ack::new("Message received. We'll get back to you soon!"));
    };

    add_breadcrumb("contact", "Contact form submitted", Some(&[("email", email)]));
    let now = Utc::now();

    let html = ContactNotification::new(
        name,
        email,
        form.kind.as_deref(),
        Some(subject.as_str()),
        message,
        now,
    )
    .render()?;
    let mut notification = SendEmail::new(NOTIFICATION_FROM, "", &subject, html).reply_to(email);
    notification.to.clone_from(&state.config().contact_recipients);

    resend.send_email(&notification).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to send contact notification");
        AppError::Failed("Failed to send message. Please try again.".to_string())
    })?;

    let html = ContactConfirmation::new(name, message, &state.config().base_url, now).render()?;
    if let Err(e) = resend
        .send_email(&SendEmail::new(CONFIRMATION_FROM, email, CONFIRMATION_SUBJECT, html))
        .await
    {
        tracing::warn!(error = %e, "Failed to send contact confirmation");
    }

    tracing::info!("Contact form delivered");
    Ok(Ack::new("Message sent successfully! We'll get back to you soon."))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::content::ContentStore;
    use crate::routes::test_support::{fixture_state, post};
    use crate::state::test_state_without_email;

    #[tokio::test]
    async fn test_rejects_missing_fields_and_bad_email() {
        let (_dir, state) = fixture_state("http://127.0.0.1:9");

        let (status, body) = post(&state, "/api/contact", &json!({"name": "Ana"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name, email, and message are required");

        let (status, body) = post(
            &state,
            "/api/contact",
            &json!({"name": "Ana", "email": "ana@nowhere", "message": "Hi"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid email format");
    }

    #[tokio::test]
    async fn test_without_resend_only_logs() {
        let state = test_state_without_email(ContentStore::default(), "http://127.0.0.1:9");
        let (status, body) = post(
            &state,
            "/api/contact",
            &json!({"name": "Ana", "email": "ana@example.com", "message": "Hi"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Message received. We'll get back to you soon!");
    }

    #[tokio::test]
    async fn test_sends_notification_and_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_partial_json(json!({
                "to": ["cisco@periospot.com"],
                "reply_to": "ana@example.com",
                "subject": "[Support Request] from Ana"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_partial_json(json!({"to": ["ana@example.com"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e-2"})))
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, state) = fixture_state(&server.uri());
        let (status, body) = post(
            &state,
            "/api/contact",
            &json!({"name": "Ana", "email": "ana@example.com", "message": "Hi", "type": "support"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_notification_failure_is_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "down"})))
            .mount(&server)
            .await;

        let (_dir, state) = fixture_state(&server.uri());
        let (status, body) = post(
            &state,
            "/api/contact",
            &json!({"name": "Ana", "email": "ana@example.com", "message": "Hi"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to send message. Please try again.");
    }

    #[test]
    fn test_subject_line_prefers_explicit_subject() {
        let form = ContactForm {
            name: "Ana".to_string(),
            subject: Some("Implant course".to_string()),
            kind: Some("business".to_string()),
            ..ContactForm::default()
        };
        assert_eq!(form.subject_line(), "Implant course");

        let form = ContactForm {
            name: "Ana".to_string(),
            kind: Some("collaboration".to_string()),
            ..ContactForm::default()
        };
        assert_eq!(form.subject_line(), "[Collaboration Request] from Ana");
    }
}
