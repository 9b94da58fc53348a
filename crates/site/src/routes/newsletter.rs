//! Newsletter signup.

use askama::Template;
use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use periospot_core::is_plausible_email;

use crate::emails::NewsletterWelcome;
use crate::error::{AppError, Result};
use crate::routes::Ack;
use crate::services::resend::{ContactOutcome, NewContact, SendEmail};
use crate::state::AppState;

const WELCOME_FROM: &str = "Periospot <newsletter@periospot.com>";
const WELCOME_SUBJECT: &str = "Welcome to The Periospot Brew! 🦷";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscribeForm {
    pub email: String,
    pub first_name: Option<String>,
}

/// Row in the `subscribers` table.
#[derive(Debug, Serialize)]
struct SubscriberRow<'a> {
    email: String,
    name: Option<&'a str>,
    source: &'a str,
    status: &'a str,
    subscribed_at: String,
}

/// Subscribe an address to the newsletter.
///
/// The address is added to the Resend audience and the `subscribers` table;
/// the request only fails when neither accepted it. The welcome email is
/// best effort.
///
/// POST /api/newsletter
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(form): Json<SubscribeForm>,
) -> Result<Json<Ack>> {
    let Some(resend) = state.resend() else {
        return Err(AppError::ServiceUnavailable(
            "Newsletter service is not configured".to_string(),
        ));
    };

    let email = form.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }
    if !is_plausible_email(email) {
        return Err(AppError::BadRequest("Invalid email format".to_string()));
    }
    let first_name = form
        .first_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let contact = NewContact {
        email: email.to_string(),
        first_name: Some(first_name.unwrap_or_default().to_string()),
        last_name: None,
        unsubscribed: false,
    };
    let in_audience = match resend.create_contact(resend.audience_id(), &contact).await {
        Ok(ContactOutcome::Created) => true,
        Ok(ContactOutcome::AlreadyExists) => {
            tracing::debug!("Contact already in audience");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Error adding contact");
            false
        }
    };

    let row = SubscriberRow {
        email: email.to_lowercase(),
        name: first_name,
        source: "website",
        status: "active",
        subscribed_at: Utc::now().to_rfc3339(),
    };
    let in_database = match state
        .supabase()
        .table("subscribers")
        .upsert(&[row], "email")
        .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Error saving subscriber to database");
            false
        }
    };

    if !in_audience && !in_database {
        return Err(AppError::Failed(
            "Failed to subscribe. Please try again.".to_string(),
        ));
    }

    let html = NewsletterWelcome {
        first_name,
        site_url: &state.config().base_url,
    }
    .render()?;
    if let Err(e) = resend
        .send_email(&SendEmail::new(WELCOME_FROM, email, WELCOME_SUBJECT, html))
        .await
    {
        tracing::error!(error = %e, "Error sending welcome email");
    }

    tracing::info!("Newsletter subscription");
    Ok(Ack::new("Successfully subscribed to the newsletter!"))
}
