//! Email campaigns: drafts and sending.

use std::time::Duration;

use askama::Template;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use periospot_core::personalize::{Recipient, personalize_content};
use periospot_core::{CampaignStatus, is_plausible_email};

use crate::emails::CampaignEmail;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::ResendClient;
use crate::services::resend::{SendEmail, SentEmail};
use crate::state::AppState;

/// Emails sent concurrently before pausing.
const BATCH_SIZE: usize = 100;
const BATCH_PAUSE: Duration = Duration::from_secs(1);

const DEFAULT_FROM_NAME: &str = "Periospot";
const DEFAULT_FROM_EMAIL: &str = "hello@periospot.com";

#[derive(Serialize)]
pub struct CampaignsResponse {
    pub campaigns: Vec<Value>,
}

/// All campaigns, newest first.
///
/// GET /api/admin/email-marketing/campaigns
#[instrument(skip(state, _admin))]
pub async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<CampaignsResponse>> {
    let campaigns = state
        .supabase()
        .table("email_campaigns")
        .select("*")
        .order("created_at", false)
        .fetch()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error fetching campaigns");
            AppError::Failed("Failed to fetch campaigns".to_string())
        })?;
    Ok(Json(CampaignsResponse { campaigns }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewCampaign {
    pub name: String,
    pub subject: String,
    pub preheader: Option<String>,
    pub content: Option<String>,
    pub audience: Option<String>,
}

#[derive(Serialize)]
struct CampaignInsert<'a> {
    name: &'a str,
    subject: &'a str,
    preheader: Option<&'a str>,
    content: Option<&'a str>,
    audience: Option<&'a str>,
    status: CampaignStatus,
    recipients: u32,
    opens: u32,
    clicks: u32,
    unsubscribes: u32,
}

#[derive(Serialize)]
pub struct CampaignCreated {
    pub success: bool,
    pub campaign: Value,
}

/// Save a draft campaign.
///
/// POST /api/admin/email-marketing/campaigns
#[instrument(skip(state, _admin, body), fields(name = %body.name))]
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(body): Json<NewCampaign>,
) -> Result<Json<CampaignCreated>> {
    let name = body.name.trim();
    let subject = body.subject.trim();
    if name.is_empty() || subject.is_empty() {
        return Err(AppError::BadRequest(
            "Name and subject are required".to_string(),
        ));
    }

    let row = CampaignInsert {
        name,
        subject,
        preheader: body.preheader.as_deref(),
        content: body.content.as_deref(),
        audience: body.audience.as_deref(),
        status: CampaignStatus::Draft,
        recipients: 0,
        opens: 0,
        clicks: 0,
        unsubscribes: 0,
    };
    let failed = || AppError::Failed("Failed to create campaign".to_string());
    let rows: Vec<Value> = state
        .supabase()
        .table("email_campaigns")
        .insert(&row)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error creating campaign");
            failed()
        })?;
    let campaign = rows.into_iter().next().ok_or_else(failed)?;

    tracing::info!("Campaign draft created");
    Ok(Json(CampaignCreated {
        success: true,
        campaign,
    }))
}

// =============================================================================
// Sending
// =============================================================================

/// The columns sending needs.
#[derive(Debug, Deserialize)]
struct CampaignRow {
    subject: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    preheader: Option<String>,
    #[serde(default)]
    from_name: Option<String>,
    #[serde(default)]
    from_email: Option<String>,
}

impl CampaignRow {
    fn from_header(&self) -> String {
        let name = self.from_name.as_deref().filter(|n| !n.is_empty());
        let email = self.from_email.as_deref().filter(|e| !e.is_empty());
        format!(
            "{} <{}>",
            name.unwrap_or(DEFAULT_FROM_NAME),
            email.unwrap_or(DEFAULT_FROM_EMAIL)
        )
    }

    /// The campaign body personalized for `recipient`, inside the branded frame.
    fn render_for(&self, recipient: &Recipient, site_url: &str) -> Result<String> {
        let body = personalize_content(self.content.as_deref().unwrap_or_default(), recipient);
        Ok(CampaignEmail::new(&body, self.preheader.as_deref(), site_url, Utc::now()).render()?)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendRequest {
    /// Send one copy here instead of to the audience.
    pub test_email: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct SendResults {
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Serialize)]
pub struct TestSendResponse {
    pub success: bool,
    pub message: &'static str,
    pub result: SentEmail,
}

#[derive(Serialize)]
pub struct CampaignSendResponse {
    pub success: bool,
    pub message: String,
    pub results: SendResults,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SendResponse {
    Test(TestSendResponse),
    Campaign(CampaignSendResponse),
}

#[derive(Serialize)]
struct StatusPatch {
    status: CampaignStatus,
    sent_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipients: Option<usize>,
}

/// `newsletter_subscribers` columns used as recipients.
#[derive(Deserialize)]
struct SubscriberRow {
    email: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

/// Send a campaign, or a single test copy when `testEmail` is given.
///
/// Recipients come from the Resend audience, falling back to
/// `newsletter_subscribers`. Emails go out in concurrent batches with a
/// pause between batches; individual failures are collected, not fatal.
///
/// POST /api/admin/email-marketing/campaigns/{id}/send
#[instrument(skip(state, _admin, body))]
pub async fn send(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
    Json(body): Json<SendRequest>,
) -> Result<Json<SendResponse>> {
    let Some(resend) = state.resend() else {
        return Err(AppError::Failed(
            "Resend is not configured. Please add RESEND_API_KEY.".to_string(),
        ));
    };

    let campaign: CampaignRow = state
        .supabase()
        .table("email_campaigns")
        .select("*")
        .eq("id", &id)
        .fetch_optional()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error loading campaign");
            AppError::Failed("Failed to send campaign".to_string())
        })?
        .ok_or_else(|| AppError::NotFound("Campaign not found".to_string()))?;

    let site_url = state.config().base_url.as_str();
    let from = campaign.from_header();

    if let Some(test_email) = body.test_email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if !is_plausible_email(test_email) {
            return Err(AppError::BadRequest("Invalid email format".to_string()));
        }
        let recipient = Recipient::new(test_email, "Test User", "");
        let html = campaign.render_for(&recipient, site_url)?;
        let result = resend
            .send_email(&SendEmail::new(&from, test_email, &campaign.subject, html))
            .await?;
        return Ok(Json(SendResponse::Test(TestSendResponse {
            success: true,
            message: "Test email sent successfully",
            result,
        })));
    }

    let recipients = collect_recipients(&state, resend).await;
    if recipients.is_empty() {
        return Err(AppError::BadRequest("No subscribers found".to_string()));
    }

    set_status(&state, &id, CampaignStatus::Sending, None).await;
    tracing::info!(recipients = recipients.len(), "Sending campaign");

    let mut results = SendResults::default();
    for (index, batch) in recipients.chunks(BATCH_SIZE).enumerate() {
        if index > 0 {
            tokio::time::sleep(BATCH_PAUSE).await;
        }

        let outcomes = join_all(batch.iter().map(|recipient| {
            let from = from.as_str();
            let campaign = &campaign;
            async move {
                let html = campaign
                    .render_for(recipient, site_url)
                    .map_err(|e| e.to_string())?;
                resend
                    .send_email(&SendEmail::new(from, &recipient.email, &campaign.subject, html))
                    .await
                    .map_err(|e| e.to_string())
            }
        }))
        .await;

        for (recipient, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(_) => results.sent += 1,
                Err(e) => {
                    results.failed += 1;
                    results.errors.push(format!("{}: {e}", recipient.email));
                }
            }
        }
    }

    set_status(&state, &id, CampaignStatus::Sent, Some(results.sent)).await;
    tracing::info!(sent = results.sent, failed = results.failed, "Campaign sent");

    Ok(Json(SendResponse::Campaign(CampaignSendResponse {
        success: true,
        message: format!("Campaign sent to {} subscribers", results.sent),
        results,
    })))
}

/// Subscribed audience contacts, else active `newsletter_subscribers` rows.
async fn collect_recipients(state: &AppState, resend: &ResendClient) -> Vec<Recipient> {
    match resend.list_contacts(resend.audience_id()).await {
        Ok(contacts) => {
            let recipients: Vec<Recipient> = contacts
                .into_iter()
                .filter(|c| !c.unsubscribed)
                .map(|c| {
                    Recipient::new(
                        c.email,
                        c.first_name.unwrap_or_default(),
                        c.last_name.unwrap_or_default(),
                    )
                })
                .collect();
            if !recipients.is_empty() {
                return recipients;
            }
        }
        Err(e) => tracing::error!(error = %e, "Could not list audience contacts"),
    }

    match state
        .supabase()
        .table("newsletter_subscribers")
        .select("email,first_name,last_name")
        .eq("unsubscribed", false)
        .fetch::<SubscriberRow>()
        .await
    {
        Ok(rows) => rows
            .into_iter()
            .map(|row| {
                Recipient::new(
                    row.email,
                    row.first_name.unwrap_or_default(),
                    row.last_name.unwrap_or_default(),
                )
            })
            .collect(),
        Err(e) => {
            tracing::error!(error = %e, "Could not load newsletter subscribers");
            Vec::new()
        }
    }
}

async fn set_status(state: &AppState, id: &str, status: CampaignStatus, recipients: Option<usize>) {
    let patch = StatusPatch {
        status,
        sent_at: Utc::now().to_rfc3339(),
        recipients,
    };
    if let Err(e) = state
        .supabase()
        .table("email_campaigns")
        .eq("id", id)
        .update::<_, Value>(&patch)
        .await
    {
        tracing::error!(error = %e, ?status, "Error updating campaign status");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::content::ContentStore;
    use crate::routes::admin::test_support::{admin_send, mount_admin};
    use crate::state::{test_state, test_state_without_email};

    const SEND: &str = "/api/admin/email-marketing/campaigns/c-1/send";

    async fn mount_campaign(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/email_campaigns"))
            .and(query_param("id", "eq.c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "c-1",
                "subject": "The Periospot Brew #48",
                "content": "<p>Hi {{firstName}}</p>",
                "from_name": null
            }])))
            .mount(server)
            .await;
    }

    #[test]
    fn test_from_header_defaults() {
        let row = CampaignRow {
            subject: String::new(),
            content: None,
            preheader: None,
            from_name: Some(String::new()),
            from_email: None,
        };
        assert_eq!(row.from_header(), "Periospot <hello@periospot.com>");
    }

    #[tokio::test]
    async fn test_create_requires_name_and_subject() {
        let server = MockServer::start().await;
        mount_admin(&server).await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = admin_send(
            &state,
            Method::POST,
            "/api/admin/email-marketing/campaigns",
            Some(&json!({"name": "Brew #48"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name and subject are required");
    }

    #[tokio::test]
    async fn test_create_inserts_draft() {
        let server = MockServer::start().await;
        mount_admin(&server).await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/email_campaigns"))
            .and(body_partial_json(json!({"status": "draft", "recipients": 0, "opens": 0})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": "c-9", "status": "draft"}])))
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = admin_send(
            &state,
            Method::POST,
            "/api/admin/email-marketing/campaigns",
            Some(&json!({"name": "Brew #48", "subject": "New guidelines"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["campaign"]["id"], "c-9");
    }

    #[tokio::test]
    async fn test_send_without_resend_is_500() {
        let server = MockServer::start().await;
        mount_admin(&server).await;
        let state = test_state_without_email(ContentStore::default(), &server.uri());

        let (status, body) = admin_send(&state, Method::POST, SEND, Some(&json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Resend is not configured. Please add RESEND_API_KEY.");
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_404() {
        let server = MockServer::start().await;
        mount_admin(&server).await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/email_campaigns"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = admin_send(&state, Method::POST, SEND, Some(&json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Campaign not found");
    }

    #[tokio::test]
    async fn test_test_send_personalizes_for_test_user() {
        let server = MockServer::start().await;
        mount_admin(&server).await;
        mount_campaign(&server).await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_partial_json(json!({
                "to": ["qa@periospot.com"],
                "from": "Periospot <hello@periospot.com>",
                "subject": "The Periospot Brew #48"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e-1"})))
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = admin_send(
            &state,
            Method::POST,
            SEND,
            Some(&json!({"testEmail": "qa@periospot.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Test email sent successfully");
        assert_eq!(body["result"]["id"], "e-1");
    }

    #[tokio::test]
    async fn test_send_skips_unsubscribed_and_records_failures() {
        let server = MockServer::start().await;
        mount_admin(&server).await;
        mount_campaign(&server).await;
        Mock::given(method("GET"))
            .and(path("/audiences/aud-1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
                {"id": "1", "email": "ana@example.com", "first_name": "Ana", "unsubscribed": false},
                {"id": "2", "email": "bounced@example.com", "unsubscribed": false},
                {"id": "3", "email": "gone@example.com", "unsubscribed": true}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_partial_json(json!({"to": ["bounced@example.com"]})))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "Invalid recipient"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_partial_json(json!({"to": ["ana@example.com"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e-2"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/email_campaigns"))
            .and(body_partial_json(json!({"status": "sending"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/email_campaigns"))
            .and(body_partial_json(json!({"status": "sent", "recipients": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = admin_send(&state, Method::POST, SEND, Some(&json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Campaign sent to 1 subscribers");
        assert_eq!(body["results"]["failed"], 1);
        assert!(
            body["results"]["errors"][0]
                .as_str()
                .unwrap()
                .starts_with("bounced@example.com: ")
        );
    }

    #[tokio::test]
    async fn test_send_falls_back_to_database_subscribers() {
        let server = MockServer::start().await;
        mount_admin(&server).await;
        mount_campaign(&server).await;
        Mock::given(method("GET"))
            .and(path("/audiences/aud-1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/newsletter_subscribers"))
            .and(query_param("unsubscribed", "eq.false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = admin_send(&state, Method::POST, SEND, Some(&json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No subscribers found");
    }
}
