//! Newsletter subscriber listing and manual imports.

use axum::{Json, extract::State};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use periospot_core::SubscriberStatus;
use periospot_core::text::normalize_date;

use super::id_string;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::resend::{Contact, NewContact};
use crate::state::AppState;

/// One row of the subscriber table in the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberView {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: SubscriberStatus,
    pub source: String,
    pub created_at: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl From<Contact> for SubscriberView {
    fn from(contact: Contact) -> Self {
        Self {
            id: contact.id,
            email: contact.email,
            first_name: contact.first_name.unwrap_or_default(),
            last_name: contact.last_name.unwrap_or_default(),
            status: if contact.unsubscribed {
                SubscriberStatus::Unsubscribed
            } else {
                SubscriberStatus::Subscribed
            },
            source: "Resend".to_string(),
            created_at: contact.created_at.unwrap_or_default(),
            tags: Vec::new(),
            country: None,
        }
    }
}

/// A `subscribers` table row.
#[derive(Debug, Deserialize)]
struct SubscriberRow {
    #[serde(default)]
    id: Value,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<SubscriberRow> for SubscriberView {
    fn from(row: SubscriberRow) -> Self {
        Self {
            id: id_string(&row.id),
            email: row.email,
            first_name: row.name.unwrap_or_default(),
            last_name: row.last_name.unwrap_or_default(),
            status: SubscriberStatus::from_stored(row.status.as_deref()),
            source: row.source.unwrap_or_else(|| "Website".to_string()),
            created_at: row.created_at.unwrap_or_default(),
            tags: row
                .tags
                .as_deref()
                .map(split_tags)
                .unwrap_or_default(),
            country: row.country,
        }
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberStats {
    pub total: usize,
    pub active: usize,
    pub unsubscribed: usize,
    pub new_this_month: usize,
}

impl SubscriberStats {
    /// Counts over `subscribers`; "new" means created in the last 30 days.
    fn tally(subscribers: &[SubscriberView], now: chrono::DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(30);
        let active = subscribers
            .iter()
            .filter(|s| s.status == SubscriberStatus::Subscribed)
            .count();
        let new_this_month = subscribers
            .iter()
            .filter_map(|s| normalize_date(&s.created_at))
            .filter(|created| *created >= cutoff)
            .count();
        Self {
            total: subscribers.len(),
            active,
            unsubscribed: subscribers.len() - active,
            new_this_month,
        }
    }
}

#[derive(Serialize)]
pub struct SubscribersResponse {
    pub subscribers: Vec<SubscriberView>,
    pub stats: SubscriberStats,
    /// Set when the list is sample data because the store was unreachable.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// Audience contacts when Resend has any, else the `subscribers` table.
///
/// GET /api/admin/email-marketing/subscribers
#[instrument(skip(state, _admin))]
pub async fn list(State(state): State<AppState>, _admin: RequireAdmin) -> Json<SubscribersResponse> {
    if let Some(resend) = state.resend() {
        match resend.list_contacts(resend.audience_id()).await {
            Ok(contacts) if !contacts.is_empty() => {
                let subscribers: Vec<SubscriberView> =
                    contacts.into_iter().map(SubscriberView::from).collect();
                let stats = SubscriberStats::tally(&subscribers, Utc::now());
                return Json(SubscribersResponse {
                    subscribers,
                    stats,
                    fallback: false,
                });
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Could not list audience contacts"),
        }
    }

    match state
        .supabase()
        .table("subscribers")
        .select("*")
        .order("created_at", false)
        .fetch::<SubscriberRow>()
        .await
    {
        Ok(rows) => {
            let subscribers: Vec<SubscriberView> =
                rows.into_iter().map(SubscriberView::from).collect();
            let stats = SubscriberStats::tally(&subscribers, Utc::now());
            Json(SubscribersResponse {
                subscribers,
                stats,
                fallback: false,
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "Error fetching subscribers, serving sample data");
            Json(SubscribersResponse {
                subscribers: sample_subscribers(),
                stats: SubscriberStats {
                    total: 18_934,
                    active: 18_456,
                    unsubscribed: 478,
                    new_this_month: 342,
                },
                fallback: true,
            })
        }
    }
}

/// Sample rows shown while the subscriber store is unavailable.
fn sample_subscribers() -> Vec<SubscriberView> {
    let row = |id: &str,
               email: &str,
               first_name: &str,
               last_name: &str,
               status: SubscriberStatus,
               source: &str,
               created_at: &str,
               tags: &[&str]| SubscriberView {
        id: id.to_string(),
        email: email.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        status,
        source: source.to_string(),
        created_at: created_at.to_string(),
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
        country: None,
    };
    vec![
        row(
            "1",
            "dr.martinez@clinic.com",
            "Carlos",
            "Martinez",
            SubscriberStatus::Subscribed,
            "Website",
            "2025-06-15",
            &["spanish", "engaged"],
        ),
        row(
            "2",
            "dental.pro@gmail.com",
            "Sarah",
            "Johnson",
            SubscriberStatus::Subscribed,
            "eBook Download",
            "2025-08-22",
            &["english", "new"],
        ),
        row(
            "3",
            "implant.expert@mail.com",
            "Michael",
            "Chen",
            SubscriberStatus::Subscribed,
            "Course Signup",
            "2025-03-10",
            &["english", "engaged"],
        ),
        row(
            "4",
            "perio.specialist@clinic.es",
            "Ana",
            "García",
            SubscriberStatus::Subscribed,
            "Website",
            "2025-11-05",
            &["spanish"],
        ),
        row(
            "5",
            "old.subscriber@mail.com",
            "",
            "",
            SubscriberStatus::Unsubscribed,
            "Import",
            "2024-01-15",
            &[],
        ),
    ]
}

// =============================================================================
// Adding
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriberInput {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub source: Option<String>,
    pub tags: Vec<String>,
}

/// A single subscriber or a `bulk` list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AddRequest {
    Bulk { bulk: Vec<SubscriberInput> },
    Single(SubscriberInput),
}

#[derive(Serialize)]
struct SubscriberUpsert<'a> {
    email: &'a str,
    name: Option<&'a str>,
    last_name: Option<&'a str>,
    source: &'a str,
    tags: Option<String>,
    status: &'static str,
}

impl<'a> SubscriberUpsert<'a> {
    fn new(input: &'a SubscriberInput, default_source: &'a str) -> Self {
        Self {
            email: input.email.trim(),
            name: input.first_name.as_deref(),
            last_name: input.last_name.as_deref(),
            source: input.source.as_deref().unwrap_or(default_source),
            tags: (!input.tags.is_empty()).then(|| input.tags.join(",")),
            status: "active",
        }
    }
}

fn new_contact(input: &SubscriberInput) -> NewContact {
    NewContact {
        email: input.email.trim().to_string(),
        first_name: input.first_name.clone(),
        last_name: input.last_name.clone(),
        unsubscribed: false,
    }
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub email: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct BulkAddResponse {
    pub success: bool,
    pub imported: usize,
    pub failed: usize,
    pub results: Vec<ImportResult>,
}

#[derive(Serialize)]
pub struct AddedResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum AddResponse {
    Bulk(BulkAddResponse),
    Single(AddedResponse),
}

/// Add subscribers to the Resend audience and the `subscribers` table.
///
/// POST /api/admin/email-marketing/subscribers
#[instrument(skip(state, _admin, body))]
pub async fn add(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(body): Json<AddRequest>,
) -> Result<Json<AddResponse>> {
    match body {
        AddRequest::Bulk { bulk } => Ok(Json(AddResponse::Bulk(add_bulk(&state, &bulk).await))),
        AddRequest::Single(input) => add_one(&state, &input).await.map(|()| {
            Json(AddResponse::Single(AddedResponse {
                success: true,
                message: "Subscriber added successfully",
            }))
        }),
    }
}

async fn add_bulk(state: &AppState, inputs: &[SubscriberInput]) -> BulkAddResponse {
    let mut results = Vec::with_capacity(inputs.len());
    for input in inputs {
        let outcome = import_one(state, input).await;
        results.push(ImportResult {
            email: input.email.clone(),
            success: outcome.is_ok(),
            error: outcome.err(),
        });
    }
    let imported = results.iter().filter(|r| r.success).count();
    tracing::info!(imported, total = results.len(), "Bulk subscriber import finished");
    BulkAddResponse {
        success: true,
        imported,
        failed: results.len() - imported,
        results,
    }
}

/// One bulk row. Either store failing fails the row.
async fn import_one(state: &AppState, input: &SubscriberInput) -> std::result::Result<(), String> {
    if input.email.trim().is_empty() {
        return Err("Email is required".to_string());
    }
    if let Some(resend) = state.resend() {
        resend
            .create_contact(resend.audience_id(), &new_contact(input))
            .await
            .map_err(|e| e.to_string())?;
    }
    state
        .supabase()
        .table("subscribers")
        .upsert(&[SubscriberUpsert::new(input, "Import")], "email")
        .await
        .map_err(|e| e.to_string())
}

async fn add_one(state: &AppState, input: &SubscriberInput) -> Result<()> {
    if input.email.trim().is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    if let Some(resend) = state.resend() {
        resend
            .create_contact(resend.audience_id(), &new_contact(input))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error adding subscriber to audience");
                AppError::Failed("Failed to add subscriber".to_string())
            })?;
    }

    if let Err(e) = state
        .supabase()
        .table("subscribers")
        .upsert(&[SubscriberUpsert::new(input, "Manual")], "email")
        .await
    {
        tracing::error!(error = %e, "Error saving subscriber row");
    }
    Ok(())
}
