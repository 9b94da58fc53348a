//! Pulling the legacy MailerLite list into Resend and Supabase.
//!
//! Both handlers work one page at a time; the dashboard follows
//! `nextCursor` until `hasMore` is false.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::mailerlite::{Subscriber, SubscriberPage};
use crate::services::resend::NewContact;
use crate::services::{MailerLiteClient, MailerLiteError};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 100;

fn client(state: &AppState) -> Result<&MailerLiteClient> {
    state
        .mailerlite()
        .ok_or_else(|| AppError::Failed("MailerLite API key not configured".to_string()))
}

async fn fetch_page(
    client: &MailerLiteClient,
    limit: u32,
    cursor: Option<&str>,
) -> Result<SubscriberPage> {
    client.list_subscribers(limit, cursor).await.map_err(|e| {
        tracing::error!(error = %e, "MailerLite API error");
        fetch_failed(&e)
    })
}

fn fetch_failed(err: &MailerLiteError) -> AppError {
    let status = err
        .status()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    AppError::Upstream(status, "Failed to fetch from MailerLite".to_string())
}

// =============================================================================
// Preview
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementStats {
    pub sent: u64,
    pub opens: u64,
    pub clicks: u64,
    pub open_rate: f64,
    pub click_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
    pub source: String,
    pub country: String,
    pub subscribed_at: Option<String>,
    pub groups: Vec<String>,
    pub stats: EngagementStats,
}

impl From<Subscriber> for PreviewRow {
    fn from(sub: Subscriber) -> Self {
        Self {
            first_name: sub.first_name().to_string(),
            last_name: sub.last_name().to_string(),
            country: sub.fields.country.unwrap_or_default(),
            groups: sub.groups.into_iter().map(|g| g.name).collect(),
            stats: EngagementStats {
                sent: sub.sent,
                opens: sub.opens_count,
                clicks: sub.clicks_count,
                open_rate: sub.open_rate,
                click_rate: sub.click_rate,
            },
            email: sub.email,
            status: sub.status,
            source: sub.source,
            subscribed_at: sub.subscribed_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub subscribers: Vec<PreviewRow>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// One page of MailerLite subscribers, shaped for the import preview.
///
/// GET /api/admin/import/mailerlite?cursor=&limit=
#[instrument(skip(state, _admin))]
pub async fn preview(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<PreviewResponse>> {
    let client = client(&state)?;
    let page = fetch_page(
        client,
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        query.cursor.as_deref(),
    )
    .await?;

    Ok(Json(PreviewResponse {
        has_more: page.next_cursor.is_some(),
        next_cursor: page.next_cursor,
        subscribers: page.subscribers.into_iter().map(PreviewRow::from).collect(),
    }))
}

// =============================================================================
// Import
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportRequest {
    pub cursor: Option<String>,
    pub batch_size: u32,
    pub import_to_resend: bool,
    pub import_to_supabase: bool,
    pub skip_unsubscribed: bool,
}

impl Default for ImportRequest {
    fn default() -> Self {
        Self {
            cursor: None,
            batch_size: DEFAULT_PAGE_SIZE,
            import_to_resend: true,
            import_to_supabase: true,
            skip_unsubscribed: true,
        }
    }
}

#[derive(Serialize)]
struct ImportedStats {
    sent: u64,
    opens: u64,
    clicks: u64,
}

/// A `newsletter_subscribers` row built from a MailerLite subscriber.
#[derive(Serialize)]
struct NewsletterRow<'a> {
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    source: String,
    country: &'a str,
    tags: Vec<&'a str>,
    unsubscribed: bool,
    mailerlite_id: &'a str,
    imported_at: String,
    original_subscribed_at: Option<&'a str>,
    stats: ImportedStats,
}

impl<'a> NewsletterRow<'a> {
    fn new(sub: &'a Subscriber, imported_at: String) -> Self {
        Self {
            email: &sub.email,
            first_name: sub.first_name(),
            last_name: sub.last_name(),
            source: format!("MailerLite Import ({})", sub.source),
            country: sub.fields.country.as_deref().unwrap_or_default(),
            tags: sub.groups.iter().map(|g| g.name.as_str()).collect(),
            unsubscribed: sub.is_unsubscribed(),
            mailerlite_id: &sub.id,
            imported_at,
            original_subscribed_at: sub.subscribed_at.as_deref(),
            stats: ImportedStats {
                sent: sub.sent,
                opens: sub.opens_count,
                clicks: sub.clicks_count,
            },
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ImportResults {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub success: bool,
    pub results: ImportResults,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Import one page of MailerLite subscribers.
///
/// A failed Supabase upsert fails that subscriber. Resend rejections are
/// logged only, since re-running an import hits contacts that already exist.
///
/// POST /api/admin/import/mailerlite
#[instrument(skip(state, _admin, body))]
pub async fn import(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(body): Json<ImportRequest>,
) -> Result<Json<ImportResponse>> {
    let client = client(&state)?;
    let page = fetch_page(client, body.batch_size, body.cursor.as_deref()).await?;

    let mut results = ImportResults {
        total: page.subscribers.len(),
        ..ImportResults::default()
    };

    for sub in &page.subscribers {
        if body.skip_unsubscribed && sub.is_unsubscribed() {
            results.skipped += 1;
            continue;
        }

        if body.import_to_supabase {
            let row = NewsletterRow::new(sub, Utc::now().to_rfc3339());
            if let Err(e) = state
                .supabase()
                .table("newsletter_subscribers")
                .upsert(&row, "email")
                .await
            {
                tracing::error!(error = %e, "Error saving imported subscriber");
                results.failed += 1;
                results.errors.push(format!("{}: {e}", sub.email));
                continue;
            }
        }

        if body.import_to_resend
            && let Some(resend) = state.resend()
        {
            let contact = NewContact {
                email: sub.email.clone(),
                first_name: Some(sub.first_name().to_string()),
                last_name: Some(sub.last_name().to_string()),
                unsubscribed: sub.is_unsubscribed(),
            };
            if let Err(e) = resend.create_contact(resend.audience_id(), &contact).await {
                tracing::warn!(error = %e, "Resend rejected imported contact");
            }
        }

        results.imported += 1;
    }

    tracing::info!(
        total = results.total,
        imported = results.imported,
        skipped = results.skipped,
        failed = results.failed,
        "MailerLite page imported"
    );

    Ok(Json(ImportResponse {
        success: true,
        results,
        has_more: page.next_cursor.is_some(),
        next_cursor: page.next_cursor,
    }))
}
