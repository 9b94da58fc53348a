//! Ebook library: listing, gated downloads, and emailed download links.
//!
//! Free titles can be downloaded anonymously in exchange for an email
//! address; paid titles need a signed-in member. Downloads are served as
//! short-lived signed URLs into the `ebooks` storage bucket.

use askama::Template;
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header::USER_AGENT},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use periospot_core::is_plausible_email;

use crate::emails::EbookDelivery;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{OptionalUser, client_ip};
use crate::models::SessionUser;
use crate::routes::Ack;
use crate::services::resend::{NewContact, SendEmail};
use crate::state::AppState;

const EBOOK_BUCKET: &str = "ebooks";
const SIGNED_URL_TTL_SECS: u64 = 5 * 60;
const DELIVERY_FROM: &str = "Periospot <hello@periospot.com>";
const DEFAULT_TITLE: &str = "Periospot eBook";

/// The `ebooks` columns the download flow reads.
#[derive(Debug, Deserialize)]
struct Ebook {
    id: Value,
    slug: String,
    title: String,
    #[serde(default)]
    is_free: bool,
    #[serde(default)]
    pdf_path: Option<String>,
    #[serde(default)]
    genius_link_url: Option<String>,
    #[serde(default)]
    apple_books_url: Option<String>,
}

#[derive(Serialize)]
pub struct EbooksResponse {
    pub ebooks: Vec<Value>,
}

/// Published ebooks, newest first.
///
/// GET /api/ebooks
#[instrument(skip(state))]
pub async fn list(State(state): State<AppState>) -> Result<Json<EbooksResponse>> {
    let ebooks = state
        .supabase()
        .table("ebooks")
        .select("*")
        .eq("is_published", true)
        .order("created_at", false)
        .fetch()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error fetching ebooks");
            AppError::Failed("Failed to fetch ebooks".to_string())
        })?;
    Ok(Json(EbooksResponse { ebooks }))
}

// =============================================================================
// Downloads
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadRequest {
    pub slug: Option<String>,
    pub email: Option<String>,
    pub marketing_consent: bool,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SlugQuery {
    pub slug: Option<String>,
}

/// Where the browser should go to get the book.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DownloadResponse {
    /// Store page for titles without a hosted PDF.
    External { url: String },
    Download {
        url: String,
        filename: String,
        title: String,
    },
}

#[derive(Serialize)]
struct DownloadRow<'a> {
    ebook_id: &'a Value,
    user_id: Option<&'a str>,
    email: Option<&'a str>,
    ip_address: String,
    user_agent: &'a str,
    marketing_consent: bool,
    source: &'a str,
}

/// Request a download, leaving an email for anonymous free downloads.
///
/// POST /api/ebooks/download
#[instrument(skip(state, user, headers, body), fields(slug = ?body.slug))]
pub async fn download(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    Json(body): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>> {
    let slug = body
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing ebook slug".to_string()))?;
    deliver(&state, user.as_ref(), &headers, slug, &body).await
}

/// Direct download link for signed-in members.
///
/// GET /api/ebooks/download?slug=
#[instrument(skip(state, user, headers))]
pub async fn download_by_slug(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    Query(query): Query<SlugQuery>,
) -> Result<Json<DownloadResponse>> {
    let slug = query
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing slug parameter".to_string()))?;
    let body = DownloadRequest {
        source: Some("direct".to_string()),
        ..DownloadRequest::default()
    };
    deliver(&state, user.as_ref(), &headers, slug, &body).await
}

async fn deliver(
    state: &AppState,
    user: Option<&SessionUser>,
    headers: &HeaderMap,
    slug: &str,
    body: &DownloadRequest,
) -> Result<Json<DownloadResponse>> {
    let ebook: Ebook = state
        .supabase()
        .table("ebooks")
        .select("*")
        .eq("slug", slug)
        .eq("is_published", true)
        .fetch_optional()
        .await?
        .ok_or_else(|| AppError::NotFound("Ebook not found".to_string()))?;

    let Some(pdf_path) = ebook.pdf_path.as_deref().filter(|p| !p.is_empty()) else {
        let external = ebook
            .genius_link_url
            .clone()
            .or_else(|| ebook.apple_books_url.clone())
            .filter(|u| !u.is_empty());
        return match external {
            Some(url) => Ok(Json(DownloadResponse::External { url })),
            None => Err(AppError::NotFound("Ebook file not available".to_string())),
        };
    };

    let email = body.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    if user.is_none() {
        if !ebook.is_free {
            return Err(AppError::LoginRequired);
        }
        let email = email.ok_or(AppError::EmailRequired)?;
        if !is_plausible_email(email) {
            return Err(AppError::BadRequest("Invalid email format".to_string()));
        }
    }

    add_breadcrumb("ebooks", "Download requested", Some(&[("slug", slug)]));

    let row = DownloadRow {
        ebook_id: &ebook.id,
        user_id: user.map(|u| u.id.as_str()),
        email: email.or_else(|| user.and_then(|u| u.email.as_deref())),
        ip_address: client_ip(headers).map_or_else(|| "unknown".to_string(), |ip| ip.to_string()),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default(),
        marketing_consent: body.marketing_consent,
        source: body.source.as_deref().unwrap_or("library"),
    };
    if let Err(e) = state
        .supabase()
        .table("ebook_downloads")
        .insert_minimal(&row)
        .await
    {
        tracing::error!(error = %e, "Error recording download");
    }

    let url = state
        .supabase()
        .create_signed_url(EBOOK_BUCKET, pdf_path, SIGNED_URL_TTL_SECS)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error generating signed URL");
            AppError::Failed("Failed to generate download link".to_string())
        })?;

    Ok(Json(DownloadResponse::Download {
        url,
        filename: format!("{}.pdf", ebook.slug),
        title: ebook.title,
    }))
}

// =============================================================================
// Emailed links
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EbookRequest {
    pub ebook_id: Option<Value>,
    pub ebook_slug: Option<String>,
    pub ebook_title: Option<String>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub accepts_marketing: bool,
    pub trigger: Option<String>,
}

#[derive(Deserialize)]
struct TitleRow {
    title: String,
}

#[derive(Serialize)]
struct NewsletterRow<'a> {
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    source: String,
    tags: [String; 2],
    unsubscribed: bool,
}

/// Email a download link, subscribing the reader when they opted in.
///
/// Subscription and delivery problems are logged; the request succeeds once
/// the address is valid.
///
/// POST /api/ebooks/request
#[instrument(skip(state, body), fields(email = %body.email, slug = ?body.ebook_slug, trigger = ?body.trigger))]
pub async fn request(
    State(state): State<AppState>,
    Json(body): Json<EbookRequest>,
) -> Result<Json<Ack>> {
    let email = body.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }
    if !is_plausible_email(email) {
        return Err(AppError::BadRequest("Invalid email format".to_string()));
    }

    let slug = body.ebook_slug.as_deref().filter(|s| !s.is_empty());
    let title = resolve_title(&state, body.ebook_title.as_deref(), slug).await;

    let base_url = state.config().base_url.trim_end_matches('/');
    let download_url = slug.map_or_else(
        || format!("{base_url}/library"),
        |slug| {
            let encoded: String = url::form_urlencoded::byte_serialize(slug.as_bytes()).collect();
            format!("{base_url}/api/ebooks/download?slug={encoded}")
        },
    );

    let first_name = body.first_name.as_deref().unwrap_or_default().trim();
    let last_name = body.last_name.as_deref().unwrap_or_default().trim();

    if body.accepts_marketing {
        subscribe_reader(&state, email, first_name, last_name, &title, &body).await;
    }

    if let Some(resend) = state.resend() {
        let html = EbookDelivery::new(
            Some(first_name),
            &title,
            &download_url,
            base_url,
            Utc::now(),
        )
        .render()?;
        let message = SendEmail::new(DELIVERY_FROM, email, format!("Your eBook: {title}"), html);
        if let Err(e) = resend.send_email(&message).await {
            tracing::error!(error = %e, "Email send error");
        }
    } else {
        tracing::warn!("Resend not configured; ebook link not emailed");
    }

    Ok(Ack::new("eBook sent to your email"))
}

/// The given title, else the stored title for `slug`, else a generic one.
async fn resolve_title(state: &AppState, given: Option<&str>, slug: Option<&str>) -> String {
    if let Some(title) = given.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    let Some(slug) = slug else {
        return DEFAULT_TITLE.to_string();
    };

    match state
        .supabase()
        .table("ebooks")
        .select("title")
        .eq("slug", slug)
        .fetch_optional::<TitleRow>()
        .await
    {
        Ok(Some(row)) => row.title,
        Ok(None) => DEFAULT_TITLE.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not look up ebook title");
            DEFAULT_TITLE.to_string()
        }
    }
}

async fn subscribe_reader(
    state: &AppState,
    email: &str,
    first_name: &str,
    last_name: &str,
    title: &str,
    body: &EbookRequest,
) {
    if let Some(resend) = state.resend() {
        let contact = NewContact {
            email: email.to_string(),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            unsubscribed: false,
        };
        if let Err(e) = resend.create_contact(resend.audience_id(), &contact).await {
            tracing::error!(error = %e, "Subscriber error");
        }
    }

    let tag = body
        .ebook_slug
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            body.ebook_id.as_ref().map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
        .unwrap_or_else(|| "unknown".to_string());
    let row = NewsletterRow {
        email,
        first_name,
        last_name,
        source: format!("eBook: {title}"),
        tags: ["ebook-download".to_string(), tag],
        unsubscribed: false,
    };
    if let Err(e) = state
        .supabase()
        .table("newsletter_subscribers")
        .upsert(&[row], "email")
        .await
    {
        tracing::error!(error = %e, "Subscriber error");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::content::ContentStore;
    use crate::routes::test_support::{get, post};
    use crate::state::test_state;

    async fn mock_ebook(server: &MockServer, slug: &str, is_free: bool) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/ebooks"))
            .and(query_param("slug", format!("eq.{slug}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 7,
                "slug": slug,
                "title": "Socket Shield Atlas",
                "is_free": is_free,
                "pdf_path": "pdfs/atlas.pdf"
            }])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_anonymous_free_download_requires_email() {
        let server = MockServer::start().await;
        mock_ebook(&server, "atlas", true).await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = post(&state, "/api/ebooks/download", &json!({"slug": "atlas"})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["requiresEmail"], true);
    }

    #[tokio::test]
    async fn test_anonymous_paid_download_requires_login() {
        let server = MockServer::start().await;
        mock_ebook(&server, "masterclass", false).await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = post(
            &state,
            "/api/ebooks/download",
            &json!({"slug": "masterclass", "email": "ana@example.com"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["requiresLogin"], true);
    }

    #[tokio::test]
    async fn test_free_download_with_email_returns_signed_url() {
        let server = MockServer::start().await;
        mock_ebook(&server, "atlas", true).await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/ebook_downloads"))
            .and(body_partial_json(json!({
                "email": "ana@example.com",
                "source": "library",
                "marketing_consent": true
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/ebooks/pdfs/atlas.pdf"))
            .and(body_partial_json(json!({"expiresIn": 300})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "signedURL": "/object/sign/ebooks/pdfs/atlas.pdf?token=abc"
            })))
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = post(
            &state,
            "/api/ebooks/download",
            &json!({"slug": "atlas", "email": "ana@example.com", "marketingConsent": true}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "download");
        assert_eq!(body["filename"], "atlas.pdf");
        assert!(body["url"].as_str().unwrap().ends_with("token=abc"));
    }

    #[tokio::test]
    async fn test_missing_pdf_falls_back_to_store_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/ebooks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 8, "slug": "guide", "title": "Guide", "is_free": true,
                "pdf_path": null, "apple_books_url": "https://books.apple.com/guide"
            }])))
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = get(&state, "/api/ebooks/download?slug=guide").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "external");
        assert_eq!(body["url"], "https://books.apple.com/guide");
    }

    #[tokio::test]
    async fn test_unknown_ebook_is_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/ebooks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = post(&state, "/api/ebooks/download", &json!({"slug": "nope"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Ebook not found");
    }

    #[tokio::test]
    async fn test_request_emails_link_and_subscribes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audiences/aud-1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/newsletter_subscribers"))
            .and(body_partial_json(json!([{
                "source": "eBook: Socket Shield Atlas",
                "tags": ["ebook-download", "atlas"]
            }])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_partial_json(json!({"subject": "Your eBook: Socket Shield Atlas"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e-1"})))
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = post(
            &state,
            "/api/ebooks/request",
            &json!({
                "ebookSlug": "atlas",
                "ebookTitle": "Socket Shield Atlas",
                "email": "ana@example.com",
                "acceptsMarketing": true
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "eBook sent to your email");
    }

    #[tokio::test]
    async fn test_request_requires_email() {
        let state = test_state(ContentStore::default(), "http://127.0.0.1:9");
        let (status, body) = post(&state, "/api/ebooks/request", &json!({"ebookSlug": "atlas"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email is required");
    }
}
