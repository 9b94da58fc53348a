//! Reusable email templates.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// A built-in template shown until the admin saves their own.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub subject: &'static str,
    pub category: &'static str,
    pub content: &'static str,
    pub created_at: &'static str,
}

pub static DEFAULT_TEMPLATES: [DefaultTemplate; 5] = [
    DefaultTemplate {
        id: "template-1",
        name: "Welcome Email",
        subject: "Welcome to Periospot!",
        category: "onboarding",
        content: r"<h2>Welcome to Periospot, {{firstName}}!</h2>
<p>We're thrilled to have you join our community of dental professionals.</p>
<p>Here's what you can expect:</p>
<ul>
  <li>Weekly articles on the latest in implantology and periodontics</li>
  <li>Exclusive access to our resource library</li>
  <li>Early bird discounts on courses and products</li>
</ul>
<p>Have questions? Just reply to this email!</p>
<p>Best regards,<br>The Periospot Team</p>",
        created_at: "2025-01-01",
    },
    DefaultTemplate {
        id: "template-2",
        name: "New Article Notification",
        subject: "New Article: {{articleTitle}}",
        category: "content",
        content: r#"<h2>New Article Published</h2>
<p>Hi {{firstName}},</p>
<p>We just published a new article that we think you'll love:</p>
<div style="background: #f3f4f6; padding: 20px; border-radius: 8px; margin: 20px 0;">
  <h3 style="margin: 0 0 10px 0;">{{articleTitle}}</h3>
  <p style="margin: 0; color: #6b7280;">{{articleExcerpt}}</p>
</div>
<p><a href="{{articleUrl}}" style="display: inline-block; background: #10b981; color: white; padding: 12px 24px; border-radius: 6px; text-decoration: none;">Read Article</a></p>"#,
        created_at: "2025-01-02",
    },
    DefaultTemplate {
        id: "template-3",
        name: "Monthly Newsletter",
        subject: "Periospot Monthly: {{month}} Highlights",
        category: "newsletter",
        content: r##"<h2>Monthly Highlights</h2>
<p>Hi {{firstName}},</p>
<p>Here's what happened this month at Periospot:</p>

<h3>📚 Top Articles</h3>
<ul>
  <li><a href="#">Socket Shield Technique: A Complete Guide</a></li>
  <li><a href="#">Managing Peri-implantitis: Latest Research</a></li>
  <li><a href="#">Digital Workflow in Implantology</a></li>
</ul>

<h3>🛒 Featured Products</h3>
<p>Check out our latest additions to the shop!</p>

<h3>📅 Upcoming Events</h3>
<p>Don't miss our upcoming webinars and courses.</p>

<p>Thanks for being part of our community!</p>"##,
        created_at: "2025-01-03",
    },
    DefaultTemplate {
        id: "template-4",
        name: "eBook Delivery",
        subject: "Your eBook is Ready: {{ebookTitle}}",
        category: "lead-magnet",
        content: r#"<h2>Your eBook is Ready!</h2>
<p>Hi {{firstName}},</p>
<p>Thank you for downloading <strong>{{ebookTitle}}</strong>.</p>
<p>Click the button below to access your eBook:</p>
<p><a href="{{downloadUrl}}" style="display: inline-block; background: #10b981; color: white; padding: 12px 24px; border-radius: 6px; text-decoration: none;">Download eBook</a></p>
<p>We hope you find it valuable!</p>
<p><em>P.S. This download link expires in 7 days.</em></p>"#,
        created_at: "2025-01-04",
    },
    DefaultTemplate {
        id: "template-5",
        name: "Course Enrollment",
        subject: "Welcome to {{courseName}}!",
        category: "courses",
        content: r#"<h2>You're Enrolled!</h2>
<p>Hi {{firstName}},</p>
<p>Congratulations on enrolling in <strong>{{courseName}}</strong>!</p>
<p>Here's how to get started:</p>
<ol>
  <li>Log in to your dashboard</li>
  <li>Navigate to "My Courses"</li>
  <li>Start with Module 1</li>
</ol>
<p><a href="{{courseUrl}}" style="display: inline-block; background: #10b981; color: white; padding: 12px 24px; border-radius: 6px; text-decoration: none;">Access Course</a></p>
<p>Good luck with your learning!</p>"#,
        created_at: "2025-01-05",
    },
];

#[derive(Serialize)]
#[serde(untagged)]
pub enum TemplateList {
    Stored(Vec<Value>),
    Defaults(&'static [DefaultTemplate]),
}

#[derive(Serialize)]
pub struct TemplatesResponse {
    pub templates: TemplateList,
}

/// Saved templates, newest first. An empty or unreachable table yields
/// the built-in set.
///
/// GET /api/admin/email-marketing/templates
#[instrument(skip(state, _admin))]
pub async fn list(State(state): State<AppState>, _admin: RequireAdmin) -> Json<TemplatesResponse> {
    let stored = state
        .supabase()
        .table("email_templates")
        .select("*")
        .order("created_at", false)
        .fetch::<Value>()
        .await;

    let templates = match stored {
        Ok(rows) if !rows.is_empty() => TemplateList::Stored(rows),
        Ok(_) => TemplateList::Defaults(&DEFAULT_TEMPLATES),
        Err(e) => {
            tracing::error!(error = %e, "Error fetching templates");
            TemplateList::Defaults(&DEFAULT_TEMPLATES)
        }
    };
    Json(TemplatesResponse { templates })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewTemplate {
    pub name: String,
    pub subject: Option<String>,
    pub content: String,
    pub category: Option<String>,
}

#[derive(Serialize)]
struct TemplateInsert<'a> {
    name: &'a str,
    subject: &'a str,
    content: &'a str,
    category: &'a str,
}

#[derive(Serialize)]
pub struct TemplateSaved {
    pub success: bool,
    pub template: Value,
}

/// POST /api/admin/email-marketing/templates
#[instrument(skip(state, _admin, body), fields(name = %body.name))]
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(body): Json<NewTemplate>,
) -> Result<Json<TemplateSaved>> {
    if body.name.trim().is_empty() || body.content.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Name and content are required".to_string(),
        ));
    }

    let row = TemplateInsert {
        name: &body.name,
        subject: body.subject.as_deref().unwrap_or_default(),
        content: &body.content,
        category: body.category.as_deref().unwrap_or("general"),
    };
    let failed = || AppError::Failed("Failed to create template".to_string());
    let rows: Vec<Value> = state
        .supabase()
        .table("email_templates")
        .insert(&row)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error creating template");
            failed()
        })?;
    let template = rows.into_iter().next().ok_or_else(failed)?;
    Ok(Json(TemplateSaved {
        success: true,
        template,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TemplateUpdate {
    pub id: Option<Value>,
    pub name: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

#[derive(Serialize)]
struct TemplatePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    updated_at: String,
}

/// Update the given fields of a template.
///
/// PUT /api/admin/email-marketing/templates
#[instrument(skip(state, _admin, body))]
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(body): Json<TemplateUpdate>,
) -> Result<Json<TemplateSaved>> {
    let id = body
        .id
        .as_ref()
        .filter(|id| !id.is_null())
        .map(super::id_string)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Template ID is required".to_string()))?;

    let patch = TemplatePatch {
        name: body.name.as_deref(),
        subject: body.subject.as_deref(),
        content: body.content.as_deref(),
        category: body.category.as_deref(),
        updated_at: Utc::now().to_rfc3339(),
    };
    let failed = || AppError::Failed("Failed to update template".to_string());
    let rows: Vec<Value> = state
        .supabase()
        .table("email_templates")
        .eq("id", &id)
        .update(&patch)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error updating template");
            failed()
        })?;
    let template = rows.into_iter().next().ok_or_else(failed)?;
    Ok(Json(TemplateSaved {
        success: true,
        template,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub id: Option<String>,
}

#[derive(Serialize)]
pub struct Deleted {
    pub success: bool,
}

/// DELETE /api/admin/email-marketing/templates?id=
#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Deleted>> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Template ID is required".to_string()))?;

    state
        .supabase()
        .table("email_templates")
        .eq("id", &id)
        .delete()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error deleting template");
            AppError::Failed("Failed to delete template".to_string())
        })?;
    tracing::info!(id, "Template deleted");
    Ok(Json(Deleted { success: true }))
}
