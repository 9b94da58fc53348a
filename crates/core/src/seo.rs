//! SEO metadata: merging, Yoast import, and the editorial audit.
//!
//! Metadata comes from three places, in order of trust: what an editor
//! already saved, what the model generated, and a fallback derived from the
//! content itself. [`merge_seo`] combines them and clamps every field to the
//! lengths search engines display.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::clamp_length;

pub const TITLE_MAX: usize = 60;
pub const DESCRIPTION_MAX: usize = 160;
pub const SOCIAL_TITLE_MAX: usize = 70;

/// SEO fields stored alongside posts, pages, and products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_robots: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_robots_noindex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_robots_nofollow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_robots_adv: Option<String>,
}

impl SeoFields {
    /// True when at least one field holds a non-empty value.
    #[must_use]
    pub fn has_any(&self) -> bool {
        [
            &self.title,
            &self.description,
            &self.focus_keyword,
            &self.canonical,
            &self.og_title,
            &self.og_description,
            &self.og_image,
            &self.twitter_title,
            &self.twitter_description,
            &self.twitter_image,
            &self.meta_robots,
            &self.meta_robots_noindex,
            &self.meta_robots_nofollow,
            &self.meta_robots_adv,
        ]
        .into_iter()
        .any(|field| present(field.as_deref()).is_some())
    }
}

/// `Some(s)` unless `s` is missing or blank.
fn present(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Title and description are the two fields a listing cannot do without.
#[must_use]
pub fn needs_seo(fields: &SeoFields) -> bool {
    present(fields.title.as_deref()).is_none() || present(fields.description.as_deref()).is_none()
}

/// Title and description derived from the content when nothing better exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeoFallback {
    pub title: String,
    pub description: String,
}

fn pick(candidates: &[Option<&str>], default: &str, max: usize) -> Option<String> {
    let value = candidates
        .iter()
        .copied()
        .find_map(present)
        .unwrap_or(default);
    Some(clamp_length(value, max))
}

/// Combine saved, generated, and fallback metadata.
///
/// Fields the editor saved always win. Social titles and descriptions fall
/// back to the generated title/description before the content fallback.
/// Fields outside the merge (canonical, robots, images) are kept from
/// `existing`.
#[must_use]
pub fn merge_seo(existing: &SeoFields, generated: &SeoFields, fallback: &SeoFallback) -> SeoFields {
    let e = existing;
    let g = generated;
    SeoFields {
        title: pick(
            &[e.title.as_deref(), g.title.as_deref()],
            &fallback.title,
            TITLE_MAX,
        ),
        description: pick(
            &[e.description.as_deref(), g.description.as_deref()],
            &fallback.description,
            DESCRIPTION_MAX,
        ),
        og_title: pick(
            &[e.og_title.as_deref(), g.og_title.as_deref(), g.title.as_deref()],
            &fallback.title,
            SOCIAL_TITLE_MAX,
        ),
        og_description: pick(
            &[
                e.og_description.as_deref(),
                g.og_description.as_deref(),
                g.description.as_deref(),
            ],
            &fallback.description,
            DESCRIPTION_MAX,
        ),
        twitter_title: pick(
            &[
                e.twitter_title.as_deref(),
                g.twitter_title.as_deref(),
                g.title.as_deref(),
            ],
            &fallback.title,
            SOCIAL_TITLE_MAX,
        ),
        twitter_description: pick(
            &[
                e.twitter_description.as_deref(),
                g.twitter_description.as_deref(),
                g.description.as_deref(),
            ],
            &fallback.description,
            DESCRIPTION_MAX,
        ),
        focus_keyword: Some(
            [e.focus_keyword.as_deref(), g.focus_keyword.as_deref()]
                .into_iter()
                .find_map(present)
                .unwrap_or_default()
                .to_owned(),
        ),
        ..existing.clone()
    }
}

/// Read Yoast SEO post meta (`_yoast_wpseo_*`) from a WordPress export.
#[must_use]
pub fn map_yoast_meta(meta: &HashMap<String, Value>) -> SeoFields {
    let get = |key: &str| {
        meta.get(&format!("_yoast_wpseo_{key}"))
            .and_then(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    };

    SeoFields {
        title: get("title"),
        description: get("metadesc"),
        focus_keyword: get("focuskw"),
        canonical: get("canonical"),
        og_title: get("opengraph-title"),
        og_description: get("opengraph-description"),
        og_image: get("opengraph-image"),
        twitter_title: get("twitter-title"),
        twitter_description: get("twitter-description"),
        twitter_image: get("twitter-image"),
        meta_robots: get("meta-robots"),
        meta_robots_noindex: get("meta-robots-noindex"),
        meta_robots_nofollow: get("meta-robots-nofollow"),
        meta_robots_adv: get("meta-robots-adv"),
    }
}

/// Outcome of a single audit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

/// One line of the editorial SEO audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeoCheck {
    pub id: &'static str,
    pub label: &'static str,
    pub status: CheckStatus,
    pub message: String,
}

/// What the audit looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditInput<'a> {
    pub title: &'a str,
    pub meta_title: Option<&'a str>,
    pub meta_description: Option<&'a str>,
    pub focus_keyword: Option<&'a str>,
    pub featured_image_url: Option<&'a str>,
    pub excerpt: Option<&'a str>,
    pub content: &'a str,
    pub slug: &'a str,
}

/// Audit result: every check plus a 0-100 score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeoAudit {
    pub checks: Vec<SeoCheck>,
    pub score: u32,
}

/// Score a post the way the editorial dashboard does.
#[must_use]
pub fn audit(input: &AuditInput<'_>) -> SeoAudit {
    let mut checks = Vec::with_capacity(7);
    let mut score = 0;
    let mut push = |id: &'static str,
                    label: &'static str,
                    status: CheckStatus,
                    message: String,
                    points: u32| {
        checks.push(SeoCheck {
            id,
            label,
            status,
            message,
        });
        score += points;
    };

    let title = present(input.meta_title).unwrap_or(input.title);
    let title_len = title.chars().count();
    if title.trim().is_empty() {
        push("title", "Title", CheckStatus::Fail, "Missing title".to_owned(), 0);
    } else if title_len > TITLE_MAX {
        push(
            "title",
            "Title",
            CheckStatus::Warning,
            format!("Title too long ({title_len}/{TITLE_MAX} chars)"),
            10,
        );
    } else if title_len < 30 {
        push(
            "title",
            "Title",
            CheckStatus::Warning,
            format!("Title too short ({title_len}/30 chars)"),
            10,
        );
    } else {
        push(
            "title",
            "Title",
            CheckStatus::Pass,
            format!("Title length is good ({title_len} chars)"),
            15,
        );
    }

    let description = present(input.meta_description);
    match description.map(|d| d.chars().count()) {
        None => push(
            "meta_desc",
            "Meta Description",
            CheckStatus::Fail,
            "Missing meta description".to_owned(),
            0,
        ),
        Some(len) if len > DESCRIPTION_MAX => push(
            "meta_desc",
            "Meta Description",
            CheckStatus::Warning,
            format!("Too long ({len}/{DESCRIPTION_MAX} chars)"),
            10,
        ),
        Some(len) if len < 120 => push(
            "meta_desc",
            "Meta Description",
            CheckStatus::Warning,
            format!("Too short ({len}/120 chars)"),
            10,
        ),
        Some(len) => push(
            "meta_desc",
            "Meta Description",
            CheckStatus::Pass,
            format!("Good length ({len} chars)"),
            15,
        ),
    }

    if present(input.featured_image_url).is_some() {
        push(
            "image",
            "Featured Image",
            CheckStatus::Pass,
            "Featured image is set".to_owned(),
            15,
        );
    } else {
        push(
            "image",
            "Featured Image",
            CheckStatus::Fail,
            "No featured image set".to_owned(),
            0,
        );
    }

    let content_len = input.content.chars().count();
    if content_len < 500 {
        push(
            "content",
            "Content Length",
            CheckStatus::Fail,
            format!("Very short content ({content_len} chars)"),
            0,
        );
    } else if content_len < 1500 {
        push(
            "content",
            "Content Length",
            CheckStatus::Warning,
            format!("Short content ({content_len} chars)"),
            10,
        );
    } else {
        push(
            "content",
            "Content Length",
            CheckStatus::Pass,
            format!("Good content length ({content_len} chars)"),
            20,
        );
    }

    if present(input.excerpt).is_some() {
        push("excerpt", "Excerpt", CheckStatus::Pass, "Excerpt is set".to_owned(), 10);
    } else {
        push("excerpt", "Excerpt", CheckStatus::Warning, "No excerpt set".to_owned(), 5);
    }

    match present(input.focus_keyword) {
        None => push(
            "keyword",
            "Focus Keyword",
            CheckStatus::Warning,
            "No focus keyword".to_owned(),
            0,
        ),
        Some(keyword) => {
            let keyword = keyword.to_lowercase();
            let in_title = title.to_lowercase().contains(&keyword);
            let in_description =
                description.is_some_and(|d| d.to_lowercase().contains(&keyword));
            match (in_title, in_description) {
                (true, true) => push(
                    "keyword",
                    "Focus Keyword",
                    CheckStatus::Pass,
                    "Keyword in title & description".to_owned(),
                    15,
                ),
                (true, false) | (false, true) => push(
                    "keyword",
                    "Focus Keyword",
                    CheckStatus::Warning,
                    "Keyword only in title OR description".to_owned(),
                    10,
                ),
                (false, false) => push(
                    "keyword",
                    "Focus Keyword",
                    CheckStatus::Warning,
                    "Keyword not in title or description".to_owned(),
                    5,
                ),
            }
        }
    }

    if input.slug.contains(' ') || input.slug != input.slug.to_lowercase() {
        push(
            "slug",
            "URL Slug",
            CheckStatus::Warning,
            "Slug has spaces or uppercase".to_owned(),
            5,
        );
    } else {
        push(
            "slug",
            "URL Slug",
            CheckStatus::Pass,
            "Slug is properly formatted".to_owned(),
            10,
        );
    }

    SeoAudit {
        checks,
        score: score.min(100),
    }
}
