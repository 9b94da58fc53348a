//! Fill in missing SEO metadata with Gemini.
//!
//! # Usage
//!
//! ```bash
//! # Generate for everything that lacks a title or description
//! ps-cli generate-seo
//!
//! # Ten posts only, then push posts to Supabase
//! ps-cli generate-seo --scope posts --limit 10 --push
//!
//! # List what would be generated without calling the API
//! ps-cli generate-seo --dry-run
//! ```
//!
//! The export file is saved after every generated item, so an interrupted
//! run resumes where it stopped.
//!
//! # Environment Variables
//!
//! - `GOOGLE_GEMINI_API_KEY` - API key (required)
//! - `GEMINI_MODEL` - Model override (default `gemini-2.5-flash`)

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use periospot_core::seo::{SeoFallback, SeoFields, map_yoast_meta, merge_seo, needs_seo};
use periospot_core::text::{plain_text, truncate};
use periospot_site::services::GeminiClient;
use periospot_site::services::gemini::SeoPrompt;
use serde_json::Value;

use super::{CommandError, read_json, write_json};

const CONTENT_CHARS: usize = 2000;
const EXCERPT_CHARS: usize = 300;
const FALLBACK_DESCRIPTION_CHARS: usize = 160;

/// Which export file to work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scope {
    Posts,
    Pages,
    Products,
}

impl Scope {
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Posts => "posts.json",
            Self::Pages => "pages.json",
            Self::Products => "products.json",
        }
    }

    const fn kind(self) -> &'static str {
        match self {
            Self::Posts => "blog post",
            Self::Pages => "page",
            Self::Products => "product",
        }
    }

    const fn label_field(self) -> &'static str {
        match self {
            Self::Pages => "post_name",
            Self::Posts | Self::Products => "slug",
        }
    }
}

/// Options for [`generate`].
#[derive(Debug, Clone)]
pub struct SeoOptions {
    pub content_dir: PathBuf,
    /// Per-scope cap on generated items
    pub limit: Option<usize>,
    pub delay: Duration,
    pub dry_run: bool,
}

/// What the model is told about one item.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    title: String,
    categories: Vec<String>,
    excerpt: String,
    content: String,
    existing: SeoFields,
    fallback_description: String,
}

fn str_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn saved_seo(item: &Value) -> Option<SeoFields> {
    item.get("seo")
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn yoast_seo(item: &Value) -> SeoFields {
    let meta: HashMap<String, Value> = item
        .get("meta")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    map_yoast_meta(&meta)
}

fn string_list(item: &Value, key: &str) -> Vec<String> {
    item.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Candidate {
    fn from_item(scope: Scope, item: &Value) -> Self {
        let title = str_field(item, "title").unwrap_or("Untitled").to_string();
        let (summary_source, body_source, categories) = match scope {
            Scope::Posts | Scope::Pages => (
                str_field(item, "excerpt").or_else(|| str_field(item, "content")),
                str_field(item, "content"),
                string_list(item, "categories"),
            ),
            Scope::Products => (
                str_field(item, "description"),
                str_field(item, "description"),
                str_field(item, "product_type")
                    .map(|t| vec![t.to_string()])
                    .unwrap_or_default(),
            ),
        };

        let summary = plain_text(summary_source.unwrap_or_default());
        let mut fallback_description: String =
            summary.chars().take(FALLBACK_DESCRIPTION_CHARS).collect();
        if scope == Scope::Pages && fallback_description.is_empty() {
            let name = str_field(item, "title").unwrap_or("this page");
            fallback_description = format!("Learn more about {name} on Periospot.");
        }

        let existing = match scope {
            Scope::Pages => saved_seo(item).unwrap_or_else(|| yoast_seo(item)),
            Scope::Posts | Scope::Products => saved_seo(item).unwrap_or_default(),
        };

        Self {
            excerpt: truncate(&summary, EXCERPT_CHARS),
            content: truncate(&plain_text(body_source.unwrap_or_default()), CONTENT_CHARS),
            title,
            categories,
            existing,
            fallback_description,
        }
    }

    fn prompt(&self, scope: Scope) -> String {
        SeoPrompt {
            kind: scope.kind(),
            title: &self.title,
            categories: &self.categories,
            excerpt: &self.excerpt,
            content: &self.content,
        }
        .render()
    }

    fn merge(&self, generated: &SeoFields) -> SeoFields {
        let fallback = SeoFallback {
            title: self.title.clone(),
            description: self.fallback_description.clone(),
        };
        merge_seo(&self.existing, generated, &fallback)
    }
}

fn seo_value(fields: &SeoFields) -> Result<Value, CommandError> {
    serde_json::to_value(fields).map_err(|source| CommandError::Json {
        path: PathBuf::from("seo"),
        source,
    })
}

/// Generate SEO for one export file. Returns the number of items generated
/// (or, in a dry run, the number that would be).
///
/// # Errors
///
/// Returns error if the file cannot be read or written, or Gemini fails.
pub async fn generate_scope(
    gemini: &GeminiClient,
    scope: Scope,
    options: &SeoOptions,
) -> Result<usize, CommandError> {
    let path = options.content_dir.join(scope.file_name());
    let mut items: Vec<Value> = read_json(&path)?;
    let mut processed = 0;
    let mut dirty = false;

    for index in 0..items.len() {
        let Some(item) = items.get_mut(index).filter(|item| item.is_object()) else {
            continue;
        };
        let candidate = Candidate::from_item(scope, item);

        if !needs_seo(&candidate.existing) {
            // Pages carry their Yoast fields forward into `seo`.
            if scope == Scope::Pages && item.get("seo").is_none() {
                item["seo"] = seo_value(&candidate.existing)?;
                dirty = true;
            }
            continue;
        }
        if options.limit.is_some_and(|limit| processed >= limit) {
            break;
        }

        let label = str_field(item, scope.label_field())
            .map_or_else(|| item.get("id").map(ToString::to_string).unwrap_or_default(), str::to_string);

        if options.dry_run {
            tracing::info!(scope = ?scope, item = %label, "Would generate SEO");
            processed += 1;
            continue;
        }

        let generated = gemini
            .generate_seo(&candidate.prompt(scope))
            .await?
            .unwrap_or_default();
        item["seo"] = seo_value(&candidate.merge(&generated))?;
        processed += 1;
        tracing::info!(scope = ?scope, item = %label, "SEO generated");

        write_json(&path, &items)?;
        dirty = false;
        tokio::time::sleep(options.delay).await;
    }

    if dirty && !options.dry_run {
        write_json(&path, &items)?;
    }
    Ok(processed)
}

/// Generate SEO for every scope in turn.
///
/// # Errors
///
/// Stops at the first scope that fails; earlier items stay saved.
pub async fn generate(
    gemini: &GeminiClient,
    scopes: &[Scope],
    options: &SeoOptions,
) -> Result<usize, CommandError> {
    let mut total = 0;
    for scope in scopes {
        total += generate_scope(gemini, *scope, options).await?;
    }
    tracing::info!(total, model = gemini.model(), "SEO generation complete");
    Ok(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use std::path::Path;

    use super::*;

    fn gemini(base_url: &str) -> GeminiClient {
        GeminiClient::with_base_url(SecretString::from("g-key"), "gemini-2.5-flash", base_url)
    }

    fn options(dir: &Path, limit: Option<usize>, dry_run: bool) -> SeoOptions {
        SeoOptions {
            content_dir: dir.to_path_buf(),
            limit,
            delay: Duration::ZERO,
            dry_run,
        }
    }

    fn reply(seo: &Value) -> Value {
        json!({"candidates": [{"content": {"parts": [{"text": seo.to_string()}]}}]})
    }

    #[test]
    fn test_candidate_for_post() {
        let item = json!({
            "title": "Socket Preservation",
            "excerpt": "",
            "content": "<p>Ridge <b>preservation</b> after extraction.</p>",
            "categories": ["Surgery"]
        });
        let candidate = Candidate::from_item(Scope::Posts, &item);
        assert_eq!(candidate.excerpt, "Ridge preservation after extraction.");
        assert_eq!(candidate.fallback_description, "Ridge preservation after extraction.");
        assert_eq!(candidate.categories, vec!["Surgery"]);
        assert!(candidate.prompt(Scope::Posts).contains("metadata for a blog post"));
    }

    #[test]
    fn test_candidate_for_page_uses_yoast_and_default_description() {
        let item = json!({
            "title": "Contact",
            "meta": {"_yoast_wpseo_title": "Contact Periospot"}
        });
        let candidate = Candidate::from_item(Scope::Pages, &item);
        assert_eq!(candidate.existing.title.as_deref(), Some("Contact Periospot"));
        assert_eq!(
            candidate.fallback_description,
            "Learn more about Contact on Periospot."
        );
    }

    #[test]
    fn test_candidate_for_product_uses_type_as_category() {
        let item = json!({"title": "Perio Atlas", "description": "<p>Atlas</p>", "product_type": "downloadable"});
        let candidate = Candidate::from_item(Scope::Products, &item);
        assert_eq!(candidate.categories, vec!["downloadable"]);
        assert_eq!(candidate.content, "Atlas");
    }

    #[test]
    fn test_merge_keeps_editor_fields() {
        let item = json!({"title": "Implants", "excerpt": "About implants", "seo": {"title": "Editor title"}});
        let candidate = Candidate::from_item(Scope::Posts, &item);
        let generated = SeoFields {
            title: Some("Model title".into()),
            description: Some("Model description".into()),
            ..SeoFields::default()
        };
        let merged = candidate.merge(&generated);
        assert_eq!(merged.title.as_deref(), Some("Editor title"));
        assert_eq!(merged.description.as_deref(), Some("Model description"));
        assert_eq!(merged.og_title.as_deref(), Some("Model title"));
    }

    #[tokio::test]
    async fn test_generate_scope_saves_and_respects_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply(&json!({
                "title": "Generated title",
                "description": "Generated description",
                "focus_keyword": "implants"
            }))))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("posts.json"),
            json!([
                {"slug": "done", "seo": {"title": "T", "description": "D"}},
                {"slug": "first", "title": "First", "content": "<p>Body</p>"},
                {"slug": "second", "title": "Second"}
            ])
            .to_string(),
        )
        .unwrap();

        let generated = generate_scope(
            &gemini(&server.uri()),
            Scope::Posts,
            &options(dir.path(), Some(1), false),
        )
        .await
        .unwrap();
        assert_eq!(generated, 1);

        let posts: Vec<Value> = read_json(&dir.path().join("posts.json")).unwrap();
        assert_eq!(posts[0]["seo"]["title"], "T");
        assert_eq!(posts[1]["seo"]["title"], "Generated title");
        assert_eq!(posts[1]["seo"]["focus_keyword"], "implants");
        assert!(posts[2].get("seo").is_none());
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_calls_and_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let original = json!([{"slug": "a"}, {"slug": "b"}]).to_string();
        std::fs::write(dir.path().join("products.json"), &original).unwrap();

        let count = generate(
            &gemini(&server.uri()),
            &[Scope::Products],
            &options(dir.path(), None, true),
        )
        .await
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("products.json")).unwrap(),
            original
        );
    }

    #[tokio::test]
    async fn test_pages_with_yoast_seo_are_carried_forward() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pages.json"),
            json!([{"post_name": "about", "meta": {
                "_yoast_wpseo_title": "About", "_yoast_wpseo_metadesc": "Who we are"
            }}])
            .to_string(),
        )
        .unwrap();

        let count = generate_scope(&gemini(&server.uri()), Scope::Pages, &options(dir.path(), None, false))
            .await
            .unwrap();
        assert_eq!(count, 0);
        let pages: Vec<Value> = read_json(&dir.path().join("pages.json")).unwrap();
        assert_eq!(pages[0]["seo"]["description"], "Who we are");
    }
}
