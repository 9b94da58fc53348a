//! Google Gemini client for SEO metadata generation.
//!
//! Used by the `generate-seo` CLI command. The model is asked for a JSON
//! object; replies that wrap the object in prose are salvaged by extracting
//! the first `{...}` span.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{instrument, warn};

use periospot_core::seo::SeoFields;

/// Model used when neither `--model` nor `GEMINI_MODEL` is given.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_ATTEMPTS: u32 = 3;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("Invalid regex"));

/// Errors that can occur when calling Gemini.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("Gemini error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Every attempt was rate limited.
    #[error("Gemini error: retries exhausted")]
    RetriesExhausted,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// What the SEO prompt describes.
#[derive(Debug, Clone)]
pub struct SeoPrompt<'a> {
    /// `blog post`, `page`, or `product`
    pub kind: &'a str,
    pub title: &'a str,
    pub categories: &'a [String],
    pub excerpt: &'a str,
    pub content: &'a str,
}

impl SeoPrompt<'_> {
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "You are an SEO assistant. Generate SEO metadata for a {kind}.\n\n\
             Rules:\n\
             - Output valid JSON only.\n\
             - Preserve the content language.\n\
             - Title: 50-60 chars. Description: 140-160 chars.\n\
             - Avoid quotes unless needed.\n\n\
             Return JSON with keys:\n\
             {{\"title\":\"\", \"description\":\"\", \"og_title\":\"\", \"og_description\":\"\", \
             \"twitter_title\":\"\", \"twitter_description\":\"\", \"focus_keyword\":\"\"}}\n\n\
             Context:\n\
             Title: {title}\n\
             Categories: {categories}\n\
             Excerpt: {excerpt}\n\
             Content: {content}\n",
            kind = self.kind,
            title = self.title,
            categories = self.categories.join(", "),
            excerpt = self.excerpt,
            content = self.content,
        )
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    inner: Arc<GeminiClientInner>,
}

struct GeminiClientInner {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    backoff_base: Duration,
    backoff_step: Duration,
}

impl GeminiClient {
    /// Create a client for `model`. A leading `models/` prefix is dropped.
    #[must_use]
    pub fn new(api_key: SecretString, model: &str) -> Self {
        Self::build(api_key, model, BASE_URL, Duration::from_secs(15), Duration::from_secs(5))
    }

    /// Create a client against a different API host, without rate-limit
    /// backoff.
    #[must_use]
    pub fn with_base_url(api_key: SecretString, model: &str, base_url: &str) -> Self {
        Self::build(api_key, model, base_url, Duration::ZERO, Duration::ZERO)
    }

    fn build(
        api_key: SecretString,
        model: &str,
        base_url: &str,
        backoff_base: Duration,
        backoff_step: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(GeminiClientInner {
                client: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                model: normalize_model(model).to_string(),
                backoff_base,
                backoff_step,
            }),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Generate SEO fields for a prompt.
    ///
    /// Returns `Ok(None)` when the reply holds no usable JSON object.
    /// Rate-limited calls wait 15 s, then 20 s, then give up.
    ///
    /// # Errors
    ///
    /// Returns error on non-429 API failures or when every attempt is rate
    /// limited.
    #[instrument(skip(self, prompt), fields(model = %self.inner.model))]
    pub async fn generate_seo(&self, prompt: &str) -> Result<Option<SeoFields>, GeminiError> {
        for attempt in 0..MAX_ATTEMPTS {
            match self.generate_once(prompt).await {
                Err(GeminiError::Api { status: 429, .. }) => {
                    let delay = self.inner.backoff_base + self.inner.backoff_step * attempt;
                    warn!(delay_secs = delay.as_secs(), "Rate limit hit, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
        Err(GeminiError::RetriesExhausted)
    }

    async fn generate_once(&self, prompt: &str) -> Result<Option<SeoFields>, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.inner.base_url, self.inner.model
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.2,
                "maxOutputTokens": 256,
                "responseMimeType": "application/json",
            },
        });

        let response = self
            .inner
            .client
            .post(url)
            .query(&[("key", self.inner.api_key.expose_secret())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(format!("Failed to parse response: {e}")))?;

        let text = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        Ok(parse_seo_json(&text))
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.inner.model)
            .finish_non_exhaustive()
    }
}

fn normalize_model(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

/// Parse a model reply, falling back to the first `{...}` span in it.
fn parse_seo_json(text: &str) -> Option<SeoFields> {
    serde_json::from_str(text).ok().or_else(|| {
        JSON_OBJECT
            .find(text)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
    })
}
