//! Content layer over the legacy WordPress JSON export.
//!
//! This module loads `posts.json`, `products.json`, `authors.json`,
//! `categories.json` and `pages.json` from the content directory at startup.
//! Every file is optional: a missing or unparsable file logs a warning and
//! leaves that collection empty, so the site still boots on a partial export.
//!
//! Posts are normalized on load (title, slug, author, excerpt and image
//! fallbacks) and sorted newest first.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use periospot_core::seo::SeoFields;
use periospot_core::text::{build_excerpt, normalize_date, plain_text, reading_time_minutes, slugify};

const DEFAULT_AUTHOR: &str = "Periospot";
const EXCERPT_LENGTH: usize = 180;

/// A normalized blog post.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub date: String,
    pub modified: String,
    pub author: String,
    pub categories: Vec<String>,
    pub featured_image: String,
    pub status: String,
    pub reading_time: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo: Option<SeoFields>,
    #[serde(skip)]
    published_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Publication time, when the export's date string could be read.
    #[must_use]
    pub const fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    fn in_category(&self, category: &str) -> bool {
        let needle = category.to_lowercase();
        self.categories
            .iter()
            .any(|cat| cat.to_lowercase().contains(&needle))
    }
}

/// A product from the legacy shop export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "loose_id")]
    pub id: String,
    #[serde(default, deserialize_with = "loose_optional_id")]
    pub woocommerce_id: Option<u64>,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "loose_price")]
    pub price: f64,
    #[serde(default, deserialize_with = "loose_optional_price")]
    pub sale_price: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub featured_image_url: String,
    #[serde(default)]
    pub gallery_images: Vec<String>,
    #[serde(default)]
    pub stock_status: String,
    #[serde(default)]
    pub link: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    #[serde(deserialize_with = "loose_id")]
    pub id: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(deserialize_with = "loose_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nicename: String,
    #[serde(default)]
    pub description: String,
}

/// A static WordPress page (about, privacy, ...).
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub status: String,
    pub modified: String,
}

/// One heading in a post's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub id: String,
    pub title: String,
    pub level: u8,
}

/// Previous (older) and next (newer) neighbours of a post.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdjacentPosts<'a> {
    pub prev: Option<&'a Post>,
    pub next: Option<&'a Post>,
}

// =============================================================================
// Raw export shapes
// =============================================================================

/// WordPress exports ids as numbers or strings depending on the tool.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// Prices and WooCommerce ids arrive as numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn loose_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(RawId::into_string)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn loose_optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let raw = Option::<RawNumber>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|n| n.value())
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| n as u64))
}

/// Unparsable prices read as zero rather than dropping the product.
fn loose_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(loose_optional_price(deserializer)?.unwrap_or_default())
}

fn loose_optional_price<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    let raw = Option::<RawNumber>::deserialize(deserializer)?;
    Ok(raw.and_then(|n| n.value()).filter(|n| n.is_finite()))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAuthor {
    Name(String),
    Object {
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPost {
    id: Option<RawId>,
    title: Option<String>,
    slug: Option<String>,
    excerpt: Option<String>,
    content: Option<String>,
    date: Option<String>,
    modified: Option<String>,
    author: Option<RawAuthor>,
    #[serde(default)]
    categories: Vec<String>,
    featured_image: Option<String>,
    #[serde(rename = "featured_image")]
    featured_image_snake: Option<String>,
    #[serde(rename = "featured_image_url")]
    featured_image_url: Option<String>,
    status: Option<String>,
    seo: Option<SeoFields>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    id: Option<RawId>,
    title: Option<String>,
    slug: Option<String>,
    post_name: Option<String>,
    content: Option<String>,
    post_status: Option<String>,
    status: Option<String>,
    modified: Option<String>,
}

/// Treat blank strings as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn normalize_post(raw: RawPost) -> Post {
    let title = non_blank(raw.title).unwrap_or_else(|| "Untitled".to_string());
    let id = raw.id.map(RawId::into_string);
    let slug = non_blank(raw.slug)
        .or_else(|| Some(slugify(&title)).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| format!("post-{}", id.as_deref().unwrap_or_default()));

    let author = match raw.author {
        Some(RawAuthor::Name(name)) => name,
        Some(RawAuthor::Object { name }) => {
            non_blank(name).unwrap_or_else(|| DEFAULT_AUTHOR.to_string())
        }
        None => DEFAULT_AUTHOR.to_string(),
    };

    let content = raw.content.unwrap_or_default();
    let excerpt =
        non_blank(raw.excerpt).unwrap_or_else(|| build_excerpt(&content, EXCERPT_LENGTH));
    let featured_image = [raw.featured_image, raw.featured_image_snake, raw.featured_image_url]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    let date = raw.date.unwrap_or_default();
    let modified = raw
        .modified
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| date.clone());

    Post {
        id: id.unwrap_or_else(|| slug.clone()),
        reading_time: reading_time_minutes(&plain_text(&content)),
        published_at: normalize_date(&date),
        title,
        slug,
        excerpt,
        content,
        date,
        modified,
        author,
        categories: raw.categories,
        featured_image,
        status: non_blank(raw.status).unwrap_or_else(|| "publish".to_string()),
        seo: raw.seo.filter(SeoFields::has_any),
    }
}

fn normalize_page(raw: RawPage) -> Option<Page> {
    let slug = non_blank(raw.post_name).or_else(|| non_blank(raw.slug))?;
    Some(Page {
        id: raw
            .id
            .map_or_else(|| slug.clone(), RawId::into_string),
        title: non_blank(raw.title).unwrap_or_else(|| "Untitled".to_string()),
        content: raw.content.unwrap_or_default(),
        status: non_blank(raw.post_status)
            .or_else(|| non_blank(raw.status))
            .unwrap_or_else(|| "publish".to_string()),
        modified: raw.modified.unwrap_or_default(),
        slug,
    })
}

// =============================================================================
// Store
// =============================================================================

/// Content store that holds all loaded content in memory
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    posts: Arc<Vec<Post>>,
    products: Arc<Vec<Product>>,
    authors: Arc<Vec<Author>>,
    categories: Arc<Vec<Category>>,
    pages: Arc<Vec<Page>>,
}

impl ContentStore {
    /// Load all content from the export directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `content_dir` exists but is not a directory.
    /// Problems with individual files are logged and skipped.
    pub fn load(content_dir: &Path) -> Result<Self, ContentError> {
        if !content_dir.exists() {
            tracing::warn!("Content directory does not exist: {:?}", content_dir);
            return Ok(Self::default());
        }
        if !content_dir.is_dir() {
            return Err(ContentError::Io(format!(
                "{} is not a directory",
                content_dir.display()
            )));
        }

        let mut posts: Vec<Post> = read_collection::<RawPost>(&content_dir.join("posts.json"))
            .into_iter()
            .map(normalize_post)
            .collect();
        posts.sort_by_key(|post| Reverse(post.published_at));

        let pages = read_collection::<RawPage>(&content_dir.join("pages.json"))
            .into_iter()
            .filter_map(normalize_page)
            .collect();

        let store = Self {
            posts: Arc::new(posts),
            products: Arc::new(read_collection(&content_dir.join("products.json"))),
            authors: Arc::new(read_collection(&content_dir.join("authors.json"))),
            categories: Arc::new(read_collection(&content_dir.join("categories.json"))),
            pages: Arc::new(pages),
        };

        tracing::info!(
            posts = store.posts.len(),
            products = store.products.len(),
            pages = store.pages.len(),
            "Loaded content"
        );

        Ok(store)
    }

    /// All posts, newest first.
    #[must_use]
    pub fn all_posts(&self) -> &[Post] {
        &self.posts
    }

    #[must_use]
    pub fn post_by_slug(&self, slug: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.slug == slug)
    }

    /// Posts with a category equal to or containing `category`, ignoring case.
    pub fn posts_by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Post> {
        self.posts.iter().filter(move |p| p.in_category(category))
    }

    /// The `limit` most recent posts.
    #[must_use]
    pub fn featured_posts(&self, limit: usize) -> &[Post] {
        self.posts.get(..limit).unwrap_or(self.posts.as_slice())
    }

    /// Neighbours of `slug` in date order. Unknown slugs have none.
    #[must_use]
    pub fn adjacent_posts(&self, slug: &str) -> AdjacentPosts<'_> {
        let Some(index) = self.posts.iter().position(|p| p.slug == slug) else {
            return AdjacentPosts::default();
        };
        AdjacentPosts {
            prev: self.posts.get(index + 1),
            next: index.checked_sub(1).and_then(|i| self.posts.get(i)),
        }
    }

    /// Posts sharing a category with `slug`, topped up with recent posts.
    ///
    /// An unknown slug yields the `limit` most recent posts.
    #[must_use]
    pub fn related_posts(&self, slug: &str, limit: usize) -> Vec<&Post> {
        let Some(current) = self.post_by_slug(slug) else {
            return self.featured_posts(limit).iter().collect();
        };

        let others = self.posts.iter().filter(|p| p.slug != slug);
        let mut related: Vec<&Post> = others
            .clone()
            .filter(|p| p.categories.iter().any(|c| current.categories.contains(c)))
            .take(limit)
            .collect();

        if related.len() < limit {
            let taken: HashSet<&str> = related.iter().map(|p| p.slug.as_str()).collect();
            let fill: Vec<&Post> = others
                .filter(|p| !taken.contains(p.slug.as_str()))
                .take(limit - related.len())
                .collect();
            related.extend(fill);
        }

        related
    }

    #[must_use]
    pub fn all_products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub fn product_by_slug(&self, slug: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.slug == slug)
    }

    /// Products whose type contains `category`, ignoring case.
    pub fn products_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a Product> {
        let needle = category.to_lowercase();
        self.products
            .iter()
            .filter(move |p| p.product_type.to_lowercase().contains(&needle))
    }

    #[must_use]
    pub fn authors(&self) -> &[Author] {
        &self.authors
    }

    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    #[must_use]
    pub fn page_by_slug(&self, slug: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.slug == slug)
    }
}

/// Read a JSON array file, logging and returning nothing on failure.
fn read_collection<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    if !path.exists() {
        tracing::warn!("Content file does not exist: {:?}", path);
        return Vec::new();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| ContentError::Io(e.to_string()))
        .and_then(|raw| {
            serde_json::from_str::<Vec<serde_json::Value>>(&raw)
                .map_err(|e| ContentError::Parse(e.to_string()))
        });

    let rows = match parsed {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!("Failed to load {:?}: {}", path, e);
            return Vec::new();
        }
    };

    // A malformed row is skipped on its own; the rest of the file still loads.
    let total = rows.len();
    let items: Vec<T> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(file = ?path, index, error = %e, "Skipping malformed content row");
                None
            }
        })
        .collect();
    if items.len() < total {
        tracing::warn!(file = ?path, skipped = total - items.len(), "Some content rows were skipped");
    }
    items
}

// =============================================================================
// Headings
// =============================================================================

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<h([2-4])([^>]*)>([^<]*)</h([2-4])>").expect("Invalid regex")
});

static ID_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bid="([^"]*)""#).expect("Invalid regex"));

/// List the `h2`..`h4` headings of a post body.
///
/// Headings with an `id` attribute keep it; others get a slug of their text.
/// Empty headings are skipped.
#[must_use]
pub fn extract_table_of_contents(html: &str) -> Vec<TocEntry> {
    HEADING_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let level = caps.get(1)?.as_str().parse().ok()?;
            let attrs = caps.get(2).map_or("", |m| m.as_str());
            let title = plain_text(caps.get(3)?.as_str());
            if title.is_empty() {
                return None;
            }
            let id = ID_ATTR_RE
                .captures(attrs)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| slugify(&title));
            Some(TocEntry { id, title, level })
        })
        .collect()
}

/// Add slug ids to `h2`..`h4` headings that have none, so TOC links resolve.
#[must_use]
pub fn add_heading_ids(html: &str) -> String {
    HEADING_RE
        .replace_all(html, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let attrs = caps.get(2).map_or("", |m| m.as_str());
            if ID_ATTR_RE.is_match(attrs) {
                return whole.to_string();
            }
            let level = caps.get(1).map_or("", |m| m.as_str());
            let title = caps.get(3).map_or("", |m| m.as_str());
            let close = caps.get(4).map_or("", |m| m.as_str());
            let id = slugify(&plain_text(title));
            format!(r#"<h{level}{attrs} id="{id}">{title}</h{close}>"#)
        })
        .into_owned()
}

/// Errors that can occur when loading content
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}
