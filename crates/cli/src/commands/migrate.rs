//! Copy the WordPress export into Supabase tables.
//!
//! # Usage
//!
//! ```bash
//! ps-cli migrate posts --dry-run
//! ps-cli migrate pages --limit 10
//! ps-cli migrate products
//! ps-cli migrate comments --batch-size 100
//! ```
//!
//! Rows are upserted on their natural key (`slug`, or `legacy_comment_id`
//! for comments), so every migration can be re-run after the export changes.
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` (or `VITE_SUPABASE_URL`) - Project URL
//! - `SUPABASE_SERVICE_ROLE_KEY` - Service role key

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use periospot_core::seo::{SeoFields, map_yoast_meta};
use periospot_core::text::{Language, normalize_date, reading_time_minutes};
use periospot_core::{CommentStatus, PostStatus};
use periospot_site::services::SupabaseClient;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{BatchOptions, CommandError, apply_limit, read_json, upsert_batches};

const POSTS_PAGE_SIZE: usize = 1000;

/// Namespace for comment ids derived from WordPress comment ids.
const COMMENT_NAMESPACE: Uuid = Uuid::from_u128(0x5f0e_7c3a_8d41_4b6e_9a20_3c71_d2e4_f801);

/// An integer that the export may hold as a number or a numeric string.
fn legacy_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A decimal that the export may hold as a number or a numeric string.
fn legacy_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// String arrays that may be missing, `null`, or hold non-string junk.
fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

// =============================================================================
// Posts
// =============================================================================

/// A post as exported from WordPress.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LegacyPost {
    pub id: Value,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub featured_image: Option<String>,
    pub author: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub categories: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub status: Option<String>,
    pub date: Option<String>,
}

/// A row of the `posts` table.
#[derive(Debug, Serialize)]
pub struct PostRow {
    pub wordpress_id: Option<i64>,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub featured_image_url: Option<String>,
    pub author_name: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub language: String,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub reading_time_minutes: u32,
    pub updated_at: DateTime<Utc>,
}

impl PostRow {
    /// Convert an exported post. Posts without a slug are dropped.
    #[must_use]
    pub fn from_legacy(post: LegacyPost, now: DateTime<Utc>) -> Option<Self> {
        let slug = non_empty(post.slug)?;
        let title = non_empty(post.title).unwrap_or_else(|| "Untitled".to_string());
        let excerpt = post.excerpt.unwrap_or_default();
        let content = post.content.unwrap_or_default();

        let language = non_empty(post.language).unwrap_or_else(|| {
            let haystack = format!(
                "{} {} {slug} {title}",
                post.categories.join(" "),
                post.tags.join(" ")
            );
            Language::detect(&haystack).code().to_string()
        });
        let reading_source = if excerpt.is_empty() { &content } else { &excerpt };

        Some(Self {
            wordpress_id: legacy_int(&post.id),
            reading_time_minutes: reading_time_minutes(reading_source),
            featured_image_url: non_empty(post.featured_image),
            author_name: non_empty(post.author),
            status: PostStatus::normalize_legacy(post.status.as_deref()),
            published_at: post.date.as_deref().and_then(normalize_date),
            categories: post.categories,
            tags: post.tags,
            language,
            slug,
            title,
            excerpt,
            content,
            updated_at: now,
        })
    }
}

/// Migrate `posts.json` into the `posts` table.
///
/// # Errors
///
/// Returns error if the export cannot be read or any batch is rejected.
pub async fn posts(
    supabase: &SupabaseClient,
    input: &Path,
    options: &BatchOptions,
) -> Result<usize, CommandError> {
    let legacy: Vec<LegacyPost> = read_json(input)?;
    let now = Utc::now();
    let rows: Vec<PostRow> = legacy
        .into_iter()
        .filter_map(|post| PostRow::from_legacy(post, now))
        .collect();
    let rows = apply_limit(rows, options.limit);
    upsert_batches(supabase, "posts", "slug", &rows, options).await
}

// =============================================================================
// Pages
// =============================================================================

/// A page as exported from WordPress.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LegacyPage {
    pub id: Value,
    pub post_name: Option<String>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub post_status: Option<String>,
    pub seo: Option<SeoFields>,
    pub meta: HashMap<String, Value>,
}

impl LegacyPage {
    /// Saved SEO, or the Yoast post meta when none was saved.
    #[must_use]
    pub fn effective_seo(&self) -> SeoFields {
        self.seo
            .clone()
            .unwrap_or_else(|| map_yoast_meta(&self.meta))
    }
}

/// A row of the `pages` table.
#[derive(Debug, Serialize)]
pub struct PageRow {
    pub wordpress_id: Option<i64>,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub og_image_url: Option<String>,
    pub seo: Option<SeoFields>,
    pub status: PostStatus,
    pub updated_at: DateTime<Utc>,
}

impl PageRow {
    /// Convert an exported page. Pages without a slug are dropped.
    #[must_use]
    pub fn from_legacy(page: LegacyPage, now: DateTime<Utc>) -> Option<Self> {
        let seo = page.effective_seo();
        let slug = non_empty(page.post_name).or_else(|| non_empty(page.slug))?;

        Some(Self {
            wordpress_id: legacy_int(&page.id),
            slug,
            title: non_empty(page.title).unwrap_or_else(|| "Untitled".to_string()),
            content: page.content.unwrap_or_default(),
            meta_title: non_empty(seo.title.clone()),
            meta_description: non_empty(seo.description.clone()),
            og_image_url: non_empty(seo.og_image.clone()),
            status: PostStatus::normalize_legacy(page.post_status.as_deref()),
            seo: seo.has_any().then_some(seo),
            updated_at: now,
        })
    }
}

/// Migrate `pages.json` into the `pages` table.
///
/// # Errors
///
/// Returns error if the export cannot be read or any batch is rejected.
pub async fn pages(
    supabase: &SupabaseClient,
    input: &Path,
    options: &BatchOptions,
) -> Result<usize, CommandError> {
    let legacy: Vec<LegacyPage> = read_json(input)?;
    let now = Utc::now();
    let rows: Vec<PageRow> = legacy
        .into_iter()
        .filter_map(|page| PageRow::from_legacy(page, now))
        .collect();
    let rows = apply_limit(rows, options.limit);
    upsert_batches(supabase, "pages", "slug", &rows, options).await
}

// =============================================================================
// Products
// =============================================================================

/// A product as exported from WooCommerce.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LegacyProduct {
    pub id: Value,
    pub woocommerce_id: Value,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub price: Value,
    pub sale_price: Value,
    pub currency: Option<String>,
    pub product_type: Option<String>,
    pub is_digital: Option<bool>,
    pub featured_image_url: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub gallery_images: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub categories: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub tags: Vec<String>,
    pub stock_status: Option<String>,
    pub stock_quantity: Option<i64>,
    pub seo: Option<SeoFields>,
    pub link: Option<String>,
    pub checkout_url: Option<String>,
}

/// A row of the `products` table.
#[derive(Debug, Serialize)]
pub struct ProductRow {
    pub woocommerce_id: Option<i64>,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub short_description: Option<String>,
    pub price: f64,
    pub sale_price: Option<f64>,
    pub currency: String,
    pub product_type: String,
    pub is_digital: bool,
    pub featured_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub stock_status: String,
    pub stock_quantity: Option<i64>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub seo: Option<SeoFields>,
    pub woocommerce_url: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    /// Convert an exported product. Products without a slug are dropped.
    #[must_use]
    pub fn from_legacy(product: LegacyProduct, now: DateTime<Utc>) -> Option<Self> {
        let slug = non_empty(product.slug)?;
        let product_type = non_empty(product.product_type).unwrap_or_else(|| "simple".to_string());
        let seo = product.seo.filter(SeoFields::has_any);

        Some(Self {
            woocommerce_id: legacy_int(&product.woocommerce_id)
                .filter(|id| *id != 0)
                .or_else(|| legacy_int(&product.id)),
            slug,
            name: non_empty(product.title).unwrap_or_else(|| "Untitled".to_string()),
            description: product.description.unwrap_or_default(),
            short_description: non_empty(product.short_description),
            price: legacy_number(&product.price).unwrap_or(0.0),
            sale_price: legacy_number(&product.sale_price),
            currency: non_empty(product.currency).unwrap_or_else(|| "EUR".to_string()),
            is_digital: product.is_digital.unwrap_or(false) || product_type == "downloadable",
            product_type,
            featured_image_url: non_empty(product.featured_image_url),
            gallery_image_urls: product.gallery_images,
            categories: product.categories,
            tags: product.tags,
            stock_status: non_empty(product.stock_status).unwrap_or_else(|| "instock".to_string()),
            stock_quantity: product.stock_quantity.filter(|q| *q != 0),
            meta_title: seo.as_ref().and_then(|s| non_empty(s.title.clone())),
            meta_description: seo.as_ref().and_then(|s| non_empty(s.description.clone())),
            seo,
            woocommerce_url: non_empty(product.link).or_else(|| non_empty(product.checkout_url)),
            last_synced_at: now,
            updated_at: now,
        })
    }
}

/// Migrate `products.json` into the `products` table.
///
/// # Errors
///
/// Returns error if the export cannot be read or any batch is rejected.
pub async fn products(
    supabase: &SupabaseClient,
    input: &Path,
    options: &BatchOptions,
) -> Result<usize, CommandError> {
    let legacy: Vec<LegacyProduct> = read_json(input)?;
    let now = Utc::now();
    let rows: Vec<ProductRow> = legacy
        .into_iter()
        .filter_map(|product| ProductRow::from_legacy(product, now))
        .collect();
    let rows = apply_limit(rows, options.limit);
    upsert_batches(supabase, "products", "slug", &rows, options).await
}

// =============================================================================
// Comments
// =============================================================================

/// A comment as exported from WordPress.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LegacyComment {
    pub legacy_comment_id: Value,
    pub wordpress_post_id: Value,
    pub parent_legacy_id: Value,
    pub post_slug: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_url: Option<String>,
    pub content: Option<String>,
    pub status: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub approved_at: Option<String>,
    pub created_at: Option<String>,
}

/// The columns of an already-migrated post that comments attach to.
#[derive(Debug, Clone, Deserialize)]
pub struct PostRef {
    pub id: Value,
    #[serde(default)]
    pub wordpress_id: Option<i64>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Migrated posts indexed by WordPress id and by slug.
#[derive(Debug, Default)]
pub struct PostLookup {
    by_wordpress_id: HashMap<i64, PostRef>,
    by_slug: HashMap<String, PostRef>,
}

impl PostLookup {
    #[must_use]
    pub fn new(posts: Vec<PostRef>) -> Self {
        let mut lookup = Self::default();
        for post in posts {
            if let Some(id) = post.wordpress_id {
                lookup.by_wordpress_id.insert(id, post.clone());
            }
            if let Some(slug) = post.slug.clone() {
                lookup.by_slug.insert(slug, post);
            }
        }
        lookup
    }

    fn find(&self, wordpress_id: Option<i64>, slug: Option<&str>) -> Option<&PostRef> {
        wordpress_id
            .and_then(|id| self.by_wordpress_id.get(&id))
            .or_else(|| slug.and_then(|s| self.by_slug.get(s)))
    }
}

/// A row of the `comments` table.
#[derive(Debug, Serialize)]
pub struct CommentRow {
    pub id: Uuid,
    pub post_id: Value,
    pub post_slug: Option<String>,
    pub wordpress_post_id: Option<i64>,
    pub parent_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_url: Option<String>,
    pub content: String,
    pub status: CommentStatus,
    pub is_legacy: bool,
    pub legacy_comment_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stable row id for a WordPress comment, so re-runs keep reply threading.
#[must_use]
pub fn comment_uuid(legacy_id: i64) -> Uuid {
    Uuid::new_v5(&COMMENT_NAMESPACE, legacy_id.to_string().as_bytes())
}

/// Converted comments plus the legacy ids whose post could not be found.
#[derive(Debug, Default)]
pub struct CommentConversion {
    pub rows: Vec<CommentRow>,
    pub skipped: Vec<Option<i64>>,
}

/// Attach exported comments to migrated posts.
///
/// A parent is linked only when the parent comment is part of the same
/// export.
#[must_use]
pub fn convert_comments(
    comments: Vec<LegacyComment>,
    posts: &PostLookup,
    now: DateTime<Utc>,
) -> CommentConversion {
    let known: HashSet<i64> = comments
        .iter()
        .filter_map(|c| legacy_int(&c.legacy_comment_id))
        .collect();

    let mut conversion = CommentConversion::default();
    for comment in comments {
        let legacy_id = legacy_int(&comment.legacy_comment_id);
        let wordpress_post_id = legacy_int(&comment.wordpress_post_id);
        let Some(post) = posts.find(wordpress_post_id, comment.post_slug.as_deref()) else {
            conversion.skipped.push(legacy_id);
            continue;
        };

        let parent_id = legacy_int(&comment.parent_legacy_id)
            .filter(|parent| known.contains(parent))
            .map(comment_uuid);

        conversion.rows.push(CommentRow {
            id: legacy_id.map_or_else(Uuid::new_v4, comment_uuid),
            post_id: post.id.clone(),
            post_slug: non_empty(comment.post_slug).or_else(|| post.slug.clone()),
            wordpress_post_id,
            parent_id,
            author_name: non_empty(comment.author_name),
            author_email: non_empty(comment.author_email),
            author_url: non_empty(comment.author_url),
            content: comment.content.unwrap_or_default(),
            status: CommentStatus::from_legacy(comment.status.as_deref()),
            is_legacy: true,
            legacy_comment_id: legacy_id,
            ip_address: non_empty(comment.ip_address),
            user_agent: non_empty(comment.user_agent),
            approved_at: comment.approved_at.as_deref().and_then(normalize_date),
            created_at: comment
                .created_at
                .as_deref()
                .and_then(normalize_date)
                .unwrap_or(now),
            updated_at: now,
        });
    }
    conversion
}

/// Every migrated post's id, WordPress id, and slug.
async fn fetch_post_refs(supabase: &SupabaseClient) -> Result<Vec<PostRef>, CommandError> {
    let mut posts = Vec::new();
    let mut offset = 0;
    loop {
        let page: Vec<PostRef> = supabase
            .table("posts")
            .select("id,wordpress_id,slug")
            .order("id", true)
            .limit(POSTS_PAGE_SIZE)
            .offset(offset)
            .fetch()
            .await?;
        let done = page.len() < POSTS_PAGE_SIZE;
        posts.extend(page);
        if done {
            return Ok(posts);
        }
        offset += POSTS_PAGE_SIZE;
    }
}

/// Migrate `comments.json` into the `comments` table.
///
/// Posts must be migrated first; comments whose post is missing are
/// skipped and logged.
///
/// # Errors
///
/// Returns error if the export or the posts cannot be read, or any batch is
/// rejected.
pub async fn comments(
    supabase: &SupabaseClient,
    input: &Path,
    options: &BatchOptions,
) -> Result<usize, CommandError> {
    let legacy: Vec<LegacyComment> = read_json(input)?;
    let posts = PostLookup::new(fetch_post_refs(supabase).await?);

    let conversion = convert_comments(legacy, &posts, Utc::now());
    if !conversion.skipped.is_empty() {
        tracing::warn!(
            skipped = conversion.skipped.len(),
            "Comments skipped because their post is not migrated"
        );
    }

    let rows = apply_limit(conversion.rows, options.limit);
    upsert_batches(supabase, "comments", "legacy_comment_id", &rows, options).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::commands::test_support;

    fn now() -> DateTime<Utc> {
        normalize_date("2026-01-05T12:00:00Z").unwrap()
    }

    fn options() -> BatchOptions {
        BatchOptions {
            batch_size: 25,
            limit: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_post_row_defaults_and_language() {
        let post: LegacyPost = serde_json::from_value(json!({
            "id": "512",
            "slug": "guia-implantes",
            "categories": ["Español", 7],
            "status": "pending",
            "date": "2019-04-02 10:11:12",
            "content": "<p>word</p>"
        }))
        .unwrap();
        let row = PostRow::from_legacy(post, now()).unwrap();
        assert_eq!(row.wordpress_id, Some(512));
        assert_eq!(row.title, "Untitled");
        assert_eq!(row.language, "es");
        assert_eq!(row.categories, vec!["Español"]);
        assert_eq!(row.status, PostStatus::Draft);
        assert_eq!(row.published_at, normalize_date("2019-04-02T10:11:12Z"));
        assert_eq!(row.reading_time_minutes, 3);
        assert!(row.featured_image_url.is_none());
    }

    #[test]
    fn test_post_row_keeps_explicit_language() {
        let post: LegacyPost = serde_json::from_value(json!({
            "slug": "spanish-named", "title": "Spanish", "language": "en"
        }))
        .unwrap();
        assert_eq!(PostRow::from_legacy(post, now()).unwrap().language, "en");
    }

    #[test]
    fn test_posts_without_slug_are_dropped() {
        let post: LegacyPost = serde_json::from_value(json!({"title": "Orphan"})).unwrap();
        assert!(PostRow::from_legacy(post, now()).is_none());
    }

    #[test]
    fn test_page_row_reads_yoast_meta() {
        let page: LegacyPage = serde_json::from_value(json!({
            "id": 9,
            "post_name": "about",
            "title": "About",
            "post_status": "publish",
            "meta": {
                "_yoast_wpseo_title": "About Periospot",
                "_yoast_wpseo_metadesc": "Who we are",
                "_yoast_wpseo_opengraph-image": "https://periospot.com/og.jpg"
            }
        }))
        .unwrap();
        let row = PageRow::from_legacy(page, now()).unwrap();
        assert_eq!(row.slug, "about");
        assert_eq!(row.meta_title.as_deref(), Some("About Periospot"));
        assert_eq!(row.meta_description.as_deref(), Some("Who we are"));
        assert_eq!(row.og_image_url.as_deref(), Some("https://periospot.com/og.jpg"));
        assert!(row.seo.is_some());
        assert_eq!(row.status, PostStatus::Published);
    }

    #[test]
    fn test_page_row_without_seo_stores_null() {
        let page: LegacyPage =
            serde_json::from_value(json!({"slug": "contact", "title": "Contact"})).unwrap();
        let row = PageRow::from_legacy(page, now()).unwrap();
        assert!(row.seo.is_none());
        assert!(row.meta_title.is_none());
    }

    #[test]
    fn test_product_row_mapping() {
        let product: LegacyProduct = serde_json::from_value(json!({
            "id": 77,
            "slug": "perio-ebook",
            "title": "Perio eBook",
            "price": "19.90",
            "sale_price": null,
            "product_type": "downloadable",
            "gallery_images": ["https://periospot.com/a.jpg"],
            "checkout_url": "https://periospot.com/checkout/?add-to-cart=77"
        }))
        .unwrap();
        let row = ProductRow::from_legacy(product, now()).unwrap();
        assert_eq!(row.woocommerce_id, Some(77));
        assert_eq!(row.name, "Perio eBook");
        assert!((row.price - 19.9).abs() < f64::EPSILON);
        assert!(row.sale_price.is_none());
        assert!(row.is_digital);
        assert_eq!(row.currency, "EUR");
        assert_eq!(row.stock_status, "instock");
        assert_eq!(row.gallery_image_urls.len(), 1);
        assert_eq!(
            row.woocommerce_url.as_deref(),
            Some("https://periospot.com/checkout/?add-to-cart=77")
        );
    }

    fn lookup() -> PostLookup {
        PostLookup::new(vec![
            PostRef {
                id: json!("post-uuid-1"),
                wordpress_id: Some(100),
                slug: Some("bone-grafts".to_string()),
            },
            PostRef {
                id: json!("post-uuid-2"),
                wordpress_id: None,
                slug: Some("implants".to_string()),
            },
        ])
    }

    #[test]
    fn test_convert_comments_links_posts_and_parents() {
        let comments: Vec<LegacyComment> = serde_json::from_value(json!([
            {"legacy_comment_id": "1", "wordpress_post_id": "100", "status": "approved",
             "content": "Great", "created_at": "2018-01-01 08:00:00"},
            {"legacy_comment_id": 2, "parent_legacy_id": "1", "post_slug": "implants",
             "status": "spam"},
            {"legacy_comment_id": 3, "parent_legacy_id": 999, "wordpress_post_id": 100},
            {"legacy_comment_id": 4, "wordpress_post_id": 555, "post_slug": "missing"}
        ]))
        .unwrap();

        let conversion = convert_comments(comments, &lookup(), now());
        assert_eq!(conversion.rows.len(), 3);
        assert_eq!(conversion.skipped, vec![Some(4)]);

        let first = &conversion.rows[0];
        assert_eq!(first.id, comment_uuid(1));
        assert_eq!(first.post_id, json!("post-uuid-1"));
        assert_eq!(first.post_slug.as_deref(), Some("bone-grafts"));
        assert_eq!(first.status, CommentStatus::Approved);
        assert_eq!(first.created_at, normalize_date("2018-01-01T08:00:00Z").unwrap());

        let reply = &conversion.rows[1];
        assert_eq!(reply.parent_id, Some(comment_uuid(1)));
        assert_eq!(reply.post_id, json!("post-uuid-2"));
        assert_eq!(reply.status, CommentStatus::Spam);
        assert_eq!(reply.created_at, now());

        assert!(conversion.rows[2].parent_id.is_none());
    }

    #[test]
    fn test_comment_uuid_is_stable() {
        assert_eq!(comment_uuid(42), comment_uuid(42));
        assert_ne!(comment_uuid(42), comment_uuid(43));
    }

    #[tokio::test]
    async fn test_migrate_comments_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/posts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "post-uuid-1", "wordpress_id": 100, "slug": "bone-grafts"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/comments"))
            .and(query_param("on_conflict", "legacy_comment_id"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("comments.json");
        std::fs::write(
            &input,
            json!([
                {"legacy_comment_id": 1, "wordpress_post_id": 100},
                {"legacy_comment_id": 2, "post_slug": "gone"}
            ])
            .to_string(),
        )
        .unwrap();

        let client = test_support::supabase(&server.uri());
        let written = comments(&client, &input, &options()).await.unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_migrate_posts_respects_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/posts"))
            .and(query_param("on_conflict", "slug"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("posts.json");
        std::fs::write(
            &input,
            json!([{"slug": "a"}, {"title": "no slug"}, {"slug": "b"}, {"slug": "c"}]).to_string(),
        )
        .unwrap();

        let client = test_support::supabase(&server.uri());
        let options = BatchOptions {
            limit: Some(2),
            ..options()
        };
        assert_eq!(posts(&client, &input, &options).await.unwrap(), 2);
    }
}
