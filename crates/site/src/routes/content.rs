//! JSON endpoints over the WordPress content export, plus robots and sitemap.

use askama::Template;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use periospot_core::seo::{AuditInput, SeoAudit, audit};
use periospot_core::text::normalize_date;

use crate::content::{
    AdjacentPosts, Author, Category, Post, Product, TocEntry, add_heading_ids,
    extract_table_of_contents,
};
use crate::error::{AppError, Result};
use crate::state::AppState;

const RELATED_POSTS: usize = 3;

/// Blog categories that get their own sitemap entry.
const SITEMAP_CATEGORIES: &[&str] = &[
    "implantology",
    "periodontics",
    "aesthetics",
    "blog-english",
    "blog-espanol",
    "blog-portugues",
];

#[derive(Debug, Deserialize)]
pub struct PostsQuery {
    pub category: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct PostsResponse<'a> {
    pub posts: Vec<&'a Post>,
    pub total: usize,
}

/// A single post with everything the article page needs.
#[derive(Serialize)]
pub struct PostDetail<'a> {
    pub post: Post,
    pub toc: Vec<TocEntry>,
    pub adjacent: AdjacentPosts<'a>,
    pub related: Vec<&'a Post>,
}

/// List posts, newest first.
///
/// GET /api/content/posts?category=&limit=
#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostsQuery>,
) -> impl IntoResponse {
    let content = state.content();
    let mut posts: Vec<&Post> = match query.category.as_deref().filter(|c| !c.is_empty()) {
        Some(category) => content.posts_by_category(category).collect(),
        None => content.all_posts().iter().collect(),
    };
    let total = posts.len();
    if let Some(limit) = query.limit {
        posts.truncate(limit);
    }

    Json(PostsResponse { posts, total }).into_response()
}

/// A post with its table of contents, neighbours and related posts.
///
/// GET /api/content/posts/{slug}
#[instrument(skip(state))]
pub async fn show_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let content = state.content();
    let post = content
        .post_by_slug(&slug)
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let toc = extract_table_of_contents(&post.content);
    let mut post = post.clone();
    post.content = add_heading_ids(&post.content);

    let detail = PostDetail {
        post,
        toc,
        adjacent: content.adjacent_posts(&slug),
        related: content.related_posts(&slug, RELATED_POSTS),
    };
    Ok(Json(detail).into_response())
}

/// Editorial SEO audit of one post.
///
/// GET /api/content/posts/{slug}/seo
#[instrument(skip(state))]
pub async fn post_seo(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<SeoAudit>> {
    let post = state
        .content()
        .post_by_slug(&slug)
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    let seo = post.seo.as_ref();

    let input = AuditInput {
        title: &post.title,
        meta_title: seo.and_then(|s| s.title.as_deref()),
        meta_description: seo.and_then(|s| s.description.as_deref()),
        focus_keyword: seo.and_then(|s| s.focus_keyword.as_deref()),
        featured_image_url: Some(post.featured_image.as_str()),
        excerpt: Some(post.excerpt.as_str()),
        content: &post.content,
        slug: &post.slug,
    };
    Ok(Json(audit(&input)))
}

#[derive(Serialize)]
pub struct ProductsResponse<'a> {
    pub products: Vec<&'a Product>,
}

/// GET /api/content/products?category=
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> impl IntoResponse {
    let content = state.content();
    let products = match query.category.as_deref().filter(|c| !c.is_empty()) {
        Some(category) => content.products_by_category(category).collect(),
        None => content.all_products().iter().collect(),
    };
    Json(ProductsResponse { products }).into_response()
}

/// GET /api/content/products/{slug}
#[instrument(skip(state))]
pub async fn show_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let product = state
        .content()
        .product_by_slug(&slug)
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
    Ok(Json(serde_json::json!({ "product": product })))
}

#[derive(Serialize)]
pub struct CategoriesResponse<'a> {
    pub categories: &'a [Category],
}

/// GET /api/content/categories
pub async fn list_categories(State(state): State<AppState>) -> impl IntoResponse {
    Json(CategoriesResponse {
        categories: state.content().categories(),
    })
    .into_response()
}

#[derive(Serialize)]
pub struct AuthorsResponse<'a> {
    pub authors: &'a [Author],
}

/// GET /api/content/authors
pub async fn list_authors(State(state): State<AppState>) -> impl IntoResponse {
    Json(AuthorsResponse {
        authors: state.content().authors(),
    })
    .into_response()
}

// =============================================================================
// Crawlers
// =============================================================================

#[derive(Template)]
#[template(path = "robots.txt")]
struct RobotsTxt<'a> {
    base_url: &'a str,
    disallow: &'a [&'a str],
    googlebot_disallow: &'a [&'a str],
}

/// GET /robots.txt
pub async fn robots(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let body = RobotsTxt {
        base_url: &state.config().base_url,
        disallow: &[
            "/api/",
            "/auth/",
            "/dashboard/",
            "/cart/",
            "/checkout/",
            "/search/",
            "/_next/",
            "/private/",
        ],
        googlebot_disallow: &[
            "/api/",
            "/auth/",
            "/dashboard/",
            "/cart/",
            "/checkout/",
            "/search/",
        ],
    }
    .render()?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

struct SitemapEntry {
    loc: String,
    lastmod: String,
    changefreq: &'static str,
    priority: &'static str,
}

#[derive(Template)]
#[template(path = "sitemap.xml")]
struct SitemapXml {
    entries: Vec<SitemapEntry>,
}

/// Static pages, published posts, shop products and blog categories.
///
/// GET /sitemap.xml
#[instrument(skip(state))]
pub async fn sitemap(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let base = state.config().base_url.trim_end_matches('/');
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let entry = |path: &str, lastmod: &str, changefreq, priority| SitemapEntry {
        loc: format!("{base}{path}"),
        lastmod: lastmod.to_string(),
        changefreq,
        priority,
    };

    let mut entries = vec![
        entry("", &today, "weekly", "1.0"),
        entry("/blog", &today, "daily", "0.9"),
        entry("/blog/es", &today, "daily", "0.8"),
        entry("/blog/pt", &today, "daily", "0.8"),
        entry("/blog/zh", &today, "daily", "0.8"),
        entry("/tienda", &today, "weekly", "0.9"),
        entry("/library", &today, "weekly", "0.8"),
        entry("/assessments", &today, "weekly", "0.8"),
        entry("/about", &today, "monthly", "0.7"),
        entry("/team", &today, "monthly", "0.6"),
    ];

    let content = state.content();
    entries.extend(
        content
            .all_posts()
            .iter()
            .filter(|post| post.status == "publish")
            .map(|post| {
                let lastmod = normalize_date(&post.modified)
                    .or_else(|| post.published_at())
                    .map_or_else(|| today.clone(), |d| d.format("%Y-%m-%d").to_string());
                entry(&format!("/blog/{}", post.slug), &lastmod, "monthly", "0.8")
            }),
    );
    entries.extend(
        content
            .all_products()
            .iter()
            .map(|product| entry(&format!("/tienda/{}", product.slug), &today, "weekly", "0.7")),
    );
    entries.extend(
        SITEMAP_CATEGORIES
            .iter()
            .map(|category| entry(&format!("/blog/category/{category}"), &today, "weekly", "0.7")),
    );

    let body = SitemapXml { entries }.render()?;
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], body))
}
