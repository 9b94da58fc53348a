//! Search over the loaded posts and shop products.

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::content::{ContentStore, Post, Product};
use crate::state::AppState;

/// Cap on hits per kind.
const MAX_HITS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Posts,
    Products,
    #[default]
    All,
}

impl SearchKind {
    const fn includes_posts(self) -> bool {
        matches!(self, Self::Posts | Self::All)
    }

    const fn includes_products(self) -> bool {
        matches!(self, Self::Products | Self::All)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default, rename = "type")]
    pub kind: SearchKind,
}

/// One search result.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchHit<'a> {
    Post {
        id: &'a str,
        title: &'a str,
        slug: &'a str,
        excerpt: &'a str,
        date: &'a str,
        author: &'a str,
        categories: &'a [String],
        featured_image: &'a str,
    },
    Product {
        id: &'a str,
        title: &'a str,
        slug: &'a str,
        excerpt: &'a str,
        price: f64,
        categories: [&'a str; 1],
        featured_image: &'a str,
    },
}

impl<'a> From<&'a Post> for SearchHit<'a> {
    fn from(post: &'a Post) -> Self {
        Self::Post {
            id: &post.id,
            title: &post.title,
            slug: &post.slug,
            excerpt: &post.excerpt,
            date: &post.date,
            author: &post.author,
            categories: &post.categories,
            featured_image: &post.featured_image,
        }
    }
}

impl<'a> From<&'a Product> for SearchHit<'a> {
    fn from(product: &'a Product) -> Self {
        Self::Product {
            id: &product.id,
            title: &product.title,
            slug: &product.slug,
            excerpt: &product.description,
            price: product.sale_price.unwrap_or(product.price),
            categories: [&product.product_type],
            featured_image: &product.featured_image_url,
        }
    }
}

fn post_matches(post: &Post, needle: &str) -> bool {
    [post.title.as_str(), post.excerpt.as_str(), post.content.as_str()]
        .into_iter()
        .chain(post.categories.iter().map(String::as_str))
        .any(|field| field.to_lowercase().contains(needle))
}

fn product_matches(product: &Product, needle: &str) -> bool {
    [
        product.title.as_str(),
        product.description.as_str(),
        product.product_type.as_str(),
    ]
    .into_iter()
    .any(|field| field.to_lowercase().contains(needle))
}

/// Case-insensitive substring search. Posts come before products.
#[must_use]
pub fn search_content<'a>(
    content: &'a ContentStore,
    query: &str,
    kind: SearchKind,
) -> Vec<SearchHit<'a>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits = Vec::new();
    if kind.includes_posts() {
        hits.extend(
            content
                .all_posts()
                .iter()
                .filter(|post| post_matches(post, &needle))
                .take(MAX_HITS)
                .map(SearchHit::from),
        );
    }
    if kind.includes_products() {
        hits.extend(
            content
                .all_products()
                .iter()
                .filter(|product| product_matches(product, &needle))
                .take(MAX_HITS)
                .map(SearchHit::from),
        );
    }
    hits
}

/// GET /api/search?q=&type=
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    Json(search_content(state.content(), &query.q, query.kind)).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{fixture_state, get};

    #[tokio::test]
    async fn test_empty_query_returns_empty_array() {
        let (_dir, state) = fixture_state("http://127.0.0.1:9");
        let (status, body) = get(&state, "/api/search?q=").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_matches_posts_and_products_case_insensitively() {
        let (_dir, state) = fixture_state("http://127.0.0.1:9");

        let (_, body) = get(&state, "/api/search?q=IMPLANT").await;
        let hits = body.as_array().unwrap();
        let kinds: Vec<&str> = hits.iter().map(|h| h["type"].as_str().unwrap()).collect();
        assert!(kinds.contains(&"post"));
        assert!(kinds.contains(&"product"));
        let atlas = hits.iter().find(|h| h["slug"] == "implant-atlas").unwrap();
        assert_eq!(atlas["categories"], json!(["Ebook"]));
    }

    #[tokio::test]
    async fn test_type_filter_and_sale_price() {
        let (_dir, state) = fixture_state("http://127.0.0.1:9");

        let (_, body) = get(&state, "/api/search?q=suture&type=products").await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["price"], 9.99);

        let (_, body) = get(&state, "/api/search?q=suture&type=posts").await;
        assert_eq!(body, json!([]));
    }
}
