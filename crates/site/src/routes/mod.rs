//! HTTP route handlers for the site.
//!
//! # Route Structure
//!
//! ```text
//! GET  /robots.txt                          - Crawler rules
//! GET  /sitemap.xml                         - Posts, products, and static pages
//!
//! # Content (WordPress export)
//! GET  /api/content/posts                   - Posts (?category=, ?limit=)
//! GET  /api/content/posts/{slug}            - Post + toc + adjacent + related
//! GET  /api/content/posts/{slug}/seo        - Editorial SEO audit
//! GET  /api/content/products                - Shop products (?category=)
//! GET  /api/content/products/{slug}         - Shop product
//! GET  /api/content/categories              - Blog categories
//! GET  /api/content/authors                 - Authors
//! GET  /api/search                          - Search posts and products
//!
//! # Forms (strict rate limit)
//! POST /api/contact                         - Contact form
//! POST /api/newsletter                      - Newsletter signup
//! GET  /api/ebooks/download?slug=           - Direct download for members
//! POST /api/ebooks/download                 - Download with email capture
//! POST /api/ebooks/request                  - Email a download link
//!
//! # Members
//! GET  /api/ebooks                          - Published ebooks
//! POST /api/profile/update                  - Update own profile
//!
//! # Cart (visitor session)
//! GET    /api/cart                          - Current cart
//! POST   /api/cart                          - Apply a cart action
//! DELETE /api/cart                          - Clear the cart
//!
//! # WooCommerce
//! GET  /api/woocommerce/products            - Products (?slug= for one)
//! GET  /api/woocommerce/products/{id}       - Product by id
//! GET  /api/woocommerce/categories          - Product categories
//! GET  /api/woocommerce/cart?ids=           - Validate cart products
//! POST /api/woocommerce/cart                - Checkout URL for cart items
//! POST /api/woocommerce/checkout            - Create a pending order
//! GET  /api/woocommerce/orders              - Order by id or customer
//! PUT  /api/woocommerce/orders              - Update order status
//!
//! # Admin (profiles.is_admin)
//! GET  /api/admin/email-marketing/campaigns            - List campaigns
//! POST /api/admin/email-marketing/campaigns            - Create draft
//! POST /api/admin/email-marketing/campaigns/{id}/send  - Send or test-send
//! GET  /api/admin/email-marketing/subscribers          - Subscribers + stats
//! POST /api/admin/email-marketing/subscribers          - Add or bulk import
//! GET|POST|PUT|DELETE /api/admin/email-marketing/templates
//! GET  /api/admin/import/mailerlite                    - Preview a page
//! POST /api/admin/import/mailerlite                    - Import a page
//! ```

pub mod admin;
pub mod cart;
pub mod contact;
pub mod content;
pub mod ebooks;
pub mod newsletter;
pub mod profile;
pub mod search;
pub mod woocommerce;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::state::AppState;

/// `{"success": true, "message": ...}`
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Content and crawler routes.
pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route("/robots.txt", get(content::robots))
        .route("/sitemap.xml", get(content::sitemap))
        .route("/api/content/posts", get(content::list_posts))
        .route("/api/content/posts/{slug}", get(content::show_post))
        .route("/api/content/posts/{slug}/seo", get(content::post_seo))
        .route("/api/content/products", get(content::list_products))
        .route("/api/content/products/{slug}", get(content::show_product))
        .route("/api/content/categories", get(content::list_categories))
        .route("/api/content/authors", get(content::list_authors))
        .route("/api/search", get(search::search))
}

/// Endpoints that send email or hand out download links.
pub fn form_routes() -> Router<AppState> {
    Router::new()
        .route("/api/contact", post(contact::submit))
        .route("/api/newsletter", post(newsletter::subscribe))
        .route(
            "/api/ebooks/download",
            get(ebooks::download_by_slug).post(ebooks::download),
        )
        .route("/api/ebooks/request", post(ebooks::request))
}

/// Member, cart, and WooCommerce routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ebooks", get(ebooks::list))
        .route("/api/profile/update", post(profile::update))
        .route(
            "/api/cart",
            get(cart::show).post(cart::dispatch).delete(cart::clear),
        )
        .nest("/api/woocommerce", woocommerce_routes())
        .nest("/api/admin", admin::routes())
}

/// WooCommerce proxy routes.
pub fn woocommerce_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(woocommerce::products))
        .route("/products/{id}", get(woocommerce::product))
        .route("/categories", get(woocommerce::categories))
        .route(
            "/cart",
            get(woocommerce::validate_cart).post(woocommerce::cart_checkout),
        )
        .route("/checkout", post(woocommerce::checkout))
        .route(
            "/orders",
            get(woocommerce::orders).put(woocommerce::update_order),
        )
}

/// Every route, without rate limiting.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(content_routes())
        .merge(form_routes())
        .merge(api_routes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use axum::{
        Router,
        body::{Body, Bytes},
        http::{HeaderMap, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::content::ContentStore;
    use crate::middleware::create_session_layer;
    use crate::state::{AppState, test_state};

    fn write(dir: &std::path::Path, name: &str, value: &Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    /// State over a small content export, with every service at `service_url`.
    pub fn fixture_state(service_url: &str) -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "posts.json",
            &json!([
                {"id": 1, "title": "Socket Shield", "slug": "socket-shield",
                 "date": "2021-03-01", "categories": ["Implants"],
                 "content": "<h2>Why it works</h2><p>Root membrane technique</p>"},
                {"id": 2, "title": "Bone Grafts", "slug": "bone-grafts",
                 "date": "2023-05-10", "categories": ["Implants", "Surgery"],
                 "content": "<p>Xenograft or allograft</p>"},
                {"id": 3, "title": "Digital Workflow", "slug": "digital-workflow",
                 "date": "2020-07-07", "categories": ["Digital Dentistry"],
                 "content": "<p>Intraoral scanners</p>"}
            ]),
        );
        write(
            dir.path(),
            "products.json",
            &json!([
                {"id": "p1", "title": "Implant Atlas", "slug": "implant-atlas",
                 "description": "Step by step implant placement",
                 "price": 29.0, "product_type": "Ebook"},
                {"id": "p2", "title": "Suture Kit", "slug": "suture-kit",
                 "price": 12.5, "sale_price": 9.99, "product_type": "Instrument"}
            ]),
        );
        let content = ContentStore::load(dir.path()).unwrap();
        (dir, test_state(content, service_url))
    }

    /// The full router with a session layer, as the server mounts it.
    pub fn app(state: AppState) -> Router {
        let session_layer = create_session_layer(state.config());
        super::routes().layer(session_layer).with_state(state)
    }

    /// Send one request through `app`.
    pub async fn call(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn parse(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    pub async fn get(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = call(&app(state.clone()), request).await;
        (status, parse(&body))
    }

    pub async fn get_text(state: &AppState, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = call(&app(state.clone()), request).await;
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    pub async fn post(state: &AppState, uri: &str, body: &Value) -> (StatusCode, Value) {
        send(state, Method::POST, uri, body).await
    }

    pub async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: &Value,
    ) -> (StatusCode, Value) {
        let (status, _, body) = call(&app(state.clone()), json_request(method, uri, body)).await;
        (status, parse(&body))
    }
}
