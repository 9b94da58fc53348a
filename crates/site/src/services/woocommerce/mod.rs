//! WooCommerce REST API client.
//!
//! The legacy WordPress store is still the product and order source for the
//! shop. Requests go to `{base}/wp-json/wc/v3{endpoint}` with the consumer
//! key and secret as query parameters.
//!
//! Single products are cached for 5 minutes. Product listings, orders, and
//! coupons always hit the API.

mod types;

pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use periospot_core::OrderStatus;

use crate::config::WooCommerceConfig;

/// Errors that can occur when interacting with WooCommerce.
#[derive(Debug, Error)]
pub enum WooCommerceError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("{message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// WooCommerce API client.
#[derive(Clone)]
pub struct WooCommerceClient {
    inner: Arc<WooCommerceClientInner>,
}

struct WooCommerceClientInner {
    client: reqwest::Client,
    base_url: String,
    consumer_key: SecretString,
    consumer_secret: SecretString,
    products: Cache<u64, Product>,
}

impl WooCommerceClient {
    /// Create a new WooCommerce client.
    ///
    /// Missing credentials are logged and sent empty; WooCommerce answers
    /// those requests with 401.
    #[must_use]
    pub fn new(config: &WooCommerceConfig) -> Self {
        if config.consumer_key.is_none() || config.consumer_secret.is_none() {
            warn!("WooCommerce credentials not configured");
        }

        let products = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300))
            .build();

        Self {
            inner: Arc::new(WooCommerceClientInner {
                client: reqwest::Client::new(),
                base_url: config.base_url.clone(),
                consumer_key: config
                    .consumer_key
                    .clone()
                    .unwrap_or_else(|| SecretString::from("")),
                consumer_secret: config
                    .consumer_secret
                    .clone()
                    .unwrap_or_else(|| SecretString::from("")),
                products,
            }),
        }
    }

    /// Store URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn request(&self, method: Method, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/wp-json/wc/v3{endpoint}", self.inner.base_url);
        self.inner.client.request(method, url).query(&[
            ("consumer_key", self.inner.consumer_key.expose_secret()),
            ("consumer_secret", self.inner.consumer_secret.expose_secret()),
        ])
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, WooCommerceError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(parse_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| WooCommerceError::Parse(format!("Failed to parse response: {e}")))
    }

    async fn send_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> Result<T, WooCommerceError> {
        self.send(self.request(method, endpoint).json(body)).await
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// List products with WooCommerce's pagination totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_products(&self, query: &ProductQuery) -> Result<ProductPage, WooCommerceError> {
        let response = self.request(Method::GET, "/products").query(query).send().await?;
        if !response.status().is_success() {
            return Err(parse_error(response).await);
        }

        let total = header_u64(&response, "X-WP-Total");
        let total_pages = header_u64(&response, "X-WP-TotalPages");
        let products = response
            .json()
            .await
            .map_err(|e| WooCommerceError::Parse(format!("Failed to parse products: {e}")))?;

        Ok(ProductPage {
            products,
            total,
            total_pages,
        })
    }

    /// Get a product by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the API request fails.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: u64) -> Result<Product, WooCommerceError> {
        if let Some(product) = self.inner.products.get(&id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let product: Product = self
            .send(self.request(Method::GET, &format!("/products/{id}")))
            .await?;
        self.inner.products.insert(id, product.clone()).await;
        Ok(product)
    }

    /// Find a product by slug using the search endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, WooCommerceError> {
        let page = self
            .get_products(&ProductQuery {
                search: Some(slug.to_string()),
                per_page: Some(1),
                ..ProductQuery::default()
            })
            .await?;
        Ok(page.products.into_iter().find(|p| p.slug == slug))
    }

    /// All product categories (first 100).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_categories(&self) -> Result<Vec<Category>, WooCommerceError> {
        self.send(
            self.request(Method::GET, "/products/categories")
                .query(&[("per_page", "100")]),
        )
        .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Create an unpaid order.
    ///
    /// # Errors
    ///
    /// Returns an error if WooCommerce rejects the order.
    #[instrument(skip(self, order), fields(lines = order.line_items.len()))]
    pub async fn create_order(&self, order: &CreateOrder) -> Result<Order, WooCommerceError> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(flatten)]
            order: &'a CreateOrder,
            set_paid: bool,
        }

        self.send_json(
            Method::POST,
            "/orders",
            &Body {
                order,
                set_paid: false,
            },
        )
        .await
    }

    /// Get an order by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is not found or the API request fails.
    #[instrument(skip(self))]
    pub async fn get_order(&self, id: u64) -> Result<Order, WooCommerceError> {
        self.send(self.request(Method::GET, &format!("/orders/{id}")))
            .await
    }

    /// Move an order to a new status.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is not found or the API request fails.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        id: u64,
        status: OrderStatus,
    ) -> Result<Order, WooCommerceError> {
        self.send_json(
            Method::PUT,
            &format!("/orders/{id}"),
            &OrderStatusPatch { status },
        )
        .await
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_customer_orders(
        &self,
        customer_id: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Order>, WooCommerceError> {
        self.send(self.request(Method::GET, "/orders").query(&[
            ("customer", customer_id.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ]))
        .await
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    /// Look up a coupon code. An unknown code is `valid: false`, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn validate_coupon(&self, code: &str) -> Result<CouponCheck, WooCommerceError> {
        let coupons: Vec<Coupon> = self
            .send(self.request(Method::GET, "/coupons").query(&[("code", code)]))
            .await?;

        Ok(coupons.into_iter().next().map_or_else(
            || CouponCheck {
                valid: false,
                discount_type: String::new(),
                amount: "0".to_string(),
            },
            |coupon| CouponCheck {
                valid: true,
                discount_type: coupon.discount_type,
                amount: coupon.amount,
            },
        ))
    }

    // =========================================================================
    // Storefront URLs
    // =========================================================================

    /// Direct-to-checkout URL for a single product.
    #[must_use]
    pub fn checkout_url(&self, product_id: u64, quantity: u32) -> String {
        format!(
            "{}/checkout/?add-to-cart={product_id}&quantity={quantity}",
            self.inner.base_url
        )
    }

    /// Add-to-cart URL that stays on the shop front page.
    #[must_use]
    pub fn add_to_cart_url(&self, product_id: u64, quantity: u32) -> String {
        format!(
            "{}/?add-to-cart={product_id}&quantity={quantity}",
            self.inner.base_url
        )
    }

    /// Add-to-cart URL that lands on the cart page.
    #[must_use]
    pub fn cart_url(&self, product_id: u64, quantity: u32) -> String {
        format!(
            "{}/cart/?add-to-cart={product_id}&quantity={quantity}",
            self.inner.base_url
        )
    }

    /// Hosted payment page for an unpaid order.
    #[must_use]
    pub fn payment_url(&self, order_id: u64, order_key: &str) -> String {
        format!(
            "{}/checkout/order-pay/{order_id}/?pay_for_order=true&key={order_key}",
            self.inner.base_url
        )
    }
}

impl std::fmt::Debug for WooCommerceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WooCommerceClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

fn header_u64(response: &reqwest::Response, name: &str) -> u64 {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

async fn parse_error(response: reqwest::Response) -> WooCommerceError {
    let status = response.status();
    let fallback = format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );

    let body = response.json::<ErrorBody>().await.ok();
    let (code, message) = match body {
        Some(body) if !body.message.is_empty() => (body.code, body.message),
        Some(body) => (body.code, fallback),
        None => ("unknown_error".to_string(), fallback),
    };

    if status == reqwest::StatusCode::NOT_FOUND {
        return WooCommerceError::NotFound(message);
    }

    WooCommerceError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

#[cfg(test)]
pub(crate) fn test_client(base_url: &str) -> WooCommerceClient {
    WooCommerceClient::new(&WooCommerceConfig {
        base_url: base_url.to_string(),
        consumer_key: Some(SecretString::from("ck_test")),
        consumer_secret: Some(SecretString::from("cs_test")),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn product_json(id: u64, slug: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Atlas of Bone Grafting",
            "slug": slug,
            "type": "simple",
            "price": "29.99",
            "virtual": true,
            "images": [{"id": 1, "src": "https://periospot.com/a.png"}]
        })
    }

    #[tokio::test]
    async fn test_get_products_reads_pagination_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products"))
            .and(query_param("consumer_key", "ck_test"))
            .and(query_param("per_page", "20"))
            .and(query_param("status", "publish"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-Total", "41")
                    .insert_header("X-WP-TotalPages", "3")
                    .set_body_json(json!([product_json(7, "atlas")])),
            )
            .mount(&server)
            .await;

        let page = test_client(&server.uri())
            .get_products(&ProductQuery {
                per_page: Some(20),
                status: Some("publish".to_string()),
                ..ProductQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 41);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.products[0].product_type, "simple");
        assert!(page.products[0].virtual_product);
    }

    #[tokio::test]
    async fn test_get_product_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(product_json(7, "atlas")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.get_product(7).await.unwrap();
        let product = client.get_product(7).await.unwrap();
        assert_eq!(product.slug, "atlas");
    }

    #[tokio::test]
    async fn test_error_body_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/orders/9"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "woocommerce_rest_cannot_view",
                "message": "Sorry, you cannot view this resource."
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/orders/10"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.get_order(9).await.unwrap_err();
        assert_eq!(err.to_string(), "Sorry, you cannot view this resource.");

        let err = client.get_order(10).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
    }

    #[tokio::test]
    async fn test_create_order_is_unpaid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp-json/wc/v3/orders"))
            .and(body_partial_json(json!({
                "set_paid": false,
                "line_items": [{"product_id": 7, "quantity": 2}]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 120,
                "number": "120",
                "order_key": "wc_order_abc",
                "status": "pending",
                "currency": "EUR",
                "total": "59.98"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let order = client
            .create_order(&CreateOrder {
                line_items: vec![OrderLineInput {
                    product_id: 7,
                    quantity: 2,
                }],
                ..CreateOrder::default()
            })
            .await
            .unwrap();
        assert_eq!(
            client.payment_url(order.id, &order.order_key),
            format!(
                "{}/checkout/order-pay/120/?pay_for_order=true&key=wc_order_abc",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn test_validate_coupon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/coupons"))
            .and(query_param("code", "PERIO10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"code": "perio10", "discount_type": "percent", "amount": "10.00"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/coupons"))
            .and(query_param("code", "NOPE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let check = client.validate_coupon("PERIO10").await.unwrap();
        assert!(check.valid);
        assert_eq!(check.amount, "10.00");
        assert!(!client.validate_coupon("NOPE").await.unwrap().valid);
    }

    #[test]
    fn test_storefront_urls() {
        let client = test_client("https://periospot.com");
        assert_eq!(
            client.checkout_url(5, 2),
            "https://periospot.com/checkout/?add-to-cart=5&quantity=2"
        );
        assert_eq!(
            client.add_to_cart_url(5, 1),
            "https://periospot.com/?add-to-cart=5&quantity=1"
        );
        assert_eq!(
            client.cart_url(5, 3),
            "https://periospot.com/cart/?add-to-cart=5&quantity=3"
        );
    }
}
