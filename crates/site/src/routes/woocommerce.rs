//! WooCommerce proxy routes.
//!
//! The shop front talks to these instead of the store directly so the
//! consumer key never reaches the browser. Payment always happens on the
//! WooCommerce site: these routes hand back checkout or payment URLs.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use periospot_core::OrderStatus;

use crate::error::{AppError, Result};
use crate::services::woocommerce::{
    Address, Category, CouponLineInput, CreateOrder, Order, OrderLineInput, Product,
    ProductQuery,
};
use crate::state::AppState;

const DEFAULT_PER_PAGE: u32 = 20;
const DEFAULT_ORDERS_PER_PAGE: u32 = 10;

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<u64>,
    pub search: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub on_sale: bool,
    /// Look up a single product by slug instead of listing.
    pub slug: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProductsResponse {
    Page {
        success: bool,
        products: Vec<Product>,
        pagination: Pagination,
    },
    Single {
        success: bool,
        product: Product,
    },
}

/// Published products, or one product when `slug` is given.
///
/// GET /api/woocommerce/products
#[instrument(skip(state))]
pub async fn products(
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> Result<Json<ProductsResponse>> {
    let woocommerce = state.woocommerce();

    if let Some(slug) = query.slug.as_deref().filter(|s| !s.is_empty()) {
        let product = woocommerce
            .get_product_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
        return Ok(Json(ProductsResponse::Single {
            success: true,
            product,
        }));
    }

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, 100);
    let result = woocommerce
        .get_products(&ProductQuery {
            page: Some(page),
            per_page: Some(per_page),
            category: query.category,
            search: query.search.filter(|s| !s.is_empty()),
            status: Some("publish".to_string()),
            featured: query.featured.then_some(true),
            on_sale: query.on_sale.then_some(true),
            ..ProductQuery::default()
        })
        .await?;

    Ok(Json(ProductsResponse::Page {
        success: true,
        products: result.products,
        pagination: Pagination {
            page,
            per_page,
            total: result.total,
            total_pages: result.total_pages,
        },
    }))
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub success: bool,
    pub product: Product,
}

/// GET /api/woocommerce/products/{id}
#[instrument(skip(state))]
pub async fn product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>> {
    let id: u64 = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid product ID".to_string()))?;
    let product = state.woocommerce().get_product(id).await?;
    Ok(Json(ProductResponse {
        success: true,
        product,
    }))
}

#[derive(Serialize)]
pub struct CategoriesResponse {
    pub success: bool,
    pub categories: Vec<Category>,
}

/// GET /api/woocommerce/categories
#[instrument(skip(state))]
pub async fn categories(State(state): State<AppState>) -> Result<Json<CategoriesResponse>> {
    let categories = state.woocommerce().get_categories().await?;
    Ok(Json(CategoriesResponse {
        success: true,
        categories,
    }))
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct IdsQuery {
    #[serde(default)]
    pub ids: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartValidation {
    pub success: bool,
    pub valid_products: Vec<u64>,
    pub invalid_products: Vec<u64>,
}

/// Split product ids into those WooCommerce still knows and those it doesn't.
///
/// GET /api/woocommerce/cart?ids=1,2
#[instrument(skip(state))]
pub async fn validate_cart(
    State(state): State<AppState>,
    Query(query): Query<IdsQuery>,
) -> Json<CartValidation> {
    let ids: Vec<u64> = query
        .ids
        .split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect();

    let woocommerce = state.woocommerce();
    let lookups = join_all(ids.iter().map(|&id| woocommerce.get_product(id))).await;

    let mut validation = CartValidation {
        success: true,
        valid_products: Vec::new(),
        invalid_products: Vec::new(),
    };
    for (id, lookup) in ids.into_iter().zip(lookups) {
        match lookup {
            Ok(_) => validation.valid_products.push(id),
            Err(e) => {
                tracing::debug!(product_id = id, error = %e, "Cart product is no longer available");
                validation.invalid_products.push(id);
            }
        }
    }
    Json(validation)
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: u64,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

impl CartLine {
    /// Requested quantity; zero counts as one.
    const fn quantity(self) -> u32 {
        if self.quantity == 0 { 1 } else { self.quantity }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CartCheckoutRequest {
    pub items: Vec<CartLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalItem {
    pub product_id: u64,
    pub quantity: u32,
    pub add_to_cart_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMethod {
    /// Open `checkoutUrl` and pay.
    Redirect,
    /// Open each `addToCartUrl`, then `checkoutUrl`.
    Sequential,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLink {
    pub success: bool,
    pub checkout_url: String,
    pub method: CheckoutMethod,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_items: Vec<AdditionalItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Turn cart lines into WooCommerce storefront URLs.
///
/// WooCommerce adds one product per request, so carts with several lines
/// come back as a cart URL for the first line plus add-to-cart URLs for the
/// rest.
///
/// POST /api/woocommerce/cart
#[instrument(skip(state, body), fields(lines = body.items.len()))]
pub async fn cart_checkout(
    State(state): State<AppState>,
    Json(body): Json<CartCheckoutRequest>,
) -> Result<Json<CheckoutLink>> {
    let woocommerce = state.woocommerce();
    let Some((first, rest)) = body.items.split_first() else {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    };

    if rest.is_empty() {
        return Ok(Json(CheckoutLink {
            success: true,
            checkout_url: woocommerce.checkout_url(first.product_id, first.quantity()),
            method: CheckoutMethod::Redirect,
            additional_items: Vec::new(),
            message: None,
        }));
    }

    Ok(Json(CheckoutLink {
        success: true,
        checkout_url: woocommerce.cart_url(first.product_id, first.quantity()),
        method: CheckoutMethod::Sequential,
        additional_items: rest
            .iter()
            .map(|line| AdditionalItem {
                product_id: line.product_id,
                quantity: line.quantity(),
                add_to_cart_url: woocommerce.add_to_cart_url(line.product_id, line.quantity()),
            })
            .collect(),
        message: Some("Multiple items require sequential cart addition"),
    }))
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutLine {
    pub product_id: u64,
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl CheckoutLine {
    fn quantity(&self) -> u32 {
        self.quantity.filter(|q| *q > 0).unwrap_or(1)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutRequest {
    pub billing: Option<Address>,
    pub shipping: Option<Address>,
    pub line_items: Vec<CheckoutLine>,
    pub customer_note: Option<String>,
    pub coupon_code: Option<String>,
    pub redirect_to_woocommerce: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: u64,
    pub number: String,
    pub status: String,
    pub total: String,
    pub currency: String,
    pub created: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub success: bool,
    pub order: OrderSummary,
    pub payment_url: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CheckoutResponse {
    Redirect(CheckoutLink),
    Created(CreatedOrder),
}

fn has_billing_identity(billing: &Address) -> bool {
    billing.email.as_deref().is_some_and(|e| !e.trim().is_empty())
        && !billing.first_name.trim().is_empty()
        && !billing.last_name.trim().is_empty()
}

/// Create an unpaid order and return its payment URL, or just a checkout URL
/// when `redirect_to_woocommerce` is set.
///
/// POST /api/woocommerce/checkout
#[instrument(skip(state, body), fields(lines = body.line_items.len()))]
pub async fn checkout(
    State(state): State<AppState>,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let billing = body
        .billing
        .filter(has_billing_identity)
        .ok_or_else(|| {
            AppError::BadRequest(
                "Billing information is required (email, first_name, last_name)".to_string(),
            )
        })?;
    let Some(first) = body.line_items.first() else {
        return Err(AppError::BadRequest(
            "At least one product is required".to_string(),
        ));
    };

    let woocommerce = state.woocommerce();
    if body.redirect_to_woocommerce {
        return Ok(Json(CheckoutResponse::Redirect(CheckoutLink {
            success: true,
            checkout_url: woocommerce.checkout_url(first.product_id, first.quantity()),
            method: CheckoutMethod::Redirect,
            additional_items: Vec::new(),
            message: Some("Redirect to WooCommerce checkout"),
        })));
    }

    let shipping = body.shipping.map(|mut shipping| {
        if shipping.first_name.trim().is_empty() {
            shipping.first_name.clone_from(&billing.first_name);
        }
        if shipping.last_name.trim().is_empty() {
            shipping.last_name.clone_from(&billing.last_name);
        }
        shipping.email = None;
        shipping.phone = None;
        shipping
    });

    let mut coupon_lines = Vec::new();
    if let Some(code) = body.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        if !woocommerce.validate_coupon(code).await?.valid {
            return Err(AppError::BadRequest("Invalid coupon code".to_string()));
        }
        coupon_lines.push(CouponLineInput {
            code: code.to_string(),
        });
    }

    let order = woocommerce
        .create_order(&CreateOrder {
            line_items: body
                .line_items
                .iter()
                .map(|line| OrderLineInput {
                    product_id: line.product_id,
                    quantity: line.quantity(),
                })
                .collect(),
            billing,
            shipping,
            customer_note: body.customer_note.unwrap_or_default(),
            coupon_lines,
            ..CreateOrder::default()
        })
        .await?;

    tracing::info!(order_id = order.id, "Order created");
    let payment_url = woocommerce.payment_url(order.id, &order.order_key);
    Ok(Json(CheckoutResponse::Created(CreatedOrder {
        success: true,
        order: OrderSummary {
            id: order.id,
            number: order.number,
            status: order.status,
            total: order.total,
            currency: order.currency,
            created: order.date_created,
        },
        payment_url,
        message: "Order created successfully. Proceed to payment.",
    })))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub id: Option<u64>,
    pub customer_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OrderLineView {
    pub id: u64,
    pub name: String,
    pub quantity: u32,
    pub total: String,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub id: u64,
    pub number: String,
    pub status: String,
    pub total: String,
    pub currency: String,
    pub billing: Address,
    pub line_items: Vec<OrderLineView>,
    pub date_created: Option<String>,
    pub date_paid: Option<String>,
}

impl From<Order> for OrderDetail {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            number: order.number,
            status: order.status,
            total: order.total,
            currency: order.currency,
            billing: order.billing,
            line_items: order
                .line_items
                .into_iter()
                .map(|line| OrderLineView {
                    id: line.id,
                    name: line.name,
                    quantity: line.quantity,
                    total: line.total,
                })
                .collect(),
            date_created: order.date_created,
            date_paid: order.date_paid,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderListItem {
    pub id: u64,
    pub number: String,
    pub status: String,
    pub total: String,
    pub currency: String,
    pub date_created: Option<String>,
    pub items_count: usize,
}

impl From<Order> for OrderListItem {
    fn from(order: Order) -> Self {
        Self {
            items_count: order.line_items.len(),
            id: order.id,
            number: order.number,
            status: order.status,
            total: order.total,
            currency: order.currency,
            date_created: order.date_created,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OrdersResponse {
    One { success: bool, order: OrderDetail },
    Many { success: bool, orders: Vec<OrderListItem> },
}

/// One order by `id`, or a page of a customer's orders by `customer_id`.
///
/// GET /api/woocommerce/orders
#[instrument(skip(state))]
pub async fn orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<OrdersResponse>> {
    let woocommerce = state.woocommerce();

    if let Some(id) = query.id {
        let order = woocommerce.get_order(id).await?;
        return Ok(Json(OrdersResponse::One {
            success: true,
            order: order.into(),
        }));
    }

    if let Some(customer_id) = query.customer_id {
        let orders = woocommerce
            .get_customer_orders(
                customer_id,
                query.page.unwrap_or(1).max(1),
                query.per_page.unwrap_or(DEFAULT_ORDERS_PER_PAGE).clamp(1, 100),
            )
            .await?;
        return Ok(Json(OrdersResponse::Many {
            success: true,
            orders: orders.into_iter().map(OrderListItem::from).collect(),
        }));
    }

    Err(AppError::BadRequest(
        "Order ID or Customer ID is required".to_string(),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OrderStatusUpdate {
    pub order_id: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdatedOrder {
    pub id: u64,
    pub number: String,
    pub status: String,
    pub total: String,
}

#[derive(Debug, Serialize)]
pub struct UpdatedOrderResponse {
    pub success: bool,
    pub order: UpdatedOrder,
    pub message: String,
}

/// PUT /api/woocommerce/orders
#[instrument(skip(state))]
pub async fn update_order(
    State(state): State<AppState>,
    Json(body): Json<OrderStatusUpdate>,
) -> Result<Json<UpdatedOrderResponse>> {
    let (Some(order_id), Some(status)) = (body.order_id, body.status.as_deref()) else {
        return Err(AppError::BadRequest(
            "Order ID and status are required".to_string(),
        ));
    };
    let status: OrderStatus = status.parse().map_err(|_| {
        let valid: Vec<&str> = OrderStatus::ALL.into_iter().map(OrderStatus::as_str).collect();
        AppError::BadRequest(format!(
            "Invalid status. Must be one of: {}",
            valid.join(", ")
        ))
    })?;

    let order = state
        .woocommerce()
        .update_order_status(order_id, status)
        .await?;
    tracing::info!(order_id, status = %status, "Order status updated");

    Ok(Json(UpdatedOrderResponse {
        success: true,
        message: format!("Order status updated to {status}"),
        order: UpdatedOrder {
            id: order.id,
            number: order.number,
            status: order.status,
            total: order.total,
        },
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::content::ContentStore;
    use crate::routes::test_support::{get, post, send};
    use crate::state::test_state;

    fn product(id: u64, slug: &str) -> serde_json::Value {
        json!({"id": id, "name": "Implant Atlas", "slug": slug, "price": "29.00"})
    }

    #[tokio::test]
    async fn test_products_reports_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products"))
            .and(query_param("status", "publish"))
            .and(query_param("page", "2"))
            .and(query_param("featured", "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-Total", "41")
                    .insert_header("X-WP-TotalPages", "3")
                    .set_body_json(json!([product(7, "implant-atlas")])),
            )
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = get(&state, "/api/woocommerce/products?page=2&featured=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"], json!({"page": 2, "perPage": 20, "total": 41, "totalPages": 3}));
        assert_eq!(body["products"][0]["slug"], "implant-atlas");
    }

    #[tokio::test]
    async fn test_invalid_product_id() {
        let state = test_state(ContentStore::default(), "http://127.0.0.1:9");
        let (status, body) = get(&state, "/api/woocommerce/products/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid product ID");
    }

    #[tokio::test]
    async fn test_validate_cart_splits_known_and_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(product(7, "implant-atlas")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products/8"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"code": "woocommerce_rest_product_invalid_id", "message": "Invalid ID."})),
            )
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = get(&state, "/api/woocommerce/cart?ids=7,8").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["validProducts"], json!([7]));
        assert_eq!(body["invalidProducts"], json!([8]));
    }

    #[tokio::test]
    async fn test_cart_checkout_single_and_multiple_lines() {
        let server = MockServer::start().await;
        let state = test_state(ContentStore::default(), &server.uri());
        let base = server.uri();

        let (status, body) = post(&state, "/api/woocommerce/cart", &json!({"items": []})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Cart is empty");

        let (_, body) = post(
            &state,
            "/api/woocommerce/cart",
            &json!({"items": [{"productId": 7, "quantity": 2}]}),
        )
        .await;
        assert_eq!(body["method"], "redirect");
        assert_eq!(body["checkoutUrl"], format!("{base}/checkout/?add-to-cart=7&quantity=2"));

        let (_, body) = post(
            &state,
            "/api/woocommerce/cart",
            &json!({"items": [{"productId": 7, "quantity": 1}, {"productId": 9, "quantity": 3}]}),
        )
        .await;
        assert_eq!(body["method"], "sequential");
        assert_eq!(body["checkoutUrl"], format!("{base}/cart/?add-to-cart=7&quantity=1"));
        assert_eq!(
            body["additionalItems"][0]["addToCartUrl"],
            format!("{base}/?add-to-cart=9&quantity=3")
        );
    }

    #[tokio::test]
    async fn test_cart_checkout_zero_quantity_counts_as_one() {
        let state = test_state(ContentStore::default(), "http://127.0.0.1:9");

        let (status, body) = post(
            &state,
            "/api/woocommerce/cart",
            &json!({"items": [{"productId": 7, "quantity": 0}]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["checkoutUrl"].as_str().unwrap().ends_with("add-to-cart=7&quantity=1"));

        let (_, body) = post(
            &state,
            "/api/woocommerce/cart",
            &json!({"items": [{"productId": 7}, {"productId": 9, "quantity": 0}]}),
        )
        .await;
        assert_eq!(body["additionalItems"][0]["quantity"], 1);
        assert!(
            body["additionalItems"][0]["addToCartUrl"]
                .as_str()
                .unwrap()
                .ends_with("add-to-cart=9&quantity=1")
        );
    }

    #[tokio::test]
    async fn test_checkout_validates_billing_and_lines() {
        let state = test_state(ContentStore::default(), "http://127.0.0.1:9");

        let (status, body) = post(
            &state,
            "/api/woocommerce/checkout",
            &json!({"billing": {"email": "ana@example.com"}, "line_items": [{"product_id": 7}]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Billing information is required (email, first_name, last_name)"
        );

        let (status, body) = post(
            &state,
            "/api/woocommerce/checkout",
            &json!({"billing": {"email": "ana@example.com", "first_name": "Ana", "last_name": "Lopes"}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "At least one product is required");
    }

    #[tokio::test]
    async fn test_checkout_rejects_unknown_coupon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/coupons"))
            .and(query_param("code", "NOPE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = post(
            &state,
            "/api/woocommerce/checkout",
            &json!({
                "billing": {"email": "ana@example.com", "first_name": "Ana", "last_name": "Lopes"},
                "line_items": [{"product_id": 7}],
                "coupon_code": "NOPE"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid coupon code");
    }

    #[tokio::test]
    async fn test_checkout_creates_pending_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp-json/wc/v3/orders"))
            .and(body_partial_json(json!({
                "set_paid": false,
                "line_items": [{"product_id": 7, "quantity": 1}],
                "shipping": {"first_name": "Ana", "last_name": "Lopes", "city": "Lisboa"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 501, "number": "501", "order_key": "wc_order_k",
                "status": "pending", "currency": "EUR", "total": "29.00",
                "date_created": "2025-06-01T10:00:00"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = post(
            &state,
            "/api/woocommerce/checkout",
            &json!({
                "billing": {"email": "ana@example.com", "first_name": "Ana", "last_name": "Lopes"},
                "shipping": {"city": "Lisboa"},
                "line_items": [{"product_id": 7, "quantity": 0}]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"]["id"], 501);
        assert_eq!(
            body["paymentUrl"],
            format!(
                "{}/checkout/order-pay/501/?pay_for_order=true&key=wc_order_k",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn test_orders_requires_id_or_customer() {
        let state = test_state(ContentStore::default(), "http://127.0.0.1:9");
        let (status, body) = get(&state, "/api/woocommerce/orders").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Order ID or Customer ID is required");
    }

    #[tokio::test]
    async fn test_customer_orders_are_summarized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/orders"))
            .and(query_param("customer", "12"))
            .and(query_param("per_page", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 501, "number": "501", "status": "completed", "total": "29.00",
                "line_items": [{"id": 1, "name": "Implant Atlas", "quantity": 1}]
            }])))
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = get(&state, "/api/woocommerce/orders?customer_id=12").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["orders"][0]["items_count"], 1);
    }

    #[tokio::test]
    async fn test_update_order_rejects_unknown_status() {
        let state = test_state(ContentStore::default(), "http://127.0.0.1:9");
        let (status, body) = send(
            &state,
            Method::PUT,
            "/api/woocommerce/orders",
            &json!({"order_id": 501, "status": "shipped"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Invalid status. Must be one of: pending, processing, on-hold, completed, cancelled, refunded, failed"
        );
    }

    #[tokio::test]
    async fn test_update_order_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/wp-json/wc/v3/orders/501"))
            .and(body_partial_json(json!({"status": "on-hold"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 501, "number": "501", "status": "on-hold", "total": "29.00"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(ContentStore::default(), &server.uri());

        let (status, body) = send(
            &state,
            Method::PUT,
            "/api/woocommerce/orders",
            &json!({"order_id": 501, "status": "on-hold"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Order status updated to on-hold");
    }
}
