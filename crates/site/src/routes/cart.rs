//! Visitor cart kept in the session.
//!
//! The browser posts [`CartAction`]s; the reducer runs server side and the
//! resulting cart is stored under the session's cart key. WooCommerce only
//! sees the lines at checkout.

use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use periospot_core::{Cart, CartAction, CartItem, CurrencyCode};

use crate::error::{AppError, Result};
use crate::models::session_keys;

/// The cart with its derived totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: CurrencyCode,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self {
            item_count: cart.item_count(),
            subtotal: cart.subtotal(),
            total: cart.total(),
            currency: cart.currency,
            items: cart.items,
        }
    }
}

/// Get the cart from the session. A missing or unreadable cart is empty.
async fn load_cart(session: &Session) -> Cart {
    match session.get::<Cart>(session_keys::CART).await {
        Ok(cart) => cart.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Failed to read cart from session: {e}");
            Cart::new()
        }
    }
}

async fn save_cart(session: &Session, cart: &Cart) -> Result<()> {
    session
        .insert(session_keys::CART, cart)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to save cart to session: {e}")))
}

/// GET /api/cart
#[instrument(skip(session))]
pub async fn show(session: Session) -> Json<CartView> {
    Json(load_cart(&session).await.into())
}

/// Apply one cart action and return the new cart.
///
/// POST /api/cart
#[instrument(skip(session))]
pub async fn dispatch(
    session: Session,
    Json(action): Json<CartAction>,
) -> Result<Json<CartView>> {
    let cart = load_cart(&session).await.reduce(action);
    save_cart(&session, &cart).await?;
    tracing::debug!(lines = cart.items.len(), "Cart updated");
    Ok(Json(cart.into()))
}

/// DELETE /api/cart
#[instrument(skip(session))]
pub async fn clear(session: Session) -> Result<Json<CartView>> {
    let cart = load_cart(&session).await.reduce(CartAction::ClearCart);
    save_cart(&session, &cart).await?;
    Ok(Json(cart.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};

    use crate::content::ContentStore;
    use crate::routes::test_support::{app, call, json_request, parse};
    use crate::state::test_state;

    fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
        request
            .headers_mut()
            .insert(header::COOKIE, cookie.parse().unwrap());
        request
    }

    fn add(product_id: u64, price: &str) -> Value {
        json!({
            "type": "ADD_ITEM",
            "payload": {
                "productId": product_id,
                "name": "Implant Atlas",
                "slug": "implant-atlas",
                "price": price
            }
        })
    }

    #[tokio::test]
    async fn test_cart_persists_across_requests() {
        let router = app(test_state(ContentStore::default(), "http://127.0.0.1:9"));

        let (status, headers, body) =
            call(&router, json_request(Method::POST, "/api/cart", &add(7, "29.00"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse(&body)["itemCount"], 1);
        let cookie = headers
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        // Adding the same product again bumps the quantity.
        let request = with_cookie(json_request(Method::POST, "/api/cart", &add(7, "29.00")), &cookie);
        let (_, _, body) = call(&router, request).await;
        let cart = parse(&body);
        assert_eq!(cart["items"].as_array().unwrap().len(), 1);
        assert_eq!(cart["items"][0]["quantity"], 2);
        assert_eq!(cart["subtotal"], "58.00");

        let request = with_cookie(
            Request::builder().uri("/api/cart").body(Body::empty()).unwrap(),
            &cookie,
        );
        let (_, _, body) = call(&router, request).await;
        assert_eq!(parse(&body)["itemCount"], 2);

        let request = with_cookie(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/cart")
                .body(Body::empty())
                .unwrap(),
            &cookie,
        );
        let (_, _, body) = call(&router, request).await;
        assert_eq!(parse(&body)["itemCount"], 0);
    }

    #[tokio::test]
    async fn test_new_visitor_has_empty_cart() {
        let router = app(test_state(ContentStore::default(), "http://127.0.0.1:9"));
        let request = Request::builder().uri("/api/cart").body(Body::empty()).unwrap();
        let (status, _, body) = call(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        let cart = parse(&body);
        assert_eq!(cart["items"], json!([]));
        assert_eq!(cart["currency"], "EUR");
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected() {
        let router = app(test_state(ContentStore::default(), "http://127.0.0.1:9"));
        let (status, _, _) = call(
            &router,
            json_request(Method::POST, "/api/cart", &json!({"type": "CHECKOUT"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
