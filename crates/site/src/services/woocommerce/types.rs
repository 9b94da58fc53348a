//! WooCommerce REST API v3 payloads.
//!
//! Only the fields the site reads are typed. Money amounts stay strings
//! because WooCommerce sends them that way and the site never does arithmetic
//! on them.

use serde::{Deserialize, Serialize};

use periospot_core::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default, rename = "type")]
    pub product_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub regular_price: String,
    #[serde(default)]
    pub sale_price: String,
    #[serde(default)]
    pub on_sale: bool,
    #[serde(default)]
    pub purchasable: bool,
    #[serde(default, rename = "virtual")]
    pub virtual_product: bool,
    #[serde(default)]
    pub downloadable: bool,
    #[serde(default)]
    pub stock_status: String,
    #[serde(default)]
    pub categories: Vec<Term>,
    #[serde(default)]
    pub tags: Vec<Term>,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// A category or tag reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub src: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub count: u64,
}

/// One page of products with the pagination headers WooCommerce sends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: u64,
    pub total_pages: u64,
}

/// Filters for `GET /products`. Unset fields are left off the query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_sale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub address_1: String,
    #[serde(default)]
    pub address_2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postcode: String,
    #[serde(default)]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub product_id: u64,
    pub quantity: u32,
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub sku: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub order_key: String,
    pub status: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_paid: Option<String>,
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub customer_id: u64,
    #[serde(default)]
    pub billing: Address,
    #[serde(default)]
    pub shipping: Address,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub product_id: u64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponLineInput {
    pub code: String,
}

/// Body for `POST /orders`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateOrder {
    pub billing: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<Address>,
    pub line_items: Vec<OrderLineInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_title: Option<String>,
    pub customer_note: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coupon_lines: Vec<CouponLineInput>,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderStatusPatch {
    pub status: OrderStatus,
}

/// A coupon as returned by `GET /coupons?code=`.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct Coupon {
    #[serde(default)]
    pub discount_type: String,
    #[serde(default)]
    pub amount: String,
}

/// Outcome of a coupon lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponCheck {
    pub valid: bool,
    pub discount_type: String,
    pub amount: String,
}

/// WooCommerce error body.
#[derive(Debug, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
