//! Shopping cart state.
//!
//! The cart is a plain value driven by [`CartAction`]s. The site keeps one per
//! visitor session and WooCommerce receives the lines only at checkout, so
//! everything here stays pure and easy to test.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::CurrencyCode;

/// A single line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Line id, `"{product_id}-{millis}"` when created by the reducer.
    pub id: String,
    /// WooCommerce product id.
    pub product_id: u64,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
    pub quantity: u32,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub product_type: String,
}

impl CartItem {
    /// Unit price actually charged: the sale price when one is set.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }

    /// Effective price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.effective_price() * Decimal::from(self.quantity)
    }
}

/// A product being added to the cart; the reducer assigns the line id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartItem {
    pub product_id: u64,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub product_type: String,
}

const fn one() -> u32 {
    1
}

/// Everything that can happen to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartAction {
    /// Add a product, merging with an existing line for the same product.
    AddItem(NewCartItem),
    /// Remove a line by its id.
    RemoveItem(String),
    /// Set a line's quantity; zero or less removes the line.
    UpdateQuantity { id: String, quantity: i64 },
    ClearCart,
    /// Replace the whole cart, e.g. from a previously saved session.
    LoadCart(Vec<CartItem>),
}

/// The cart and its derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub currency: CurrencyCode,
}

impl Cart {
    /// An empty euro cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure reducer: returns the cart after `action`.
    #[must_use]
    pub fn reduce(mut self, action: CartAction) -> Self {
        self.apply(action);
        self
    }

    /// Apply `action` in place, stamping new lines with the current time.
    pub fn apply(&mut self, action: CartAction) {
        self.apply_at(action, Utc::now());
    }

    /// Apply `action` in place with an explicit clock.
    pub fn apply_at(&mut self, action: CartAction, now: DateTime<Utc>) {
        match action {
            CartAction::AddItem(new) => {
                let added = new.quantity.max(1);
                if let Some(line) = self
                    .items
                    .iter_mut()
                    .find(|line| line.product_id == new.product_id)
                {
                    line.quantity = line.quantity.saturating_add(added);
                } else {
                    self.items.push(CartItem {
                        id: format!("{}-{}", new.product_id, now.timestamp_millis()),
                        product_id: new.product_id,
                        name: new.name,
                        slug: new.slug,
                        price: new.price,
                        sale_price: new.sale_price,
                        quantity: added,
                        image: new.image,
                        product_type: new.product_type,
                    });
                }
            }
            CartAction::RemoveItem(id) => self.items.retain(|line| line.id != id),
            CartAction::UpdateQuantity { id, quantity } => {
                if quantity <= 0 {
                    self.items.retain(|line| line.id != id);
                } else if let Some(line) = self.items.iter_mut().find(|line| line.id == id) {
                    line.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
                }
            }
            CartAction::ClearCart => self.items.clear(),
            CartAction::LoadCart(items) => self.items = items,
        }
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |count, line| count.saturating_add(line.quantity))
    }

    /// Sum of line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Amount due. There are no shipping or tax lines, so this equals the
    /// subtotal.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.subtotal()
    }

    /// Whether any line holds `product_id`.
    #[must_use]
    pub fn is_in_cart(&self, product_id: u64) -> bool {
        self.items.iter().any(|line| line.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
