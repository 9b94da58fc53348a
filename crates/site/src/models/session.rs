//! Session-related types.
//!
//! The visitor session only carries the cart; identity comes from the
//! Supabase access token on each request.

use serde::{Deserialize, Serialize};

/// The user behind a validated Supabase access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    /// Supabase auth user id (UUID)
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
}

/// Session keys.
pub mod keys {
    /// Key for the visitor's cart state.
    pub const CART: &str = "cart";
}
