//! Periospot Core - Shared types library.
//!
//! This crate provides common types used across all Periospot components:
//! - `site` - Public website API, content layer, and email marketing routes
//! - `cli` - Command-line tools for WordPress migrations and list imports
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses
//! - [`cart`] - Shopping cart state and its reducer
//! - [`personalize`] - Merge tags for campaign emails
//! - [`seo`] - SEO field merging, Yoast mapping, and length checks
//! - [`text`] - Slugs, excerpts, and other string helpers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod personalize;
pub mod seo;
pub mod text;
pub mod types;

pub use cart::{Cart, CartAction, CartItem, NewCartItem};
pub use types::*;
