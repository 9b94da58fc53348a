//! Core types for Periospot.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod price;
pub mod status;

pub use email::{Email, EmailError, is_plausible_email};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::*;
