//! Domain models for the site.

pub mod session;
pub mod user;

pub use session::{SessionUser, keys as session_keys};
pub use user::{Profile, ProfileUpdate};
