//! Integration tests for the Periospot site.
//!
//! These run against a live server and are ignored by default.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the site over the content export
//! cargo run -p periospot-site
//!
//! # Run the ignored tests against it
//! SITE_BASE_URL=http://localhost:3000 cargo test -p periospot-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `content_api` - Content layer, search, sitemap
//! - `cart_api` - Session cart round trips
//! - `forms_api` - Validation on public form endpoints

use reqwest::Client;

/// Base URL of the running site (configurable via `SITE_BASE_URL`).
#[must_use]
pub fn site_base_url() -> String {
    std::env::var("SITE_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Shared client and base URL for one test.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
}

impl TestContext {
    /// A context whose client keeps cookies, so the session survives across requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().cookie_store(true).build()?,
            base_url: site_base_url(),
        })
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}
