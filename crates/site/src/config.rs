//! Site configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Supabase project URL (falls back to `NEXT_PUBLIC_SUPABASE_URL`)
//! - `SUPABASE_ANON_KEY` - Public anon key (falls back to `NEXT_PUBLIC_SUPABASE_ANON_KEY`)
//! - `SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 3000)
//! - `SITE_URL` - Public URL of the site (default: <https://periospot.com>)
//! - `CONTENT_DIR` - WordPress JSON export directory (default: legacy-wordpress/content)
//! - `SUPABASE_SERVICE_ROLE_KEY` - Service key for admin writes and storage
//! - `RESEND_API_KEY` - Resend API key; email routes degrade without it
//! - `RESEND_AUDIENCE_ID` - Newsletter audience (default: periospot-newsletter)
//! - `CONTACT_RECIPIENTS` - Comma-separated inbox list for the contact form
//! - `WOOCOMMERCE_URL` - WooCommerce store URL (default: <https://periospot.com>)
//! - `WOOCOMMERCE_CONSUMER_KEY` / `WOOCOMMERCE_CONSUMER_SECRET` - REST API credentials
//! - `MAILERLITE_API_KEY` - MailerLite API token for list imports
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_SITE_URL: &str = "https://periospot.com";
const DEFAULT_AUDIENCE_ID: &str = "periospot-newsletter";
const DEFAULT_CONTACT_RECIPIENTS: &str = "cisco@periospot.com,periospot@periospot.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Site application configuration.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used in emails, sitemaps, and download links
    pub base_url: String,
    /// Directory holding the WordPress JSON export
    pub content_dir: PathBuf,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Supabase project configuration
    pub supabase: SupabaseConfig,
    /// Resend configuration; `None` disables outgoing email
    pub resend: Option<ResendConfig>,
    /// Inboxes that receive contact form notifications
    pub contact_recipients: Vec<String>,
    /// WooCommerce REST API configuration
    pub woocommerce: WooCommerceConfig,
    /// MailerLite API token
    pub mailerlite_api_key: Option<SecretString>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Supabase project configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g., <https://abcd.supabase.co>)
    pub url: String,
    /// Public anon key, safe for row-level-security reads
    pub anon_key: SecretString,
    /// Service role key; bypasses row-level security
    pub service_role_key: Option<SecretString>,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "service_role_key",
                &self.service_role_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Resend email configuration.
#[derive(Clone)]
pub struct ResendConfig {
    pub api_key: SecretString,
    /// Audience that newsletter signups are added to
    pub audience_id: String,
}

impl std::fmt::Debug for ResendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendConfig")
            .field("api_key", &"[REDACTED]")
            .field("audience_id", &self.audience_id)
            .finish()
    }
}

/// WooCommerce REST API configuration.
#[derive(Clone)]
pub struct WooCommerceConfig {
    /// Store URL without the `/wp-json` suffix
    pub base_url: String,
    pub consumer_key: Option<SecretString>,
    pub consumer_secret: Option<SecretString>,
}

impl std::fmt::Debug for WooCommerceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WooCommerceConfig")
            .field("base_url", &self.base_url)
            .field("consumer_key", &self.consumer_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "consumer_secret",
                &self.consumer_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl SiteConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORT".to_string(), e.to_string()))?;
        let base_url = normalize_base_url(&get_env_or_default("SITE_URL", DEFAULT_SITE_URL));
        let content_dir =
            PathBuf::from(get_env_or_default("CONTENT_DIR", "legacy-wordpress/content"));
        let session_secret = get_validated_secret("SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SESSION_SECRET")?;

        let supabase = SupabaseConfig::from_env()?;
        let resend = ResendConfig::from_env()?;
        let contact_recipients = parse_list(&get_env_or_default(
            "CONTACT_RECIPIENTS",
            DEFAULT_CONTACT_RECIPIENTS,
        ));
        let woocommerce = WooCommerceConfig::from_env();
        let mailerlite_api_key = get_optional_secret("MAILERLITE_API_KEY")?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            host,
            port,
            base_url,
            content_dir,
            session_secret,
            supabase,
            resend,
            contact_recipients,
            woocommerce,
            mailerlite_api_key,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl SupabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: normalize_base_url(&get_env_with_fallback(
                "SUPABASE_URL",
                "NEXT_PUBLIC_SUPABASE_URL",
            )?),
            anon_key: SecretString::from(get_env_with_fallback(
                "SUPABASE_ANON_KEY",
                "NEXT_PUBLIC_SUPABASE_ANON_KEY",
            )?),
            service_role_key: get_optional_secret("SUPABASE_SERVICE_ROLE_KEY")?,
        })
    }

    /// Configuration for offline tools that write with the service role.
    ///
    /// Requires `SUPABASE_URL` (or `VITE_SUPABASE_URL`) and
    /// `SUPABASE_SERVICE_ROLE_KEY`. The service key doubles as the anon key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if either variable is unset.
    pub fn service_from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let url = normalize_base_url(&get_env_with_fallback("SUPABASE_URL", "VITE_SUPABASE_URL")?);
        let key = get_required_env("SUPABASE_SERVICE_ROLE_KEY")?;
        Ok(Self {
            url,
            anon_key: SecretString::from(key.clone()),
            service_role_key: Some(SecretString::from(key)),
        })
    }
}

impl ResendConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = get_optional_secret("RESEND_API_KEY")? else {
            return Ok(None);
        };
        Ok(Some(Self {
            api_key,
            audience_id: get_env_or_default("RESEND_AUDIENCE_ID", DEFAULT_AUDIENCE_ID),
        }))
    }
}

impl WooCommerceConfig {
    fn from_env() -> Self {
        Self {
            base_url: normalize_base_url(
                &get_optional_env("WOOCOMMERCE_URL")
                    .or_else(|| get_optional_env("VITE_WOOCOMMERCE_URL"))
                    .unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            ),
            consumer_key: get_optional_env("WOOCOMMERCE_CONSUMER_KEY").map(SecretString::from),
            consumer_secret: get_optional_env("WOOCOMMERCE_CONSUMER_SECRET")
                .map(SecretString::from),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required variable, accepting a legacy name as fallback.
fn get_env_with_fallback(primary_key: &str, fallback_key: &str) -> Result<String, ConfigError> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var(fallback_key))
        .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Optional secret, validated when present.
fn get_optional_secret(key: &str) -> Result<Option<SecretString>, ConfigError> {
    get_optional_env(key)
        .map(|value| {
            validate_secret_strength(&value, key)?;
            Ok(SecretString::from(value))
        })
        .transpose()
}

/// Strip trailing slashes so paths can be appended with `format!`.
fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

/// Configuration for unit tests: no outgoing email, local base URL.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn test_config() -> SiteConfig {
    SiteConfig {
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        content_dir: PathBuf::from("legacy-wordpress/content"),
        session_secret: SecretString::from("x".repeat(32)),
        supabase: SupabaseConfig {
            url: "https://project.supabase.co".to_string(),
            anon_key: SecretString::from("anon_key_value_that_is_secret"),
            service_role_key: Some(SecretString::from("service_role_value_that_is_secret")),
        },
        resend: None,
        contact_recipients: vec!["cisco@periospot.com".to_string()],
        woocommerce: WooCommerceConfig {
            base_url: "https://periospot.com".to_string(),
            consumer_key: Some(SecretString::from("ck_consumer_value")),
            consumer_secret: None,
        },
        mailerlite_api_key: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}
