//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::config::SiteConfig;
use crate::content::ContentStore;
use crate::models::SessionUser;
use crate::services::{
    MailerLiteClient, MailerLiteError, ResendClient, ResendError, SupabaseClient, SupabaseError,
    WooCommerceClient,
};

/// How long a validated access token is trusted before asking Supabase again.
const USER_CACHE_TTL: Duration = Duration::from_secs(60);

/// Error creating a service client from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("supabase client: {0}")]
    Supabase(#[from] SupabaseError),
    #[error("resend client: {0}")]
    Resend(#[from] ResendError),
    #[error("mailerlite client: {0}")]
    MailerLite(#[from] MailerLiteError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the content store, the service clients, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: SiteConfig,
    content: ContentStore,
    supabase: SupabaseClient,
    resend: Option<ResendClient>,
    woocommerce: WooCommerceClient,
    mailerlite: Option<MailerLiteClient>,
    user_cache: Cache<String, SessionUser>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Resend and MailerLite clients are only built when their keys are set.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured client cannot be built.
    pub fn new(config: SiteConfig, content: ContentStore) -> Result<Self, StateError> {
        let supabase = SupabaseClient::new(&config.supabase)?;
        let resend = config.resend.as_ref().map(ResendClient::new).transpose()?;
        let woocommerce = WooCommerceClient::new(&config.woocommerce);
        let mailerlite = config
            .mailerlite_api_key
            .as_ref()
            .map(MailerLiteClient::new)
            .transpose()?;

        Ok(Self::from_parts(
            config,
            content,
            supabase,
            resend,
            woocommerce,
            mailerlite,
        ))
    }

    /// Assemble state from ready-made clients.
    #[must_use]
    pub fn from_parts(
        config: SiteConfig,
        content: ContentStore,
        supabase: SupabaseClient,
        resend: Option<ResendClient>,
        woocommerce: WooCommerceClient,
        mailerlite: Option<MailerLiteClient>,
    ) -> Self {
        let user_cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(USER_CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                content,
                supabase,
                resend,
                woocommerce,
                mailerlite,
                user_cache,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.inner.config
    }

    /// Get a reference to the loaded WordPress content.
    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.inner.content
    }

    #[must_use]
    pub fn supabase(&self) -> &SupabaseClient {
        &self.inner.supabase
    }

    /// Resend client, or `None` when `RESEND_API_KEY` is unset.
    #[must_use]
    pub fn resend(&self) -> Option<&ResendClient> {
        self.inner.resend.as_ref()
    }

    #[must_use]
    pub fn woocommerce(&self) -> &WooCommerceClient {
        &self.inner.woocommerce
    }

    /// MailerLite client, or `None` when `MAILERLITE_API_KEY` is unset.
    #[must_use]
    pub fn mailerlite(&self) -> Option<&MailerLiteClient> {
        self.inner.mailerlite.as_ref()
    }

    /// Validated access tokens, keyed by token.
    #[must_use]
    pub fn user_cache(&self) -> &Cache<String, SessionUser> {
        &self.inner.user_cache
    }
}

/// State for handler tests: content from `content`, services at `service_url`.
#[cfg(test)]
pub(crate) fn test_state(content: ContentStore, service_url: &str) -> AppState {
    AppState::from_parts(
        crate::config::test_config(),
        content,
        crate::services::supabase::test_client(service_url),
        Some(crate::services::resend::test_client(service_url)),
        crate::services::woocommerce::test_client(service_url),
        Some(crate::services::mailerlite::test_client(service_url)),
    )
}

/// Like [`test_state`], but with Resend and MailerLite unconfigured.
#[cfg(test)]
pub(crate) fn test_state_without_email(content: ContentStore, service_url: &str) -> AppState {
    AppState::from_parts(
        crate::config::test_config(),
        content,
        crate::services::supabase::test_client(service_url),
        None,
        crate::services::woocommerce::test_client(service_url),
        None,
    )
}
