//! Clients for the hosted services behind the site.
//!
//! # Services
//!
//! - `supabase` - Postgres tables (PostgREST), Auth, and Storage
//! - `resend` - Transactional email and newsletter audiences
//! - `woocommerce` - Legacy store products and orders
//! - `mailerlite` - Legacy newsletter list (import only)
//! - `gemini` - SEO metadata generation for the CLI
//!
//! Every client is an `Arc` around a shared `reqwest::Client`, so clones are
//! cheap and can live in `AppState`.

pub mod gemini;
pub mod mailerlite;
pub mod resend;
pub mod supabase;
pub mod woocommerce;

pub use gemini::{GeminiClient, GeminiError};
pub use mailerlite::{MailerLiteClient, MailerLiteError};
pub use resend::{ResendClient, ResendError};
pub use supabase::{SupabaseClient, SupabaseError};
pub use woocommerce::{WooCommerceClient, WooCommerceError};
