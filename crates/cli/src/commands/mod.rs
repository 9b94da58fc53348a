//! Command implementations and the plumbing they share.
//!
//! Every command reads the WordPress export under `legacy-wordpress/` and
//! writes through the Supabase service-role key, so row-level security does
//! not apply.

pub mod ebooks;
pub mod exports;
pub mod images;
pub mod migrate;
pub mod seo;
pub mod subscribers;

use std::path::{Path, PathBuf};

use periospot_site::config::{ConfigError, SupabaseConfig};
use periospot_site::services::{GeminiError, ResendError, SupabaseClient, SupabaseError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Directory holding `posts.json`, `pages.json`, `products.json`, and
/// `comments.json`.
pub const CONTENT_DIR: &str = "legacy-wordpress/content";

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading or writing a local file failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A local JSON file is malformed.
    #[error("{}: invalid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Supabase rejected a request.
    #[error("Supabase error: {0}")]
    Supabase(#[from] SupabaseError),

    /// Resend rejected a request.
    #[error("Resend error: {0}")]
    Resend(#[from] ResendError),

    /// Gemini rejected a request.
    #[error("Gemini error: {0}")]
    Gemini(#[from] GeminiError),

    /// Some records could not be written; the rest were.
    #[error("{failed} of {total} {what} failed")]
    Partial {
        what: &'static str,
        failed: usize,
        total: usize,
    },
}

/// Service-role Supabase client from `SUPABASE_URL` and
/// `SUPABASE_SERVICE_ROLE_KEY`.
pub fn supabase_from_env() -> Result<SupabaseClient, CommandError> {
    let config = SupabaseConfig::service_from_env()?;
    Ok(SupabaseClient::new(&config)?)
}

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CommandError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CommandError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CommandError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `value` as two-space indented JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CommandError> {
    let raw = serde_json::to_string_pretty(value).map_err(|source| CommandError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, raw).map_err(|source| CommandError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Options shared by the table migrations.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub limit: Option<usize>,
    pub dry_run: bool,
}

/// Upsert `rows` into `table` in batches, continuing past failed batches.
///
/// # Errors
///
/// Returns [`CommandError::Partial`] when any batch was rejected.
pub async fn upsert_batches<R: Serialize + Sync>(
    supabase: &SupabaseClient,
    table: &'static str,
    on_conflict: &str,
    rows: &[R],
    options: &BatchOptions,
) -> Result<usize, CommandError> {
    let batch_size = options.batch_size.max(1);
    let batches = rows.len().div_ceil(batch_size);
    tracing::info!(
        table,
        rows = rows.len(),
        batches,
        dry_run = options.dry_run,
        "Starting migration"
    );

    let mut failed = 0;
    for (index, batch) in rows.chunks(batch_size).enumerate() {
        if options.dry_run {
            tracing::info!("Batch {}/{} ready (dry run)", index + 1, batches);
            continue;
        }
        match supabase.table(table).upsert(batch, on_conflict).await {
            Ok(()) => tracing::info!("Batch {}/{} migrated", index + 1, batches),
            Err(e) => {
                failed += batch.len();
                tracing::error!(error = %e, "Batch {}/{} failed", index + 1, batches);
            }
        }
    }

    if failed > 0 {
        return Err(CommandError::Partial {
            what: table,
            failed,
            total: rows.len(),
        });
    }
    tracing::info!(table, rows = rows.len(), "Migration complete");
    Ok(rows.len())
}

/// Keep at most `limit` items.
pub fn apply_limit<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use periospot_site::config::SupabaseConfig;
    use periospot_site::services::SupabaseClient;
    use secrecy::SecretString;

    /// Service-role client against a mock server.
    pub fn supabase(url: &str) -> SupabaseClient {
        let config = SupabaseConfig {
            url: url.to_string(),
            anon_key: SecretString::from("anon"),
            service_role_key: Some(SecretString::from("service")),
        };
        SupabaseClient::new(&config).unwrap()
    }
}
