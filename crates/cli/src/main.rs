//! Periospot CLI - WordPress migration and list import tools.
//!
//! # Usage
//!
//! ```bash
//! # Copy the WordPress export into Supabase
//! ps-cli migrate posts
//! ps-cli migrate comments --dry-run
//!
//! # Move media into Supabase Storage, then rewrite content URLs
//! ps-cli images migrate
//! ps-cli images rewrite
//!
//! # Fill in missing SEO metadata and push it
//! ps-cli generate-seo --scope posts,pages --push
//!
//! # Import the newsletter export
//! ps-cli subscribers supabase subscribers_active.csv
//! ps-cli subscribers resend subscribers_active.csv --dry-run
//!
//! # Upload ebook PDFs and link them to their rows
//! ps-cli ebooks upload --list
//! ps-cli ebooks upload
//! ```
//!
//! # Commands
//!
//! - `migrate` - Upsert posts, pages, products, or comments into Supabase
//! - `images` - Upload media to Storage and rewrite URLs in the export
//! - `generate-seo` - Generate SEO metadata with Gemini
//! - `subscribers` - Import the newsletter CSV into Supabase or Resend
//! - `ebooks` - Upload ebook PDFs to Storage
//! - `validate-exports` - Check the export files before migrating

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use periospot_site::config::ResendConfig;
use periospot_site::services::gemini::DEFAULT_MODEL;
use periospot_site::services::{GeminiClient, ResendClient};
use secrecy::SecretString;

use commands::seo::Scope;
use commands::{BatchOptions, CONTENT_DIR, CommandError};

mod commands;

#[derive(Parser)]
#[command(name = "ps-cli")]
#[command(author, version, about = "Periospot CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upsert part of the WordPress export into Supabase
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Move media into Supabase Storage
    Images {
        #[command(subcommand)]
        action: ImagesAction,
    },
    /// Generate missing SEO metadata with Gemini
    GenerateSeo {
        /// Export files to process
        #[arg(long, value_enum, value_delimiter = ',', default_values = ["posts", "pages", "products"])]
        scope: Vec<Scope>,

        /// Generate at most this many items per file
        #[arg(long)]
        limit: Option<usize>,

        /// Gemini model
        #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,

        /// Pause between items, in milliseconds
        #[arg(long, default_value_t = 250)]
        delay: u64,

        /// List what would be generated without calling the API
        #[arg(long)]
        dry_run: bool,

        /// Migrate the processed files to Supabase afterwards
        #[arg(long)]
        push: bool,

        #[arg(long, default_value = CONTENT_DIR)]
        content_dir: PathBuf,
    },
    /// Import the newsletter CSV export
    Subscribers {
        #[command(subcommand)]
        target: SubscribersTarget,
    },
    /// Manage ebook PDFs in Supabase Storage
    Ebooks {
        #[command(subcommand)]
        action: EbooksAction,
    },
    /// Check that the export files exist and parse
    ValidateExports {
        #[arg(long, default_value = CONTENT_DIR)]
        content_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum EbooksAction {
    /// Upload PDFs to the `ebooks` bucket and record their paths
    Upload {
        /// Folder holding `<slug>.pdf` files
        #[arg(long, default_value = commands::ebooks::PDF_DIR)]
        dir: PathBuf,

        /// List what would be uploaded without uploading
        #[arg(long)]
        dry_run: bool,

        /// Show local PDFs and the `ebooks` table, then exit
        #[arg(long, conflicts_with = "dry_run")]
        list: bool,
    },
}

#[derive(clap::Args)]
struct MigrateArgs {
    /// Export file (defaults to the matching file under legacy-wordpress/content)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Rows per request
    #[arg(long)]
    batch_size: Option<usize>,

    /// Migrate at most this many rows
    #[arg(long)]
    limit: Option<usize>,

    /// Convert rows without writing them
    #[arg(long)]
    dry_run: bool,
}

impl MigrateArgs {
    fn resolve(self, file: &str, default_batch: usize) -> (PathBuf, BatchOptions) {
        let input = self
            .input
            .unwrap_or_else(|| PathBuf::from(CONTENT_DIR).join(file));
        let options = BatchOptions {
            batch_size: self.batch_size.unwrap_or(default_batch),
            limit: self.limit,
            dry_run: self.dry_run,
        };
        (input, options)
    }
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Migrate posts.json into `posts`
    Posts(MigrateArgs),
    /// Migrate pages.json into `pages`
    Pages(MigrateArgs),
    /// Migrate products.json into `products`
    Products(MigrateArgs),
    /// Migrate comments.json into `comments` (posts first)
    Comments(MigrateArgs),
}

#[derive(Subcommand)]
enum ImagesAction {
    /// Upload every referenced image and write the URL mappings
    Migrate {
        #[arg(long, default_value = CONTENT_DIR)]
        content_dir: PathBuf,

        /// Local copy of wp-content/uploads
        #[arg(long, default_value = "legacy-wordpress/media")]
        media_dir: PathBuf,

        /// Where to write the mappings
        #[arg(long, default_value = "image-migration-mappings.json")]
        output: PathBuf,
    },
    /// Rewrite posts.json and products.json with the uploaded URLs
    Rewrite {
        #[arg(long, default_value = "image-migration-mappings.json")]
        mappings: PathBuf,

        #[arg(long, default_value = CONTENT_DIR)]
        content_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum SubscribersTarget {
    /// Upsert subscribers into the Supabase `subscribers` table
    Supabase {
        csv: PathBuf,

        #[arg(long, default_value_t = 100)]
        batch_size: usize,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Add subscribers to per-language Resend audiences
    Resend {
        csv: PathBuf,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        dry_run: bool,

        /// Pause between API calls, in milliseconds
        #[arg(long, default_value_t = 550)]
        delay: u64,
    },
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ps_cli=info,periospot_site=warn".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before parsing so `env = ...` arguments see .env values.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn required_secret(key: &'static str) -> Result<SecretString, CommandError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
        .ok_or(CommandError::MissingEnvVar(key))
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate { target } => migrate(target).await?,
        Commands::Images { action } => match action {
            ImagesAction::Migrate {
                content_dir,
                media_dir,
                output,
            } => {
                let supabase = commands::supabase_from_env()?;
                let options = commands::images::ImageOptions {
                    content_dir,
                    media_dir,
                    output,
                    delay: Duration::from_millis(100),
                };
                let report =
                    commands::images::migrate(&supabase, &reqwest::Client::new(), &options).await?;
                tracing::info!(
                    migrated = report.successful,
                    total = report.total,
                    "Review {} before rewriting content",
                    options.output.display()
                );
            }
            ImagesAction::Rewrite {
                mappings,
                content_dir,
            } => {
                let stats = commands::images::rewrite(&mappings, &content_dir)?;
                tracing::info!(
                    items = stats.updated,
                    replacements = stats.replacements,
                    "Content rewritten"
                );
            }
        },
        Commands::GenerateSeo {
            scope,
            limit,
            model,
            delay,
            dry_run,
            push,
            content_dir,
        } => {
            let gemini = GeminiClient::new(required_secret("GOOGLE_GEMINI_API_KEY")?, &model);
            let options = commands::seo::SeoOptions {
                content_dir: content_dir.clone(),
                limit,
                delay: Duration::from_millis(delay),
                dry_run,
            };
            commands::seo::generate(&gemini, &scope, &options).await?;
            if push && !dry_run {
                push_scopes(&scope, &content_dir).await?;
            }
        }
        Commands::Subscribers { target } => match target {
            SubscribersTarget::Supabase {
                csv,
                batch_size,
                limit,
                dry_run,
            } => {
                let supabase = commands::supabase_from_env()?;
                let options = BatchOptions {
                    batch_size,
                    limit,
                    dry_run,
                };
                let summary =
                    commands::subscribers::import_to_supabase(&supabase, &csv, &options).await?;
                tracing::info!(
                    total = summary.total,
                    imported = summary.imported,
                    skipped = summary.skipped,
                    "Subscriber import complete"
                );
            }
            SubscribersTarget::Resend {
                csv,
                limit,
                dry_run,
                delay,
            } => {
                let config = ResendConfig {
                    api_key: required_secret("RESEND_API_KEY")?,
                    audience_id: String::new(),
                };
                let resend = ResendClient::new(&config)?;
                let audiences = commands::subscribers::Audiences::from_env();
                let options = commands::subscribers::ResendImportOptions {
                    limit,
                    dry_run,
                    delay: Duration::from_millis(delay),
                };
                commands::subscribers::import_to_resend(&resend, &audiences, &csv, &options)
                    .await?;
            }
        },
        Commands::Ebooks {
            action: EbooksAction::Upload { dir, dry_run, list },
        } => {
            let supabase = commands::supabase_from_env()?;
            if list {
                commands::ebooks::list(&supabase, &dir).await?;
            } else {
                let options = commands::ebooks::UploadOptions { dir, dry_run };
                commands::ebooks::upload(&supabase, &options).await?;
            }
        }
        Commands::ValidateExports { content_dir } => {
            commands::exports::validate(&content_dir)?;
        }
    }
    Ok(())
}

async fn migrate(target: MigrateTarget) -> Result<(), CommandError> {
    let supabase = commands::supabase_from_env()?;
    match target {
        MigrateTarget::Posts(args) => {
            let (input, options) = args.resolve("posts.json", 25);
            commands::migrate::posts(&supabase, &input, &options).await?;
        }
        MigrateTarget::Pages(args) => {
            let (input, options) = args.resolve("pages.json", 25);
            commands::migrate::pages(&supabase, &input, &options).await?;
        }
        MigrateTarget::Products(args) => {
            let (input, options) = args.resolve("products.json", 25);
            commands::migrate::products(&supabase, &input, &options).await?;
        }
        MigrateTarget::Comments(args) => {
            let (input, options) = args.resolve("comments.json", 50);
            commands::migrate::comments(&supabase, &input, &options).await?;
        }
    }
    Ok(())
}

/// Migrate the files `generate-seo` just updated.
async fn push_scopes(scopes: &[Scope], content_dir: &std::path::Path) -> Result<(), CommandError> {
    let supabase = commands::supabase_from_env()?;
    let options = BatchOptions {
        batch_size: 25,
        limit: None,
        dry_run: false,
    };
    for scope in scopes {
        let input = content_dir.join(scope.file_name());
        tracing::info!(file = %input.display(), "Pushing to Supabase");
        match scope {
            Scope::Posts => commands::migrate::posts(&supabase, &input, &options).await?,
            Scope::Pages => commands::migrate::pages(&supabase, &input, &options).await?,
            Scope::Products => commands::migrate::products(&supabase, &input, &options).await?,
        };
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_seo_scope_list() {
        let cli = Cli::try_parse_from(["ps-cli", "generate-seo", "--scope", "posts,products"]).unwrap();
        let Commands::GenerateSeo { scope, delay, .. } = cli.command else {
            panic!("expected generate-seo");
        };
        assert_eq!(scope, vec![Scope::Posts, Scope::Products]);
        assert_eq!(delay, 250);
    }

    #[test]
    fn test_ebooks_upload_flags() {
        let cli = Cli::try_parse_from(["ps-cli", "ebooks", "upload", "--list"]).unwrap();
        let Commands::Ebooks {
            action: EbooksAction::Upload { dir, list, dry_run },
        } = cli.command
        else {
            panic!("expected ebooks upload");
        };
        assert!(list);
        assert!(!dry_run);
        assert_eq!(dir, PathBuf::from("ebooks/pdfs"));

        assert!(Cli::try_parse_from(["ps-cli", "ebooks", "upload", "--list", "--dry-run"]).is_err());
    }

    #[test]
    fn test_migrate_defaults() {
        let cli = Cli::try_parse_from(["ps-cli", "migrate", "comments", "--dry-run"]).unwrap();
        let Commands::Migrate {
            target: MigrateTarget::Comments(args),
        } = cli.command
        else {
            panic!("expected migrate comments");
        };
        let (input, options) = args.resolve("comments.json", 50);
        assert_eq!(input, PathBuf::from("legacy-wordpress/content/comments.json"));
        assert_eq!(options.batch_size, 50);
        assert!(options.dry_run);
    }
}
