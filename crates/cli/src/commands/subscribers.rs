//! Import the legacy newsletter CSV export.
//!
//! # Usage
//!
//! ```bash
//! # Upsert every subscriber into the Supabase `subscribers` table
//! ps-cli subscribers supabase subscribers_active.csv
//!
//! # Add subscribers to the Resend audience matching their language group
//! ps-cli subscribers resend subscribers_active.csv --dry-run --limit 100
//! ```
//!
//! # Environment Variables
//!
//! - `RESEND_API_KEY` - Resend API key (Resend import)
//! - `RESEND_AUDIENCE_EN`, `RESEND_AUDIENCE_ES`, `RESEND_AUDIENCE_PT`,
//!   `RESEND_AUDIENCE_GENERAL` - Audience ids per language group

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use periospot_core::is_plausible_email;
use periospot_site::services::resend::NewContact;
use periospot_site::services::{ResendClient, SupabaseClient};
use serde::Serialize;

use super::{BatchOptions, CommandError, apply_limit, upsert_batches};

/// `source` recorded on imported rows.
pub const IMPORT_SOURCE: &str = "mailchimp_import";

const MAX_REPORTED_ERRORS: usize = 10;

// =============================================================================
// CSV
// =============================================================================

/// One CSV row keyed by lowercased header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvRecord(HashMap<String, String>);

impl CsvRecord {
    /// Non-empty value of a column, matched case-insensitively.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .get(&column.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn text(&self, column: &str) -> Option<String> {
        self.get(column).map(str::to_string)
    }

    fn count(&self, column: &str) -> i64 {
        self.get(column)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Split CSV text into rows of trimmed fields.
///
/// Commas and newlines inside double quotes belong to the field, and `""`
/// inside quotes is a literal quote. Blank lines are skipped.
#[must_use]
pub fn split_csv_rows(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => row.push(take_field(&mut field)),
            '\n' if !in_quotes => {
                row.push(take_field(&mut field));
                push_row(&mut rows, std::mem::take(&mut row));
            }
            '\r' if !in_quotes => {}
            _ => field.push(c),
        }
    }
    if !row.is_empty() || !field.trim().is_empty() {
        row.push(take_field(&mut field));
        push_row(&mut rows, row);
    }
    rows
}

fn take_field(field: &mut String) -> String {
    let value = field.trim().to_string();
    field.clear();
    value
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if !matches!(row.as_slice(), [only] if only.is_empty()) {
        rows.push(row);
    }
}

/// Parse an export with a header row.
#[must_use]
pub fn parse_csv(content: &str) -> Vec<CsvRecord> {
    let mut rows = split_csv_rows(content).into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header.into_iter().map(|h| h.to_lowercase()).collect();

    rows.map(|values| {
        CsvRecord(
            headers
                .iter()
                .cloned()
                .zip(values.into_iter().chain(std::iter::repeat(String::new())))
                .collect(),
        )
    })
    .collect()
}

fn read_csv(path: &Path) -> Result<Vec<CsvRecord>, CommandError> {
    let content = std::fs::read_to_string(path).map_err(|source| CommandError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_csv(&content))
}

// =============================================================================
// Supabase
// =============================================================================

/// A row of the `subscribers` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberRow {
    pub email: String,
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub location: Option<String>,
    pub subscribed_at: Option<String>,
    pub language: Option<String>,
    pub sent: i64,
    pub opens: i64,
    pub clicks: i64,
    pub tags: Option<String>,
    pub groups: Option<String>,
    pub score_on_test: Option<String>,
    pub source: &'static str,
}

impl SubscriberRow {
    /// Convert a CSV row. Rows without a usable email are dropped.
    #[must_use]
    pub fn from_record(record: &CsvRecord) -> Option<Self> {
        let email = record.get("Subscriber")?.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return None;
        }
        Some(Self {
            email,
            name: record.text("Name"),
            last_name: record.text("Last name"),
            country: record.text("Country"),
            city: record.text("City"),
            location: record.text("Location"),
            subscribed_at: record.text("Subscribed"),
            language: record.text("Language"),
            sent: record.count("Sent"),
            opens: record.count("Opens"),
            clicks: record.count("Clicks"),
            tags: record.text("Tags"),
            groups: record.text("Groups"),
            score_on_test: record.text("Score on Test"),
            source: IMPORT_SOURCE,
        })
    }
}

/// Outcome of a Supabase subscriber import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Data rows in the export
    pub total: usize,
    /// Rows sent to Supabase (or prepared, on a dry run)
    pub imported: usize,
    /// Rows without a usable email
    pub skipped: usize,
}

/// Upsert the CSV into `subscribers`, keyed on email.
///
/// # Errors
///
/// Returns error if the file cannot be read or any batch is rejected.
pub async fn import_to_supabase(
    supabase: &SupabaseClient,
    csv: &Path,
    options: &BatchOptions,
) -> Result<ImportSummary, CommandError> {
    let records = read_csv(csv)?;
    let total = records.len();
    let rows: Vec<SubscriberRow> = records.iter().filter_map(SubscriberRow::from_record).collect();
    let skipped = total - rows.len();
    tracing::info!(valid = rows.len(), skipped, "Parsed subscriber export");
    let rows = apply_limit(rows, options.limit);
    let imported = upsert_batches(supabase, "subscribers", "email", &rows, options).await?;
    Ok(ImportSummary {
        total,
        imported,
        skipped,
    })
}

// =============================================================================
// Resend
// =============================================================================

/// Newsletter list a subscriber belongs to, from their export groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListLanguage {
    English,
    Spanish,
    Portuguese,
    General,
}

impl ListLanguage {
    pub const ALL: [Self; 4] = [Self::English, Self::Spanish, Self::Portuguese, Self::General];

    /// Portuguese wins over Spanish, which wins over English.
    #[must_use]
    pub fn from_groups(groups: &str) -> Self {
        let groups = groups.to_lowercase();
        if groups.contains("portuguese") {
            Self::Portuguese
        } else if groups.contains("spanish") {
            Self::Spanish
        } else if groups.contains("english") {
            Self::English
        } else {
            Self::General
        }
    }

    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::English => "RESEND_AUDIENCE_EN",
            Self::Spanish => "RESEND_AUDIENCE_ES",
            Self::Portuguese => "RESEND_AUDIENCE_PT",
            Self::General => "RESEND_AUDIENCE_GENERAL",
        }
    }
}

/// Resend audience ids per list.
#[derive(Debug, Clone, Default)]
pub struct Audiences(HashMap<ListLanguage, String>);

impl Audiences {
    /// Read every `RESEND_AUDIENCE_*` variable that is set.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve each list's audience id through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self(
            ListLanguage::ALL
                .into_iter()
                .filter_map(|lang| {
                    lookup(lang.env_var())
                        .filter(|id| !id.trim().is_empty())
                        .map(|id| (lang, id))
                })
                .collect(),
        )
    }

    fn get(&self, language: ListLanguage) -> Result<&str, CommandError> {
        self.0
            .get(&language)
            .map(String::as_str)
            .ok_or(CommandError::MissingEnvVar(language.env_var()))
    }
}

/// Contacts grouped by list.
pub type ContactGroups = HashMap<ListLanguage, Vec<NewContact>>;

/// Group CSV rows by list. Rows with a blank email or no `@` in it are
/// dropped and counted in the second value.
#[must_use]
pub fn group_contacts(records: &[CsvRecord]) -> (ContactGroups, usize) {
    let mut groups = ContactGroups::new();
    let mut skipped = 0;
    for record in records {
        let Some(email) = record
            .get("Subscriber")
            .or_else(|| record.get("email"))
            .filter(|email| email.contains('@'))
        else {
            skipped += 1;
            continue;
        };
        let language = ListLanguage::from_groups(record.get("Groups").unwrap_or_default());
        groups.entry(language).or_default().push(NewContact {
            email: email.to_string(),
            first_name: Some(
                record
                    .get("Name")
                    .or_else(|| record.get("First Name"))
                    .unwrap_or_default()
                    .to_string(),
            ),
            last_name: Some(record.get("Last name").unwrap_or_default().to_string()),
            unsubscribed: false,
        });
    }
    (groups, skipped)
}

/// Options for [`import_to_resend`].
#[derive(Debug, Clone)]
pub struct ResendImportOptions {
    pub limit: Option<usize>,
    pub dry_run: bool,
    /// Pause between API calls
    pub delay: Duration,
}

/// Outcome of a Resend import.
#[derive(Debug, Default)]
pub struct ResendImportReport {
    /// Contacts created or already present
    pub imported: usize,
    pub failed: usize,
    /// Rows without a usable email
    pub skipped: usize,
    /// First few failures
    pub errors: Vec<String>,
}

/// Add CSV subscribers to the Resend audience for their language group.
///
/// # Errors
///
/// Returns error if the file cannot be read, a needed audience id is not
/// configured, or [`CommandError::Partial`] when any contact failed.
pub async fn import_to_resend(
    resend: &ResendClient,
    audiences: &Audiences,
    csv: &Path,
    options: &ResendImportOptions,
) -> Result<ResendImportReport, CommandError> {
    let records = apply_limit(read_csv(csv)?, options.limit);
    let (groups, skipped) = group_contacts(&records);
    tracing::info!(rows = records.len(), skipped, "Parsed subscriber export");

    for language in ListLanguage::ALL {
        let count = groups.get(&language).map_or(0, Vec::len);
        tracing::info!(list = ?language, count, "Subscribers by language");
    }

    let mut report = ResendImportReport {
        skipped,
        ..ResendImportReport::default()
    };
    if options.dry_run {
        for (language, contacts) in &groups {
            for contact in contacts.iter().take(3) {
                tracing::info!(list = ?language, email = %contact.email, "Sample contact");
            }
        }
        return Ok(report);
    }

    // Fail before the first call rather than halfway through.
    for language in groups.keys() {
        audiences.get(*language)?;
    }

    let mut languages: Vec<_> = groups.keys().copied().collect();
    languages.sort();
    for language in languages {
        let audience_id = audiences.get(language)?;
        let contacts = groups.get(&language).map_or(&[][..], Vec::as_slice);
        tracing::info!(list = ?language, count = contacts.len(), "Importing contacts");

        for (index, contact) in contacts.iter().enumerate() {
            match resend.create_contact(audience_id, contact).await {
                Ok(_) => report.imported += 1,
                Err(e) => {
                    report.failed += 1;
                    if report.errors.len() < MAX_REPORTED_ERRORS {
                        report.errors.push(format!("{}: {e}", contact.email));
                    }
                }
            }
            if (index + 1) % 100 == 0 {
                tracing::info!("Processed {}/{}", index + 1, contacts.len());
            }
            tokio::time::sleep(options.delay).await;
        }
    }

    tracing::info!(
        imported = report.imported,
        failed = report.failed,
        skipped = report.skipped,
        "Resend import complete"
    );
    for error in &report.errors {
        tracing::warn!("{error}");
    }

    if report.failed > 0 {
        return Err(CommandError::Partial {
            what: "contacts",
            failed: report.failed,
            total: report.imported + report.failed,
        });
    }
    Ok(report)
}
