//! Check the WordPress export before migrating it.
//!
//! ```bash
//! ps-cli validate-exports
//! ```

use std::fmt;
use std::path::Path;

use serde_json::Value;

use super::CommandError;

/// Files every migration needs.
pub const REQUIRED_EXPORTS: [&str; 5] = [
    "posts.json",
    "products.json",
    "pages.json",
    "authors.json",
    "categories.json",
];

/// Files some commands use when present.
pub const OPTIONAL_EXPORTS: [&str; 5] = [
    "ebooks.json",
    "comments.json",
    "tags.json",
    "product_categories.json",
    "media.json",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    /// Parsed; carries a short shape summary
    Ok(String),
    Missing,
    Empty,
    Invalid(String),
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(summary) => f.write_str(summary),
            Self::Missing => f.write_str("not found"),
            Self::Empty => f.write_str("0 bytes"),
            Self::Invalid(e) => write!(f, "invalid JSON ({e})"),
        }
    }
}

/// Result for one export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCheck {
    pub file: &'static str,
    pub required: bool,
    pub status: ExportStatus,
}

impl ExportCheck {
    /// A required file that is missing, empty, or unparsable.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.required && !matches!(self.status, ExportStatus::Ok(_))
    }
}

fn summarize(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("array ({})", items.len()),
        Value::Object(map) => format!("object ({} keys)", map.len()),
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
    }
}

fn check_file(content_dir: &Path, file: &'static str, required: bool) -> ExportCheck {
    let status = match std::fs::read_to_string(content_dir.join(file)) {
        Err(_) => ExportStatus::Missing,
        Ok(raw) if raw.is_empty() => ExportStatus::Empty,
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(value) => ExportStatus::Ok(summarize(&value)),
            Err(e) => ExportStatus::Invalid(e.to_string()),
        },
    };
    ExportCheck {
        file,
        required,
        status,
    }
}

/// Check every known export file in `content_dir`.
#[must_use]
pub fn check(content_dir: &Path) -> Vec<ExportCheck> {
    REQUIRED_EXPORTS
        .into_iter()
        .map(|file| check_file(content_dir, file, true))
        .chain(
            OPTIONAL_EXPORTS
                .into_iter()
                .map(|file| check_file(content_dir, file, false)),
        )
        .collect()
}

/// Log each export's status.
///
/// # Errors
///
/// Returns [`CommandError::Partial`] when a required export is missing or
/// invalid.
pub fn validate(content_dir: &Path) -> Result<Vec<ExportCheck>, CommandError> {
    let checks = check(content_dir);
    for result in &checks {
        if result.is_failure() {
            tracing::error!(file = result.file, "{}", result.status);
        } else if matches!(result.status, ExportStatus::Ok(_)) {
            tracing::info!(file = result.file, "{}", result.status);
        } else {
            tracing::warn!(file = result.file, "Optional export: {}", result.status);
        }
    }

    let failed = checks.iter().filter(|c| c.is_failure()).count();
    if failed > 0 {
        return Err(CommandError::Partial {
            what: "required exports",
            failed,
            total: REQUIRED_EXPORTS.len(),
        });
    }
    tracing::info!("All required exports are present and valid");
    Ok(checks)
}
