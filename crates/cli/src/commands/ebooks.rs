//! Upload ebook PDFs to Supabase Storage and link them to their rows.
//!
//! # Usage
//!
//! ```bash
//! # Show local PDFs next to the `ebooks` table
//! ps-cli ebooks upload --list
//!
//! # Upload every PDF whose name matches an ebook slug
//! ps-cli ebooks upload --dry-run
//! ps-cli ebooks upload
//! ```
//!
//! `ebooks/pdfs/guided-bone-regeneration-pt.pdf` is stored as
//! `pdfs/guided-bone-regeneration-pt.pdf` in the private `ebooks` bucket and
//! written to `ebooks.pdf_path` for the row with that slug. Downloads then go
//! through signed URLs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use periospot_site::services::SupabaseClient;
use periospot_site::services::supabase::BucketSpec;
use serde::Deserialize;
use serde_json::{Value, json};

use super::CommandError;

/// Private bucket the download route signs URLs for.
pub const BUCKET: &str = "ebooks";

/// Default folder holding the PDFs.
pub const PDF_DIR: &str = "ebooks/pdfs";

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// The Portuguese GBR edition alone is about 165 MB.
const MAX_PDF_BYTES: u64 = 200 * 1024 * 1024;

const EBOOK_BUCKET: BucketSpec<'static> = BucketSpec {
    name: BUCKET,
    public: false,
    file_size_limit: MAX_PDF_BYTES,
    allowed_mime_types: &[PDF_CONTENT_TYPE],
};

/// A non-empty PDF waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPdf {
    pub path: PathBuf,
    pub file_name: String,
    /// Slug of the ebook row, taken from the file name
    pub slug: String,
    pub size: u64,
}

impl LocalPdf {
    /// Object path inside the bucket.
    #[must_use]
    pub fn storage_path(&self) -> String {
        format!("pdfs/{}.pdf", self.slug)
    }

    #[allow(clippy::cast_precision_loss)]
    fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

/// Non-empty `.pdf` files in `dir`, sorted by name. A missing folder has none.
///
/// # Errors
///
/// Returns error if the folder exists but cannot be read.
pub fn local_pdfs(dir: &Path) -> Result<Vec<LocalPdf>, CommandError> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "PDF folder not found");
        return Ok(Vec::new());
    }
    let io_error = |source: std::io::Error| CommandError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let path = entry.path();
        let Some(slug) = path
            .extension()
            .filter(|ext| ext.eq_ignore_ascii_case("pdf"))
            .and_then(|_| path.file_stem())
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
        else {
            continue;
        };
        let size = entry.metadata().map_err(io_error)?.len();
        if size == 0 {
            continue;
        }
        pdfs.push(LocalPdf {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            path,
            slug,
            size,
        });
    }
    pdfs.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(pdfs)
}

/// A row of the `ebooks` table as shown by `--list`.
#[derive(Debug, Clone, Deserialize)]
pub struct EbookRow {
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default)]
    pub download_count: i64,
}

impl EbookRow {
    fn has_pdf(&self) -> bool {
        self.pdf_path.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Local files next to the database rows.
#[derive(Debug)]
pub struct Inventory {
    pub local: Vec<LocalPdf>,
    pub ebooks: Vec<EbookRow>,
}

impl Inventory {
    #[must_use]
    pub fn published(&self) -> usize {
        self.ebooks.iter().filter(|e| e.is_published).count()
    }

    #[must_use]
    pub fn with_pdf(&self) -> usize {
        self.ebooks.iter().filter(|e| e.has_pdf()).count()
    }
}

/// Log local PDFs and the `ebooks` table side by side.
///
/// # Errors
///
/// Returns error if the folder cannot be read or the table query fails.
pub async fn list(supabase: &SupabaseClient, dir: &Path) -> Result<Inventory, CommandError> {
    let local = local_pdfs(dir)?;
    let ebooks: Vec<EbookRow> = supabase
        .table("ebooks")
        .select("slug,title,language,is_published,pdf_path,download_count")
        .order("language", true)
        .fetch()
        .await?;
    let slugs: HashSet<&str> = ebooks.iter().map(|e| e.slug.as_str()).collect();

    for pdf in &local {
        tracing::info!(
            file = %pdf.file_name,
            size_mb = %format!("{:.1}", pdf.size_mb()),
            slug = %pdf.slug,
            matched = slugs.contains(pdf.slug.as_str()),
            "Local PDF"
        );
    }
    for ebook in &ebooks {
        tracing::info!(
            slug = %ebook.slug,
            language = ebook.language.as_deref().unwrap_or("?"),
            published = ebook.is_published,
            has_pdf = ebook.has_pdf(),
            downloads = ebook.download_count,
            "Ebook"
        );
    }

    let inventory = Inventory { local, ebooks };
    tracing::info!(
        local = inventory.local.len(),
        published = inventory.published(),
        with_pdf = inventory.with_pdf(),
        "Ebook inventory"
    );
    Ok(inventory)
}

/// Options for [`upload`].
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub dir: PathBuf,
    pub dry_run: bool,
}

/// Outcome of an upload run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub total: usize,
    pub uploaded: usize,
    /// Files with no ebook row of the same slug
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Deserialize)]
struct SlugRow {
    slug: String,
}

/// Upload every PDF with a matching ebook row and record its `pdf_path`.
///
/// # Errors
///
/// Returns error if the folder cannot be read, the bucket cannot be set up,
/// or [`CommandError::Partial`] when any file failed.
pub async fn upload(
    supabase: &SupabaseClient,
    options: &UploadOptions,
) -> Result<UploadReport, CommandError> {
    let pdfs = local_pdfs(&options.dir)?;
    let mut report = UploadReport {
        total: pdfs.len(),
        ..UploadReport::default()
    };
    if pdfs.is_empty() {
        tracing::warn!(dir = %options.dir.display(), "No PDF files to upload");
        return Ok(report);
    }

    for pdf in &pdfs {
        tracing::info!(
            file = %pdf.file_name,
            size_mb = %format!("{:.1}", pdf.size_mb()),
            target = %pdf.storage_path(),
            "Found PDF"
        );
    }
    if options.dry_run {
        tracing::info!(files = pdfs.len(), "Dry run complete, nothing uploaded");
        return Ok(report);
    }

    let known: HashSet<String> = supabase
        .table("ebooks")
        .select("slug")
        .fetch::<SlugRow>()
        .await?
        .into_iter()
        .map(|row| row.slug)
        .collect();
    supabase.ensure_bucket(&EBOOK_BUCKET).await?;

    for pdf in &pdfs {
        if !known.contains(&pdf.slug) {
            tracing::warn!(file = %pdf.file_name, "No ebook row with this slug, skipping");
            report.skipped += 1;
            continue;
        }

        let bytes = std::fs::read(&pdf.path).map_err(|source| CommandError::Io {
            path: pdf.path.clone(),
            source,
        })?;
        let storage_path = pdf.storage_path();
        if let Err(e) = supabase
            .upload(BUCKET, &storage_path, bytes, PDF_CONTENT_TYPE)
            .await
        {
            tracing::error!(file = %pdf.file_name, error = %e, "Upload failed");
            report.failed += 1;
            continue;
        }

        let patch = json!({
            "pdf_path": storage_path,
            "updated_at": Utc::now().to_rfc3339(),
        });
        match supabase
            .table("ebooks")
            .eq("slug", &pdf.slug)
            .update::<_, Value>(&patch)
            .await
        {
            Ok(_) => {
                tracing::info!(slug = %pdf.slug, path = %storage_path, "Uploaded");
                report.uploaded += 1;
            }
            Err(e) => {
                tracing::error!(slug = %pdf.slug, error = %e, "Failed to record pdf_path");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        uploaded = report.uploaded,
        skipped = report.skipped,
        failed = report.failed,
        total = report.total,
        "Ebook upload complete"
    );
    if report.failed > 0 {
        return Err(CommandError::Partial {
            what: "ebooks",
            failed: report.failed,
            total: report.total,
        });
    }
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::commands::test_support;

    fn pdf_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("guided-bone-regeneration-pt.pdf"), b"%PDF-1.7 gbr").unwrap();
        std::fs::write(dir.path().join("17-immutable-laws-en.pdf"), b"%PDF-1.7 laws").unwrap();
        std::fs::write(dir.path().join("draft.pdf"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a pdf").unwrap();
        dir
    }

    fn options(dir: &Path, dry_run: bool) -> UploadOptions {
        UploadOptions {
            dir: dir.to_path_buf(),
            dry_run,
        }
    }

    #[test]
    fn test_local_pdfs_skips_empty_and_other_files() {
        let dir = pdf_dir();
        let pdfs = local_pdfs(dir.path()).unwrap();
        assert_eq!(pdfs.len(), 2);
        assert_eq!(pdfs[0].slug, "17-immutable-laws-en");
        assert_eq!(pdfs[1].storage_path(), "pdfs/guided-bone-regeneration-pt.pdf");
        assert!(local_pdfs(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_links_matching_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/ebooks"))
            .and(query_param("select", "slug"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"slug": "guided-bone-regeneration-pt"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/bucket"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "ebooks"}])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/ebooks/pdfs/guided-bone-regeneration-pt.pdf"))
            .and(header("Content-Type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/ebooks"))
            .and(query_param("slug", "eq.guided-bone-regeneration-pt"))
            .and(body_partial_json(json!({"pdf_path": "pdfs/guided-bone-regeneration-pt.pdf"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"slug": "guided-bone-regeneration-pt"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = pdf_dir();
        let client = test_support::supabase(&server.uri());
        let report = upload(&client, &options(dir.path(), false)).await.unwrap();
        assert_eq!(
            report,
            UploadReport {
                total: 2,
                uploaded: 1,
                skipped: 1,
                failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_upload_reports_failed_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/ebooks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"slug": "guided-bone-regeneration-pt"}, {"slug": "17-immutable-laws-en"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/bucket"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "ebooks"}])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/ebooks/pdfs/17-immutable-laws-en.pdf"))
            .respond_with(ResponseTemplate::new(413).set_body_json(json!({"message": "Payload too large"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/ebooks/pdfs/guided-bone-regeneration-pt.pdf"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/ebooks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let dir = pdf_dir();
        let client = test_support::supabase(&server.uri());
        let err = upload(&client, &options(dir.path(), false)).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Partial {
                failed: 1,
                total: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upload_dry_run_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = pdf_dir();
        let client = test_support::supabase(&server.uri());
        let report = upload(&client, &options(dir.path(), true)).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.uploaded, 0);
    }

    #[tokio::test]
    async fn test_list_counts_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/ebooks"))
            .and(query_param("order", "language.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"slug": "17-immutable-laws-en", "language": "en", "is_published": true,
                 "pdf_path": "pdfs/17-immutable-laws-en.pdf", "download_count": 12},
                {"slug": "connective-tissue-grafts-en", "language": "en", "is_published": false,
                 "pdf_path": null, "download_count": 0}
            ])))
            .mount(&server)
            .await;

        let dir = pdf_dir();
        let client = test_support::supabase(&server.uri());
        let inventory = list(&client, dir.path()).await.unwrap();
        assert_eq!(inventory.local.len(), 2);
        assert_eq!(inventory.published(), 1);
        assert_eq!(inventory.with_pdf(), 1);
    }
}
