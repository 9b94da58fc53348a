//! Move WordPress media into Supabase Storage and point content at it.
//!
//! # Usage
//!
//! ```bash
//! # Upload every referenced image and write the URL mappings
//! ps-cli images migrate
//!
//! # Rewrite posts.json and products.json with the new URLs
//! ps-cli images rewrite
//! ```
//!
//! Images are read from the local media dump when the upload path exists
//! there, and downloaded from the live site otherwise.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use periospot_site::services::SupabaseClient;
use regex::{NoExpand, Regex};
use reqwest::header::{REFERER, USER_AGENT};
use serde_json::Value;

use super::{CommandError, read_json, write_json};

/// Public bucket images are uploaded to.
pub const BUCKET: &str = "images";

const FOLDER: &str = "migrated";
const DOWNLOAD_REFERER: &str = "https://periospot.com";
const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (compatible; Periospot-Migration/1.0)";

static CONTENT_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)src=["']([^"']+)["']"#).expect("Invalid regex"));
static UPLOAD_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/uploads/(.+)$").expect("Invalid regex"));
static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9.-]").expect("Invalid regex"));
static SCHEME_AND_WWW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(www\.)?").expect("Invalid regex"));

const POST_IMAGE_FIELDS: [&str; 3] = ["featured_image_url", "featured_image", "featuredImage"];
const PRODUCT_IMAGE_FIELDS: [&str; 2] = ["featured_image_url", "featured_image"];

fn str_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn first_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| str_field(item, key))
}

// =============================================================================
// Collecting and uploading
// =============================================================================

/// Unique image URLs referenced by the export, in first-seen order.
///
/// Featured and gallery images count when absolute; images embedded in post
/// bodies count only when hosted on periospot.com.
#[must_use]
pub fn collect_image_urls(posts: &[Value], products: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut add = |url: &str| {
        if url.starts_with("http") && seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    };

    for post in posts {
        if let Some(url) = first_field(post, &POST_IMAGE_FIELDS) {
            add(url);
        }
        if let Some(content) = str_field(post, "content") {
            for capture in CONTENT_IMAGE.captures_iter(content) {
                if let Some(url) = capture.get(1).map(|m| m.as_str())
                    && url.contains("periospot.com")
                {
                    add(url);
                }
            }
        }
    }

    for product in products {
        if let Some(url) = first_field(product, &PRODUCT_IMAGE_FIELDS) {
            add(url);
        }
        if let Some(gallery) = product.get("gallery_images").and_then(Value::as_array) {
            gallery.iter().filter_map(Value::as_str).for_each(&mut add);
        }
    }

    urls
}

/// Where a WordPress upload URL lives in the local media dump.
#[must_use]
pub fn local_media_path(url: &str, media_dir: &Path) -> Option<PathBuf> {
    UPLOAD_PATH
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| media_dir.join(m.as_str()))
}

/// Last path segment of the URL, or `image.jpg`.
#[must_use]
pub fn filename_from_url(url: &str) -> String {
    let segment = reqwest::Url::parse(url).map_or_else(
        |_| url.rsplit('/').next().map(str::to_string),
        |parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        },
    );
    segment
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image.jpg".to_string())
}

/// MIME type by extension, defaulting to JPEG.
#[must_use]
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "image/jpeg",
    }
}

/// Storage path for an upload: `migrated/{millis}-{filename}`.
#[must_use]
pub fn storage_path(filename: &str, millis: i64) -> String {
    let safe = UNSAFE_FILENAME_CHARS.replace_all(filename, "_");
    format!("{FOLDER}/{millis}-{safe}")
}

/// Image bytes from the media dump, or downloaded from the live site.
async fn load_image(
    http: &reqwest::Client,
    url: &str,
    media_dir: &Path,
) -> Result<Vec<u8>, String> {
    if let Some(local) = local_media_path(url, media_dir) {
        match tokio::fs::read(&local).await {
            Ok(bytes) => {
                tracing::debug!(path = %local.display(), "Read from local media");
                return Ok(bytes);
            }
            Err(_) => tracing::debug!(url, "Local file not found, downloading"),
        }
    }

    let first = http
        .get(url)
        .header(REFERER, DOWNLOAD_REFERER)
        .header(USER_AGENT, DOWNLOAD_USER_AGENT)
        .send()
        .await
        .map_err(|e| format!("Download failed: {e}"))?;

    // Some hosts reject the hotlink headers; retry bare.
    let response = if first.status().is_success() {
        first
    } else {
        let retry = http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Download failed: {e}"))?;
        if !retry.status().is_success() {
            return Err(format!("Download failed: HTTP {}", retry.status()));
        }
        retry
    };

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| format!("Download failed: {e}"))
}

/// Outcome of an image migration run.
#[derive(Debug, Default)]
pub struct ImageReport {
    pub total: usize,
    pub successful: usize,
    pub errors: Vec<(String, String)>,
    /// Original URL to public Storage URL
    pub mappings: BTreeMap<String, String>,
}

/// Paths and pacing for [`migrate`].
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub content_dir: PathBuf,
    pub media_dir: PathBuf,
    pub output: PathBuf,
    pub delay: Duration,
}

/// Upload every image the export references and write the URL mappings.
///
/// Failures are recorded and the run continues; the mappings file always
/// holds every image that did upload.
///
/// # Errors
///
/// Returns error if the mappings cannot be written, or
/// [`CommandError::Partial`] when any image failed.
pub async fn migrate(
    supabase: &SupabaseClient,
    http: &reqwest::Client,
    options: &ImageOptions,
) -> Result<ImageReport, CommandError> {
    let posts = read_items(&options.content_dir.join("posts.json"));
    let products = read_items(&options.content_dir.join("products.json"));
    let urls = collect_image_urls(&posts, &products);

    let mut report = ImageReport {
        total: urls.len(),
        ..ImageReport::default()
    };
    tracing::info!(total = report.total, "Found image URLs to migrate");

    for (index, url) in urls.iter().enumerate() {
        tracing::info!("[{}/{}] {}", index + 1, report.total, url);
        match upload_one(supabase, http, url, &options.media_dir).await {
            Ok(public_url) => {
                report.successful += 1;
                report.mappings.insert(url.clone(), public_url);
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Image failed");
                report.errors.push((url.clone(), e));
            }
        }
        tokio::time::sleep(options.delay).await;
    }

    write_json(&options.output, &report.mappings)?;
    tracing::info!(
        total = report.total,
        successful = report.successful,
        failed = report.errors.len(),
        mappings = %options.output.display(),
        "Image migration finished"
    );

    if report.errors.is_empty() {
        Ok(report)
    } else {
        Err(CommandError::Partial {
            what: "images",
            failed: report.errors.len(),
            total: report.total,
        })
    }
}

async fn upload_one(
    supabase: &SupabaseClient,
    http: &reqwest::Client,
    url: &str,
    media_dir: &Path,
) -> Result<String, String> {
    let bytes = load_image(http, url, media_dir).await?;
    let filename = filename_from_url(url);
    let object_path = storage_path(&filename, chrono::Utc::now().timestamp_millis());
    supabase
        .upload(BUCKET, &object_path, bytes, content_type_for(&filename))
        .await
        .map_err(|e| format!("Upload failed: {e}"))?;
    Ok(supabase.public_url(BUCKET, &object_path))
}

/// A content file as a list of JSON objects; a missing or broken file is
/// logged and treated as empty.
fn read_items(path: &Path) -> Vec<Value> {
    read_json(path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Skipping content file");
        Vec::new()
    })
}

// =============================================================================
// Rewriting
// =============================================================================

/// `https://` without `www.`, the form mapping keys are compared in.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    SCHEME_AND_WWW.replace(url, "https://").into_owned()
}

/// Replaces migrated image URLs in content.
///
/// Matching ignores case, scheme (`http`/`https`), and a `www.` prefix.
#[derive(Debug)]
pub struct UrlRewriter {
    direct: HashMap<String, String>,
    patterns: Vec<(Regex, String)>,
}

impl UrlRewriter {
    /// Build from original-URL to new-URL mappings.
    ///
    /// # Errors
    ///
    /// Returns error if a URL pattern cannot be compiled.
    pub fn new(mappings: &BTreeMap<String, String>) -> Result<Self, regex::Error> {
        let mut direct = HashMap::new();
        let mut normalized: BTreeMap<String, &String> = BTreeMap::new();
        for (old, new) in mappings {
            direct.insert(old.clone(), new.clone());
            let key = normalize_url(old);
            direct.insert(key.clone(), new.clone());
            normalized.insert(key, new);
        }

        let mut keyed: Vec<_> = normalized.into_iter().collect();
        // Longest first so a URL is never clobbered by a prefix of itself.
        keyed.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let patterns = keyed
            .into_iter()
            .map(|(key, new)| {
                let rest = key.strip_prefix("https://").unwrap_or(&key);
                let pattern = format!(r"(?i)https?://(?:www\.)?{}", regex::escape(rest));
                Regex::new(&pattern).map(|re| (re, new.clone()))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { direct, patterns })
    }

    /// New URL for an exact field value.
    #[must_use]
    pub fn lookup(&self, url: &str) -> Option<&str> {
        self.direct
            .get(&normalize_url(url))
            .or_else(|| self.direct.get(url))
            .map(String::as_str)
    }

    /// Replace every mapped URL in `text`, returning the count replaced.
    #[must_use]
    pub fn replace_all(&self, text: &str) -> (String, usize) {
        let mut result = text.to_string();
        let mut count = 0;
        for (pattern, new) in &self.patterns {
            let matches = pattern.find_iter(&result).count();
            if matches > 0 {
                count += matches;
                result = pattern.replace_all(&result, NoExpand(new)).into_owned();
            }
        }
        (result, count)
    }
}

/// Items touched and URLs replaced by a rewrite.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub updated: usize,
    pub replacements: usize,
}

impl std::ops::AddAssign for RewriteStats {
    fn add_assign(&mut self, other: Self) {
        self.updated += other.updated;
        self.replacements += other.replacements;
    }
}

fn rewrite_featured(item: &mut Value, fields: &[&str], rewriter: &UrlRewriter) -> usize {
    let Some(new) = first_field(item, fields)
        .and_then(|url| rewriter.lookup(url))
        .map(str::to_string)
    else {
        return 0;
    };
    for field in fields {
        if str_field(item, field).is_some() {
            item[*field] = Value::String(new.clone());
        }
    }
    1
}

fn rewrite_text(item: &mut Value, field: &str, rewriter: &UrlRewriter) -> usize {
    let Some(text) = str_field(item, field) else {
        return 0;
    };
    let (replaced, count) = rewriter.replace_all(text);
    if count > 0 {
        item[field] = Value::String(replaced);
    }
    count
}

fn rewrite_gallery(item: &mut Value, rewriter: &UrlRewriter) -> usize {
    let Some(gallery) = item.get_mut("gallery_images").and_then(Value::as_array_mut) else {
        return 0;
    };
    let mut count = 0;
    for entry in gallery {
        if let Some(new) = entry.as_str().and_then(|url| rewriter.lookup(url)) {
            *entry = Value::String(new.to_string());
            count += 1;
        }
    }
    count
}

fn tally(stats: &mut RewriteStats, replacements: usize) {
    if replacements > 0 {
        stats.updated += 1;
        stats.replacements += replacements;
    }
}

/// Point post featured images and inline images at Storage.
pub fn rewrite_posts(posts: &mut [Value], rewriter: &UrlRewriter) -> RewriteStats {
    let mut stats = RewriteStats::default();
    for post in posts.iter_mut().filter(|p| p.is_object()) {
        let replaced = rewrite_featured(post, &POST_IMAGE_FIELDS, rewriter)
            + rewrite_text(post, "content", rewriter);
        tally(&mut stats, replaced);
    }
    stats
}

/// Point product images, galleries, and descriptions at Storage.
pub fn rewrite_products(products: &mut [Value], rewriter: &UrlRewriter) -> RewriteStats {
    let mut stats = RewriteStats::default();
    for product in products.iter_mut().filter(|p| p.is_object()) {
        let replaced = rewrite_featured(product, &PRODUCT_IMAGE_FIELDS, rewriter)
            + rewrite_gallery(product, rewriter)
            + rewrite_text(product, "description", rewriter)
            + rewrite_text(product, "short_description", rewriter);
        tally(&mut stats, replaced);
    }
    stats
}

/// Rewrite `posts.json` and `products.json` in place using a mappings file
/// written by [`migrate`].
///
/// # Errors
///
/// Returns error if the mappings or a content file cannot be read or
/// written.
pub fn rewrite(mappings_path: &Path, content_dir: &Path) -> Result<RewriteStats, CommandError> {
    let mappings: BTreeMap<String, String> = read_json(mappings_path)?;
    let rewriter = UrlRewriter::new(&mappings).map_err(|e| CommandError::Json {
        path: mappings_path.to_path_buf(),
        source: serde::de::Error::custom(e),
    })?;

    let posts_path = content_dir.join("posts.json");
    let mut posts: Vec<Value> = read_json(&posts_path)?;
    let post_stats = rewrite_posts(&mut posts, &rewriter);
    write_json(&posts_path, &posts)?;
    tracing::info!(
        updated = post_stats.updated,
        replacements = post_stats.replacements,
        "Posts rewritten"
    );

    let products_path = content_dir.join("products.json");
    let mut products: Vec<Value> = read_json(&products_path)?;
    let product_stats = rewrite_products(&mut products, &rewriter);
    write_json(&products_path, &products)?;
    tracing::info!(
        updated = product_stats.updated,
        replacements = product_stats.replacements,
        "Products rewritten"
    );

    let mut total = post_stats;
    total += product_stats;
    Ok(total)
}
