//! String helpers shared by the content layer and the migration tools.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

/// Replace every HTML tag with a space. Entities are left alone.
#[must_use]
pub fn strip_html(html: &str) -> String {
    HTML_TAG.replace_all(html, " ").into_owned()
}

/// Collapse runs of whitespace into single spaces and trim the ends.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an HTML fragment on a single line.
#[must_use]
pub fn plain_text(html: &str) -> String {
    collapse_whitespace(&strip_html(html))
}

/// Turn a title into a URL slug.
///
/// Lowercases, folds common Latin accents (`ç` to `c`, `ã` to `a`, ...), and
/// joins alphanumeric runs with `-`.
///
/// ```
/// use periospot_core::text::slugify;
/// assert_eq!(slugify("Implantes Dentários: Guia Clínico"), "implantes-dentarios-guia-clinico");
/// assert_eq!(slugify("  ¿Qué?  "), "que");
/// ```
#[must_use]
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars().flat_map(char::to_lowercase).map(fold_accent) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

const fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// First `max` characters of `s` with trailing whitespace removed.
#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    s.chars().take(max).collect::<String>().trim().to_owned()
}

/// Trim `s`, and if it is still longer than `max`, cut it to `max - 1`
/// characters and trim again.
#[must_use]
pub fn clamp_length(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_owned();
    }
    truncate(trimmed, max.saturating_sub(1))
}

/// Plain-text excerpt of an HTML body, ending in `...` when cut.
#[must_use]
pub fn build_excerpt(html: &str, max: usize) -> String {
    let clean = plain_text(html);
    if clean.chars().count() > max {
        format!("{}...", truncate(&clean, max))
    } else {
        clean
    }
}

/// Minutes to read at 200 words per minute, never less than three.
#[must_use]
pub fn reading_time_minutes(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    let minutes = (words + 100) / 200;
    u32::try_from(minutes).unwrap_or(u32::MAX).max(3)
}

/// Parse a WordPress or ISO-8601 date into UTC.
///
/// Accepts `2019-04-02 10:11:12`, `2019-04-02T10:11:12`, RFC 3339 with an
/// offset, and bare dates. Naive times are taken as UTC.
#[must_use]
pub fn normalize_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let candidate = raw.replacen(' ', "T", 1);
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&candidate, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Content language of a legacy post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Pt,
    Zh,
}

impl Language {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
            Self::Pt => "pt",
            Self::Zh => "zh",
        }
    }

    /// Guess the language from category, tag, slug, and title text.
    ///
    /// Posts were filed under language categories on WordPress, so the
    /// markers are category names rather than a statistical model.
    #[must_use]
    pub fn detect(haystack: &str) -> Self {
        let text = haystack.to_lowercase();
        let has_any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
        if has_any(&["espanol", "español", "spanish"]) {
            Self::Es
        } else if has_any(&["portugues", "português", "portuguese"]) {
            Self::Pt
        } else if has_any(&["chinese", "中文", "chino"]) {
            Self::Zh
        } else {
            Self::En
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        assert_eq!(
            plain_text("<p>Bone <strong>graft</strong>\n\n healing</p>"),
            "Bone graft healing"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("--Peri-implantitis 101--"), "peri-implantitis-101");
        assert_eq!(slugify("Ñandú"), "nandu");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_clamp_length() {
        assert_eq!(clamp_length("  short  ", 10), "short");
        assert_eq!(clamp_length("abcdefghij", 5), "abcd");
        assert_eq!(clamp_length("abc def", 5), "abc");
    }

    #[test]
    fn test_build_excerpt() {
        let html = format!("<p>{}</p>", "word ".repeat(60));
        let excerpt = build_excerpt(&html, 180);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 183);
        assert_eq!(build_excerpt("<p>Short</p>", 180), "Short");
        assert_eq!(build_excerpt("", 180), "");
    }

    #[test]
    fn test_reading_time() {
        assert_eq!(reading_time_minutes(""), 3);
        assert_eq!(reading_time_minutes(&"w ".repeat(1000)), 5);
        assert_eq!(reading_time_minutes(&"w ".repeat(1100)), 6);
        assert_eq!(reading_time_minutes(&"w ".repeat(1099)), 5);
    }

    #[test]
    fn test_normalize_date() {
        let wp = normalize_date("2019-04-02 10:11:12").unwrap();
        assert_eq!(wp.to_rfc3339(), "2019-04-02T10:11:12+00:00");

        let iso = normalize_date("2019-04-02T10:11:12+02:00").unwrap();
        assert_eq!(iso.to_rfc3339(), "2019-04-02T08:11:12+00:00");

        assert!(normalize_date("2019-04-02").is_some());
        assert!(normalize_date("not a date").is_none());
        assert!(normalize_date("").is_none());
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(Language::detect("Periodoncia Español"), Language::Es);
        assert_eq!(Language::detect("implantes portugues"), Language::Pt);
        assert_eq!(Language::detect("bone grafting"), Language::En);
    }
}
