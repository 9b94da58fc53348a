//! Merge tags for campaign emails.
//!
//! Campaign bodies are authored with `{{firstName}}`, `{{lastName}}`,
//! `{{email}}` and `{{name}}` placeholders; each recipient gets its own copy.

use serde::{Deserialize, Serialize};

/// The recipient fields available to merge tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Recipient {
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// `"first last"` trimmed, or `"there"` when both are blank.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            "there".to_owned()
        } else {
            full.to_owned()
        }
    }
}

/// Replace every merge tag in `content` for `recipient`.
///
/// A blank first name becomes `"there"` so greetings still read naturally.
#[must_use]
pub fn personalize_content(content: &str, recipient: &Recipient) -> String {
    let first_name = if recipient.first_name.trim().is_empty() {
        "there"
    } else {
        recipient.first_name.as_str()
    };

    content
        .replace("{{firstName}}", first_name)
        .replace("{{lastName}}", &recipient.last_name)
        .replace("{{email}}", &recipient.email)
        .replace("{{name}}", &recipient.display_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personalize_all_tags() {
        let recipient = Recipient::new("ana@example.com", "Ana", "Silva");
        let out = personalize_content(
            "Hi {{firstName}} {{lastName}} ({{email}}), welcome {{name}}! Bye {{firstName}}.",
            &recipient,
        );
        assert_eq!(
            out,
            "Hi Ana Silva (ana@example.com), welcome Ana Silva! Bye Ana."
        );
    }

    #[test]
    fn test_personalize_defaults() {
        let recipient = Recipient::new("x@example.com", "", "");
        let out = personalize_content("Hi {{firstName}}{{lastName}}, {{name}}", &recipient);
        assert_eq!(out, "Hi there, there");
    }

    #[test]
    fn test_display_name_trims_missing_last_name() {
        let recipient = Recipient::new("x@example.com", "Test User", "");
        assert_eq!(recipient.display_name(), "Test User");
    }
}
