//! Branded HTML emails.
//!
//! Every message the site sends is an Askama template under
//! `templates/email/`. Values are HTML-escaped by the template engine; only
//! the campaign body (authored by admins) is inserted raw.

use askama::Template;
use chrono::{DateTime, Utc};

/// Resend substitutes this with the recipient's unsubscribe link.
pub const UNSUBSCRIBE_URL_PLACEHOLDER: &str = "{{unsubscribe_url}}";

/// Length of the message excerpt quoted back to the sender.
const CONFIRMATION_PREVIEW_CHARS: usize = 200;

/// Notification to the Periospot inboxes about a contact form submission.
#[derive(Template)]
#[template(path = "email/contact_notification.html")]
pub struct ContactNotification<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub kind: &'a str,
    pub subject: &'a str,
    pub message: &'a str,
    pub reply_href: String,
    pub sent_at: String,
}

impl<'a> ContactNotification<'a> {
    #[must_use]
    pub fn new(
        name: &'a str,
        email: &'a str,
        kind: Option<&'a str>,
        subject: Option<&'a str>,
        message: &'a str,
        now: DateTime<Utc>,
    ) -> Self {
        let subject = subject.filter(|s| !s.trim().is_empty());
        Self {
            name,
            email,
            kind: kind.filter(|k| !k.trim().is_empty()).unwrap_or("General"),
            subject: subject.unwrap_or("No subject"),
            message,
            reply_href: format!(
                "mailto:{email}?subject=Re: {}",
                subject.unwrap_or("Your inquiry")
            ),
            sent_at: now.format("%A, %B %-d, %Y at %H:%M UTC").to_string(),
        }
    }
}

/// Auto-reply to the person who used the contact form.
#[derive(Template)]
#[template(path = "email/contact_confirmation.html")]
pub struct ContactConfirmation<'a> {
    pub name: &'a str,
    pub message_preview: String,
    pub site_url: &'a str,
    pub year: i32,
}

impl<'a> ContactConfirmation<'a> {
    #[must_use]
    pub fn new(name: &'a str, message: &str, site_url: &'a str, now: DateTime<Utc>) -> Self {
        Self {
            name,
            message_preview: preview(message, CONFIRMATION_PREVIEW_CHARS),
            site_url,
            year: chrono::Datelike::year(&now),
        }
    }
}

/// Welcome message for new newsletter subscribers.
#[derive(Template)]
#[template(path = "email/newsletter_welcome.html")]
pub struct NewsletterWelcome<'a> {
    pub first_name: Option<&'a str>,
    pub site_url: &'a str,
}

/// Download link for a requested ebook.
#[derive(Template)]
#[template(path = "email/ebook_delivery.html")]
pub struct EbookDelivery<'a> {
    pub first_name: &'a str,
    pub ebook_title: &'a str,
    pub download_url: &'a str,
    pub site_url: &'a str,
    pub unsubscribe_url: &'a str,
    pub year: i32,
}

impl<'a> EbookDelivery<'a> {
    #[must_use]
    pub fn new(
        first_name: Option<&'a str>,
        ebook_title: &'a str,
        download_url: &'a str,
        site_url: &'a str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            first_name: first_name.filter(|n| !n.trim().is_empty()).unwrap_or("there"),
            ebook_title,
            download_url,
            site_url,
            unsubscribe_url: UNSUBSCRIBE_URL_PLACEHOLDER,
            year: chrono::Datelike::year(&now),
        }
    }
}

/// The branded frame around a campaign body.
#[derive(Template)]
#[template(path = "email/campaign.html")]
pub struct CampaignEmail<'a> {
    /// Already-personalized campaign HTML.
    pub content: &'a str,
    pub preheader: Option<&'a str>,
    pub site_url: &'a str,
    pub unsubscribe_url: &'a str,
    pub year: i32,
}

impl<'a> CampaignEmail<'a> {
    #[must_use]
    pub fn new(
        content: &'a str,
        preheader: Option<&'a str>,
        site_url: &'a str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            content,
            preheader: preheader.filter(|p| !p.trim().is_empty()),
            site_url,
            unsubscribe_url: UNSUBSCRIBE_URL_PLACEHOLDER,
            year: chrono::Datelike::year(&now),
        }
    }
}

/// First `max_chars` characters of `message`, with `...` when cut.
fn preview(message: &str, max_chars: usize) -> String {
    if message.chars().count() > max_chars {
        let head: String = message.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}
