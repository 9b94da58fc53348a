//! Status enums for various entities.

use serde::{Deserialize, Serialize};

/// Editorial status of a post or page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    PendingReview,
    #[default]
    Published,
    Archived,
}

impl PostStatus {
    /// Map a WordPress `post_status` onto the editorial status set.
    ///
    /// `publish`/`published` publish, `draft`/`pending` become drafts,
    /// `archived` is kept, and anything unknown is treated as published.
    #[must_use]
    pub fn normalize_legacy(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("draft" | "pending") => Self::Draft,
            Some("archived") => Self::Archived,
            _ => Self::Published,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::PendingReview => write!(f, "pending_review"),
            Self::Published => write!(f, "published"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending_review" => Ok(Self::PendingReview),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("invalid post status: {s}")),
        }
    }
}

/// Moderation status of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    Approved,
    #[default]
    Pending,
    Spam,
    #[serde(rename = "deleted")]
    Trash,
}

impl CommentStatus {
    /// Map an exported comment status (`approved`, `1`, `spam`, `trash`, ...).
    ///
    /// Anything not recognisably approved, spam, or deleted waits for
    /// moderation.
    #[must_use]
    pub fn from_legacy(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("approved" | "publish" | "1") => Self::Approved,
            Some("spam") => Self::Spam,
            Some("deleted" | "trash") => Self::Trash,
            _ => Self::Pending,
        }
    }
}

/// WooCommerce order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    /// Every status an order can be moved to.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Processing,
        Self::OnHold,
        Self::Completed,
        Self::Cancelled,
        Self::Refunded,
        Self::Failed,
    ];

    /// The wire value used by the WooCommerce REST API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::OnHold => "on-hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Lifecycle of an email campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Scheduled,
    Sending,
    Sent,
}

/// Newsletter subscription state as shown in the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberStatus {
    #[default]
    Subscribed,
    Unsubscribed,
}

impl SubscriberStatus {
    /// Map a stored `status` column (`active`, `subscribed`, ...) onto the
    /// two dashboard states.
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw {
            Some("unsubscribed" | "bounced" | "junk" | "unconfirmed") => Self::Unsubscribed,
            _ => Self::Subscribed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_legacy_post_status() {
        assert_eq!(PostStatus::normalize_legacy(Some("publish")), PostStatus::Published);
        assert_eq!(PostStatus::normalize_legacy(Some("Published")), PostStatus::Published);
        assert_eq!(PostStatus::normalize_legacy(Some("pending")), PostStatus::Draft);
        assert_eq!(PostStatus::normalize_legacy(Some("draft")), PostStatus::Draft);
        assert_eq!(PostStatus::normalize_legacy(Some("archived")), PostStatus::Archived);
        assert_eq!(PostStatus::normalize_legacy(Some("future")), PostStatus::Published);
        assert_eq!(PostStatus::normalize_legacy(None), PostStatus::Published);
    }

    #[test]
    fn test_post_status_roundtrip_strings() {
        for status in [
            PostStatus::Draft,
            PostStatus::PendingReview,
            PostStatus::Published,
            PostStatus::Archived,
        ] {
            assert_eq!(status.to_string().parse::<PostStatus>().unwrap(), status);
        }
        assert!("publish".parse::<PostStatus>().is_err());
    }

    #[test]
    fn test_order_status_wire_values() {
        assert_eq!("on-hold".parse::<OrderStatus>().unwrap(), OrderStatus::OnHold);
        assert_eq!(
            serde_json::to_string(&OrderStatus::OnHold).unwrap(),
            "\"on-hold\""
        );
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_comment_status_from_legacy() {
        assert_eq!(CommentStatus::from_legacy(Some("1")), CommentStatus::Approved);
        assert_eq!(CommentStatus::from_legacy(Some("0")), CommentStatus::Pending);
        assert_eq!(CommentStatus::from_legacy(Some("spam")), CommentStatus::Spam);
        assert_eq!(CommentStatus::from_legacy(None), CommentStatus::Pending);
        assert_eq!(
            serde_json::to_value(CommentStatus::from_legacy(Some("Trash"))).unwrap(),
            "deleted"
        );
    }

    #[test]
    fn test_subscriber_status_from_stored() {
        assert_eq!(SubscriberStatus::from_stored(Some("active")), SubscriberStatus::Subscribed);
        assert_eq!(
            SubscriberStatus::from_stored(Some("unsubscribed")),
            SubscriberStatus::Unsubscribed
        );
        assert_eq!(SubscriberStatus::from_stored(None), SubscriberStatus::Subscribed);
    }
}
