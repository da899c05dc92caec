use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Image;

/// Path segment the admin UI lives under on the client site.
pub const RESERVED_PATH: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gallery {
    pub id: i64,
    pub title: String,
    /// Path of the gallery on the client site
    pub path: String,
    pub event_date: Option<DateTime<Utc>>,
    /// Start of the live window
    pub live: DateTime<Utc>,
    /// End of the live window (exclusive)
    pub expiration: DateTime<Utc>,
    /// Listed on the client home page (never when `protected`)
    pub public: bool,
    pub protected: bool,
    /// bcrypt hash; never serialized
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    /// Send an expiration reminder five days before `expiration`
    pub reminder: bool,
    /// Space separated recipient list
    pub reminder_emails: Option<String>,
    /// Pre-built per-tier zips are current
    pub zips_ready: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub featured_image: Option<Image>,
    pub images_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGallery {
    pub title: String,
    pub path: String,
    pub event_date: Option<DateTime<Utc>>,
    pub live: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub protected: bool,
    pub password: Option<String>,
    #[serde(default)]
    pub reminder: bool,
    pub reminder_emails: Option<String>,
}

/// Partial update. Absent fields are left untouched except `event_date`,
/// which is always overwritten.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryUpdate {
    pub title: Option<String>,
    pub path: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub live: Option<DateTime<Utc>>,
    pub expiration: Option<DateTime<Utc>>,
    pub public: Option<bool>,
    pub protected: Option<bool>,
    /// `""` removes the password
    pub password: Option<String>,
    pub featured_image_id: Option<i64>,
    pub reminder: Option<bool>,
    /// `""` removes the recipient list
    pub reminder_emails: Option<String>,
}

impl Gallery {
    /// Recipients of the reminder email, empty entries dropped.
    pub fn reminder_recipients(&self) -> Vec<String> {
        self.reminder_emails
            .as_deref()
            .map(split_recipients)
            .unwrap_or_default()
    }
}

pub fn split_recipients(list: &str) -> Vec<String> {
    list.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_ignore_extra_whitespace() {
        assert_eq!(
            split_recipients("  a@example.com   b@example.com "),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(split_recipients("   ").is_empty());
    }
}
