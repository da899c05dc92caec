use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub gallery_id: i64,
    /// Set when this image is the featured image of its gallery
    pub featured_gallery_id: Option<i64>,
    /// Size of the original upload in bytes
    pub size: i64,
    pub width: i64,
    pub height: i64,
    pub position: i64,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateImage {
    pub gallery_id: i64,
    pub size: i64,
    pub width: i64,
    pub height: i64,
    pub filename: String,
}

impl Image {
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}
