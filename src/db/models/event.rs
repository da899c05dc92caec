use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Download audit record. Never updated once written.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub gallery_id: i64,
    /// `None` when the whole gallery (or a bulk selection) was downloaded
    pub image_id: Option<i64>,
    /// `ip:port` of the requesting client
    pub requestor: String,
    pub filename: String,
    /// Tier downloaded (`web` / `original`)
    pub size: String,
    pub bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvent {
    pub gallery_id: i64,
    pub image_id: Option<i64>,
    #[serde(default)]
    pub requestor: String,
    pub filename: String,
    pub size: String,
    pub bytes: i64,
}
