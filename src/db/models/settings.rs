use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Singleton settings row (id = 1).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Settings {
    pub id: i64,
    /// A live gallery changed and the client has not been redeployed yet
    #[serde(rename = "update")]
    pub update_pending: bool,
    pub client_webhook_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}
