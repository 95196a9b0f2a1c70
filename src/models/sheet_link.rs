use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sync configuration, one per deployment. Assembled from the shared
/// settings store rather than its own table; the credential file lives
/// outside the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetLink {
    pub sheet_id: String,
    pub credentials_path: String,
    pub auto_push: bool,
    pub last_sync: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SheetsSyncLog {
    pub id: i64,
    pub user_id: i64,
    pub synced_at: String,
    pub direction: String,
    pub inserted: i64,
    pub updated: i64,
    pub pushed: i64,
    pub appended: i64,
    pub errors: i64,
    pub status: String,
}
