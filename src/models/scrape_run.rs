use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One orchestration execution. Finalized once, read-only history after.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScrapeRun {
    pub id: i64,
    pub run_id: String,
    pub user_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub jobs_fetched: i64,
    pub jobs_new: i64,
    pub jobs_scored: i64,
    pub general_calls: i64,
    pub board_calls: i64,
    pub ai_calls: i64,
    pub budget_note: String,
    pub status: String,
}
