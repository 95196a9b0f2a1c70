use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One stored listing. `match_score` is -1 until the scorer has seen it;
/// an unscored job must stay distinguishable from a low-scoring one.
pub const UNSCORED: i64 = -1;

pub const APP_STATUSES: [&str; 6] = [
    "none",
    "interested",
    "applied",
    "interview",
    "offer",
    "rejected",
];

pub fn is_valid_status(status: &str) -> bool {
    APP_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: i64,
    pub user_id: i64,
    pub job_id: String,
    pub norm_key: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub work_type: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_display: String,
    pub match_score: i64,
    pub match_reasons: String,
    pub description: String,
    pub apply_url: String,
    pub company_url: String,
    pub source: String,
    pub date_found: String,
    pub date_posted: String,
    pub saved: bool,
    pub hidden: bool,
    pub notes: String,
    pub app_status: String,
    pub is_new: bool,
    pub sheet_row: Option<i64>,
    pub from_sheet: bool,
}

/// Normalized provider output before it is persisted; no user state yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCandidate {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub work_type: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_display: String,
    pub description: String,
    pub apply_url: String,
    pub company_url: String,
    pub source: String,
    pub date_posted: String,
}
