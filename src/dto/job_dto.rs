use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub work_type: Option<String>,
    pub min_score: Option<i64>,
    pub search: Option<String>,
    pub saved: Option<bool>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub hidden: Option<bool>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SavePayload {
    pub saved: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct NotesPayload {
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total: i64,
    pub saved: i64,
    pub unscored: i64,
    pub new_since_last_view: i64,
    pub last_scrape: String,
    pub scrape_running: bool,
    pub scrape_progress: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub saved: Option<bool>,
    pub include_hidden: Option<bool>,
}
