use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub ok: bool,
    pub msg: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PullSummary {
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
    pub total: i64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PushSummary {
    pub pushed: i64,
    pub appended: i64,
    pub errors: i64,
}

#[derive(Debug, Deserialize)]
pub struct PushPayload {
    pub job_ids: Option<Vec<i64>>,
}
