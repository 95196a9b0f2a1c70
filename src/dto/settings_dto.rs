use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Partial update: only present, non-masked values are written.
#[derive(Debug, Deserialize)]
pub struct SettingsPayload {
    #[serde(flatten)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LocationPayload {
    #[validate(length(min = 1, max = 80))]
    pub city: String,
    #[validate(length(max = 20))]
    pub state: Option<String>,
    pub label: Option<String>,
    #[validate(range(min = 1, max = 200))]
    pub radius_miles: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResumePayload {
    #[validate(length(min = 1))]
    pub resume_text: String,
    pub resume_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContextPayload {
    pub ai_context: String,
}
