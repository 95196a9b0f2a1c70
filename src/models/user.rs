use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub resume_text: String,
    pub resume_name: String,
    pub ai_context: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SearchLocation {
    pub id: i64,
    pub user_id: i64,
    pub city: String,
    pub state: String,
    pub label: String,
    pub radius_miles: i64,
    pub active: bool,
}
