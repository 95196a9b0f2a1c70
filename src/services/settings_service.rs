use crate::error::Result;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// Keys surfaced to (and writable from) the settings UI. API credentials
/// are shared deployment-wide, never per user.
pub const EDITABLE_KEYS: [&str; 11] = [
    "adzuna_app_id",
    "adzuna_app_key",
    "jsearch_key",
    "ai_api_url",
    "ai_api_key",
    "ai_model",
    "search_roles",
    "company_targets",
    "sheets_id",
    "sheets_auto_push",
    "scrape_interval_hours",
];

const SECRET_KEYS: [&str; 4] = ["adzuna_app_key", "jsearch_key", "ai_api_key", "adzuna_app_id"];

#[derive(Clone)]
pub struct SettingsService {
    pool: SqlitePool,
}

impl SettingsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_defaults(&self) -> Result<()> {
        let defaults: [(&str, &str); 15] = [
            ("adzuna_app_id", ""),
            ("adzuna_app_key", ""),
            ("jsearch_key", ""),
            ("ai_api_url", "https://api.openai.com/v1/chat/completions"),
            ("ai_api_key", ""),
            ("ai_model", "gpt-4o-mini"),
            ("adzuna_daily_limit", "250"),
            ("jsearch_monthly_limit", "200"),
            (
                "search_roles",
                "software engineer,data analyst,data engineer,qa engineer",
            ),
            ("company_targets", ""),
            ("sheets_id", ""),
            ("sheets_auto_push", "0"),
            ("scrape_interval_hours", "24"),
            ("last_scrape", ""),
            ("sheets_last_sync", ""),
        ];
        for (key, value) in defaults {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<String> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| r.get::<String, _>("value"))
            .unwrap_or_default())
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        let raw = self.get(key).await?;
        Ok(raw.parse().unwrap_or(default))
    }

    pub async fn get_bool(&self, key: &str) -> Result<bool> {
        let raw = self.get(key).await?;
        Ok(matches!(raw.as_str(), "1" | "true" | "TRUE" | "True"))
    }

    /// Editable settings with secrets masked for display.
    pub async fn masked_settings(&self) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for key in EDITABLE_KEYS {
            let value = self.get(key).await?;
            if SECRET_KEYS.contains(&key) && !value.is_empty() {
                out.insert(key.to_string(), mask_secret(&value));
            } else {
                out.insert(key.to_string(), value);
            }
        }
        Ok(out)
    }

    /// Writes only known keys, and never writes a masked value back.
    pub async fn apply_updates(&self, values: &BTreeMap<String, String>) -> Result<usize> {
        let mut written = 0;
        for (key, value) in values {
            if !EDITABLE_KEYS.contains(&key.as_str()) {
                continue;
            }
            if value.contains("...") || value == "****" {
                continue;
            }
            self.set(key, value).await?;
            written += 1;
        }
        Ok(written)
    }
}

fn mask_secret(value: &str) -> String {
    if value.len() > 10 {
        format!("{}...{}", &value[..6], &value[value.len() - 4..])
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_secrets_and_blanks_short_ones() {
        assert_eq!(mask_secret("sk-abcdef1234567890"), "sk-abc...7890");
        assert_eq!(mask_secret("short"), "****");
    }
}
