use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Quota window key for monthly counters, e.g. "2026-08".
pub fn month_key() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// Quota window key for daily counters, e.g. "2026-08-07".
pub fn day_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

pub fn from_rfc3339(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
