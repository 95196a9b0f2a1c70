use crate::error::Result;
use crate::utils::time::{day_key, month_key};
use sqlx::{Row, SqlitePool};

/// Company-board queries stop once fewer than this many monthly calls remain.
pub const BOARD_SAFETY_MARGIN: i64 = 5;

/// Persisted provider call counters. The counters live in the database so a
/// restart inside the same day/month does not reset the budget.
#[derive(Clone)]
pub struct QuotaService {
    pool: SqlitePool,
}

impl QuotaService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn monthly_board_calls(&self) -> Result<i64> {
        let row = sqlx::query("SELECT jsearch_calls FROM api_usage WHERE month = ?1")
            .bind(month_key())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("jsearch_calls")).unwrap_or(0))
    }

    pub async fn daily_general_calls(&self) -> Result<i64> {
        let row = sqlx::query("SELECT adzuna_calls FROM api_usage_daily WHERE day = ?1")
            .bind(day_key())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("adzuna_calls")).unwrap_or(0))
    }

    pub async fn record_board_calls(&self, calls: i64) -> Result<()> {
        if calls == 0 {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO api_usage (month, jsearch_calls) VALUES (?1, ?2)
            ON CONFLICT(month) DO UPDATE SET
                jsearch_calls = jsearch_calls + ?2,
                updated_at = datetime('now')
            "#,
        )
        .bind(month_key())
        .bind(calls)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_general_calls(&self, calls: i64) -> Result<()> {
        if calls == 0 {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO api_usage_daily (day, adzuna_calls) VALUES (?1, ?2)
            ON CONFLICT(day) DO UPDATE SET adzuna_calls = adzuna_calls + ?2
            "#,
        )
        .bind(day_key())
        .bind(calls)
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            INSERT INTO api_usage (month, adzuna_calls) VALUES (?1, ?2)
            ON CONFLICT(month) DO UPDATE SET
                adzuna_calls = adzuna_calls + ?2,
                updated_at = datetime('now')
            "#,
        )
        .bind(month_key())
        .bind(calls)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_ai_calls(&self, calls: i64) -> Result<()> {
        if calls == 0 {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO api_usage (month, ai_calls) VALUES (?1, ?2)
            ON CONFLICT(month) DO UPDATE SET
                ai_calls = ai_calls + ?2,
                updated_at = datetime('now')
            "#,
        )
        .bind(month_key())
        .bind(calls)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// How many company-board queries may run given the remaining monthly
/// budget: stop before the safety margin is breached.
pub fn board_queries_allowed(remaining: i64, requested: usize) -> usize {
    if remaining < BOARD_SAFETY_MARGIN {
        return 0;
    }
    let allowed = remaining - BOARD_SAFETY_MARGIN + 1;
    (allowed.max(0) as usize).min(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_margin_issues_no_board_queries() {
        // 15 configured targets, 4 calls remaining: zero queries go out.
        assert_eq!(board_queries_allowed(4, 15), 0);
        assert_eq!(board_queries_allowed(0, 15), 0);
    }

    #[test]
    fn at_margin_issues_exactly_one() {
        assert_eq!(board_queries_allowed(5, 15), 1);
    }

    #[test]
    fn budget_caps_at_requested_count() {
        assert_eq!(board_queries_allowed(200, 10), 10);
        assert_eq!(board_queries_allowed(10, 15), 6);
    }
}
