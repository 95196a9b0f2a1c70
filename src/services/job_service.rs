use crate::error::{Error, Result};
use crate::models::job::{is_valid_status, Job, JobCandidate, UNSCORED};
use crate::models::scrape_run::ScrapeRun;
use crate::utils::normalize::normalized_key;
use crate::utils::time::now_rfc3339;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashSet;

const JOB_COLUMNS: &str = "id, user_id, job_id, norm_key, title, company, location, lat, lng, work_type, \
     salary_min, salary_max, salary_display, match_score, match_reasons, description, \
     apply_url, company_url, source, date_found, date_posted, saved, hidden, notes, \
     app_status, is_new, sheet_row, from_sheet";

#[derive(Debug, Default)]
pub struct JobFilter {
    pub work_type: Option<String>,
    pub min_score: Option<i64>,
    pub search: Option<String>,
    pub saved_only: bool,
    pub status: Option<String>,
    pub source: Option<String>,
    pub include_hidden: bool,
    pub sort: Option<String>,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct UpsertSummary {
    pub inserted: i64,
    pub duplicates: i64,
    pub backfilled: i64,
}

/// Within one fetched batch, the first candidate per normalized
/// (title, company) key wins; order of arrival never changes the key.
pub fn dedup_batch(candidates: Vec<JobCandidate>) -> Vec<JobCandidate> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let key = normalized_key(&candidate.title, &candidate.company);
        if seen.insert(key) {
            result.push(candidate);
        }
    }
    result
}

#[derive(Clone)]
pub struct JobService {
    pool: SqlitePool,
}

impl JobService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_job(&self, user_id: i64, id: i64) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE id = ?1 AND user_id = ?2",
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        job.ok_or_else(|| Error::NotFound("Job not found".into()))
    }

    pub async fn find_by_norm_key(&self, user_id: i64, norm_key: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE user_id = ?1 AND norm_key = ?2 ORDER BY id LIMIT 1",
            JOB_COLUMNS
        ))
        .bind(user_id)
        .bind(norm_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// Persist a deduplicated batch. An existing row wins over a new
    /// candidate (score and status are preserved); only salary fields the
    /// stored row lacks are backfilled from the candidate.
    pub async fn upsert_candidates(
        &self,
        user_id: i64,
        candidates: &[JobCandidate],
    ) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for candidate in candidates {
            let norm_key = normalized_key(&candidate.title, &candidate.company);
            if let Some(existing) = self.find_by_norm_key(user_id, &norm_key).await? {
                summary.duplicates += 1;
                if existing.salary_min.is_none() && candidate.salary_min.is_some() {
                    sqlx::query(
                        r#"
                        UPDATE jobs SET salary_min = ?1, salary_max = ?2,
                            salary_display = CASE WHEN salary_display = '' THEN ?3 ELSE salary_display END
                        WHERE id = ?4
                        "#,
                    )
                    .bind(candidate.salary_min)
                    .bind(candidate.salary_max)
                    .bind(&candidate.salary_display)
                    .bind(existing.id)
                    .execute(&self.pool)
                    .await?;
                    summary.backfilled += 1;
                }
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO jobs
                (user_id, job_id, norm_key, title, company, location, lat, lng, work_type,
                 salary_min, salary_max, salary_display, match_score, match_reasons,
                 description, apply_url, company_url, source, date_found, date_posted, is_new)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, '', ?14, ?15, ?16, ?17, ?18, ?19, 1)
                "#,
            )
            .bind(user_id)
            .bind(&candidate.job_id)
            .bind(&norm_key)
            .bind(&candidate.title)
            .bind(&candidate.company)
            .bind(&candidate.location)
            .bind(candidate.lat)
            .bind(candidate.lng)
            .bind(&candidate.work_type)
            .bind(candidate.salary_min)
            .bind(candidate.salary_max)
            .bind(&candidate.salary_display)
            .bind(UNSCORED)
            .bind(&candidate.description)
            .bind(&candidate.apply_url)
            .bind(&candidate.company_url)
            .bind(&candidate.source)
            .bind(now_rfc3339())
            .bind(&candidate.date_posted)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() > 0 {
                summary.inserted += 1;
            } else {
                summary.duplicates += 1;
            }
        }
        Ok(summary)
    }

    pub async fn list_jobs(&self, user_id: i64, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM jobs WHERE user_id = ",
            JOB_COLUMNS
        ));
        qb.push_bind(user_id);
        if !filter.include_hidden {
            qb.push(" AND hidden = 0");
        }
        if let Some(work_type) = filter.work_type.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND work_type = ").push_bind(work_type.to_string());
        }
        if let Some(min_score) = filter.min_score {
            qb.push(" AND match_score >= ").push_bind(min_score);
        }
        if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND app_status = ").push_bind(status.to_string());
        }
        if let Some(source) = filter.source.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND source = ").push_bind(source.to_string());
        }
        if filter.saved_only {
            qb.push(" AND saved = 1");
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            qb.push(" AND (title LIKE ")
                .push_bind(pattern.clone())
                .push(" OR company LIKE ")
                .push_bind(pattern.clone())
                .push(" OR location LIKE ")
                .push_bind(pattern.clone())
                .push(" OR notes LIKE ")
                .push_bind(pattern)
                .push(")");
        }

        let order = match filter.sort.as_deref() {
            Some("date_found") => "date_found DESC",
            Some("salary") => "salary_max DESC",
            Some("title") => "title ASC",
            _ => "match_score DESC",
        };
        qb.push(" ORDER BY ").push(order);

        let jobs = qb.build_query_as::<Job>().fetch_all(&self.pool).await?;
        Ok(jobs)
    }

    pub async fn unscored_jobs(&self, user_id: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE user_id = ?1 AND match_score = ?2 AND hidden = 0 ORDER BY id",
            JOB_COLUMNS
        ))
        .bind(user_id)
        .bind(UNSCORED)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    pub async fn set_saved(&self, user_id: i64, id: i64, saved: bool) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET saved = ?1 WHERE id = ?2 AND user_id = ?3")
            .bind(saved)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Job not found".into()));
        }
        Ok(())
    }

    /// Soft delete: hide is a terminal display state, the row stays for
    /// audit and export.
    pub async fn set_hidden(&self, user_id: i64, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET hidden = 1, is_new = 0 WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Job not found".into()));
        }
        Ok(())
    }

    pub async fn set_status(&self, user_id: i64, id: i64, status: &str) -> Result<()> {
        if !is_valid_status(status) {
            return Err(Error::BadRequest(format!("Unknown status: {}", status)));
        }
        let result = sqlx::query("UPDATE jobs SET app_status = ?1 WHERE id = ?2 AND user_id = ?3")
            .bind(status)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Job not found".into()));
        }
        Ok(())
    }

    pub async fn set_notes(&self, user_id: i64, id: i64, notes: &str) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET notes = ?1 WHERE id = ?2 AND user_id = ?3")
            .bind(notes)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Job not found".into()));
        }
        Ok(())
    }

    pub async fn mark_seen(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET is_new = 0 WHERE user_id = ?1 AND is_new = 1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Writes a score or resets to the sentinel; anything else is refused
    /// so the stored invariant (sentinel or 0..=100) can never break.
    pub async fn set_score(
        &self,
        id: i64,
        score: i64,
        reasons: &str,
        work_type: Option<&str>,
    ) -> Result<()> {
        if score != UNSCORED && !(0..=100).contains(&score) {
            return Err(Error::BadRequest(format!("Score out of range: {}", score)));
        }
        if let Some(work_type) = work_type {
            sqlx::query("UPDATE jobs SET match_score = ?1, match_reasons = ?2, work_type = ?3 WHERE id = ?4")
                .bind(score)
                .bind(reasons)
                .bind(work_type)
                .bind(id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("UPDATE jobs SET match_score = ?1, match_reasons = ?2 WHERE id = ?3")
                .bind(score)
                .bind(reasons)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn update_from_sheet(
        &self,
        id: i64,
        status: Option<&str>,
        notes: Option<&str>,
        sheet_row: Option<i64>,
    ) -> Result<bool> {
        let mut changed = false;
        if let Some(status) = status {
            sqlx::query("UPDATE jobs SET app_status = ?1 WHERE id = ?2")
                .bind(status)
                .bind(id)
                .execute(&self.pool)
                .await?;
            changed = true;
        }
        if let Some(notes) = notes {
            sqlx::query("UPDATE jobs SET notes = ?1 WHERE id = ?2")
                .bind(notes)
                .bind(id)
                .execute(&self.pool)
                .await?;
            changed = true;
        }
        if let Some(sheet_row) = sheet_row {
            sqlx::query("UPDATE jobs SET sheet_row = ?1 WHERE id = ?2")
                .bind(sheet_row)
                .bind(id)
                .execute(&self.pool)
                .await?;
            changed = true;
        }
        Ok(changed)
    }

    /// Minimal record for a sheet row with no store counterpart: title,
    /// company and location only — no listing detail is invented.
    pub async fn insert_sheet_job(
        &self,
        user_id: i64,
        job_id: &str,
        title: &str,
        company: &str,
        location: &str,
        work_type: &str,
        status: &str,
        notes: &str,
        sheet_row: i64,
        date_applied: &str,
    ) -> Result<bool> {
        let norm_key = normalized_key(title, company);
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs
            (user_id, job_id, norm_key, title, company, location, work_type,
             match_score, match_reasons, source, date_found, date_posted,
             app_status, notes, sheet_row, from_sheet, saved)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'Imported from spreadsheet', 'Sheets Import', ?9, ?10, ?11, ?12, ?13, 1, 1)
            "#,
        )
        .bind(user_id)
        .bind(job_id)
        .bind(&norm_key)
        .bind(title)
        .bind(company)
        .bind(location)
        .bind(work_type)
        .bind(UNSCORED)
        .bind(now_rfc3339())
        .bind(date_applied)
        .bind(status)
        .bind(notes)
        .bind(sheet_row)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn jobs_for_push(&self, user_id: i64, ids: Option<&[i64]>) -> Result<Vec<Job>> {
        match ids {
            Some(ids) if !ids.is_empty() => {
                let mut qb = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT {} FROM jobs WHERE user_id = ",
                    JOB_COLUMNS
                ));
                qb.push_bind(user_id);
                qb.push(" AND id IN (");
                let mut separated = qb.separated(", ");
                for id in ids {
                    separated.push_bind(*id);
                }
                separated.push_unseparated(")");
                Ok(qb.build_query_as::<Job>().fetch_all(&self.pool).await?)
            }
            _ => {
                let jobs = sqlx::query_as::<_, Job>(&format!(
                    "SELECT {} FROM jobs WHERE user_id = ?1 AND hidden = 0 AND (sheet_row IS NOT NULL OR app_status = 'applied')",
                    JOB_COLUMNS
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
                Ok(jobs)
            }
        }
    }

    pub async fn set_sheet_row(&self, id: i64, sheet_row: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET sheet_row = ?1 WHERE id = ?2")
            .bind(sheet_row)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn stats(&self, user_id: i64) -> Result<(i64, i64, i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE hidden = 0) as total,
                COUNT(*) FILTER (WHERE saved = 1 AND hidden = 0) as saved,
                COUNT(*) FILTER (WHERE match_score = -1 AND hidden = 0) as unscored,
                COUNT(*) FILTER (WHERE is_new = 1 AND hidden = 0) as fresh
            FROM jobs WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((
            row.get::<i64, _>("total"),
            row.get::<i64, _>("saved"),
            row.get::<i64, _>("unscored"),
            row.get::<i64, _>("fresh"),
        ))
    }

    // ── scrape run history ───────────────────────────────────────────────

    pub async fn start_run(&self, run_id: &str, user_id: i64) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO scrape_runs (run_id, user_id, started_at, status) VALUES (?1, ?2, ?3, 'running')",
        )
        .bind(run_id)
        .bind(user_id)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_run(
        &self,
        id: i64,
        jobs_fetched: i64,
        jobs_new: i64,
        jobs_scored: i64,
        general_calls: i64,
        board_calls: i64,
        ai_calls: i64,
        budget_note: &str,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scrape_runs SET finished_at = ?1, jobs_fetched = ?2, jobs_new = ?3,
                jobs_scored = ?4, general_calls = ?5, board_calls = ?6, ai_calls = ?7,
                budget_note = ?8, status = ?9
            WHERE id = ?10
            "#,
        )
        .bind(now_rfc3339())
        .bind(jobs_fetched)
        .bind(jobs_new)
        .bind(jobs_scored)
        .bind(general_calls)
        .bind(board_calls)
        .bind(ai_calls)
        .bind(budget_note)
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_runs(&self, user_id: i64, limit: i64) -> Result<Vec<ScrapeRun>> {
        let runs = sqlx::query_as::<_, ScrapeRun>(
            r#"
            SELECT id, run_id, user_id, started_at, finished_at, jobs_fetched, jobs_new,
                   jobs_scored, general_calls, board_calls, ai_calls, budget_note, status
            FROM scrape_runs WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, company: &str) -> JobCandidate {
        JobCandidate {
            job_id: format!("test_{}_{}", title, company),
            title: title.to_string(),
            company: company.to_string(),
            location: "Indianapolis, IN".to_string(),
            lat: None,
            lng: None,
            work_type: "Onsite".to_string(),
            salary_min: None,
            salary_max: None,
            salary_display: String::new(),
            description: String::new(),
            apply_url: String::new(),
            company_url: String::new(),
            source: "Adzuna".to_string(),
            date_posted: String::new(),
        }
    }

    #[test]
    fn batch_dedup_keeps_first_per_normalized_pair() {
        let batch = vec![
            candidate("Software Engineer I", "Acme Corp"),
            candidate("software engineer i", "ACME CORP "),
            candidate("Software Engineer II", "Acme Corp"),
        ];
        let deduped = dedup_batch(batch);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "Software Engineer I");
    }

    #[test]
    fn batch_dedup_is_order_insensitive_on_key_identity() {
        let forward = dedup_batch(vec![
            candidate("Dev", "Acme"),
            candidate("dev", "ACME"),
        ]);
        let reverse = dedup_batch(vec![
            candidate("dev", "ACME"),
            candidate("Dev", "Acme"),
        ]);
        assert_eq!(forward.len(), 1);
        assert_eq!(reverse.len(), 1);
        assert_eq!(
            normalized_key(&forward[0].title, &forward[0].company),
            normalized_key(&reverse[0].title, &reverse[0].company)
        );
    }
}
