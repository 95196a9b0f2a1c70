use crate::dto::sync_dto::{PullSummary, PushSummary};
use crate::error::{Error, Result};
use crate::models::job::Job;
use crate::services::job_service::JobService;
use crate::utils::normalize::{infer_work_type, normalized_key};
use crate::utils::time::now_rfc3339;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEET_RANGE: &str = "Sheet1!A:I";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

// Fixed column contract: Title, Company, Pay, Date Applied, Location,
// Status, Latest Email Subject, Latest Email Body, Notes (A..I).
const COL_TITLE: usize = 0;
const COL_COMPANY: usize = 1;
const COL_PAY: usize = 2;
const COL_DATE_APPLIED: usize = 3;
const COL_LOCATION: usize = 4;
const COL_STATUS: usize = 5;
const COL_EMAIL_SUBJECT: usize = 6;
const COL_EMAIL_BODY: usize = 7;
const COL_NOTES: usize = 8;
const SHEET_COLUMNS: usize = 9;

/// The external email-tracking process writes these; map them into the
/// app's status vocabulary.
pub fn status_from_sheet(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().as_str() {
        "applied" => "applied",
        "rejected" => "rejected",
        "interview" => "interview",
        "offer" => "offer",
        "interested" => "interested",
        "stale" | "" => "none",
        _ => "applied",
    }
}

pub fn status_to_sheet(status: &str) -> String {
    match status {
        "applied" | "none" => "Applied".to_string(),
        "rejected" => "Rejected".to_string(),
        "interview" => "Interview".to_string(),
        "offer" => "Offer".to_string(),
        "interested" => "Interested".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetRow {
    pub row_index: i64,
    pub title: String,
    pub company: String,
    pub pay: Option<i64>,
    pub date_applied: String,
    pub location: String,
    pub status: String,
    pub email_subject: String,
    pub email_body: String,
    pub notes: String,
    pub key: String,
}

/// What a pull would change on one matched store row. Sheet status wins
/// whenever it differs and is meaningful; notes only fill a blank field.
#[derive(Debug, Default, PartialEq)]
pub struct PullChanges {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub sheet_row: Option<i64>,
}

impl PullChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.notes.is_none() && self.sheet_row.is_none()
    }
}

pub fn decide_pull_changes(job: &Job, row: &SheetRow) -> PullChanges {
    let mut changes = PullChanges::default();
    if row.status != "none" && row.status != job.app_status {
        changes.status = Some(row.status.clone());
    }
    if !row.notes.is_empty() && job.notes.is_empty() {
        changes.notes = Some(row.notes.clone());
    }
    if job.sheet_row != Some(row.row_index) {
        changes.sheet_row = Some(row.row_index);
    }
    changes
}

/// Parse the raw values payload. Header row is skipped; data rows are
/// 1-indexed sheet rows starting at 2. Short rows are padded so the
/// column contract always holds.
pub fn parse_rows(body: &JsonValue) -> Vec<SheetRow> {
    let Some(values) = body.get("values").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    let mut rows = Vec::new();
    for (i, raw) in values.iter().skip(1).enumerate() {
        let mut cells: Vec<String> = raw
            .as_array()
            .map(|a| {
                a.iter()
                    .map(|c| c.as_str().unwrap_or("").trim().to_string())
                    .collect()
            })
            .unwrap_or_default();
        cells.resize(SHEET_COLUMNS, String::new());

        let title = cells[COL_TITLE].clone();
        let company = cells[COL_COMPANY].clone();
        if title.is_empty() && company.is_empty() {
            continue;
        }

        rows.push(SheetRow {
            row_index: (i + 2) as i64,
            key: normalized_key(&title, &company),
            pay: parse_pay(&cells[COL_PAY]),
            date_applied: cells[COL_DATE_APPLIED].clone(),
            location: cells[COL_LOCATION].clone(),
            status: status_from_sheet(&cells[COL_STATUS]).to_string(),
            email_subject: cells[COL_EMAIL_SUBJECT].clone(),
            email_body: cells[COL_EMAIL_BODY].clone(),
            notes: cells[COL_NOTES].clone(),
            title,
            company,
        });
    }
    rows
}

fn parse_pay(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct GoogleClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct SheetsService {
    client: Client,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

impl SheetsService {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            token_cache: Arc::new(Mutex::new(None)),
        }
    }

    async fn access_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.lock().await;
            if let Some(token) = cache.as_ref() {
                if token.expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let creds_path = &crate::config::get_config().sheets_credentials_path;
        let raw = tokio::fs::read_to_string(creds_path).await.map_err(|_| {
            Error::BadRequest(format!(
                "Credentials file not found at: {}. Upload a service-account key first.",
                creds_path
            ))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| Error::BadRequest(format!("Invalid service-account key file: {}", e)))?;

        let iat = chrono::Utc::now().timestamp();
        let claims = GoogleClaims {
            iss: key.client_email.clone(),
            scope: SHEETS_SCOPE.to_string(),
            aud: key.token_uri.clone(),
            iat,
            exp: iat + 3600,
        };
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::BadRequest(format!("Service-account private key rejected: {}", e)))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| Error::Internal(format!("token signing failed: {}", e)))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SheetPermission(format!(
                "Token exchange failed ({}): {}",
                status, body
            )));
        }
        let token: TokenResponse = response.json().await?;

        let expires_in = if token.expires_in == 0 { 3600 } else { token.expires_in };
        let mut cache = self.token_cache.lock().await;
        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });
        Ok(token.access_token)
    }

    fn sheet_error(status: StatusCode) -> Error {
        match status {
            StatusCode::FORBIDDEN => Error::SheetPermission(
                "Permission denied. Share the sheet with the service account email (Editor access)."
                    .to_string(),
            ),
            StatusCode::NOT_FOUND => Error::SheetNotFound(
                "Sheet not found. Check the Sheet ID and that you shared it with the service account."
                    .to_string(),
            ),
            other => Error::Internal(format!("Sheets API returned {}", other)),
        }
    }

    pub async fn verify(&self, sheet_id: &str) -> Result<String> {
        let token = self.access_token().await?;
        let url = format!("{}/{}?fields=properties.title", SHEETS_API_BASE, sheet_id);
        let response = self.client.get(url).bearer_auth(&token).send().await?;
        if !response.status().is_success() {
            return Err(Self::sheet_error(response.status()));
        }
        let body: JsonValue = response.json().await?;
        let title = body
            .get("properties")
            .and_then(|p| p.get("title"))
            .and_then(|t| t.as_str())
            .unwrap_or("Unknown");
        Ok(format!("Connected to: {}", title))
    }

    pub async fn fetch_rows(&self, sheet_id: &str) -> Result<Vec<SheetRow>> {
        let token = self.access_token().await?;
        let url = format!("{}/{}/values/{}", SHEETS_API_BASE, sheet_id, SHEET_RANGE);
        let response = self.client.get(url).bearer_auth(&token).send().await?;
        if !response.status().is_success() {
            return Err(Self::sheet_error(response.status()));
        }
        let body: JsonValue = response.json().await?;
        Ok(parse_rows(&body))
    }

    async fn write_status(
        &self,
        sheet_id: &str,
        sheet_row: i64,
        status: &str,
        notes: Option<&str>,
    ) -> Result<()> {
        let token = self.access_token().await?;
        let mut data = vec![serde_json::json!({
            "range": format!("Sheet1!F{}", sheet_row),
            "values": [[status_to_sheet(status)]]
        })];
        if let Some(notes) = notes {
            data.push(serde_json::json!({
                "range": format!("Sheet1!I{}", sheet_row),
                "values": [[notes]]
            }));
        }
        let url = format!("{}/{}/values:batchUpdate", SHEETS_API_BASE, sheet_id);
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "valueInputOption": "USER_ENTERED",
                "data": data
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::sheet_error(response.status()));
        }
        Ok(())
    }

    async fn append_row(&self, sheet_id: &str, job: &Job) -> Result<()> {
        let token = self.access_token().await?;
        let date_applied = chrono::Utc::now().format("%-m/%-d/%Y").to_string();
        let salary = job
            .salary_max
            .or(job.salary_min)
            .map(|s| s.to_string())
            .unwrap_or_default();
        let location = if !job.work_type.is_empty() && !job.location.contains(&job.work_type) {
            format!("{} {}", job.location, job.work_type).trim().to_string()
        } else {
            job.location.clone()
        };

        let row = serde_json::json!([
            job.title,
            job.company,
            salary,
            date_applied,
            location,
            "Applied",
            "",
            "",
            job.notes,
        ]);

        let url = format!(
            "{}/{}/values/{}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
            SHEETS_API_BASE, sheet_id, SHEET_RANGE
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "values": [row] }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::sheet_error(response.status()));
        }
        Ok(())
    }

    /// Pull sheet → store. Idempotent: a second pull with no external
    /// changes writes nothing.
    pub async fn pull(
        &self,
        jobs: &JobService,
        user_id: i64,
        sheet_id: &str,
    ) -> Result<PullSummary> {
        let rows = self.fetch_rows(sheet_id).await?;
        let summary = Self::apply_pull(jobs, user_id, &rows).await?;
        log_sync(
            jobs.pool(),
            user_id,
            "pull",
            summary.inserted,
            summary.updated,
            0,
            0,
            0,
            "success",
        )
        .await?;
        Ok(summary)
    }

    /// The database half of a pull, separated from the network fetch.
    /// Matched rows: sheet status wins; blank store notes are filled;
    /// sheet_row is re-synced. Unmatched rows become minimal from-sheet
    /// records — title/company/location only, nothing invented.
    pub async fn apply_pull(
        jobs: &JobService,
        user_id: i64,
        rows: &[SheetRow],
    ) -> Result<PullSummary> {
        let mut summary = PullSummary {
            total: rows.len() as i64,
            ..Default::default()
        };
        for row in rows {
            match jobs.find_by_norm_key(user_id, &row.key).await? {
                Some(job) => {
                    let changes = decide_pull_changes(&job, row);
                    if changes.is_empty() {
                        summary.skipped += 1;
                    } else {
                        jobs.update_from_sheet(
                            job.id,
                            changes.status.as_deref(),
                            changes.notes.as_deref(),
                            changes.sheet_row,
                        )
                        .await?;
                        summary.updated += 1;
                    }
                }
                None => {
                    let pseudo_id = format!(
                        "sheet_{}",
                        crate::utils::normalize::synthesized_job_id(
                            "row",
                            &row.title,
                            &row.company,
                            &row.date_applied
                        )
                    );
                    let inserted = jobs
                        .insert_sheet_job(
                            user_id,
                            &pseudo_id,
                            &row.title,
                            &row.company,
                            &row.location,
                            infer_work_type("", &row.location),
                            &row.status,
                            &row.notes,
                            row.row_index,
                            &row.date_applied,
                        )
                        .await?;
                    if inserted {
                        summary.inserted += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Push store → sheet. Rows already linked get their status/notes
    /// cells updated; newly-applied rows are appended and then linked by
    /// re-reading the sheet.
    pub async fn push(
        &self,
        jobs: &JobService,
        user_id: i64,
        sheet_id: &str,
        job_ids: Option<&[i64]>,
    ) -> Result<PushSummary> {
        let mut summary = PushSummary::default();
        let to_push = jobs.jobs_for_push(user_id, job_ids).await?;

        for job in &to_push {
            let result = self.push_one(jobs, sheet_id, job).await;
            match result {
                Ok(Pushed::Updated) => summary.pushed += 1,
                Ok(Pushed::Appended) => summary.appended += 1,
                Ok(Pushed::Skipped) => {}
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(job_id = job.id, error = %e, "sheet push failed for job");
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        log_sync(
            jobs.pool(),
            user_id,
            "push",
            0,
            0,
            summary.pushed,
            summary.appended,
            summary.errors,
            if summary.errors == 0 { "success" } else { "partial" },
        )
        .await?;
        Ok(summary)
    }

    async fn push_one(&self, jobs: &JobService, sheet_id: &str, job: &Job) -> Result<Pushed> {
        if let Some(sheet_row) = job.sheet_row {
            let notes = (!job.notes.is_empty()).then_some(job.notes.as_str());
            self.write_status(sheet_id, sheet_row, &job.app_status, notes)
                .await?;
            return Ok(Pushed::Updated);
        }
        if job.app_status == "applied" {
            self.append_row(sheet_id, job).await?;
            let rows = self.fetch_rows(sheet_id).await?;
            let key = normalized_key(&job.title, &job.company);
            if let Some(row) = rows.iter().find(|r| r.key == key) {
                jobs.set_sheet_row(job.id, row.row_index).await?;
            }
            return Ok(Pushed::Appended);
        }
        Ok(Pushed::Skipped)
    }
}

enum Pushed {
    Updated,
    Appended,
    Skipped,
}

/// Best-effort single-row propagation after a user edit. The caller
/// spawns this; a failure is logged and never surfaced to the save.
pub async fn auto_push(
    sheets: SheetsService,
    jobs: JobService,
    sheet_id: String,
    user_id: i64,
    job_id: i64,
) {
    match sheets.push(&jobs, user_id, &sheet_id, Some(&[job_id])).await {
        Ok(summary) if summary.errors > 0 => {
            tracing::warn!(job_id, "auto-push completed with errors");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(job_id, error = %e, "auto-push failed");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn log_sync(
    pool: &SqlitePool,
    user_id: i64,
    direction: &str,
    inserted: i64,
    updated: i64,
    pushed: i64,
    appended: i64,
    errors: i64,
    status: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sheets_sync_log (user_id, synced_at, direction, inserted, updated, pushed, appended, errors, status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(user_id)
    .bind(now_rfc3339())
    .bind(direction)
    .bind(inserted)
    .bind(updated)
    .bind(pushed)
    .bind(appended)
    .bind(errors)
    .bind(status)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_with(status: &str, notes: &str, sheet_row: Option<i64>) -> Job {
        Job {
            id: 1,
            user_id: 1,
            job_id: "x".into(),
            norm_key: normalized_key("Software Engineer", "Acme"),
            title: "Software Engineer".into(),
            company: "Acme".into(),
            location: "Indianapolis, IN".into(),
            lat: None,
            lng: None,
            work_type: "Onsite".into(),
            salary_min: None,
            salary_max: None,
            salary_display: String::new(),
            match_score: 70,
            match_reasons: String::new(),
            description: String::new(),
            apply_url: String::new(),
            company_url: String::new(),
            source: "Adzuna".into(),
            date_found: String::new(),
            date_posted: String::new(),
            saved: true,
            hidden: false,
            notes: notes.into(),
            app_status: status.into(),
            is_new: false,
            sheet_row,
            from_sheet: false,
        }
    }

    fn sheet_row(status: &str, notes: &str, row_index: i64) -> SheetRow {
        SheetRow {
            row_index,
            title: "Software Engineer".into(),
            company: "Acme".into(),
            pay: None,
            date_applied: "8/1/2026".into(),
            location: "Indianapolis, IN".into(),
            status: status.into(),
            email_subject: String::new(),
            email_body: String::new(),
            notes: notes.into(),
            key: normalized_key("Software Engineer", "Acme"),
        }
    }

    #[test]
    fn sheet_status_wins_when_it_differs() {
        let job = job_with("applied", "", Some(2));
        let row = sheet_row("interview", "", 2);
        let changes = decide_pull_changes(&job, &row);
        assert_eq!(changes.status.as_deref(), Some("interview"));
        assert_eq!(changes.notes, None);
        assert_eq!(changes.sheet_row, None);
    }

    #[test]
    fn none_status_from_sheet_never_overwrites() {
        let job = job_with("applied", "", Some(2));
        let row = sheet_row("none", "", 2);
        assert!(decide_pull_changes(&job, &row).is_empty());
    }

    #[test]
    fn notes_only_fill_blank_store_notes() {
        let job = job_with("applied", "my own notes", Some(2));
        let row = sheet_row("applied", "sheet notes", 2);
        assert!(decide_pull_changes(&job, &row).is_empty());

        let blank = job_with("applied", "", Some(2));
        let changes = decide_pull_changes(&blank, &sheet_row("applied", "sheet notes", 2));
        assert_eq!(changes.notes.as_deref(), Some("sheet notes"));
    }

    #[test]
    fn pull_decision_is_idempotent_after_application() {
        let job = job_with("applied", "", None);
        let row = sheet_row("interview", "followed up", 7);
        let first = decide_pull_changes(&job, &row);
        assert!(!first.is_empty());

        let mut synced = job_with("interview", "followed up", Some(7));
        synced.notes = "followed up".into();
        assert!(decide_pull_changes(&synced, &row).is_empty());
    }

    #[test]
    fn status_maps_follow_the_email_tracker_vocabulary() {
        assert_eq!(status_from_sheet("Interview"), "interview");
        assert_eq!(status_from_sheet("STALE"), "none");
        assert_eq!(status_from_sheet(""), "none");
        assert_eq!(status_from_sheet("something odd"), "applied");

        assert_eq!(status_to_sheet("none"), "Applied");
        assert_eq!(status_to_sheet("interested"), "Interested");
        assert_eq!(status_to_sheet("offer"), "Offer");
    }

    #[test]
    fn rows_parse_with_padding_and_header_skip() {
        let body = json!({
            "values": [
                ["Title", "Company", "Pay", "Date Applied", "Location", "Status",
                 "Latest Email Subject", "Latest Email Body", "Notes"],
                ["Software Engineer", "Acme", "$70,000", "8/1/2026", "Indianapolis, IN",
                 "Interview", "Re: interview", "See you Tuesday", "bring portfolio"],
                ["QA Engineer", "Globex"],
                ["", "", "", "", "", "", "", "", ""]
            ]
        });
        let rows = parse_rows(&body);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_index, 2);
        assert_eq!(rows[0].pay, Some(70000));
        assert_eq!(rows[0].status, "interview");
        assert_eq!(rows[1].row_index, 3);
        assert_eq!(rows[1].status, "none");
        assert_eq!(rows[1].notes, "");
    }
}
