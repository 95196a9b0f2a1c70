use crate::error::Result;
use crate::services::fetch_service::ProviderCreds;
use crate::services::job_service::dedup_batch;
use crate::services::match_service::AiConfig;
use crate::services::quota_service::board_queries_allowed;
use crate::AppState;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Progress log shared between the run and the status endpoint.
pub struct ScrapeLogger {
    progress: Mutex<String>,
    lines: Mutex<Vec<String>>,
}

impl ScrapeLogger {
    fn new() -> Self {
        Self {
            progress: Mutex::new(String::new()),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self, msg: &str) {
        tracing::info!("{}", msg);
        let stamp = chrono::Utc::now().format("%H:%M:%S");
        let mut lines = self.lines.lock().expect("scrape log mutex poisoned");
        lines.push(format!("[{}] {}", stamp, msg));
        let mut progress = self.progress.lock().expect("scrape progress mutex poisoned");
        *progress = msg.to_string();
    }

    fn reset(&self) {
        self.lines.lock().expect("scrape log mutex poisoned").clear();
        self.progress
            .lock()
            .expect("scrape progress mutex poisoned")
            .clear();
    }
}

/// Explicit run state owned by AppState: one scrape at a time, a second
/// trigger is rejected rather than queued.
pub struct ScrapeState {
    running: AtomicBool,
    logger: ScrapeLogger,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeStatus {
    pub running: bool,
    pub progress: String,
    pub log: Vec<String>,
}

impl ScrapeState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            logger: ScrapeLogger::new(),
        }
    }

    /// Claims the single run slot; false means a run is already active.
    pub fn try_begin(&self) -> bool {
        let claimed = self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            self.logger.reset();
        }
        claimed
    }

    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn logger(&self) -> &ScrapeLogger {
        &self.logger
    }

    pub fn snapshot(&self) -> ScrapeStatus {
        ScrapeStatus {
            running: self.is_running(),
            progress: self
                .logger
                .progress
                .lock()
                .expect("scrape progress mutex poisoned")
                .clone(),
            log: self
                .logger
                .lines
                .lock()
                .expect("scrape log mutex poisoned")
                .clone(),
        }
    }
}

impl Default for ScrapeState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct RunCounts {
    fetched: i64,
    new: i64,
    scored: i64,
    general_calls: i64,
    board_calls: i64,
    ai_calls: i64,
    budget_notes: Vec<String>,
}

/// One full scrape: fetch → pre-filter → dedup → persist → score. The
/// caller must already hold the run slot (`try_begin`); this releases it.
/// Failed stages are logged into the run record, never panicked across.
pub async fn run_scrape(state: AppState, user_id: i64) {
    let logger = state.scrape_state.logger();
    let run_uuid = Uuid::new_v4().to_string();

    let run_row = match state.job_service.start_run(&run_uuid, user_id).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "could not record scrape run start");
            state.scrape_state.finish();
            return;
        }
    };

    logger.log("Starting scrape...");
    let mut counts = RunCounts::default();
    let status = match run_stages(&state, user_id, &mut counts).await {
        Ok(()) => "success".to_string(),
        Err(e) => {
            logger.log(&format!("Scrape failed: {}", e));
            format!("error: {}", e)
        }
    };

    let budget_note = counts.budget_notes.join("; ");
    if let Err(e) = state
        .job_service
        .finalize_run(
            run_row,
            counts.fetched,
            counts.new,
            counts.scored,
            counts.general_calls,
            counts.board_calls,
            counts.ai_calls,
            &budget_note,
            &status,
        )
        .await
    {
        tracing::error!(error = %e, "could not finalize scrape run");
    }
    if status == "success" {
        let _ = state
            .settings_service
            .set("last_scrape", &crate::utils::time::now_rfc3339())
            .await;
        logger.log(&format!("Done! {} new jobs saved.", counts.new));
    }
    state.scrape_state.finish();
}

async fn run_stages(state: &AppState, user_id: i64, counts: &mut RunCounts) -> Result<()> {
    let logger = state.scrape_state.logger();
    let settings = &state.settings_service;

    let creds = ProviderCreds {
        adzuna_app_id: settings.get("adzuna_app_id").await?,
        adzuna_app_key: settings.get("adzuna_app_key").await?,
        jsearch_key: settings.get("jsearch_key").await?,
    };
    let roles = csv_values(&settings.get("search_roles").await?);
    let targets = csv_values(&settings.get("company_targets").await?);
    let locations = state.user_service.active_locations(user_id).await?;

    // General role/location provider, bounded by the daily window.
    let daily_limit = settings.get_i64("adzuna_daily_limit", 250).await?;
    let daily_used = state.quota_service.daily_general_calls().await?;
    let remaining_daily = (daily_limit - daily_used).max(0);
    let general = state
        .fetch_service
        .search_general(&creds, &roles, &locations, remaining_daily, logger)
        .await?;
    counts.general_calls = general.calls;
    state.quota_service.record_general_calls(general.calls).await?;
    if let Some(note) = general.budget_note {
        counts.budget_notes.push(note);
    }

    // Company-board provider, bounded by the monthly window with the
    // safety margin applied before any query goes out.
    let monthly_limit = settings.get_i64("jsearch_monthly_limit", 200).await?;
    let monthly_used = state.quota_service.monthly_board_calls().await?;
    let remaining_monthly = (monthly_limit - monthly_used).max(0);
    let allowed = board_queries_allowed(remaining_monthly, targets.len());
    let boards = state
        .fetch_service
        .search_company_boards(&creds, &targets, allowed, logger)
        .await?;
    counts.board_calls = boards.calls;
    state.quota_service.record_board_calls(boards.calls).await?;
    if let Some(note) = boards.budget_note {
        counts.budget_notes.push(note);
    }

    let mut candidates = general.candidates;
    candidates.extend(boards.candidates);
    let deduped = dedup_batch(candidates);
    counts.fetched = deduped.len() as i64;
    logger.log(&format!("Found {} unique listings. Saving...", deduped.len()));

    let upsert = state.job_service.upsert_candidates(user_id, &deduped).await?;
    counts.new = upsert.inserted;
    logger.log(&format!(
        "Saved {} new jobs ({} duplicates, {} backfilled)",
        upsert.inserted, upsert.duplicates, upsert.backfilled
    ));

    let outcome = score_pending_for_user(state, user_id).await?;
    counts.scored = outcome.scored;
    counts.ai_calls = outcome.ai_calls;
    Ok(())
}

/// Scoring pass shared by the scrape run and the rescore endpoint.
pub async fn score_pending_for_user(
    state: &AppState,
    user_id: i64,
) -> Result<crate::services::match_service::ScoreOutcome> {
    let logger = state.scrape_state.logger();
    let settings = &state.settings_service;
    let user = state.user_service.get_by_id(user_id).await?;

    if user.resume_text.is_empty() {
        logger.log("AI matching: skipped (no resume on file)");
        return Ok(Default::default());
    }

    let cfg = AiConfig {
        api_url: settings.get("ai_api_url").await?,
        api_key: settings.get("ai_api_key").await?,
        model: settings.get("ai_model").await?,
    };

    state
        .match_service
        .score_pending(
            &state.job_service,
            &state.quota_service,
            &cfg,
            &user.resume_text,
            &user.ai_context,
            user_id,
            logger,
        )
        .await
}

/// Rescore path: same run slot, scoring stage only.
pub async fn run_rescore(state: AppState, user_id: i64) {
    let logger = state.scrape_state.logger();
    logger.log("Rescoring unscored jobs...");
    if let Err(e) = score_pending_for_user(&state, user_id).await {
        logger.log(&format!("Rescore failed: {}", e));
    }
    state.scrape_state.finish();
}

fn csv_values(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_slot_is_exclusive_until_finished() {
        let state = ScrapeState::new();
        assert!(state.try_begin());
        assert!(!state.try_begin());
        state.finish();
        assert!(state.try_begin());
        state.finish();
    }

    #[test]
    fn logger_snapshot_carries_progress_and_lines() {
        let state = ScrapeState::new();
        assert!(state.try_begin());
        state.logger().log("Starting scrape...");
        state.logger().log("Found 3 unique listings. Saving...");
        let snapshot = state.snapshot();
        assert!(snapshot.running);
        assert_eq!(snapshot.progress, "Found 3 unique listings. Saving...");
        assert_eq!(snapshot.log.len(), 2);
        assert!(snapshot.log[0].contains("Starting scrape..."));
        state.finish();
    }

    #[test]
    fn begin_resets_the_previous_run_log() {
        let state = ScrapeState::new();
        assert!(state.try_begin());
        state.logger().log("old line");
        state.finish();
        assert!(state.try_begin());
        assert!(state.snapshot().log.is_empty());
        state.finish();
    }

    #[test]
    fn csv_parsing_trims_and_drops_empties() {
        assert_eq!(
            csv_values(" software engineer, data analyst ,,qa engineer"),
            vec!["software engineer", "data analyst", "qa engineer"]
        );
        assert!(csv_values("").is_empty());
    }
}
