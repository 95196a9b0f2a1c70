use crate::middleware::auth::Claims;
use crate::models::scrape_run::ScrapeRun;
use crate::services::scrape_service::{self, ScrapeStatus};
use crate::{error::Result, AppState};
use axum::{extract::State, Extension, Json};
use serde_json::json;

/// Starts one run. A request while a run is active is rejected, not
/// queued: both would contend on the unscored set and the quota counters.
pub async fn trigger_scrape(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>> {
    if !state.scrape_state.try_begin() {
        return Err(crate::error::Error::Conflict("Scrape already running".into()));
    }
    let task_state = state.clone();
    tokio::spawn(scrape_service::run_scrape(task_state, claims.uid));
    Ok(Json(json!({"ok": true})))
}

pub async fn scrape_status(State(state): State<AppState>) -> Result<Json<ScrapeStatus>> {
    Ok(Json(state.scrape_state.snapshot()))
}

pub async fn list_runs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ScrapeRun>>> {
    let runs = state.job_service.list_runs(claims.uid, 20).await?;
    Ok(Json(runs))
}

/// Re-run only the scoring stage over still-unscored jobs. Shares the
/// single run slot with the scrape.
pub async fn rescore(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>> {
    if !state.scrape_state.try_begin() {
        return Err(crate::error::Error::Conflict("Scrape already running".into()));
    }
    let task_state = state.clone();
    tokio::spawn(scrape_service::run_rescore(task_state, claims.uid));
    Ok(Json(json!({"ok": true})))
}
