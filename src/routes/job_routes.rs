use crate::dto::job_dto::{JobListQuery, NotesPayload, SavePayload, StatsResponse, StatusPayload};
use crate::middleware::auth::Claims;
use crate::models::job::Job;
use crate::services::job_service::JobFilter;
use crate::services::sheets_service;
use crate::{error::Result, AppState};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::json;

pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<Job>>> {
    let filter = JobFilter {
        work_type: query.work_type,
        min_score: query.min_score,
        search: query.search,
        saved_only: query.saved.unwrap_or(false),
        status: query.status,
        source: query.source,
        include_hidden: query.hidden.unwrap_or(false),
        sort: query.sort,
    };
    let jobs = state.job_service.list_jobs(claims.uid, &filter).await?;
    Ok(Json(jobs))
}

pub async fn toggle_save(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SavePayload>,
) -> Result<Json<serde_json::Value>> {
    state.job_service.set_saved(claims.uid, id, payload.saved).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn hide_job(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    state.job_service.set_hidden(claims.uid, id).await?;
    Ok(Json(json!({"ok": true})))
}

/// The save commits first; any enabled auto-push happens after the
/// response is already on its way and can only ever log a failure.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<serde_json::Value>> {
    state
        .job_service
        .set_status(claims.uid, id, &payload.status)
        .await?;
    spawn_auto_push(&state, claims.uid, id).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn update_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<NotesPayload>,
) -> Result<Json<serde_json::Value>> {
    state
        .job_service
        .set_notes(claims.uid, id, &payload.notes)
        .await?;
    spawn_auto_push(&state, claims.uid, id).await?;
    Ok(Json(json!({"ok": true})))
}

async fn spawn_auto_push(state: &AppState, user_id: i64, job_id: i64) -> Result<()> {
    if !state.settings_service.get_bool("sheets_auto_push").await? {
        return Ok(());
    }
    let sheet_id = state.settings_service.get("sheets_id").await?;
    if sheet_id.is_empty() {
        return Ok(());
    }
    let sheets = state.sheets_service.clone();
    let jobs = state.job_service.clone();
    tokio::spawn(sheets_service::auto_push(sheets, jobs, sheet_id, user_id, job_id));
    Ok(())
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>> {
    state.job_service.mark_seen(claims.uid).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatsResponse>> {
    let (total, saved, unscored, fresh) = state.job_service.stats(claims.uid).await?;
    let last_scrape = state.settings_service.get("last_scrape").await?;
    let snapshot = state.scrape_state.snapshot();
    Ok(Json(StatsResponse {
        total,
        saved,
        unscored,
        new_since_last_view: fresh,
        last_scrape,
        scrape_running: snapshot.running,
        scrape_progress: snapshot.progress,
    }))
}
