use crate::dto::sync_dto::{PullSummary, PushPayload, PushSummary, VerifyResponse};
use crate::middleware::auth::Claims;
use crate::models::sheet_link::{SheetLink, SheetsSyncLog};
use crate::{error::Result, AppState};
use axum::{extract::State, Extension, Json};

pub async fn get_link(State(state): State<AppState>) -> Result<Json<SheetLink>> {
    let settings = &state.settings_service;
    Ok(Json(SheetLink {
        sheet_id: settings.get("sheets_id").await?,
        credentials_path: crate::config::get_config().sheets_credentials_path.clone(),
        auto_push: settings.get_bool("sheets_auto_push").await?,
        last_sync: settings.get("sheets_last_sync").await?,
    }))
}

pub async fn sync_log(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SheetsSyncLog>>> {
    let rows = sqlx::query_as::<_, SheetsSyncLog>(
        r#"
        SELECT id, user_id, synced_at, direction, inserted, updated, pushed, appended, errors, status
        FROM sheets_sync_log WHERE user_id = ?1 ORDER BY id DESC LIMIT 20
        "#,
    )
    .bind(claims.uid)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

async fn configured_sheet_id(state: &AppState) -> Result<String> {
    let sheet_id = state.settings_service.get("sheets_id").await?;
    if sheet_id.is_empty() {
        return Err(crate::error::Error::BadRequest(
            "No sheet configured. Set the Sheet ID in Settings first.".into(),
        ));
    }
    Ok(sheet_id)
}

pub async fn verify(State(state): State<AppState>) -> Result<Json<VerifyResponse>> {
    let sheet_id = configured_sheet_id(&state).await?;
    let msg = state.sheets_service.verify(&sheet_id).await?;
    Ok(Json(VerifyResponse { ok: true, msg }))
}

/// Full pull; unlike the silent auto-push, a failure here is surfaced to
/// the caller with an actionable message.
pub async fn pull(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PullSummary>> {
    let sheet_id = configured_sheet_id(&state).await?;
    let summary = state
        .sheets_service
        .pull(&state.job_service, claims.uid, &sheet_id)
        .await?;
    state
        .settings_service
        .set("sheets_last_sync", &crate::utils::time::now_rfc3339())
        .await?;
    Ok(Json(summary))
}

pub async fn push(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PushPayload>,
) -> Result<Json<PushSummary>> {
    let sheet_id = configured_sheet_id(&state).await?;
    let summary = state
        .sheets_service
        .push(
            &state.job_service,
            claims.uid,
            &sheet_id,
            payload.job_ids.as_deref(),
        )
        .await?;
    state
        .settings_service
        .set("sheets_last_sync", &crate::utils::time::now_rfc3339())
        .await?;
    Ok(Json(summary))
}
