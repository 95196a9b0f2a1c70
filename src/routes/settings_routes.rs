use crate::dto::settings_dto::{
    ContextPayload, LocationPayload, ResumePayload, SettingsPayload, SettingsResponse,
};
use crate::middleware::auth::Claims;
use crate::models::user::SearchLocation;
use crate::{error::Result, AppState};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::json;
use validator::Validate;

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsResponse>> {
    let values = state.settings_service.masked_settings().await?;
    Ok(Json(SettingsResponse { values }))
}

pub async fn save_settings(
    State(state): State<AppState>,
    Json(payload): Json<SettingsPayload>,
) -> Result<Json<serde_json::Value>> {
    let written = state.settings_service.apply_updates(&payload.values).await?;
    Ok(Json(json!({"ok": true, "written": written})))
}

pub async fn list_locations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SearchLocation>>> {
    let locations = state.user_service.list_locations(claims.uid).await?;
    Ok(Json(locations))
}

pub async fn add_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<LocationPayload>,
) -> Result<Json<SearchLocation>> {
    payload.validate()?;
    let location = state
        .user_service
        .add_location(
            claims.uid,
            payload.city.trim(),
            payload.state.as_deref().unwrap_or("").trim(),
            payload.label.as_deref().unwrap_or("").trim(),
            payload.radius_miles.unwrap_or(30),
            payload.active.unwrap_or(true),
        )
        .await?;
    Ok(Json(location))
}

pub async fn delete_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    state.user_service.delete_location(claims.uid, id).await?;
    Ok(Json(json!({"ok": true})))
}

/// Resume arrives as already-extracted text; parsing uploaded documents
/// happens outside this service.
pub async fn update_resume(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ResumePayload>,
) -> Result<Json<serde_json::Value>> {
    payload.validate()?;
    state
        .user_service
        .update_resume(
            claims.uid,
            &payload.resume_text,
            payload.resume_name.as_deref().unwrap_or(""),
        )
        .await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn update_context(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ContextPayload>,
) -> Result<Json<serde_json::Value>> {
    state
        .user_service
        .update_context(claims.uid, &payload.ai_context)
        .await?;
    Ok(Json(json!({"ok": true})))
}
