use crate::dto::auth_dto::{LoginPayload, LoginResponse};
use crate::middleware::auth::issue_token;
use crate::{error::Result, AppState};
use axum::{extract::State, Json};
use validator::Validate;

/// Username-only login; the profile (and its default search locations)
/// is created on first use.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>> {
    payload.validate()?;
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(crate::error::Error::BadRequest("Username is required".into()));
    }

    let user = state.user_service.get_or_create(username).await?;
    let token = issue_token(&user.username, user.id)?;
    Ok(Json(LoginResponse {
        token,
        username: user.username,
        user_id: user.id,
    }))
}
