use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension,
};
use crate::dto::job_dto::ExportQuery;
use crate::middleware::auth::Claims;
use crate::services::export_service::ExportService;
use crate::services::job_service::JobFilter;
use crate::{AppState, error::Result};

/// Tabular export of the visible job set, CSV by default, XLSX on request.
pub async fn export_jobs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse> {
    let filter = JobFilter {
        saved_only: query.saved.unwrap_or(false),
        include_hidden: query.include_hidden.unwrap_or(false),
        ..Default::default()
    };
    let jobs = state.job_service.list_jobs(claims.uid, &filter).await?;
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M");

    match query.format.as_deref() {
        Some("xlsx") => {
            let buffer = ExportService::generate_jobs_xlsx(&jobs, &claims.sub)?;
            let disposition = format!("attachment; filename=\"jobs_export_{}.xlsx\"", stamp);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                buffer,
            ))
        }
        _ => {
            let csv = ExportService::generate_jobs_csv(&jobs);
            let disposition = format!("attachment; filename=\"jobs_export_{}.csv\"", stamp);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv.into_bytes(),
            ))
        }
    }
}
