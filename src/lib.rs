pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    fetch_service::FetchService, job_service::JobService, match_service::MatchService,
    quota_service::QuotaService, scrape_service::ScrapeState, settings_service::SettingsService,
    sheets_service::SheetsService, user_service::UserService,
};
use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub job_service: JobService,
    pub user_service: UserService,
    pub settings_service: SettingsService,
    pub quota_service: QuotaService,
    pub fetch_service: FetchService,
    pub match_service: MatchService,
    pub sheets_service: SheetsService,
    pub scrape_state: Arc<ScrapeState>,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap();

        let job_service = JobService::new(pool.clone());
        let user_service = UserService::new(pool.clone());
        let settings_service = SettingsService::new(pool.clone());
        let quota_service = QuotaService::new(pool.clone());
        let fetch_service = FetchService::new(http_client.clone());
        let match_service = MatchService::new(http_client.clone());
        let sheets_service = SheetsService::new(http_client);

        Self {
            pool,
            job_service,
            user_service,
            settings_service,
            quota_service,
            fetch_service,
            match_service,
            sheets_service,
            scrape_state: Arc::new(ScrapeState::new()),
        }
    }
}

/// Full application router; used by main and by the API tests.
pub fn build_router(state: AppState) -> Router {
    let public_api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/auth/login", post(routes::auth_routes::login));

    let session_api = Router::new()
        .route("/api/jobs", get(routes::job_routes::list_jobs))
        .route("/api/jobs/:id/save", post(routes::job_routes::toggle_save))
        .route("/api/jobs/:id/hide", post(routes::job_routes::hide_job))
        .route("/api/jobs/:id/status", post(routes::job_routes::update_status))
        .route("/api/jobs/:id/notes", post(routes::job_routes::update_notes))
        .route("/api/jobs/seen", post(routes::job_routes::mark_seen))
        .route("/api/stats", get(routes::job_routes::stats))
        .route("/api/export", get(routes::export::export_jobs))
        .route("/api/scrape", post(routes::scrape_routes::trigger_scrape))
        .route("/api/scrape/status", get(routes::scrape_routes::scrape_status))
        .route("/api/scrape/runs", get(routes::scrape_routes::list_runs))
        .route("/api/rescore", post(routes::scrape_routes::rescore))
        .route(
            "/api/settings",
            get(routes::settings_routes::get_settings).post(routes::settings_routes::save_settings),
        )
        .route(
            "/api/locations",
            get(routes::settings_routes::list_locations).post(routes::settings_routes::add_location),
        )
        .route(
            "/api/locations/:id",
            axum::routing::delete(routes::settings_routes::delete_location),
        )
        .route("/api/profile/resume", post(routes::settings_routes::update_resume))
        .route("/api/profile/context", post(routes::settings_routes::update_context))
        .route("/api/sheets/config", get(routes::sheets_routes::get_link))
        .route("/api/sheets/log", get(routes::sheets_routes::sync_log))
        .route("/api/sheets/verify", post(routes::sheets_routes::verify))
        .route("/api/sheets/pull", post(routes::sheets_routes::pull))
        .route("/api/sheets/push", post(routes::sheets_routes::push))
        .layer(axum::middleware::from_fn(middleware::auth::require_session));

    public_api.merge(session_api).with_state(state)
}
