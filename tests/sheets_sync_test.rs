use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

use jobhunter_backend::models::job::JobCandidate;
use jobhunter_backend::services::sheets_service::{parse_rows, SheetsService};
use jobhunter_backend::AppState;

async fn setup_state() -> AppState {
    std::env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    std::env::set_var("DATABASE_URL", "sqlite::memory:");
    std::env::set_var("SESSION_SECRET", "test_secret_key");
    jobhunter_backend::config::init_config().ok();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("pool");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");

    let state = AppState::new(pool);
    state.settings_service.ensure_defaults().await.expect("defaults");
    state
}

async fn seed_user_with_job(state: &AppState, status: &str) -> i64 {
    let user = state.user_service.get_or_create("tristan").await.unwrap();
    let candidate = JobCandidate {
        job_id: "test_swe_acme".to_string(),
        title: "Software Engineer".to_string(),
        company: "Acme".to_string(),
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
    };
    state
        .job_service
        .upsert_candidates(user.id, &[candidate])
        .await
        .unwrap();
    let jobs = state
        .job_service
        .list_jobs(user.id, &Default::default())
        .await
        .unwrap();
    state
        .job_service
        .set_status(user.id, jobs[0].id, status)
        .await
        .unwrap();
    user.id
}

fn sheet_values(status: &str, notes: &str) -> serde_json::Value {
    json!({
        "values": [
            ["Title", "Company", "Pay", "Date Applied", "Location", "Status",
             "Latest Email Subject", "Latest Email Body", "Notes"],
            ["Software Engineer", "Acme", "", "8/1/2026", "Indianapolis, IN",
             status, "Re: application", "Thanks for applying", notes]
        ]
    })
}

#[tokio::test]
async fn sheet_status_overwrites_store_status_on_pull() {
    let state = setup_state().await;
    let user_id = seed_user_with_job(&state, "applied").await;

    let rows = parse_rows(&sheet_values("Interview", ""));
    let summary = SheetsService::apply_pull(&state.job_service, user_id, &rows)
        .await
        .unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.inserted, 0);

    let jobs = state
        .job_service
        .list_jobs(user_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(jobs[0].app_status, "interview");
    assert_eq!(jobs[0].sheet_row, Some(2));
}

#[tokio::test]
async fn pull_is_idempotent_with_no_external_changes() {
    let state = setup_state().await;
    let user_id = seed_user_with_job(&state, "applied").await;

    let rows = parse_rows(&sheet_values("Interview", "phone screen Friday"));
    let first = SheetsService::apply_pull(&state.job_service, user_id, &rows)
        .await
        .unwrap();
    assert_eq!(first.updated, 1);

    let second = SheetsService::apply_pull(&state.job_service, user_id, &rows)
        .await
        .unwrap();
    assert_eq!(second.updated, 0);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, second.total);

    let jobs = state
        .job_service
        .list_jobs(user_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(jobs[0].app_status, "interview");
    assert_eq!(jobs[0].notes, "phone screen Friday");
}

#[tokio::test]
async fn user_notes_are_not_clobbered_by_sheet_notes() {
    let state = setup_state().await;
    let user_id = seed_user_with_job(&state, "applied").await;
    let jobs = state
        .job_service
        .list_jobs(user_id, &Default::default())
        .await
        .unwrap();
    state
        .job_service
        .set_notes(user_id, jobs[0].id, "my own research")
        .await
        .unwrap();

    let rows = parse_rows(&sheet_values("Applied", "sheet says otherwise"));
    SheetsService::apply_pull(&state.job_service, user_id, &rows)
        .await
        .unwrap();

    let jobs = state
        .job_service
        .list_jobs(user_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(jobs[0].notes, "my own research");
}

#[tokio::test]
async fn unmatched_sheet_rows_become_minimal_records_without_invented_detail() {
    let state = setup_state().await;
    let user = state.user_service.get_or_create("tristan").await.unwrap();

    let body = json!({
        "values": [
            ["Title", "Company", "Pay", "Date Applied", "Location", "Status",
             "Latest Email Subject", "Latest Email Body", "Notes"],
            ["Platform Engineer", "Initech", "$95,000", "7/15/2026", "Remote",
             "Rejected", "", "", "ghosted after onsite"]
        ]
    });
    let rows = parse_rows(&body);
    let summary = SheetsService::apply_pull(&state.job_service, user.id, &rows)
        .await
        .unwrap();
    assert_eq!(summary.inserted, 1);

    let jobs = state
        .job_service
        .list_jobs(user.id, &Default::default())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.title, "Platform Engineer");
    assert_eq!(job.company, "Initech");
    assert_eq!(job.location, "Remote");
    assert_eq!(job.work_type, "Remote");
    assert_eq!(job.app_status, "rejected");
    assert_eq!(job.notes, "ghosted after onsite");
    assert!(job.from_sheet);
    assert_eq!(job.source, "Sheets Import");
    // No listing detail is invented for sheet-only rows.
    assert_eq!(job.match_score, -1);
    assert_eq!(job.salary_min, None);
    assert_eq!(job.description, "");
    assert_eq!(job.apply_url, "");

    // A second pull of the same sheet changes nothing further.
    let again = SheetsService::apply_pull(&state.job_service, user.id, &rows)
        .await
        .unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.updated, 0);
}
