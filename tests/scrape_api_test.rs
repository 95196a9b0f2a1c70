use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::post,
    Json, Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use jobhunter_backend::models::job::JobCandidate;
use jobhunter_backend::services::scrape_service;
use jobhunter_backend::{build_router, AppState};

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

async fn login(state: &AppState, username: &str) -> (String, i64) {
    let app = build_router(state.clone());
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({"username": username}).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    (
        body["token"].as_str().unwrap().to_string(),
        body["user_id"].as_i64().unwrap(),
    )
}

fn authed_post(token: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn second_scrape_request_is_rejected_not_queued() {
    let state = setup_state().await;
    let (token, _) = login(&state, "tristan").await;

    assert!(state.scrape_state.try_begin());

    let app = build_router(state.clone());
    let resp = app
        .clone()
        .oneshot(authed_post(&token, "/api/scrape"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Rescore contends on the same unscored set, so it shares the slot.
    let resp = app
        .oneshot(authed_post(&token, "/api/rescore"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    state.scrape_state.finish();
}

#[tokio::test]
async fn scrape_with_no_credentials_completes_and_records_a_run() {
    let state = setup_state().await;
    let (token, user_id) = login(&state, "tristan").await;

    let app = build_router(state.clone());
    let resp = app
        .oneshot(authed_post(&token, "/api/scrape"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // No provider or AI credentials are configured, so the run skips
    // every external call and finishes quickly.
    let mut runs = Vec::new();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !state.scrape_state.is_running() {
            runs = state.job_service.list_runs(user_id, 20).await.unwrap();
            if !runs.is_empty() && runs[0].finished_at.is_some() {
                break;
            }
        }
    }
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "success");
    assert_eq!(runs[0].general_calls, 0);
    assert_eq!(runs[0].board_calls, 0);
    assert_eq!(runs[0].ai_calls, 0);
}

// ── AI scorer against a stub completion endpoint ─────────────────────────

fn stub_ai_router(fail_times: usize, counter: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/v1/chat/completions",
        post(move |Json(_body): Json<Value>| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < fail_times {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"error": "transient"})),
                    )
                } else {
                    let content =
                        "[{\"score\": 85, \"reasons\": \"Strong match\", \"work_type\": \"Remote\"}]";
                    (
                        StatusCode::OK,
                        Json(json!({
                            "choices": [{"message": {"content": content}}]
                        })),
                    )
                }
            }
        }),
    )
}

async fn spawn_stub_ai(fail_times: usize) -> (String, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = stub_ai_router(fail_times, counter.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1/chat/completions", addr), counter)
}

fn unscored_candidate() -> JobCandidate {
    JobCandidate {
        job_id: "test_swe_acme".to_string(),
        title: "Software Engineer I".to_string(),
        company: "Acme Corp".to_string(),
        location: "Indianapolis, IN".to_string(),
        lat: None,
        lng: None,
        work_type: "Onsite".to_string(),
        salary_min: None,
        salary_max: None,
        salary_display: String::new(),
        description: "Entry level backend role".to_string(),
        apply_url: String::new(),
        company_url: String::new(),
        source: "Adzuna".to_string(),
        date_posted: String::new(),
    }
}

async fn seed_scorable_user(state: &AppState, api_url: &str) -> i64 {
    let (_, user_id) = login(state, "tristan").await;
    state
        .user_service
        .update_resume(user_id, "Python, Rust, SQL. New grad.", "resume.txt")
        .await
        .unwrap();
    state
        .job_service
        .upsert_candidates(user_id, &[unscored_candidate()])
        .await
        .unwrap();
    state.settings_service.set("ai_api_url", api_url).await.unwrap();
    state.settings_service.set("ai_api_key", "test-key").await.unwrap();
    state.settings_service.set("ai_model", "test-model").await.unwrap();
    user_id
}

#[tokio::test]
async fn batch_succeeds_on_third_attempt_after_two_failures() {
    let state = setup_state().await;
    let (api_url, counter) = spawn_stub_ai(2).await;
    let user_id = seed_scorable_user(&state, &api_url).await;

    let outcome = scrape_service::score_pending_for_user(&state, user_id)
        .await
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.ai_calls, 3);
    assert_eq!(outcome.scored, 1);
    assert_eq!(outcome.failed_batches, 0);

    let jobs = state
        .job_service
        .list_jobs(user_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(jobs[0].match_score, 85);
    assert_eq!(jobs[0].match_reasons, "Strong match");
    assert_eq!(jobs[0].work_type, "Remote");
}

#[tokio::test]
async fn batch_failing_all_retries_keeps_the_sentinel_and_does_not_kill_the_run() {
    let state = setup_state().await;
    let (api_url, counter) = spawn_stub_ai(usize::MAX).await;
    let user_id = seed_scorable_user(&state, &api_url).await;

    let outcome = scrape_service::score_pending_for_user(&state, user_id)
        .await
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.ai_calls, 3);
    assert_eq!(outcome.scored, 0);
    assert_eq!(outcome.failed_batches, 1);

    let jobs = state
        .job_service
        .list_jobs(user_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(jobs[0].match_score, -1);
    assert!(jobs[0].match_reasons.contains("Rescore"));
}
