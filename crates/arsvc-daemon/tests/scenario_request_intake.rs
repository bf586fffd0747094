//! Exercises the request-intake router end to end against live Postgres
//! and Redis. Skipped if `DATABASE_URL` or `REDIS_URL` is not set, matching
//! the convention `arsvc-db`'s own tests use.

use std::sync::Arc;

use arsvc_cache::EphemeralStore;
use arsvc_config::{AppConfig, GitProviders};
use arsvc_daemon::{routes, state::AppState};
use arsvc_queue::WorkQueue;
use arsvc_runner::FakeRunner;
use arsvc_store::JobStore;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_state() -> Option<AppState> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let redis_url = std::env::var("REDIS_URL").ok()?;

    let pool = arsvc_db::connect(&database_url).await.unwrap();
    arsvc_db::migrate(&pool).await.unwrap();
    let cache = EphemeralStore::connect(&redis_url).await.unwrap();
    let queue = WorkQueue::connect(&redis_url).await.unwrap();
    let store = JobStore::new(pool, cache, std::time::Duration::from_secs(86_400));

    let config = Arc::new(AppConfig {
        database_url,
        redis_url,
        playbooks_dir: std::env::temp_dir(),
        collections_dir: std::env::temp_dir(),
        job_ttl: std::time::Duration::from_secs(86_400),
        stale_running_threshold: std::time::Duration::from_secs(3_600),
        clone_timeout: std::time::Duration::from_secs(120),
        providers: GitProviders::default(),
    });

    let mut state = AppState::new(store, queue, config);
    state.sync_runner = Arc::new(FakeRunner::success("PLAY RECAP"));
    Some(state)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn submit_sync_local_playbook_runs_inline() {
    let Some(state) = test_state().await else {
        eprintln!("SKIP: DATABASE_URL/REDIS_URL not set");
        return;
    };

    let playbooks_dir = tempfile::tempdir().unwrap();
    std::fs::write(playbooks_dir.path().join("hello.yml"), "---\n- hosts: all\n").unwrap();
    let config = Arc::new(AppConfig {
        playbooks_dir: playbooks_dir.path().to_path_buf(),
        ..(*state.config).clone()
    });
    let state = AppState { config, ..state };

    let app = routes::build_router(state);

    let body = json!({
        "source": {"type": "local", "target": "playbook", "path": "hello.yml"},
        "extra_vars": {"foo": "bar"}
    });

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/jobs?sync=true")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let payload = body_json(resp).await;
    assert_eq!(payload["status"], "successful");
    assert_eq!(payload["rc"], 0);
}

#[tokio::test]
async fn submit_async_then_fetch_roundtrips() {
    let Some(state) = test_state().await else {
        eprintln!("SKIP: DATABASE_URL/REDIS_URL not set");
        return;
    };

    let app = routes::build_router(state);

    let body = json!({
        "source": {"type": "local", "target": "playbook", "path": "hello.yml"}
    });

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/jobs")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let payload = body_json(resp).await;
    let job_id = payload["job_id"].as_str().unwrap().to_string();
    assert_eq!(payload["status"], "pending");

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/jobs/{job_id}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let detail = body_json(resp).await;
    assert_eq!(detail["job_id"], job_id);
    assert_eq!(detail["status"], "pending");
}

#[tokio::test]
async fn get_unknown_job_is_404() {
    let Some(state) = test_state().await else {
        eprintln!("SKIP: DATABASE_URL/REDIS_URL not set");
        return;
    };
    let app = routes::build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/jobs/{}", uuid::Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_jobs_clamps_limit_above_max() {
    let Some(state) = test_state().await else {
        eprintln!("SKIP: DATABASE_URL/REDIS_URL not set");
        return;
    };
    let app = routes::build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/jobs?limit=9999")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let payload = body_json(resp).await;
    assert_eq!(payload["limit"], 100);
}

#[tokio::test]
async fn health_endpoints_report_ok() {
    let Some(state) = test_state().await else {
        eprintln!("SKIP: DATABASE_URL/REDIS_URL not set");
        return;
    };
    let app = routes::build_router(state);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_rejects_out_of_range_verbosity_without_touching_store() {
    let Some(state) = test_state().await else {
        eprintln!("SKIP: DATABASE_URL/REDIS_URL not set");
        return;
    };
    let app = routes::build_router(state);

    let body = json!({
        "source": {"type": "local", "target": "playbook", "path": "hello.yml"},
        "options": {"verbosity": 7}
    });

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/jobs")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sync_rejects_git_source_as_bad_request() {
    let Some(state) = test_state().await else {
        eprintln!("SKIP: DATABASE_URL/REDIS_URL not set");
        return;
    };
    let app = routes::build_router(state);

    let body = json!({
        "source": {
            "type": "git",
            "target": "playbook",
            "repo": "https://dev.azure.com/xxxit/p/_git/r",
            "branch": "main",
            "path": "site.yml"
        }
    });

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/jobs?sync=true")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
