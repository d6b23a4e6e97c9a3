//! Integration tests for job submission, lookup, and cancellation.

mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use helpers::TestApp;

#[tokio::test]
async fn test_missing_or_wrong_token_is_rejected() {
    let app = TestApp::new().await;

    let response = app.send("GET", "/jobs", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "UNAUTHORIZED");

    let response = app.send("GET", "/jobs", None, Some("nope")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = TestApp::new().await;

    let response = app.send("GET", "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert!(response.body["version"].is_string());
}

#[tokio::test]
async fn test_noop_job_runs_to_success() {
    let app = TestApp::new().await;

    let response = app
        .request(
            "POST",
            "/jobs",
            Some(json!({ "kind": "noop", "payload": { "simulate_ms": 200 } })),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["status"], "queued");
    let job_id = response.body["job_id"].as_str().unwrap().to_string();

    let job = app.wait_for_terminal(&job_id).await;
    assert_eq!(job.status.as_str(), "succeeded");
    assert_eq!(job.progress, 1.0);

    let response = app.request("GET", &format!("/jobs/{job_id}"), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "succeeded");
    assert_eq!(response.body["kind"], "noop");

    let response = app
        .request("GET", &format!("/jobs/{job_id}/events"), None)
        .await;
    let messages: Vec<&str> = response.body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["message"].as_str().unwrap())
        .collect();
    assert_eq!(messages.first(), Some(&"job queued"));
    assert!(messages.contains(&"job started"));
    assert_eq!(messages.last(), Some(&"job completed"));
}

#[tokio::test]
async fn test_unknown_kind_is_a_validation_error() {
    let app = TestApp::new().await;

    let response = app
        .request("POST", "/jobs", Some(json!({ "kind": "mystery", "payload": {} })))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "VALIDATION_ERROR");

    let response = app.request("POST", "/jobs", Some(json!({ "kind": "" }))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app.request("GET", "/jobs", None).await;
    assert_eq!(response.body["jobs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_cancel_queued_job() {
    let app = TestApp::without_workers().await;

    let response = app
        .request("POST", "/jobs", Some(json!({ "kind": "noop" })))
        .await;
    let job_id = response.body["job_id"].as_str().unwrap().to_string();

    let response = app
        .request("POST", &format!("/jobs/{job_id}/cancel"), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "canceled");

    // Canceling again is a no-op that reports the terminal status.
    let response = app
        .request("POST", &format!("/jobs/{job_id}/cancel"), None)
        .await;
    assert_eq!(response.body["status"], "canceled");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = TestApp::new().await;

    for path in ["/jobs/job_missing", "/jobs/job_missing/events"] {
        let response = app.request("GET", path, None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{path}");
    }
    let response = app.request("POST", "/jobs/job_missing/cancel", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let app = TestApp::without_workers().await;
    for _ in 0..3 {
        app.request("POST", "/jobs", Some(json!({ "kind": "noop" })))
            .await;
    }

    let response = app.request("GET", "/jobs?limit=2", None).await;
    let jobs = response.body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs[0]["created_at"].as_str() >= jobs[1]["created_at"].as_str());
}

#[tokio::test]
async fn test_status_reports_queue_and_workers() {
    let app = TestApp::without_workers().await;
    app.request("POST", "/jobs", Some(json!({ "kind": "noop" })))
        .await;

    let response = app.request("GET", "/status", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["queue_depth"], 1);
    assert_eq!(response.body["workers"]["active"], 0);
    assert!(response.body["uptime_sec"].is_number());
}

#[tokio::test]
async fn test_create_session() {
    let app = TestApp::new().await;

    let response = app.send("POST", "/sessions", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app.request("POST", "/sessions", None).await;
    assert_eq!(response.status, StatusCode::CREATED);
    let session_id = response.body["session_id"].as_str().unwrap();
    assert!(session_id.starts_with("session_"));

    let other = app.request("POST", "/sessions", None).await;
    assert_ne!(other.body["session_id"], session_id);
}
