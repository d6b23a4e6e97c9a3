//! Integration tests for connector accounts, on-demand sync, and records.

mod helpers;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;

use helpers::TestApp;

async fn create_jira(app: &TestApp) -> String {
    let response = app
        .request(
            "POST",
            "/accounts",
            Some(json!({
                "source": "jira",
                "display_name": "Work Jira",
                "settings": { "base_url": "https://example.atlassian.net", "email": "me@example.com" },
                "credentials": { "api_token": "secret" },
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.body["account_id"].as_str().unwrap().to_string()
}

async fn insert_record(app: &TestApp, account_id: &str, external_id: &str, starts_ts: i64) {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO synced_records \
         (connector, external_id, source, account_id, record_type, title, starts_ts, ends_ts, data, created_at, updated_at) \
         VALUES (?, ?, 'jira', ?, 'issue', ?, ?, ?, 'null', ?, ?)",
    )
    .bind(format!("jira:{account_id}"))
    .bind(external_id)
    .bind(account_id)
    .bind(format!("Issue {external_id}"))
    .bind(starts_ts)
    .bind(starts_ts)
    .bind(now)
    .bind(now)
    .execute(app.db.pool())
    .await
    .expect("Failed to insert record");
}

#[tokio::test]
async fn test_account_crud_hides_credentials() {
    let app = TestApp::new().await;
    let account_id = create_jira(&app).await;

    let response = app.request("GET", &format!("/accounts/{account_id}"), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["display_name"], "Work Jira");
    assert!(response.body.get("credentials").is_none());

    let response = app.request("GET", "/accounts?source=jira", None).await;
    assert_eq!(response.body["accounts"].as_array().unwrap().len(), 1);
    let response = app.request("GET", "/accounts?source=calendar", None).await;
    assert_eq!(response.body["accounts"].as_array().unwrap().len(), 0);

    let response = app
        .request("DELETE", &format!("/accounts/{account_id}"), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["deleted"], true);

    let response = app.request("GET", &format!("/accounts/{account_id}"), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_account_validation() {
    let app = TestApp::new().await;

    let response = app
        .request(
            "POST",
            "/accounts",
            Some(json!({ "source": "slack", "display_name": "Chat" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .request(
            "POST",
            "/accounts",
            Some(json!({ "source": "jira", "display_name": "" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .request(
            "POST",
            "/accounts",
            Some(json!({ "source": "jira", "display_name": "x", "settings": [1, 2] })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_unknown_account_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request("POST", "/accounts/acct_missing/sync", Some(json!({})))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.request("GET", "/jobs", None).await;
    assert!(response.body["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_enqueues_connector_job() {
    let app = TestApp::without_workers().await;
    let account_id = create_jira(&app).await;

    let response = app
        .request(
            "POST",
            &format!("/accounts/{account_id}/sync"),
            Some(json!({ "force": true })),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["status"], "queued");
    let job_id = response.body["job_id"].as_str().unwrap().to_string();

    let response = app.request("GET", &format!("/jobs/{job_id}"), None).await;
    assert_eq!(response.body["kind"], "connector.jira.sync");
    assert_eq!(response.body["payload"]["account_id"], account_id.as_str());
    assert_eq!(response.body["payload"]["force"], true);

    // No body at all is also accepted.
    let response = app
        .request("POST", &format!("/accounts/{account_id}/sync"), None)
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_records_filtering_and_delete_cascade() {
    let app = TestApp::new().await;
    let account_id = create_jira(&app).await;
    insert_record(&app, &account_id, "JS-1", 1_772_323_200).await; // 2026-03-01
    insert_record(&app, &account_id, "JS-2", 1_772_928_000).await; // 2026-03-08

    let response = app
        .request("GET", &format!("/records?account_id={account_id}"), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["records"].as_array().unwrap().len(), 2);

    let response = app
        .request(
            "GET",
            "/records?source=jira&start=2026-03-05T00:00:00Z&end=2026-03-10T00:00:00Z",
            None,
        )
        .await;
    let records = response.body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["external_id"], "JS-2");

    let response = app
        .request(
            "GET",
            "/records?start=2026-03-10T00:00:00Z&end=2026-03-01T00:00:00Z",
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    app.request("DELETE", &format!("/accounts/{account_id}"), None)
        .await;
    let response = app
        .request("GET", &format!("/records?account_id={account_id}"), None)
        .await;
    assert!(response.body["records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_sub_resource_selection() {
    let app = TestApp::new().await;
    let account_id = create_jira(&app).await;
    let path = format!("/accounts/{account_id}/sub-resources");

    let response = app.request("GET", &path, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["sub_resources"].as_array().unwrap().is_empty());

    let now = Utc::now();
    sqlx::query(
        "INSERT INTO sub_resources \
         (account_id, sub_id, source, name, selected, created_at, updated_at) \
         VALUES (?, 'activity', 'jira', 'Activity', 1, ?, ?)",
    )
    .bind(&account_id)
    .bind(now)
    .bind(now)
    .execute(app.db.pool())
    .await
    .expect("Failed to insert sub-resource");

    let response = app
        .request("PATCH", &format!("{path}/activity"), Some(json!({ "selected": false })))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["selected"], false);

    let response = app.request("GET", &format!("{path}?selected_only=true"), None).await;
    assert!(response.body["sub_resources"].as_array().unwrap().is_empty());
    let response = app.request("GET", &path, None).await;
    assert_eq!(response.body["sub_resources"][0]["sub_id"], "activity");

    let response = app
        .request("PATCH", &format!("{path}/missing"), Some(json!({ "selected": true })))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .request(
            "PATCH",
            "/accounts/acct_missing/sub-resources/activity",
            Some(json!({ "selected": true })),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
