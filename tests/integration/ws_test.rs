//! Integration tests for the live event WebSocket.

mod helpers;

use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use helpers::{TOKEN, TestApp};
use jobsync_entity::job::JobKind;

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(addr: std::net::SocketAddr, token: Option<&str>) -> Result<Socket, String> {
    let mut request = format!("ws://{addr}/events")
        .into_client_request()
        .expect("valid request");
    if let Some(token) = token {
        request
            .headers_mut()
            .insert("x-backend-token", token.parse().expect("header value"));
    }
    connect_async(request)
        .await
        .map(|(socket, _)| socket)
        .map_err(|e| e.to_string())
}

async fn next_frame(socket: &mut Socket) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("frame in time")
        .expect("stream open")
        .expect("valid message");
    serde_json::from_str(message.to_text().expect("text frame")).expect("json frame")
}

#[tokio::test]
async fn test_upgrade_requires_token() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;

    let err = connect(addr, None).await.unwrap_err();
    assert!(err.contains("401"), "{err}");
}

#[tokio::test]
async fn test_connected_frame_then_job_frames() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;
    let mut socket = connect(addr, Some(TOKEN)).await.expect("connect");

    let first = next_frame(&mut socket).await;
    assert_eq!(first["type"], "connected");
    assert!(first["timestamp"].is_string());

    let job_id = app
        .engine
        .submit(JobKind::Noop, json!({ "simulate_ms": 200 }))
        .await
        .unwrap();

    let mut statuses = Vec::new();
    let mut last_progress = 0.0;
    while statuses.last().map(String::as_str) != Some("succeeded") {
        let frame = next_frame(&mut socket).await;
        if frame["job_id"] != job_id.as_str() {
            continue;
        }
        match frame["type"].as_str() {
            Some("job.status") => statuses.push(frame["status"].as_str().unwrap().to_string()),
            Some("job.progress") => {
                let progress = frame["progress"].as_f64().unwrap();
                assert!(progress >= last_progress);
                last_progress = progress;
            }
            _ => {}
        }
    }

    assert_eq!(statuses, ["queued", "running", "succeeded"]);
    assert_eq!(last_progress, 1.0);
}
