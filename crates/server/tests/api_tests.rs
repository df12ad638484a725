//! Integration tests for HTTP API endpoints.

mod common;

use axum::http::StatusCode;
use bytes::Bytes;
use common::fixtures::part_row;
use common::{TEST_TOKEN, TestServer};
use ferry_metadata::{SessionRepo, SessionRow, UploadRepo};
use ferry_server::auth::hash_token;
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn test_health_is_unauthenticated() {
    let server = TestServer::new().await;
    let (status, json) = server.request("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_follows_config() {
    let server = TestServer::new().await;
    let (status, _) = server.request("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);

    let server = TestServer::with_config(|config| {
        config.server.metrics_enabled = false;
    })
    .await;
    let (status, _) = server.request("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_routes_require_bearer() {
    let server = TestServer::new().await;

    for (method, uri) in [
        ("GET", "/api/uploads/abc"),
        ("DELETE", "/api/uploads/abc"),
        ("GET", "/api/uploads/stats"),
    ] {
        let (status, json) = server.request(method, uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(json["code"], "unauthorized");

        let (status, _) = server.request(method, uri, Some("not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }

    let (status, _) = server
        .upload(None, "abc", "partName=a&partNo=1", Bytes::from_static(b"x"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(server.transport.total_calls(), 0);
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let server = TestServer::new().await;
    let now = OffsetDateTime::now_utc();
    server
        .metadata()
        .create_session(&SessionRow {
            session_hash: hash_token("stale-token"),
            user_id: 1,
            transport_session: "whatever".to_string(),
            created_at: now - Duration::days(2),
            expires_at: Some(now - Duration::days(1)),
        })
        .await
        .unwrap();

    let (status, _) = server
        .request("GET", "/api/uploads/abc", Some("stale-token"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_scheme_is_case_insensitive() {
    let server = TestServer::new().await;
    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/uploads/abc")
        .header("Authorization", format!("bearer {TEST_TOKEN}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(server.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_list_hides_expired_parts() {
    let server = TestServer::new().await;
    let store = server.metadata();
    let now = OffsetDateTime::now_utc();
    let cutoff = now - Duration::days(1);
    store
        .create_part(&part_row("mixed", 1, now - Duration::days(2)), cutoff)
        .await
        .unwrap();
    store
        .create_part(&part_row("mixed", 2, now), cutoff)
        .await
        .unwrap();

    let (status, json) = server
        .request("GET", "/api/uploads/mixed", Some(TEST_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
    let parts = json["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0]["partNo"], 2);
    assert_eq!(parts[0]["salt"], "");
}

#[tokio::test]
async fn test_unknown_upload_lists_empty() {
    let server = TestServer::new().await;
    let (status, json) = server
        .request("GET", "/api/uploads/nothing-here", Some(TEST_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["parts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_upload_removes_ledger_rows_only() {
    let server = TestServer::new().await;
    for part_no in 1..=2 {
        let (status, _) = server
            .upload(
                Some(TEST_TOKEN),
                "bye",
                &format!("partName=bye.{part_no}&partNo={part_no}&channelId=100"),
                Bytes::from_static(b"content"),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = server
        .request("DELETE", "/api/uploads/bye", Some(TEST_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "upload deleted");

    let (_, json) = server
        .request("GET", "/api/uploads/bye", Some(TEST_TOKEN))
        .await;
    assert!(json["parts"].as_array().unwrap().is_empty());

    // Remote messages are the caller's to clean up.
    assert_eq!(server.transport.messages(100).len(), 2);
    assert!(server.transport.delete_requests().is_empty());
}

#[tokio::test]
async fn test_stats_default_window_and_bounds() {
    let server = TestServer::new().await;
    let (status, _) = server
        .upload(
            Some(TEST_TOKEN),
            "counted",
            "partName=counted.1&partNo=1&channelId=100",
            Bytes::from_static(b"twelve bytes"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = server
        .request("GET", "/api/uploads/stats", Some(TEST_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
    let days = json.as_array().unwrap();
    assert_eq!(days.len(), 7);
    assert_eq!(days[6]["totalUploaded"], 12);
    assert!(days[..6].iter().all(|d| d["totalUploaded"] == 0));

    let today = OffsetDateTime::now_utc().date();
    assert_eq!(days[6]["uploadDate"], today.to_string());

    let (status, json) = server
        .request("GET", "/api/uploads/stats?days=30", Some(TEST_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 30);

    for days in ["0", "366"] {
        let (status, _) = server
            .request(
                "GET",
                &format!("/api/uploads/stats?days={days}"),
                Some(TEST_TOKEN),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "days={days}");
    }
}

#[tokio::test]
async fn test_trace_id_header_accepted() {
    let server = TestServer::new().await;
    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/health")
        .header("x-trace-id", "client-trace-123")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(server.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
