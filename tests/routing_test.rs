//! Request routing through the full HTTP stack.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tokio::sync::Notify;

use mock_vault::handler::{HandlerBuilder, HandlerResult, MethodSpec};

mod common;

use common::{json_request, request, send, server, test_config};

#[tokio::test]
async fn test_health_binding_through_http() {
    let app = server(test_config()).app();

    let (status, body) = send(&app, request("GET", "/v1/sys/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["initialized"], true);
    assert_eq!(body["parameters"]["activecode"], 200);

    let (status, body) = send(&app, request("GET", "/v1/sys/health?activecode=201")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["parameters"]["activecode"], 201);

    let (status, body) = send(&app, request("GET", "/v1/sys/health?activecode=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].as_str().unwrap().contains("activecode"));
}

#[tokio::test]
async fn test_health_only_routes_declared_verbs() {
    let app = server(test_config()).app();

    let (status, _) = send(&app, request("HEAD", "/v1/sys/health")).await;
    assert_eq!(status, StatusCode::OK);

    for method in ["POST", "PUT", "DELETE"] {
        let (status, _) = send(&app, request(method, "/v1/sys/health")).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} should not match", method);
    }
}

#[tokio::test]
async fn test_list_matches_get_with_list_flag() {
    let app = server(test_config()).app();

    for key in ["foo/one", "foo/two", "foo/nested/three"] {
        let uri = format!("/v1/secret/{}", key);
        let (status, _) = send(&app, json_request("PUT", &uri, r#"{"value":"x"}"#)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let listed = send(&app, request("LIST", "/v1/secret/foo")).await;
    let flagged = send(&app, request("GET", "/v1/secret/foo?list=1")).await;

    assert_eq!(listed.0, StatusCode::OK);
    assert_eq!(listed, flagged);
    assert_eq!(listed.1["data"]["keys"], json!(["nested/", "one", "two"]));

    // without the flag GET reads the (absent) value
    let (status, _) = send(&app, request("GET", "/v1/secret/foo")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_kv_round_trip() {
    let app = server(test_config()).app();

    let (status, _) = send(&app, json_request("POST", "/v1/secret/app", r#"{"user":"svc"}"#)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, request("GET", "/v1/secret/app")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": { "user": "svc" } }));

    let (status, _) = send(&app, request("DELETE", "/v1/secret/app")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, request("GET", "/v1/secret/app")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "errors": [] }));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = server(test_config()).app();
    let (status, body) = send(&app, json_request("PUT", "/v1/secret/app", "{oops")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn test_unmatched_path_is_not_found() {
    let app = server(test_config()).app();
    let (status, _) = send(&app, request("GET", "/v1/nothing/here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_body_limit() {
    let mut config = test_config();
    config.limits.max_body_size = 16;
    let app = server(config).app();

    let big = format!(r#"{{"value":"{}"}}"#, "x".repeat(64));
    let (status, _) = send(&app, json_request("PUT", "/v1/secret/big", &big)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    use tower::ServiceExt;

    let app = server(test_config()).app();

    let response = app.clone().oneshot(request("GET", "/v1/sys/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));

    let mut req = request("GET", "/v1/sys/health");
    req.headers_mut().insert("x-request-id", "fixed-id".parse().unwrap());
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "fixed-id");
}

#[tokio::test]
async fn test_uninitialized_server_reports_501() {
    let mut config = test_config();
    config.server.dev_mode = false;
    let app = server(config).app();

    let (status, _) = send(&app, request("GET", "/v1/sys/health")).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let (status, body) = send(
        &app,
        json_request("PUT", "/v1/sys/init", r#"{"secret_shares":1,"secret_threshold":1}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["root_token"].as_str().unwrap().starts_with("s."));

    let (status, _) = send(&app, request("GET", "/v1/sys/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_requests() {
    let srv = server(test_config());
    let app = srv.app();

    let started = Arc::new(Notify::new());
    let handler = HandlerBuilder::from_arc(started.clone())
        .method(MethodSpec::new("stall").get(None).to(|started: Arc<Notify>, (): ()| async move {
            started.notify_one();
            tokio::time::sleep(Duration::from_secs(30)).await;
            HandlerResult::object(&json!({ "finished": true }))
        }))
        .compile()
        .unwrap();
    srv.mounts().mount("v1/slow", Arc::new(handler)).unwrap();

    let in_flight = {
        let app = app.clone();
        tokio::spawn(async move { send(&app, request("GET", "/v1/slow/stall")).await })
    };
    started.notified().await;
    srv.cancel_in_flight();

    let (status, body) = tokio::time::timeout(Duration::from_secs(2), in_flight)
        .await
        .expect("cancelled request completes")
        .unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "errors": ["server is shutting down"] }));

    // later requests are refused before reaching a handler
    let (status, _) = send(&app, request("GET", "/v1/sys/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
