//! Runtime mount/unmount behaviour.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tokio::sync::Notify;
use tower::ServiceExt;

use mock_vault::config::{MountConfig, MountKind};
use mock_vault::handler::{HandlerBuilder, HandlerResult, MethodSpec};
use mock_vault::mount::{MountOrigin, UnmountTarget, MOUNT_TOKEN};

mod common;

use common::{json_request, request, send, server, test_config};

struct Gate {
    started: Notify,
    release: Notify,
}

#[tokio::test]
async fn test_mount_and_unmount_at_runtime() {
    let srv = server(test_config());
    let app = srv.app();

    let (status, _) = send(&app, request("GET", "/v1/team/x")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let handler = srv
        .state()
        .backends
        .build(&MountConfig {
            path: "v1/team".into(),
            kind: MountKind::Kv,
        })
        .unwrap();
    srv.mounts().mount("/v1/team/", handler).unwrap();

    let (status, _) = send(&app, json_request("PUT", "/v1/team/x", r#"{"a":1}"#)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let removed = srv
        .mounts()
        .unmount(UnmountTarget::Prefix("v1/team".into()))
        .unwrap();
    assert_eq!(removed, 5);

    let (status, _) = send(&app, request("GET", "/v1/team/x")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unmount_during_in_flight_dispatch() {
    let srv = server(test_config());
    let app = srv.app();

    let gate = Arc::new(Gate {
        started: Notify::new(),
        release: Notify::new(),
    });
    let handler = HandlerBuilder::from_arc(gate.clone())
        .method(MethodSpec::new("wait").get(None).to(|g: Arc<Gate>, (): ()| async move {
            g.started.notify_one();
            g.release.notified().await;
            HandlerResult::object(&json!({ "done": true }))
        }))
        .compile()
        .unwrap();
    srv.mounts().mount("v1/slow", Arc::new(handler)).unwrap();

    let in_flight = tokio::spawn(app.clone().oneshot(request("GET", "/v1/slow/wait")));
    gate.started.notified().await;

    srv.mounts()
        .unmount(UnmountTarget::Prefix("v1/slow".into()))
        .unwrap();
    gate.release.notify_one();

    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = send(&app, request("GET", "/v1/slow/wait")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshots_are_never_torn() {
    let srv = server(test_config());
    let table = srv.state().table.clone();
    let mounts = srv.mounts().clone();
    let backends = srv.state().backends.clone();
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let stop = stop.clone();
        tokio::spawn(async move {
            let config = MountConfig {
                path: "v1/churn".into(),
                kind: MountKind::Kv,
            };
            for _ in 0..200 {
                let handler = backends.build(&config).unwrap();
                mounts.mount("v1/churn", handler).unwrap();
                tokio::task::yield_now().await;
                mounts.unmount(UnmountTarget::Prefix("v1/churn".into())).unwrap();
                tokio::task::yield_now().await;
            }
            stop.store(true, Ordering::SeqCst);
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let table = table.clone();
        let stop = stop.clone();
        readers.push(tokio::spawn(async move {
            let mut observed = 0usize;
            while !stop.load(Ordering::SeqCst) {
                let snapshot = table.snapshot();
                let churn = snapshot
                    .entries()
                    .iter()
                    .filter(|e| e.data_tokens().get(MOUNT_TOKEN) == Some(&json!("v1/churn")))
                    .count();
                assert!(churn == 0 || churn == 5, "torn snapshot with {} churn entries", churn);
                observed += 1;
                tokio::task::yield_now().await;
            }
            observed
        }));
    }

    tokio::time::timeout(Duration::from_secs(10), writer)
        .await
        .expect("writer finished")
        .unwrap();
    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
}

#[tokio::test]
async fn test_config_reload_reconciles_mounts() {
    let srv = server(test_config());
    let app = srv.app();

    let handler = srv
        .state()
        .backends
        .build(&MountConfig {
            path: "v1/manual".into(),
            kind: MountKind::Kv,
        })
        .unwrap();
    srv.mounts().mount("v1/manual", handler).unwrap();

    let mut reloaded = test_config();
    reloaded.mounts = vec![
        MountConfig {
            path: "v1/sys".into(),
            kind: MountKind::Sys,
        },
        MountConfig {
            path: "v1/extra".into(),
            kind: MountKind::Kv,
        },
    ];
    srv.state().apply_config(reloaded);

    let mounts = srv.mounts().mounts();
    let paths: Vec<&str> = mounts.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, vec!["v1/extra", "v1/manual", "v1/sys"]);
    assert_eq!(mounts[1].origin, MountOrigin::Admin);

    let (status, _) = send(&app, request("GET", "/v1/secret/x")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, json_request("PUT", "/v1/extra/x", r#"{"a":1}"#)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
