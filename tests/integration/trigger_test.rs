//! Integration tests for processing triggers and health checks.

mod helpers;

use bytes::Bytes;
use hmac::{Hmac, Mac};
use http::StatusCode;
use sha2::Sha256;

use kitspace_entity::asset::AssetCategory;

use helpers::{API_TOKEN, StubConverter, TestApp, WEBHOOK_SECRET};

fn sign(body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn push_payload() -> Bytes {
    Bytes::from_static(
        br#"{
            "ref": "refs/heads/master",
            "repository": {
                "name": "ruler",
                "full_name": "kitspace/ruler",
                "owner": { "login": "kitspace" }
            }
        }"#,
    )
}

fn app() -> TestApp {
    TestApp::new(vec![StubConverter::new(
        AssetCategory::Bom,
        &["bom-info.json"],
    )])
}

#[tokio::test]
async fn test_process_requires_token() {
    let app = app();

    let res = app.post("/process/kitspace/ruler", &[], Bytes::new()).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json()["error"], "UNAUTHORIZED");

    let res = app
        .post(
            "/process/kitspace/ruler",
            &[("authorization", "Bearer wrong-token")],
            Bytes::new(),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.shell.calls(), 0);
}

#[tokio::test]
async fn test_process_unknown_repository_is_not_found() {
    let app = app();
    let auth = format!("Bearer {API_TOKEN}");

    let res = app
        .post(
            "/process/kitspace/missing",
            &[("authorization", auth.as_str())],
            Bytes::new(),
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_process_sync_failure_hides_detail() {
    let app = app();
    let bare = app.state.pipeline.bare_repo("kitspace", "ruler");
    std::fs::create_dir_all(&bare).expect("bare repo dir");
    let auth = format!("Bearer {API_TOKEN}");

    let res = app
        .post(
            "/process/kitspace/ruler",
            &[("authorization", auth.as_str())],
            Bytes::new(),
        )
        .await;
    assert!(res.status.is_server_error(), "got {}", res.status);
    assert!(app.shell.calls() >= 1);
    assert!(!res.text().contains("no external tools"));
}

#[tokio::test]
async fn test_process_rejected_after_shutdown() {
    let app = app();
    app.state.scheduler().shutdown().await;
    let auth = format!("Bearer {API_TOKEN}");

    let res = app
        .post(
            "/process/kitspace/ruler",
            &[("authorization", auth.as_str())],
            Bytes::new(),
        )
        .await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);

    let detailed = app.get("/health/detailed").await.json();
    assert_eq!(detailed["data"]["status"], "degraded");
    assert_eq!(detailed["data"]["accepting"], false);
}

#[tokio::test]
async fn test_webhook_requires_valid_signature() {
    let app = app();
    let body = push_payload();

    let res = app.post("/hooks/gitea", &[], body.clone()).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .post(
            "/hooks/gitea",
            &[("x-gitea-signature", "deadbeef")],
            body.clone(),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let forged = sign(b"{}");
    let res = app
        .post("/hooks/gitea", &[("x-gitea-signature", forged.as_str())], body)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_push_is_accepted() {
    let app = app();
    let body = push_payload();
    let signature = sign(&body);

    let res = app
        .post(
            "/hooks/gitea",
            &[
                ("x-gitea-event", "push"),
                ("x-gitea-signature", signature.as_str()),
                ("content-type", "application/json"),
            ],
            body,
        )
        .await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.json()["data"]["repository"], "kitspace/ruler");
}

#[tokio::test]
async fn test_other_events_are_ignored() {
    let app = app();
    let body = Bytes::from_static(br#"{"ref_type":"tag"}"#);
    let signature = sign(&body);

    let res = app
        .post(
            "/hooks/gitea",
            &[
                ("x-gitea-event", "create"),
                ("x-gitea-signature", signature.as_str()),
            ],
            body,
        )
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_malformed_push_is_rejected() {
    let app = app();
    let body = Bytes::from_static(b"not json");
    let signature = sign(&body);

    let res = app
        .post(
            "/hooks/gitea",
            &[("x-gitea-signature", signature.as_str())],
            body,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_store_and_scheduler() {
    let app = app();

    let res = app.get("/health").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["data"]["status"], "ok");

    let res = app.get("/health/detailed").await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    let data = &body["data"];
    assert_eq!(data["status"], "ok");
    assert_eq!(data["storage_provider"], "memory");
    assert_eq!(data["storage_healthy"], true);
    assert_eq!(data["accepting"], true);
    assert_eq!(data["tasks"], 0);
}

#[test]
fn test_shipped_config_loads() {
    let config = kitspace_core::config::AppConfig::load("test").expect("config/default.toml");
    assert_eq!(config.server.port, 5000);
    assert_eq!(config.storage.provider, "local");
    assert!(config.api.tokens.is_empty());
    assert!(!config.watcher.enabled);
}
