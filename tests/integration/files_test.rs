//! Integration tests for asset downloads.

mod helpers;

use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use tokio::sync::Notify;

use kitspace_core::types::identity::{ContentIdentity, HEAD_REF};
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::task::TaskStatus;

use helpers::{StubConverter, TestApp};

fn ruler() -> ContentIdentity {
    ContentIdentity::new("kitspace", "ruler", "abc1234")
}

#[tokio::test]
async fn test_done_asset_is_served() {
    let app = TestApp::new(vec![StubConverter::new(
        AssetCategory::Bom,
        &["bom-info.json"],
    )]);
    app.enqueue_checkout(&ruler(), &[]).await.wait().await;

    let res = app.get("/files/kitspace/ruler/abc1234/bom-info.json").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(
        res.header("cache-control"),
        Some("public, max-age=31536000, immutable")
    );
    assert_eq!(res.text(), format!("{}:bom-info.json", AssetCategory::Bom));
}

#[tokio::test]
async fn test_pending_asset_is_accepted() {
    let gate = Arc::new(Notify::new());
    let app = TestApp::new(vec![
        StubConverter::new(AssetCategory::Readme, &["readme.html"]).gated(Arc::clone(&gate)),
    ]);
    let identity = ruler();
    let handle = app.enqueue_checkout(&identity, &[]).await;
    app.wait_for_status(&identity.asset("readme.html"), TaskStatus::Running)
        .await;

    let res = app.get("/files/kitspace/ruler/abc1234/readme.html").await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.json()["status"], "running");

    gate.notify_one();
    handle.wait().await;

    let res = app.get("/files/kitspace/ruler/abc1234/readme.html").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn test_failed_asset_hides_tool_output() {
    let app = TestApp::new(vec![
        StubConverter::new(AssetCategory::Schematic, &["images/schematic.svg"])
            .failing("plot_kicad_sch exited with code 139: Segmentation fault"),
    ]);
    app.enqueue_checkout(&ruler(), &[]).await.wait().await;

    let res = app
        .get("/files/kitspace/ruler/abc1234/images/schematic.svg")
        .await;
    assert_eq!(res.status, StatusCode::FAILED_DEPENDENCY);
    let body = res.json();
    assert_eq!(body["error"], "PROCESSING_FAILED");
    assert!(!res.text().contains("Segmentation"));
}

#[tokio::test]
async fn test_head_redirects_to_processed_commit() {
    let app = TestApp::new(vec![StubConverter::new(
        AssetCategory::Bom,
        &["1-click-BOM.tsv"],
    )]);
    let identity = ruler();
    app.tracker().set_head("kitspace", "ruler", "abc1234");
    app.enqueue_checkout(&identity, &[]).await.wait().await;

    let res = app.get("/files/kitspace/ruler/HEAD/1-click-BOM.tsv").await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(
        res.header("location"),
        Some("/files/kitspace/ruler/abc1234/1-click-BOM.tsv")
    );

    let mirrored = app
        .store()
        .get(&identity.at_ref(HEAD_REF).asset("1-click-BOM.tsv"))
        .await
        .expect("HEAD copy");
    assert_eq!(mirrored, Bytes::from(format!("{}:1-click-BOM.tsv", AssetCategory::Bom)));
}

#[tokio::test]
async fn test_stored_asset_from_earlier_run_is_served() {
    let app = TestApp::new(Vec::new());
    let identity = ruler();
    app.store()
        .put(&identity.asset("readme.html"), Bytes::from_static(b"<p>ruler</p>"))
        .await
        .expect("put");
    app.store()
        .put(
            &identity.at_ref(HEAD_REF).asset("readme.html"),
            Bytes::from_static(b"<p>ruler</p>"),
        )
        .await
        .expect("put head");

    let res = app.get("/files/kitspace/ruler/abc1234/readme.html").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "<p>ruler</p>");

    let res = app.get("/files/kitspace/ruler/HEAD/readme.html").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("cache-control"), Some("no-cache"));
}

#[tokio::test]
async fn test_project_asset_is_served() {
    let app = TestApp::new(vec![StubConverter::new(
        AssetCategory::Bom,
        &["bom-info.json"],
    )]);
    let manifest = "multi:\n  left: {}\n  right: {}\n";
    app.enqueue_checkout(&ruler(), &[("kitspace.yaml", manifest)])
        .await
        .wait()
        .await;

    let res = app
        .get("/files/kitspace/ruler/abc1234/right/bom-info.json")
        .await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_and_malformed_paths_are_not_found() {
    let app = TestApp::new(Vec::new());

    let res = app.get("/files/kitspace/ruler/abc1234/readme.html").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.get("/files/kitspace/ruler").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.get("/files/kitspace/ruler/HEAD/readme.html").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}
