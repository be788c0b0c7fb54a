//! Integration tests for status polling.

mod helpers;

use std::sync::Arc;

use http::StatusCode;
use tokio::sync::Notify;

use kitspace_core::types::identity::ContentIdentity;
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::task::TaskStatus;

use helpers::{StubConverter, TestApp};

fn ruler() -> ContentIdentity {
    ContentIdentity::new("kitspace", "ruler", "abc1234")
}

#[tokio::test]
async fn test_unknown_asset_is_not_found() {
    let app = TestApp::new(vec![StubConverter::new(
        AssetCategory::Bom,
        &["bom-info.json"],
    )]);

    let res = app.get("/status/kitspace/ruler/abc1234/bom-info.json").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_asset_status_follows_the_task() {
    let gate = Arc::new(Notify::new());
    let app = TestApp::new(vec![
        StubConverter::new(AssetCategory::Gerbers, &["gerbers.zip"]).gated(Arc::clone(&gate)),
        StubConverter::new(AssetCategory::Images, &["images/top.svg"])
            .depends_on(AssetCategory::Gerbers),
    ]);
    let identity = ruler();
    let handle = app.enqueue_checkout(&identity, &[]).await;

    app.wait_for_status(&identity.asset("gerbers.zip"), TaskStatus::Running)
        .await;
    let gerbers = app.get("/status/kitspace/ruler/abc1234/gerbers.zip").await;
    assert_eq!(gerbers.status, StatusCode::OK);
    assert_eq!(gerbers.json()["status"], "running");

    let images = app.get("/status/kitspace/ruler/abc1234/images/top.svg").await;
    assert_eq!(images.status, StatusCode::OK);
    assert_eq!(images.json()["status"], "queued");

    gate.notify_one();
    handle.wait().await;

    let images = app.get("/status/kitspace/ruler/abc1234/images/top.svg").await;
    assert_eq!(images.json()["status"], "done");
}

#[tokio::test]
async fn test_owner_and_repo_are_case_insensitive() {
    let app = TestApp::new(vec![StubConverter::new(
        AssetCategory::Bom,
        &["bom-info.json"],
    )]);
    app.enqueue_checkout(&ruler(), &[]).await.wait().await;

    let res = app.get("/status/Kitspace/RULER/abc1234/bom-info.json").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["status"], "done");
}

#[tokio::test]
async fn test_run_summary_is_finished_only_when_every_asset_is() {
    let gate = Arc::new(Notify::new());
    let app = TestApp::new(vec![
        StubConverter::new(AssetCategory::Bom, &["bom-info.json", "1-click-BOM.tsv"]),
        StubConverter::new(AssetCategory::Readme, &["readme.html"]).gated(Arc::clone(&gate)),
    ]);
    let identity = ruler();
    let handle = app.enqueue_checkout(&identity, &[]).await;
    app.wait_for_status(&identity.asset("bom-info.json"), TaskStatus::Done)
        .await;

    let res = app.get("/status/kitspace/ruler/abc1234/").await;
    assert_eq!(res.status, StatusCode::OK);
    let summary = res.json();
    assert_eq!(summary["finished"], false);
    assert_eq!(summary["complete"], false);
    assert_eq!(summary["assets"]["bom-info.json"], "done");
    assert_eq!(summary["assets"]["1-click-BOM.tsv"], "done");

    gate.notify_one();
    handle.wait().await;

    let summary = app.get("/status/kitspace/ruler/abc1234/").await.json();
    assert_eq!(summary["finished"], true);
    assert_eq!(summary["complete"], true);
    assert_eq!(summary["failed"], false);
}

#[tokio::test]
async fn test_failed_upstream_fails_dependents() {
    let app = TestApp::new(vec![
        StubConverter::new(AssetCategory::Gerbers, &["gerbers.zip"]).failing("no gerbers found"),
        StubConverter::new(AssetCategory::Images, &["images/top.svg"])
            .depends_on(AssetCategory::Gerbers),
        StubConverter::new(AssetCategory::Bom, &["bom-info.json"]),
    ]);
    app.enqueue_checkout(&ruler(), &[]).await.wait().await;

    let summary = app.get("/status/kitspace/ruler/abc1234").await.json();
    assert_eq!(summary["finished"], true);
    assert_eq!(summary["failed"], true);
    assert_eq!(summary["assets"]["gerbers.zip"], "failed");
    assert_eq!(summary["assets"]["images/top.svg"], "failed");
    assert_eq!(summary["assets"]["bom-info.json"], "done");
}

#[tokio::test]
async fn test_projects_have_their_own_status() {
    let app = TestApp::new(vec![StubConverter::new(
        AssetCategory::Bom,
        &["bom-info.json"],
    )]);
    let manifest = "multi:\n  left:\n    summary: Left half\n  right:\n    summary: Right half\n";
    app.enqueue_checkout(&ruler(), &[("kitspace.yaml", manifest)])
        .await
        .wait()
        .await;

    for project in ["left", "right"] {
        let res = app
            .get(&format!("/status/kitspace/ruler/abc1234/{project}/bom-info.json"))
            .await;
        assert_eq!(res.status, StatusCode::OK, "{project}");
        assert_eq!(res.json()["status"], "done");
    }
    let res = app.get("/status/kitspace/ruler/abc1234/bom-info.json").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}
