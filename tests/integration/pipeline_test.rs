//! End-to-end processing of a checkout with the converters that need no
//! external tools.

mod helpers;

use std::sync::Arc;

use http::StatusCode;

use kitspace_converter::{BomConverter, KitspaceYamlConverter, ReadmeConverter};
use kitspace_core::types::identity::ContentIdentity;
use kitspace_entity::task::TaskStatus;
use kitspace_worker::ConverterRegistry;

use helpers::TestApp;

const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

const MANIFEST: &str = "summary: A <b>ruler</b>, see www.kitspace.org\ncolor: red\n";

const BOM: &str = "References,Qty,Description,Manufacturer,MPN,Digikey\n\
                   C1 C2,2,100nF,Yageo,CC0603,311-1088-1-ND\n\
                   R1,,10k,,,\n";

const README: &str = "# Ruler\n\nA ruler.\n\n![top](images/top.png)\n\n<script>alert(1)</script>\n";

fn app() -> TestApp {
    let mut registry = ConverterRegistry::new();
    registry.register(Arc::new(KitspaceYamlConverter));
    registry.register(Arc::new(BomConverter));
    registry.register(Arc::new(ReadmeConverter::new("http://gitea.test/")));
    TestApp::with_registry(registry)
}

#[tokio::test]
async fn test_checkout_is_processed_into_assets() {
    let app = app();
    let identity = ContentIdentity::new("Kitspace", "Ruler", SHA);
    let handle = app
        .enqueue_checkout(
            &identity,
            &[
                ("kitspace.yaml", MANIFEST),
                ("1-click-bom.csv", BOM),
                ("README.md", README),
            ],
        )
        .await;

    let outcomes = handle.wait().await;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.status == TaskStatus::Done));
    assert_eq!(app.shell.calls(), 0);

    let res = app
        .get(&format!("/files/kitspace/ruler/{SHA}/kitspace-yaml.json"))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let manifest = res.json();
    assert_eq!(manifest["color"], "red");
    let summary = manifest["summary"].as_str().expect("summary");
    assert!(summary.contains("&lt;b&gt;ruler&lt;/b&gt;"));
    assert!(summary.contains(r#"href="https://www.kitspace.org""#));

    let res = app.get(&format!("/files/kitspace/ruler/{SHA}/bom-info.json")).await;
    assert_eq!(res.status, StatusCode::OK);
    let info = res.json();
    assert_eq!(info["inputFile"], "1-click-bom.csv");
    assert_eq!(info["bom"]["lines"].as_array().map(Vec::len), Some(2));
    assert_eq!(info["bom"]["lines"][1]["quantity"], 1);

    let res = app.get(&format!("/files/kitspace/ruler/{SHA}/1-click-BOM.tsv")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text().contains("CC0603"));

    let res = app.get(&format!("/files/kitspace/ruler/{SHA}/readme.html")).await;
    assert_eq!(res.status, StatusCode::OK);
    let html = res.text();
    assert!(html.contains("Ruler"));
    assert!(html.contains(&format!(
        "http://gitea.test/kitspace/ruler/raw/commit/{SHA}/images/top.png"
    )));
    assert!(!html.contains("<script"));
}

#[tokio::test]
async fn test_missing_inputs_fail_only_their_assets() {
    let app = app();
    let identity = ContentIdentity::new("kitspace", "bare", SHA);
    app.enqueue_checkout(&identity, &[("README.md", "# Bare\n")])
        .await
        .wait()
        .await;

    let summary = app.get(&format!("/status/kitspace/bare/{SHA}")).await.json();
    assert_eq!(summary["finished"], true);
    assert_eq!(summary["failed"], true);
    assert_eq!(summary["assets"]["readme.html"], "done");
    assert_eq!(summary["assets"]["kitspace-yaml.json"], "done");
    assert_eq!(summary["assets"]["bom-info.json"], "failed");
    assert_eq!(summary["assets"]["1-click-BOM.tsv"], "failed");

    let res = app.get(&format!("/files/kitspace/bare/{SHA}/bom-info.json")).await;
    assert_eq!(res.status, StatusCode::FAILED_DEPENDENCY);
}

#[tokio::test]
async fn test_reprocessing_a_commit_reuses_tasks() {
    let app = app();
    let identity = ContentIdentity::new("kitspace", "ruler", SHA);
    let files = [("1-click-bom.csv", BOM), ("README.md", README)];

    app.enqueue_checkout(&identity, &files).await.wait().await;
    let tasks = app.state.scheduler().task_count();

    app.enqueue_checkout(&identity, &files).await.wait().await;
    assert_eq!(app.state.scheduler().task_count(), tasks);
    assert_eq!(
        app.state.scheduler().metrics().snapshot().tasks_deduplicated,
        tasks as u64
    );
}
