//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode};
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use kitspace_api::AppState;
use kitspace_core::config::AppConfig;
use kitspace_core::shell::{ShellCommand, ShellError, ShellOutput};
use kitspace_core::traits::CommandRunner;
use kitspace_core::types::identity::{AssetId, ContentIdentity};
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::{ProjectJob, RepoInfo};
use kitspace_entity::task::TaskStatus;
use kitspace_storage::AssetStore;
use kitspace_worker::retry::RetryPolicy;
use kitspace_worker::{
    ConversionContext, Converter, ConverterOutput, ConverterRegistry, ProcessingPipeline,
    RepoSync, RunHandle, StatusTracker, TaskError, TaskScheduler,
};

/// Bearer token accepted by the test app.
pub const API_TOKEN: &str = "test-token";
/// Webhook secret of the test app.
pub const WEBHOOK_SECRET: &str = "test-secret";

/// Shell that counts invocations and fails every command.
#[derive(Debug, Default)]
pub struct CountingShell {
    calls: AtomicUsize,
}

impl CountingShell {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for CountingShell {
    async fn run(&self, command: &ShellCommand) -> Result<ShellOutput, ShellError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ShellError::Spawn {
            command: command.render(),
            reason: "no external tools in tests".into(),
        })
    }
}

/// Converter with canned outputs, an optional gate and an optional failure.
#[derive(Debug)]
pub struct StubConverter {
    category: AssetCategory,
    dependencies: Vec<AssetCategory>,
    outputs: Vec<String>,
    gate: Option<Arc<Notify>>,
    failure: Option<String>,
    runs: Arc<AtomicUsize>,
}

impl StubConverter {
    pub fn new(category: AssetCategory, outputs: &[&str]) -> Self {
        Self {
            category,
            dependencies: Vec::new(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            gate: None,
            failure: None,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn depends_on(mut self, category: AssetCategory) -> Self {
        self.dependencies.push(category);
        self
    }

    /// Block each run until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Shared run counter.
    pub fn runs(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

#[async_trait]
impl Converter for StubConverter {
    fn category(&self) -> AssetCategory {
        self.category
    }

    fn dependencies(&self) -> &[AssetCategory] {
        &self.dependencies
    }

    fn outputs(&self, _job: &ProjectJob) -> Vec<String> {
        self.outputs.clone()
    }

    async fn run(&self, _ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = &self.failure {
            return Err(TaskError::permanent(message.clone()));
        }
        let mut output = ConverterOutput::new();
        for name in &self.outputs {
            output.insert(name.clone(), Bytes::from(format!("{}:{name}", self.category)));
        }
        Ok(output)
    }
}

/// A captured HTTP response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// State shared with the router
    pub state: AppState,
    /// Shell handed to the scheduler and repo sync
    pub shell: Arc<CountingShell>,
    workspace: tempfile::TempDir,
}

impl TestApp {
    /// Create a test application over stub converters.
    pub fn new(converters: Vec<StubConverter>) -> Self {
        let mut registry = ConverterRegistry::new();
        for converter in converters {
            registry.register(Arc::new(converter));
        }
        Self::with_registry(registry)
    }

    /// Create a test application over an arbitrary registry.
    pub fn with_registry(registry: ConverterRegistry) -> Self {
        let workspace = tempfile::tempdir().expect("Failed to create workspace");

        let mut config = AppConfig::default();
        config.api.tokens = vec![API_TOKEN.to_string()];
        config.api.webhook_secret = Some(WEBHOOK_SECRET.to_string());
        config.scheduler.retry.initial_backoff_ms = 10;
        config.scheduler.shutdown_grace_seconds = 1;

        let shell = Arc::new(CountingShell::default());
        let runner: Arc<dyn CommandRunner> = shell.clone();
        let scheduler = TaskScheduler::new(
            registry,
            AssetStore::in_memory(),
            Arc::clone(&runner),
            Arc::new(StatusTracker::new()),
            &config.scheduler,
        );
        let sync = RepoSync::new(
            runner,
            workspace.path().join("checkout"),
            RetryPolicy::new(config.scheduler.retry.clone()),
        );
        let pipeline = ProcessingPipeline::new(
            scheduler,
            sync,
            None,
            workspace.path().join("repositories"),
        );

        let state = AppState::new(Arc::new(config), Arc::new(pipeline));
        let router = kitspace_api::build_app(state.clone());

        Self {
            router,
            state,
            shell,
            workspace,
        }
    }

    pub fn store(&self) -> &AssetStore {
        self.state.store()
    }

    pub fn tracker(&self) -> &StatusTracker {
        self.state.tracker()
    }

    /// Write `files` into a fresh checkout and enqueue it at `identity`.
    pub async fn enqueue_checkout(
        &self,
        identity: &ContentIdentity,
        files: &[(&str, &str)],
    ) -> RunHandle {
        let dir = self.workspace.path().join("fixtures").join(identity.prefix());
        for (name, contents) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create fixture dir");
            }
            std::fs::write(&path, contents).expect("Failed to write fixture");
        }
        std::fs::create_dir_all(&dir).expect("Failed to create checkout");

        self.state
            .pipeline
            .enqueue_checkout(identity, &dir, RepoInfo::default())
            .await
            .expect("Failed to enqueue checkout")
    }

    /// Poll the tracker until `asset` reaches `status`.
    pub async fn wait_for_status(&self, asset: &AssetId, status: TaskStatus) {
        for _ in 0..400 {
            if self.tracker().status(asset) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{asset} never reached {status:?}");
    }

    /// Make a request to the app.
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");
        self.request(request).await
    }

    pub async fn post(&self, path: &str, headers: &[(&str, &str)], body: Bytes) -> TestResponse {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("Failed to build request");
        self.request(request).await
    }
}
