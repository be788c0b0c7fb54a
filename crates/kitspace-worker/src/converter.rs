//! Converter plug-in contract and registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use kitspace_core::error::AppError;
use kitspace_core::shell::ShellError;
use kitspace_core::traits::CommandRunner;
use kitspace_core::types::identity::AssetId;
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::ProjectJob;
use kitspace_storage::AssetStore;

/// A per-format plug-in producing one category of derived assets.
///
/// Converters never write to the store. They return every output by name and
/// the scheduler persists them once `run` succeeds.
#[async_trait]
pub trait Converter: Send + Sync + std::fmt::Debug {
    /// The category this converter produces.
    fn category(&self) -> AssetCategory;

    /// Categories whose assets must be done before this one runs.
    fn dependencies(&self) -> &[AssetCategory] {
        &[]
    }

    /// Asset names this converter produces for `job`.
    fn outputs(&self, job: &ProjectJob) -> Vec<String>;

    /// Produce the assets.
    async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError>;
}

/// Error from a task run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// Converter or tool failure. Not retried.
    #[error("{0}")]
    Permanent(String),

    /// Infrastructure hiccup. Retried with backoff.
    #[error("{0}")]
    Transient(String),

    /// An upstream task failed, so this one never ran.
    #[error("dependency {category} failed: {message}")]
    Dependency {
        /// The failed upstream category.
        category: AssetCategory,
        /// The upstream error text.
        message: String,
    },

    /// Error from a lower layer. Retried when its kind is transient.
    #[error("{0}")]
    Internal(#[from] AppError),
}

impl TaskError {
    /// Whether the scheduler may retry after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Internal(e) => e.is_transient(),
            Self::Permanent(_) | Self::Dependency { .. } => false,
        }
    }

    /// Shorthand for a permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }
}

impl From<TaskError> for AppError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::Internal(inner) => inner,
            TaskError::Transient(message) => AppError::service_unavailable(message),
            other => AppError::external_service(other.to_string()),
        }
    }
}

impl From<ShellError> for TaskError {
    fn from(e: ShellError) -> Self {
        Self::Permanent(e.to_string())
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        Self::Permanent(format!("I/O error: {e}"))
    }
}

/// Named outputs of one converter run.
#[derive(Debug, Clone, Default)]
pub struct ConverterOutput {
    assets: BTreeMap<String, Bytes>,
}

impl ConverterOutput {
    /// An empty output set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an asset.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.assets.insert(name.into(), data.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.insert(name, data);
        self
    }

    /// Look up an asset.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.assets.get(name)
    }

    /// Whether an asset is present.
    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether no asset was produced.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Total payload size.
    pub fn total_bytes(&self) -> u64 {
        self.assets.values().map(|b| b.len() as u64).sum()
    }

    /// Iterate over `(name, bytes)`.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bytes)> {
        self.assets.iter()
    }
}

/// What a converter sees while running.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    /// The project being processed.
    pub job: Arc<ProjectJob>,
    /// Runner for external tools.
    pub shell: Arc<dyn CommandRunner>,
    /// Read access to assets produced by upstream categories.
    pub store: AssetStore,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl ConversionContext {
    /// Address an asset of the job's identity.
    pub fn asset(&self, name: &str) -> AssetId {
        self.job.identity.asset(name)
    }

    /// Read an upstream asset of the same identity.
    pub async fn upstream(&self, name: &str) -> Result<Bytes, TaskError> {
        Ok(self.store.get(&self.asset(name)).await?)
    }
}

/// Converters keyed by the category they produce.
#[derive(Debug, Default)]
pub struct ConverterRegistry {
    converters: HashMap<AssetCategory, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter, replacing any previous one for its category.
    pub fn register(&mut self, converter: Arc<dyn Converter>) {
        let category = converter.category();
        tracing::info!(%category, "Registered converter");
        self.converters.insert(category, converter);
    }

    /// The converter for `category`.
    pub fn get(&self, category: AssetCategory) -> Option<&Arc<dyn Converter>> {
        self.converters.get(&category)
    }

    /// Whether a converter is registered for `category`.
    pub fn has_converter(&self, category: AssetCategory) -> bool {
        self.converters.contains_key(&category)
    }

    /// Registered categories in pipeline order.
    pub fn categories(&self) -> Vec<AssetCategory> {
        AssetCategory::ALL
            .into_iter()
            .filter(|c| self.converters.contains_key(c))
            .collect()
    }

    /// `requested` plus every transitive dependency, dependencies first.
    ///
    /// Fails for unregistered categories and dependency cycles.
    pub fn resolve_order(
        &self,
        requested: &[AssetCategory],
    ) -> Result<Vec<AssetCategory>, AppError> {
        let mut order = Vec::new();
        let mut visiting = Vec::new();
        for &category in requested {
            self.visit(category, &mut visiting, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        category: AssetCategory,
        visiting: &mut Vec<AssetCategory>,
        order: &mut Vec<AssetCategory>,
    ) -> Result<(), AppError> {
        if order.contains(&category) {
            return Ok(());
        }
        if visiting.contains(&category) {
            return Err(AppError::configuration(format!(
                "converter dependency cycle through '{category}'"
            )));
        }
        let converter = self.get(category).ok_or_else(|| {
            AppError::validation(format!("no converter registered for '{category}'"))
        })?;

        visiting.push(category);
        for &dependency in converter.dependencies() {
            self.visit(dependency, visiting, order)?;
        }
        visiting.pop();
        order.push(category);
        Ok(())
    }
}
