//! Content-addressed asset store.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::try_join_all;

use kitspace_core::config::storage::StorageConfig;
use kitspace_core::error::AppError;
use kitspace_core::result::AppResult;
use kitspace_core::traits::storage::{StorageObjectMeta, StorageProvider};
use kitspace_core::types::identity::{AssetId, HEAD_REF};

use crate::providers::{LocalStorageProvider, MemoryStorageProvider, mime_from_path};

/// Typed front of a [`StorageProvider`] addressed by [`AssetId`].
#[derive(Debug, Clone)]
pub struct AssetStore {
    provider: Arc<dyn StorageProvider>,
}

impl AssetStore {
    /// Wrap a provider.
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    /// An empty in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorageProvider::new()))
    }

    /// Build the provider named by `config.provider`.
    pub async fn from_config(config: &StorageConfig) -> AppResult<Self> {
        let provider: Arc<dyn StorageProvider> = match config.provider.as_str() {
            "local" => Arc::new(LocalStorageProvider::new(&config.local.root_path).await?),
            "memory" => Arc::new(MemoryStorageProvider::new()),
            #[cfg(feature = "s3")]
            "s3" => Arc::new(crate::providers::S3StorageProvider::new(&config.s3).await?),
            other => {
                return Err(AppError::configuration(format!(
                    "Unsupported storage provider '{other}'"
                )));
            }
        };
        tracing::info!(provider = provider.provider_type(), "Asset store ready");
        Ok(Self::new(provider))
    }

    /// Name of the backing provider.
    pub fn provider_type(&self) -> &str {
        self.provider.provider_type()
    }

    /// Whether the backing provider is reachable.
    pub async fn health_check(&self) -> AppResult<bool> {
        self.provider.health_check().await
    }

    /// Write a complete asset.
    pub async fn put(&self, asset: &AssetId, data: Bytes) -> AppResult<()> {
        let path = asset.path();
        self.provider
            .write(&path, data, mime_from_path(asset.name()))
            .await
    }

    /// Copy an asset's bytes to its `HEAD` address.
    pub async fn mirror_to_head(&self, asset: &AssetId, data: Bytes) -> AppResult<()> {
        if asset.identity().is_head() {
            return Ok(());
        }
        self.put(&asset.at_ref(HEAD_REF), data).await
    }

    /// Existence check without transferring the asset bytes.
    pub async fn head(&self, asset: &AssetId) -> AppResult<bool> {
        self.provider.exists(&asset.path()).await
    }

    /// Whether every asset exists.
    pub async fn exists_all(&self, assets: &[AssetId]) -> AppResult<bool> {
        if assets.is_empty() {
            return Ok(false);
        }
        let found = try_join_all(assets.iter().map(|a| self.head(a))).await?;
        Ok(found.into_iter().all(|exists| exists))
    }

    /// Read an asset. Missing assets fail with `NotFound`.
    pub async fn get(&self, asset: &AssetId) -> AppResult<Bytes> {
        self.provider.read_bytes(&asset.path()).await
    }

    /// Asset size and content type.
    pub async fn metadata(&self, asset: &AssetId) -> AppResult<StorageObjectMeta> {
        self.provider.metadata(&asset.path()).await
    }
}
