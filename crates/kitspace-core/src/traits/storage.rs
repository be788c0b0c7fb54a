//! Storage provider trait for pluggable asset store backends.

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// Metadata about a stored object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StorageObjectMeta {
    /// Key within the storage provider.
    pub path: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// MIME type (if known).
    pub content_type: Option<String>,
    /// Last modified timestamp.
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Trait for asset store backends.
///
/// Implementations exist for the local filesystem, S3 and memory. Every
/// `write` must be whole-object: a concurrent reader sees either the old
/// object, nothing, or the complete new object.
#[async_trait]
pub trait StorageProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local", "s3").
    fn provider_type(&self) -> &str;

    /// Check whether the provider is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Read an object into memory.
    ///
    /// Missing objects fail with [`crate::error::ErrorKind::NotFound`].
    async fn read_bytes(&self, path: &str) -> AppResult<Bytes>;

    /// Write a complete object at the given key.
    async fn write(&self, path: &str, data: Bytes, content_type: Option<&str>) -> AppResult<()>;

    /// Check whether an object exists without transferring its bytes.
    async fn exists(&self, path: &str) -> AppResult<bool>;

    /// Get metadata about an object.
    async fn metadata(&self, path: &str) -> AppResult<StorageObjectMeta>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> AppResult<()>;
}
