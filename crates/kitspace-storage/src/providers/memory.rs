//! In-memory storage provider.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use kitspace_core::error::AppError;
use kitspace_core::result::AppResult;
use kitspace_core::traits::storage::{StorageObjectMeta, StorageProvider};

use super::mime_from_path;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

/// Keeps objects in a concurrent map. Used for tests and ephemeral runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageProvider {
    objects: Arc<DashMap<String, StoredObject>>,
}

impl MemoryStorageProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

#[async_trait]
impl StorageProvider for MemoryStorageProvider {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn read_bytes(&self, path: &str) -> AppResult<Bytes> {
        self.objects
            .get(normalize(path))
            .map(|o| o.data.clone())
            .ok_or_else(|| AppError::not_found(format!("Object not found: {path}")))
    }

    async fn write(&self, path: &str, data: Bytes, content_type: Option<&str>) -> AppResult<()> {
        let object = StoredObject {
            data,
            content_type: content_type.map(str::to_string),
            last_modified: Utc::now(),
        };
        self.objects.insert(normalize(path).to_string(), object);
        Ok(())
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        Ok(self.objects.contains_key(normalize(path)))
    }

    async fn metadata(&self, path: &str) -> AppResult<StorageObjectMeta> {
        let object = self
            .objects
            .get(normalize(path))
            .ok_or_else(|| AppError::not_found(format!("Object not found: {path}")))?;
        Ok(StorageObjectMeta {
            path: path.to_string(),
            size_bytes: object.data.len() as u64,
            content_type: object
                .content_type
                .clone()
                .or_else(|| mime_from_path(path).map(str::to_string)),
            last_modified: Some(object.last_modified),
        })
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        self.objects.remove(normalize(path));
        Ok(())
    }
}
