//! S3-compatible object storage provider (requires the `s3` feature).

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use kitspace_core::config::storage::S3StorageConfig;
use kitspace_core::error::AppError;
use kitspace_core::result::AppResult;
use kitspace_core::traits::storage::{StorageObjectMeta, StorageProvider};

/// S3-compatible storage provider.
#[derive(Debug, Clone)]
pub struct S3StorageProvider {
    client: Client,
    bucket: String,
}

impl S3StorageProvider {
    /// Create a new S3 storage provider.
    pub async fn new(config: &S3StorageConfig) -> AppResult<Self> {
        tracing::info!(
            endpoint = %config.endpoint,
            region = %config.region,
            bucket = %config.bucket,
            "Initializing S3 storage provider"
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if !config.access_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "kitspace-config",
            ));
        }
        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(config.endpoint.clone());
        }

        let provider = Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        };

        if config.create_bucket {
            provider.ensure_bucket().await?;
        }

        Ok(provider)
    }

    /// Create the bucket with a public read policy when it does not exist.
    async fn ensure_bucket(&self) -> AppResult<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        tracing::info!(bucket = %self.bucket, "Creating S3 bucket");
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                AppError::storage(format!(
                    "Failed to create bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        let policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "PublicRead",
                "Effect": "Allow",
                "Principal": "*",
                "Action": ["s3:GetObject"],
                "Resource": [format!("arn:aws:s3:::{}/*", self.bucket)],
            }],
        });
        self.client
            .put_bucket_policy()
            .bucket(&self.bucket)
            .policy(policy.to_string())
            .send()
            .await
            .map_err(|e| {
                AppError::storage(format!(
                    "Failed to set policy on {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    fn key(path: &str) -> &str {
        path.trim_start_matches('/')
    }
}

#[async_trait]
impl StorageProvider for S3StorageProvider {
    fn provider_type(&self) -> &str {
        "s3"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok())
    }

    async fn read_bytes(&self, path: &str) -> AppResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => {
                    AppError::not_found(format!("Object not found: {path}"))
                }
                _ => AppError::storage(format!(
                    "Failed to get {path}: {}",
                    DisplayErrorContext(&e)
                )),
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::storage(format!("Failed to read body of {path}: {e}")))?;
        Ok(body.into_bytes())
    }

    async fn write(&self, path: &str, data: Bytes, content_type: Option<&str>) -> AppResult<()> {
        let size = data.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .body(ByteStream::from(data));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        request.send().await.map_err(|e| {
            AppError::storage(format!("Failed to put {path}: {}", DisplayErrorContext(&e)))
        })?;

        tracing::debug!(path, bytes = size, "Uploaded object");
        Ok(())
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match e.as_service_error() {
                Some(service) if service.is_not_found() => Ok(false),
                _ => Err(AppError::storage(format!(
                    "Failed to head {path}: {}",
                    DisplayErrorContext(&e)
                ))),
            },
        }
    }

    async fn metadata(&self, path: &str) -> AppResult<StorageObjectMeta> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_not_found() => {
                    AppError::not_found(format!("Object not found: {path}"))
                }
                _ => AppError::storage(format!(
                    "Failed to head {path}: {}",
                    DisplayErrorContext(&e)
                )),
            })?;

        let last_modified = output
            .last_modified()
            .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos()));

        Ok(StorageObjectMeta {
            path: path.to_string(),
            size_bytes: output.content_length().unwrap_or(0).max(0) as u64,
            content_type: output.content_type().map(str::to_string),
            last_modified,
        })
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .send()
            .await
            .map_err(|e| {
                AppError::storage(format!(
                    "Failed to delete {path}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
