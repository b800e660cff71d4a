use async_trait::async_trait;
use aws_sdk_s3 as s3;
use bytes::Bytes;
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// StorageError
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object store request failed: {0}")]
    Backend(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Defines the abstract contract for storing uploaded images. This trait allows us to
/// swap the concrete implementation (local disk by default, an S3-compatible bucket in
/// deployments that have one, an in-memory mock in tests) without affecting the
/// calling handlers.
///
/// Keys are relative paths such as `items/image-1700000000-42.png`; every
/// implementation runs them through `sanitize_key` first.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Prepares the backend at startup (upload directory or bucket).
    async fn ensure_ready(&self) -> Result<(), StorageError>;

    /// Writes `body` under `key` and returns the public URL clients should use.
    async fn store(&self, key: &str, content_type: &str, body: Bytes) -> Result<String, StorageError>;

    /// Removes the object. `Ok(false)` when nothing was stored under `key`.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// The public URL an object stored under `key` is reachable at.
    fn url_for(&self, key: &str) -> String;
}

/// sanitize_key
///
/// Prevents path traversal by removing directory navigation components (`..`, `.`)
/// and empty segments from a user-influenced key.
pub fn sanitize_key(key: &str) -> String {
    key.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn checked_key(key: &str) -> Result<String, StorageError> {
    let clean = sanitize_key(key);
    if clean.is_empty() {
        Err(StorageError::InvalidKey(key.to_string()))
    } else {
        Ok(clean)
    }
}

// 2. Local disk (default)
/// LocalDiskStorage
///
/// Writes below `root`; the router serves that directory under `/uploads`.
#[derive(Clone, Debug)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl StorageService for LocalDiskStorage {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.root.join("items")).await?;
        Ok(())
    }

    async fn store(&self, key: &str, _content_type: &str, body: Bytes) -> Result<String, StorageError> {
        let key = checked_key(key)?;
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body).await?;
        tracing::debug!(path = %path.display(), bytes = body.len(), "stored upload on disk");
        Ok(self.url_for(&key))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let key = checked_key(key)?;
        match tokio::fs::remove_file(self.root.join(&key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("/uploads/{}", sanitize_key(key))
    }
}

// 3. S3-compatible bucket (MinIO, Supabase Storage, AWS)
/// S3StorageClient
///
/// The concrete implementation using the AWS SDK for S3. `force_path_style(true)` is
/// required for MinIO and Supabase compatibility.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_url: String,
}

impl S3StorageClient {
    /// new
    ///
    /// Constructs the S3 client from the storage section of AppConfig.
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_ready
    ///
    /// CreateBucket fails harmlessly when the bucket already exists, so the result is
    /// only logged.
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
        Ok(())
    }

    async fn store(&self, key: &str, content_type: &str, body: Bytes) -> Result<String, StorageError> {
        let key = checked_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(self.url_for(&key))
    }

    /// delete
    ///
    /// DeleteObject succeeds for absent keys, so existence is probed with HeadObject first.
    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let key = checked_key(key)?;
        if let Err(e) = self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
        {
            let service_error = e.into_service_error();
            if service_error.is_not_found() {
                return Ok(false);
            }
            return Err(StorageError::Backend(service_error.to_string()));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(true)
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, sanitize_key(key))
    }
}

// 4. The Mock Implementation (For Tests)
/// MockStorageService
///
/// Keeps objects in memory so upload/delete handlers can be tested without a disk
/// layout or a network connection.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(&sanitize_key(key))
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn store(&self, key: &str, _content_type: &str, body: Bytes) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend("mock storage failure".to_string()));
        }
        let key = checked_key(key)?;
        self.objects.lock().await.insert(key.clone(), body);
        Ok(self.url_for(&key))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend("mock storage failure".to_string()));
        }
        let key = checked_key(key)?;
        Ok(self.objects.lock().await.remove(&key).is_some())
    }

    fn url_for(&self, key: &str) -> String {
        format!("/uploads/{}", sanitize_key(key))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service access across the application state.
pub type StorageState = Arc<dyn StorageService>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_key_strips_traversal() {
        assert_eq!(sanitize_key("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_key("items/./a.png"), "items/a.png");
        assert_eq!(sanitize_key("items\\..\\b.png"), "items/b.png");
        assert_eq!(sanitize_key("//"), "");
    }

    #[tokio::test]
    async fn local_disk_store_and_delete() {
        let root = std::env::temp_dir().join(format!("clf-storage-{}", uuid::Uuid::new_v4()));
        let storage = LocalDiskStorage::new(&root);
        storage.ensure_ready().await.unwrap();

        let url = storage
            .store("items/a.png", "image/png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(url, "/uploads/items/a.png");
        assert!(root.join("items/a.png").exists());

        assert!(storage.delete("items/a.png").await.unwrap());
        assert!(!storage.delete("items/a.png").await.unwrap());
        assert!(matches!(
            storage.delete("../..").await,
            Err(StorageError::InvalidKey(_))
        ));

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
