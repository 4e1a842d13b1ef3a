/// Blob storage: key-addressed objects with public download URLs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::Result;

/// Top-level folder of an uploaded object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobCategory {
    PostImages,
    ProfileImages,
}

impl BlobCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobCategory::PostImages => "post-images",
            BlobCategory::ProfileImages => "profile-images",
        }
    }
}

/// Object key following `{category}/{userId}/{timestamp}-{filename}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobPath(String);

impl BlobPath {
    /// Slashes in the file name are replaced so the key keeps three segments
    pub fn new(category: BlobCategory, user_id: &str, timestamp_millis: i64, file_name: &str) -> Self {
        let file_name = file_name.replace('/', "_");
        Self(format!(
            "{}/{}/{}-{}",
            category.as_str(),
            user_id,
            timestamp_millis,
            file_name
        ))
    }

    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata returned by an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub key: String,
    pub bucket: String,
    pub content_type: String,
    pub size: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `path`, replacing any existing object
    async fn upload(&self, path: &BlobPath, bytes: Vec<u8>, content_type: &str) -> Result<BlobMetadata>;

    /// Public URL of an existing object
    async fn download_url(&self, path: &BlobPath) -> Result<String>;

    async fn download(&self, path: &BlobPath) -> Result<Vec<u8>>;

    async fn delete(&self, path: &BlobPath) -> Result<()>;

    async fn exists(&self, path: &BlobPath) -> Result<bool>;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Bucket settings used to build download URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    pub bucket: String,
    /// Base URL, e.g. `https://storage.local/v0/b/{bucket}`
    pub base_url: String,
}

impl BlobConfig {
    pub fn new(bucket: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            base_url: base_url.into(),
        }
    }

    pub fn download_url(&self, key: &str) -> String {
        format!(
            "{}/o/{}?alt=media",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(key)
        )
    }
}

struct StoredObject {
    bytes: Vec<u8>,
    metadata: BlobMetadata,
}

/// Blob storage kept in memory
pub struct InMemoryBlobStore {
    config: BlobConfig,
    objects: RwLock<HashMap<String, StoredObject>>,
    upload_failure: Mutex<Option<String>>,
}

impl InMemoryBlobStore {
    pub fn new(config: BlobConfig) -> Self {
        Self {
            config,
            objects: RwLock::new(HashMap::new()),
            upload_failure: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Make every upload fail with `message` until cleared
    pub fn fail_uploads(&self, message: Option<&str>) {
        *self
            .upload_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = message.map(str::to_string);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, path: &BlobPath, bytes: Vec<u8>, content_type: &str) -> Result<BlobMetadata> {
        let failure = self
            .upload_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(message) = failure {
            return Err(StoreError::Unavailable(message));
        }

        let metadata = BlobMetadata {
            key: path.as_str().to_string(),
            bucket: self.config.bucket.clone(),
            content_type: content_type.to_string(),
            size: bytes.len(),
            uploaded_at: Utc::now(),
        };
        self.objects.write().await.insert(
            path.as_str().to_string(),
            StoredObject {
                bytes,
                metadata: metadata.clone(),
            },
        );
        debug!(key = %path, size = metadata.size, "blob uploaded");
        Ok(metadata)
    }

    async fn download_url(&self, path: &BlobPath) -> Result<String> {
        if self.objects.read().await.contains_key(path.as_str()) {
            Ok(self.config.download_url(path.as_str()))
        } else {
            Err(StoreError::ObjectNotFound(path.as_str().to_string()))
        }
    }

    async fn download(&self, path: &BlobPath) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(path.as_str())
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::ObjectNotFound(path.as_str().to_string()))
    }

    async fn delete(&self, path: &BlobPath) -> Result<()> {
        match self.objects.write().await.remove(path.as_str()) {
            Some(object) => {
                debug!(key = %path, size = object.metadata.size, "blob deleted");
                Ok(())
            }
            None => Err(StoreError::ObjectNotFound(path.as_str().to_string())),
        }
    }

    async fn exists(&self, path: &BlobPath) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(path.as_str()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
