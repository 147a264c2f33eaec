use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};

/// Folder every generated image is written under.
pub const IMAGE_PREFIX: &str = "img";

/// Write-by-key binary storage shared by every pipeline run.
///
/// Keys are random, so concurrent runs never need to coordinate.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload a file to the store.
    async fn upload_file(&self, rel_path: &str, content: Vec<u8>) -> Result<()>;

    /// Read a file back from the store.
    async fn download_file(&self, rel_path: &str) -> Result<Vec<u8>>;

    /// Upload an image under a fresh key, returning the key.
    async fn upload_image(&self, image: Vec<u8>) -> Result<String> {
        let rel_path = format!("{}/{}.jpg", IMAGE_PREFIX, uuid::Uuid::new_v4());
        self.upload_file(&rel_path, image).await?;
        tracing::debug!("Uploaded image: {}", rel_path);
        Ok(rel_path)
    }
}

#[derive(Clone)]
pub struct StorageClient {
    gcs_client: Client,
    bucket: String,
}

impl StorageClient {
    pub async fn new(bucket: &str) -> Result<Self> {
        let config = ClientConfig::default().with_auth().await?;
        let gcs_client = Client::new(config);
        Ok(Self {
            gcs_client,
            bucket: bucket.into(),
        })
    }
}

#[async_trait]
impl ArtifactStore for StorageClient {
    async fn upload_file(&self, rel_path: &str, content: Vec<u8>) -> Result<()> {
        let media = Media::new(rel_path.to_string());
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        self.gcs_client
            .upload_object(&request, content, &UploadType::Simple(media))
            .await?;
        Ok(())
    }

    async fn download_file(&self, rel_path: &str) -> Result<Vec<u8>> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: rel_path.into(),
            ..Default::default()
        };
        Ok(self
            .gcs_client
            .download_object(&request, &Range::default())
            .await?)
    }
}

/// Keeps everything in process memory. Used for local development and tests.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key written so far, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = self
            .files
            .lock()
            .map(|files| files.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn upload_file(&self, rel_path: &str, content: Vec<u8>) -> Result<()> {
        self.files
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?
            .insert(rel_path.into(), content);
        Ok(())
    }

    async fn download_file(&self, rel_path: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?
            .get(rel_path)
            .cloned()
            .ok_or_else(|| anyhow!("No such file: {}", rel_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_image_keys() {
        let store = MemoryStore::new();
        let first = store.upload_image(vec![1, 2, 3]).await.unwrap();
        let second = store.upload_image(vec![1, 2, 3]).await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("img/") && first.ends_with(".jpg"));
        assert_eq!(store.download_file(&first).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let store = MemoryStore::new();
        assert!(store.download_file("img/nothing.jpg").await.is_err());
    }
}
