//! Blob storage for generated documents

pub mod azure;
pub mod local;

pub use azure::{AzureBlobStore, ConnectionString};
pub use local::LocalBlobStore;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Error, Result};

/// Trait for named-blob storage
///
/// Implementations:
/// - `AzureBlobStore`: Azure Blob Storage REST API
/// - `LocalBlobStore`: Local filesystem
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `name`. With `overwrite == false` an existing
    /// blob is left untouched and the call fails.
    async fn upload_bytes(&self, name: &str, data: &[u8], overwrite: bool) -> Result<()>;

    /// Blob contents, `None` when it does not exist
    async fn download_bytes(&self, name: &str) -> Result<Option<Vec<u8>>>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Returns whether a blob was deleted
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Blob names starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    async fn upload_file(&self, name: &str, path: &Path, overwrite: bool) -> Result<()> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            Error::storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.upload_bytes(name, &data, overwrite).await
    }

    /// Download to `path`; `false` when the blob does not exist
    async fn download_file(&self, name: &str, path: &Path) -> Result<bool> {
        let Some(data) = self.download_bytes(name).await? else {
            return Ok(false);
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(true)
    }
}

/// Build the configured store, `None` when storage is disabled
pub async fn create_blob_store(config: &StorageConfig) -> Result<Option<Arc<dyn BlobStore>>> {
    let store: Arc<dyn BlobStore> = match config.backend {
        StorageBackend::Disabled => {
            tracing::info!("Blob storage disabled; generated documents are not persisted");
            return Ok(None);
        }
        StorageBackend::Local => Arc::new(LocalBlobStore::new(config.local_root.clone())?),
        StorageBackend::Azure => {
            let connection_string = config.connection_string.as_deref().ok_or_else(|| {
                Error::Config("Azure storage requires a connection string".to_string())
            })?;
            Arc::new(AzureBlobStore::connect(connection_string, &config.container).await?)
        }
    };
    tracing::info!("Blob storage: {}", store.name());
    Ok(Some(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_backend() {
        let store = create_blob_store(&StorageConfig::default()).await.unwrap();
        assert!(store.is_none());
    }

    #[tokio::test]
    async fn test_local_backend_and_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Local,
            local_root: dir.path().join("blobs"),
            ..Default::default()
        };
        let store = create_blob_store(&config).await.unwrap().unwrap();
        assert_eq!(store.name(), "local-filesystem");

        let source = dir.path().join("proposal.docx");
        std::fs::write(&source, b"PK docx").unwrap();
        store.upload_file("docx/proposal.docx", &source, true).await.unwrap();

        let target = dir.path().join("restored").join("copy.docx");
        assert!(store.download_file("docx/proposal.docx", &target).await.unwrap());
        assert_eq!(std::fs::read(&target).unwrap(), b"PK docx");
        assert!(!store.download_file("docx/missing.docx", &target).await.unwrap());
    }

    #[tokio::test]
    async fn test_azure_backend_requires_connection_string() {
        let config = StorageConfig {
            backend: StorageBackend::Azure,
            ..Default::default()
        };
        assert!(matches!(create_blob_store(&config).await, Err(Error::Config(_))));
    }
}
