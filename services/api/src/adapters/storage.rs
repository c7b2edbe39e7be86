//! services/api/src/adapters/storage.rs
//!
//! Local-filesystem object storage. Media objects live under a configured
//! root directory and are served back through the media file route, so the
//! public URL is just the base URL plus the object key.

use async_trait::async_trait;
use momentbox_core::ports::{ObjectStorageService, PortError, PortResult};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone)]
pub struct LocalStorageAdapter {
    root: PathBuf,
    base_url: String,
}

impl LocalStorageAdapter {
    pub fn new(root: PathBuf, base_url: String) -> Self {
        Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolves a reference (public URL or bare key) to a path under the
    /// storage root. Keys that try to escape the root are rejected.
    fn resolve(&self, reference: &str) -> PortResult<PathBuf> {
        let key = reference
            .strip_prefix(&self.base_url)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(reference);
        if key.is_empty() || Path::new(key).components().any(|c| c.as_os_str() == "..") {
            return Err(PortError::Validation(format!(
                "invalid storage reference '{reference}'"
            )));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStorageService for LocalStorageAdapter {
    async fn fetch(&self, reference: &str) -> PortResult<Vec<u8>> {
        let path = self.resolve(reference)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PortError::NotFound(format!("object '{reference}' not found"))
            } else {
                PortError::Unexpected(e.to_string())
            }
        })
    }

    async fn store(&self, key: &str, bytes: &[u8], _content_type: &str) -> PortResult<String> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        debug!(key, size = bytes.len(), "object stored");
        Ok(format!("{}/{key}", self.base_url))
    }

    async fn exists(&self, reference: &str) -> PortResult<bool> {
        let path = self.resolve(reference)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, reference: &str) -> PortResult<()> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }
}
