//! # Filesystem Overflow Store
//!
//! Local filesystem implementation of [`OverflowStore`] for development and testing.
//! Objects live at `{base_path}/{container}/{overflow_id}.json`.

use crate::client::OverflowStore;
use crate::error::StorageError;
use crate::message::{ContainerName, OverflowId};
use crate::provider::FilesystemConfig;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[cfg(test)]
#[path = "filesystem_tests.rs"]
mod tests;

/// Filesystem-based overflow store
///
/// # Examples
///
/// ```no_run
/// use hybrid_queue_runtime::providers::FilesystemOverflowStore;
/// use hybrid_queue_runtime::{ContainerName, FilesystemConfig};
/// use std::path::{Path, PathBuf};
///
/// let store = FilesystemOverflowStore::new(
///     &FilesystemConfig { base_path: PathBuf::from("./data/overflow") },
///     ContainerName::new("overflow".to_string()).unwrap(),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemOverflowStore {
    container_name: ContainerName,
    container_path: PathBuf,
}

impl FilesystemOverflowStore {
    /// Create a store rooted at the configured base path
    ///
    /// No directory is touched until [`OverflowStore::create_if_not_exists`] runs.
    pub fn new(config: &FilesystemConfig, container_name: ContainerName) -> Self {
        let container_path = config.base_path.join(container_name.as_str());
        Self {
            container_name,
            container_path,
        }
    }

    /// Full path of the object stored under `id`
    pub fn object_path(&self, id: &OverflowId) -> PathBuf {
        self.container_path.join(format!("{}.json", id))
    }
}

fn io_error(context: &str, path: &Path, error: std::io::Error) -> StorageError {
    match error.kind() {
        ErrorKind::NotFound => StorageError::NotFound {
            key: path.display().to_string(),
        },
        ErrorKind::PermissionDenied => StorageError::PermissionDenied {
            operation: format!("{} {}", context, path.display()),
        },
        _ => StorageError::InternalError {
            message: format!("Failed to {} {}: {}", context, path.display(), error),
        },
    }
}

async fn write_file(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| io_error("create temp file", path, e))?;

    file.write_all(content)
        .await
        .map_err(|e| io_error("write", path, e))?;

    file.flush().await.map_err(|e| io_error("flush", path, e))
}

#[async_trait]
impl OverflowStore for FilesystemOverflowStore {
    async fn create_if_not_exists(&self) -> Result<bool, StorageError> {
        if fs::try_exists(&self.container_path)
            .await
            .map_err(|e| io_error("inspect", &self.container_path, e))?
        {
            return Ok(false);
        }

        fs::create_dir_all(&self.container_path)
            .await
            .map_err(|e| io_error("create directory", &self.container_path, e))?;
        Ok(true)
    }

    async fn upload(
        &self,
        id: &OverflowId,
        content: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let object_path = self.object_path(id);
        tracing::trace!(
            path = %object_path.display(),
            content_type = content_type,
            size = content.len(),
            "Writing overflow object"
        );

        // Write to a temporary file first so readers never observe a partial object
        let temp_path = object_path.with_extension("tmp");
        let result = match write_file(&temp_path, &content).await {
            Ok(()) => fs::rename(&temp_path, &object_path)
                .await
                .map_err(|e| io_error("rename", &temp_path, e)),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(e) = fs::remove_file(&temp_path).await {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(
                        path = %temp_path.display(),
                        error = %e,
                        "Failed to remove temporary overflow object"
                    );
                }
            }
        }

        result
    }

    async fn open_read(&self, id: &OverflowId) -> Result<Bytes, StorageError> {
        let object_path = self.object_path(id);
        let content = fs::read(&object_path)
            .await
            .map_err(|e| io_error("read", &object_path, e))?;
        Ok(Bytes::from(content))
    }

    async fn delete_if_exists(&self, id: &OverflowId) -> Result<bool, StorageError> {
        let object_path = self.object_path(id);
        match fs::remove_file(&object_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("delete", &object_path, e)),
        }
    }

    fn container_name(&self) -> &ContainerName {
        &self.container_name
    }
}
