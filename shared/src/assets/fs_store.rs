use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::{DeleteOutcome, ObjectStore, StorageError};

/// Objects stored as files under a root directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` under the root. Keys may contain `/` but must stay
    /// inside the root.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let contained = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn delete(&self, key: &str) -> Result<DeleteOutcome, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(storage_key = %key, "Removed stored object");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn backend(&self) -> &'static str {
        "filesystem"
    }
}
