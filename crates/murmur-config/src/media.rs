// ============================================================================
// Media Storage Configuration
// ============================================================================

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{DEFAULT_STORAGE_DIR, DEFAULT_STORAGE_TIMEOUT_MS};
use crate::env_parse;

/// Where asset bytes live
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local directory, one file per storage key
    Filesystem,
    /// Remote object store reachable at `DELETE {base_url}/{key}`
    Http,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filesystem" | "fs" => Ok(StorageBackend::Filesystem),
            "http" | "remote" => Ok(StorageBackend::Http),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Media service storage configuration
#[derive(Clone, Debug)]
pub struct MediaStorageConfig {
    pub backend: StorageBackend,
    pub storage_dir: PathBuf,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl MediaStorageConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let backend = std::env::var("MEDIA_STORAGE_BACKEND")
            .unwrap_or_else(|_| "filesystem".to_string())
            .parse::<StorageBackend>()
            .map_err(|e| anyhow::anyhow!(e))?;
        let base_url = std::env::var("MEDIA_STORAGE_BASE_URL").unwrap_or_default();

        if backend == StorageBackend::Http && base_url.is_empty() {
            anyhow::bail!("MEDIA_STORAGE_BASE_URL is required when MEDIA_STORAGE_BACKEND=http");
        }

        Ok(Self {
            backend,
            storage_dir: std::env::var("MEDIA_STORAGE_DIR")
                .unwrap_or_else(|_| DEFAULT_STORAGE_DIR.to_string())
                .into(),
            base_url,
            timeout_ms: env_parse("STORAGE_TIMEOUT_MS", DEFAULT_STORAGE_TIMEOUT_MS),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for MediaStorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            storage_dir: DEFAULT_STORAGE_DIR.into(),
            base_url: String::new(),
            timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
        }
    }
}
