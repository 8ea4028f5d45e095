use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

use super::{DeleteOutcome, ObjectStore, StorageError};

/// Remote object store addressed as `DELETE {base_url}/{key}`
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                StorageError::Unavailable(format!("invalid storage base URL: {}", base_url))
            })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Append the `/`-separated segments of `key` to the base path, each
    /// percent-encoded. Empty, `.` and `..` segments are rejected so a key
    /// can only name an object below the base.
    fn url_for(&self, key: &str) -> Result<Url, StorageError> {
        let segments: Vec<&str> = key.split('/').collect();
        if segments
            .iter()
            .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidKey(key.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn delete(&self, key: &str) -> Result<DeleteOutcome, StorageError> {
        let url = self.url_for(key)?;
        let response = self.client.delete(url).send().await?;
        let status = response.status();
        debug!(storage_key = %key, status = status.as_u16(), "Remote delete");

        match status {
            s if s.is_success() => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(DeleteOutcome::NotFound),
            s => Err(StorageError::Status(s.as_u16())),
        }
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}
