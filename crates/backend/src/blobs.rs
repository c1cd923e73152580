use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use client_core::BlobStore;
use reqwest::Client;
use shared::protocol::BlobUrlResponse;
use tracing::info;

use crate::BackendConfig;

/// Path-addressable blob storage over REST. Storage paths contain `/`, so
/// they travel as a single URL-safe base64 segment.
pub struct RestBlobStore {
    http: Client,
    config: BackendConfig,
}

impl RestBlobStore {
    pub fn new(http: Client, config: BackendConfig) -> Self {
        Self { http, config }
    }

    fn blob_url(&self, path: &str, suffix: &str) -> String {
        self.config.http_url(&format!(
            "/blobs/{}{suffix}",
            URL_SAFE_NO_PAD.encode(path.as_bytes())
        ))
    }
}

#[async_trait]
impl BlobStore for RestBlobStore {
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<()> {
        self.http
            .post(self.blob_url(path, ""))
            .body(bytes.to_vec())
            .send()
            .await?
            .error_for_status()?;
        info!(path = %path, size_bytes = bytes.len(), "backend: blob uploaded");
        Ok(())
    }

    async fn get_url(&self, path: &str) -> Result<String> {
        let response: BlobUrlResponse = self
            .http
            .get(self.blob_url(path, "/url"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.url)
    }

    async fn delete_by_path(&self, path: &str) -> Result<()> {
        self.http
            .delete(self.blob_url(path, ""))
            .send()
            .await?
            .error_for_status()?;
        info!(path = %path, "backend: blob deleted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/blobs_tests.rs"]
mod tests;
