//! Adapters binding the hosted backend service to the `client_core`
//! collaborator traits: REST for identity, records and blobs, WebSocket for
//! the live snapshot subscription.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use url::Url;

mod blobs;
mod identity;
mod messages;

pub use blobs::RestBlobStore;
pub use identity::RestIdentityProvider;
pub use messages::RestMessageStore;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    base_url: Url,
}

impl BackendConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url: Url = base_url
            .parse()
            .with_context(|| format!("invalid backend url: {base_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!("backend url must start with http:// or https://"));
        }
        Ok(Self { base_url })
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// Snapshot subscriptions ride a WebSocket on the same host; the scheme
    /// follows the configured transport security.
    pub fn ws_url(&self, path: &str) -> String {
        let http = self.http_url(path);
        if let Some(rest) = http.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = http.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            http
        }
    }
}

/// The three collaborator implementations sharing one HTTP client.
pub struct Backend {
    pub identity: Arc<RestIdentityProvider>,
    pub messages: Arc<RestMessageStore>,
    pub blobs: Arc<RestBlobStore>,
}

impl Backend {
    pub fn new(config: BackendConfig) -> Self {
        let http = Client::new();
        Self {
            identity: Arc::new(RestIdentityProvider::new(http.clone(), config.clone())),
            messages: Arc::new(RestMessageStore::new(http.clone(), config.clone())),
            blobs: Arc::new(RestBlobStore::new(http, config)),
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
