//! Attachment lifecycle: pairs a message's optional binary attachment with
//! its stored blob so that deleting the message can reclaim the blob.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::BlobStore;

/// Result of a successful upload. Both fields are persisted on the message
/// record: the path is the durable delete handle, the URL is a display-time
/// convenience that is never re-derived into a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub url: String,
    pub path: String,
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Store unreachable or payload rejected. Fatal to the enclosing send.
    #[error("blob upload failed")]
    Upload(#[source] anyhow::Error),
    /// Blob delete failed after the record was already removed. Callers log
    /// this and move on; a dangling blob is a recoverable leak.
    #[error("blob cleanup failed for {path}")]
    Cleanup {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

pub struct AttachmentManager {
    store: Arc<dyn BlobStore>,
}

impl AttachmentManager {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Uploads `bytes` under a collision-resistant path and returns the
    /// retrieval URL together with the durable path.
    pub async fn upload(
        &self,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<StoredAttachment, AttachmentError> {
        let path = storage_path(original_name);
        self.store
            .upload(bytes, &path)
            .await
            .map_err(AttachmentError::Upload)?;

        let url = match self.store.get_url(&path).await {
            Ok(url) => url,
            Err(source) => {
                // No record will ever reference this path; reclaim it now.
                let _ = self.store.delete_by_path(&path).await;
                return Err(AttachmentError::Upload(source));
            }
        };

        info!(path = %path, size_bytes = bytes.len(), "attachments: blob stored");
        Ok(StoredAttachment { url, path })
    }

    /// Best-effort removal of a previously stored blob.
    pub async fn delete(&self, path: &str) -> Result<(), AttachmentError> {
        self.store
            .delete_by_path(path)
            .await
            .map_err(|source| AttachmentError::Cleanup {
                path: path.to_string(),
                source,
            })?;
        info!(path = %path, "attachments: blob deleted");
        Ok(())
    }
}

/// `chat/<uuid>-<sanitized name>`. The unique prefix makes collisions
/// between concurrent uploads of the same filename irrelevant.
fn storage_path(original_name: &str) -> String {
    format!(
        "chat/{}-{}",
        Uuid::new_v4().simple(),
        sanitize_file_name(original_name)
    )
}

fn sanitize_file_name(original_name: &str) -> String {
    let name: String = original_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "attachment".to_string()
    } else {
        name
    }
}

#[cfg(test)]
#[path = "tests/attachments_tests.rs"]
mod tests;
