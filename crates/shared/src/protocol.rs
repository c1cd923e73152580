use serde::{Deserialize, Serialize};

use crate::{
    domain::{Message, MessageId, UserId},
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInResponse {
    pub user_id: UserId,
    pub email: String,
    pub id_token: String,
}

/// Record shape for inserting a message. The store assigns `id` and
/// `created_at`; `attachment_url`/`attachment_path` are empty strings for
/// text-only messages, matching the stored record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessageRecord {
    pub text: String,
    pub attachment_url: String,
    pub attachment_path: String,
    pub author_id: UserId,
    pub author_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertMessageResponse {
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUploadResponse {
    pub path: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUrlResponse {
    pub url: String,
}

/// Events pushed by the store over the snapshot subscription socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreEvent {
    /// Complete ordered materialization of the room, `created_at` ascending.
    /// Every change to the collection yields a full snapshot, never a diff.
    Snapshot { messages: Vec<Message> },
    Error(ApiError),
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
