use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(MessageId);

impl MessageId {
    /// Mints a fresh store-style identifier. The hosted store issues its own
    /// ids on insert; this exists for adapters and tests that need one before
    /// the round trip completes.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// A signed-in user as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
}

/// A chat message as mirrored from the remote store.
///
/// `text`, `attachment_url` and `attachment_path` follow the store's
/// empty-string-means-absent record convention. `created_at` is `None` until
/// the server has committed its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachment_url: String,
    #[serde(default)]
    pub attachment_path: String,
    pub author_id: UserId,
    pub author_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn has_attachment(&self) -> bool {
        !self.attachment_path.is_empty()
    }

    /// A record with neither text nor a retrievable attachment is invalid
    /// and must never reach the store.
    pub fn has_content(&self) -> bool {
        !self.text.is_empty() || !self.attachment_url.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.created_at.is_none()
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
