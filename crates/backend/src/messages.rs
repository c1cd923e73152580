use anyhow::{Context, Result};
use async_trait::async_trait;
use client_core::{default_snapshot_channel, MessageStore, SnapshotFeed, SubscriptionGuard};
use futures::StreamExt;
use reqwest::Client;
use shared::{
    domain::MessageId,
    protocol::{InsertMessageResponse, NewMessageRecord, StoreEvent},
};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{info, warn};

use crate::BackendConfig;

/// Remote message collection over REST, with the live snapshot subscription
/// riding a WebSocket. The server owns ordering: every frame carries the
/// complete collection sorted by `created_at` ascending.
pub struct RestMessageStore {
    http: Client,
    config: BackendConfig,
}

impl RestMessageStore {
    pub fn new(http: Client, config: BackendConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl MessageStore for RestMessageStore {
    async fn subscribe(&self) -> Result<(SnapshotFeed, SubscriptionGuard)> {
        let ws_url = self
            .config
            .ws_url("/messages/subscribe?order=created_at&dir=asc");
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect snapshot socket: {ws_url}"))?;
        let (_, mut ws_reader) = ws_stream.split();

        let (publisher, feed, guard) = default_snapshot_channel();
        let (snapshots, mut cancelled) = publisher.into_parts();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    frame = ws_reader.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<StoreEvent>(&text) {
                                Ok(StoreEvent::Snapshot { messages }) => {
                                    if snapshots.send(messages).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(StoreEvent::Error(err)) => {
                                    warn!(code = ?err.code, "backend: store error event: {}", err.message);
                                }
                                Err(err) => {
                                    warn!("backend: invalid store event: {err}");
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!("backend: snapshot socket receive failed: {err}");
                            break;
                        }
                    },
                }
            }
            info!("backend: snapshot subscription closed");
        });

        Ok((feed, guard))
    }

    async fn insert(&self, record: NewMessageRecord) -> Result<MessageId> {
        let response: InsertMessageResponse = self
            .http
            .post(self.config.http_url("/messages"))
            .json(&record)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.message_id)
    }

    async fn delete_by_id(&self, id: &MessageId) -> Result<()> {
        self.http
            .delete(self.config.http_url(&format!("/messages/{id}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/messages_tests.rs"]
mod tests;
