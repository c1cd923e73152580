use std::{collections::HashSet, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Message, MessageId, Principal},
    protocol::NewMessageRecord,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod attachments;

pub use attachments::{AttachmentError, AttachmentManager, StoredAttachment};

const EVENT_CHANNEL_CAPACITY: usize = 256;
/// Snapshot deliveries beyond this buffer are dropped; each snapshot is a
/// total state, so observing only the latest is acceptable.
const SNAPSHOT_BUFFER: usize = 16;

/// Supplies the signed-in principal and pushes identity changes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal>;
    async fn sign_out(&self) -> Result<()>;
    fn subscribe_changes(&self) -> broadcast::Receiver<Option<Principal>>;
}

/// Ordered, appendable remote message collection with a live snapshot
/// subscription. Implementations deliver the complete collection, sorted by
/// `created_at` ascending, on every change.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn subscribe(&self) -> Result<(SnapshotFeed, SubscriptionGuard)>;
    async fn insert(&self, record: NewMessageRecord) -> Result<MessageId>;
    async fn delete_by_id(&self, id: &MessageId) -> Result<()>;
}

/// Path-addressable binary storage for message attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<()>;
    async fn get_url(&self, path: &str) -> Result<String>;
    async fn delete_by_path(&self, path: &str) -> Result<()>;
}

pub struct MissingIdentityProvider;

#[async_trait]
impl IdentityProvider for MissingIdentityProvider {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Principal> {
        Err(anyhow!("identity backend unavailable"))
    }

    async fn sign_out(&self) -> Result<()> {
        Err(anyhow!("identity backend unavailable"))
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<Option<Principal>> {
        broadcast::channel(1).1
    }
}

pub struct MissingMessageStore;

#[async_trait]
impl MessageStore for MissingMessageStore {
    async fn subscribe(&self) -> Result<(SnapshotFeed, SubscriptionGuard)> {
        Err(anyhow!("message store unavailable"))
    }

    async fn insert(&self, _record: NewMessageRecord) -> Result<MessageId> {
        Err(anyhow!("message store unavailable"))
    }

    async fn delete_by_id(&self, _id: &MessageId) -> Result<()> {
        Err(anyhow!("message store unavailable"))
    }
}

pub struct MissingBlobStore;

#[async_trait]
impl BlobStore for MissingBlobStore {
    async fn upload(&self, _bytes: &[u8], _path: &str) -> Result<()> {
        Err(anyhow!("blob store unavailable"))
    }

    async fn get_url(&self, _path: &str) -> Result<String> {
        Err(anyhow!("blob store unavailable"))
    }

    async fn delete_by_path(&self, _path: &str) -> Result<()> {
        Err(anyhow!("blob store unavailable"))
    }
}

/// Receiving half of a snapshot subscription.
pub struct SnapshotFeed {
    snapshots: mpsc::Receiver<Vec<Message>>,
}

impl SnapshotFeed {
    pub async fn recv(&mut self) -> Option<Vec<Message>> {
        self.snapshots.recv().await
    }
}

/// Cancel handle for a snapshot subscription. Cancelling (or dropping) the
/// guard is the sole teardown contract; the producing side observes it and
/// stops delivering.
pub struct SubscriptionGuard {
    cancel: Option<oneshot::Sender<()>>,
}

impl SubscriptionGuard {
    pub fn cancel(mut self) {
        self.cancel_in_place();
    }

    fn cancel_in_place(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.cancel_in_place();
    }
}

/// Producing half handed to store implementations.
pub struct SnapshotPublisher {
    snapshots: mpsc::Sender<Vec<Message>>,
    cancelled: oneshot::Receiver<()>,
}

impl SnapshotPublisher {
    /// Delivers one full snapshot. Returns false once the subscriber is gone.
    pub async fn publish(&self, snapshot: Vec<Message>) -> bool {
        self.snapshots.send(snapshot).await.is_ok()
    }

    /// Resolves when the subscriber cancels its guard.
    pub async fn cancelled(&mut self) {
        let _ = (&mut self.cancelled).await;
    }

    /// Splits into the raw snapshot sender and cancel signal, for store
    /// implementations that need to select over both in one task.
    pub fn into_parts(self) -> (mpsc::Sender<Vec<Message>>, oneshot::Receiver<()>) {
        (self.snapshots, self.cancelled)
    }
}

/// Builds the three halves of a snapshot subscription: the publisher for the
/// store side, the feed and its cancel guard for the subscriber side.
pub fn snapshot_channel(buffer: usize) -> (SnapshotPublisher, SnapshotFeed, SubscriptionGuard) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        SnapshotPublisher {
            snapshots: tx,
            cancelled: cancel_rx,
        },
        SnapshotFeed { snapshots: rx },
        SubscriptionGuard {
            cancel: Some(cancel_tx),
        },
    )
}

/// Ownership check mirroring the server-side rule. This is a client-side
/// convenience only, not a security boundary; the backend must enforce the
/// same invariant independently.
pub fn can_delete(principal: &Principal, message: &Message) -> bool {
    message.author_id == principal.id
}

/// A not-yet-uploaded attachment held in the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDraft {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    MessagesUpdated { messages: Vec<Message> },
    SelectionChanged { selected: Vec<MessageId> },
    ThemeChanged { dark_mode: bool },
    IdentityChanged(Option<Principal>),
    Error(String),
}

#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Credentials rejected or identity backend failed. Callers display a
    /// generic message; the underlying error is never user-visible.
    #[error("invalid credentials")]
    Auth(#[source] anyhow::Error),
    #[error("not signed in")]
    NotSignedIn,
    #[error("failed to establish snapshot subscription")]
    Subscribe(#[source] anyhow::Error),
    #[error("attachment upload failed")]
    Upload(#[source] AttachmentError),
    #[error("failed to persist message record")]
    Send(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(MessageId),
    /// Empty text and no attachment: nothing was inserted.
    NothingToSend,
}

/// Per-id result of `delete_selected`. Ids in `failed` stay selected so the
/// user can retry; skipped ids (unknown or foreign-owned) leave silently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub skipped: usize,
    pub failed: Vec<MessageId>,
}

#[derive(Default)]
struct SessionState {
    principal: Option<Principal>,
    messages: Vec<Message>,
    selection: HashSet<MessageId>,
    dark_mode: bool,
    draft_text: String,
    draft_attachment: Option<AttachmentDraft>,
}

struct ActiveSubscription {
    guard: SubscriptionGuard,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    fn shutdown(self) {
        self.guard.cancel();
        self.task.abort();
    }
}

/// The message stream synchronizer: owns the local mirror of the remote
/// collection and mediates every mutating operation.
pub struct ChatClient {
    identity: Arc<dyn IdentityProvider>,
    message_store: Arc<dyn MessageStore>,
    attachments: AttachmentManager,
    inner: Mutex<SessionState>,
    subscription: Mutex<Option<ActiveSubscription>>,
    identity_watch: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        message_store: Arc<dyn MessageStore>,
        blob_store: Arc<dyn BlobStore>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            identity,
            message_store,
            attachments: AttachmentManager::new(blob_store),
            inner: Mutex::new(SessionState::default()),
            subscription: Mutex::new(None),
            identity_watch: Mutex::new(None),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, ChatClientError> {
        let principal = self
            .identity
            .sign_in(email, password)
            .await
            .map_err(ChatClientError::Auth)?;
        {
            let mut inner = self.inner.lock().await;
            inner.principal = Some(principal.clone());
        }
        info!(user_id = %principal.id, "auth: signed in");
        let _ = self
            .events
            .send(ClientEvent::IdentityChanged(Some(principal.clone())));
        Ok(principal)
    }

    /// Signs out remotely (best effort), tears down the subscription and
    /// discards the ephemeral session.
    pub async fn sign_out(&self) {
        if let Err(err) = self.identity.sign_out().await {
            warn!("auth: remote sign-out failed: {err:#}");
        }
        self.stop_sync().await;
        self.clear_session().await;
    }

    /// Mirrors identity-change pushes into the session. A `None` principal
    /// tears the session down exactly like an explicit sign-out.
    pub async fn watch_identity(self: &Arc<Self>) {
        let mut changes = self.identity.subscribe_changes();
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Ok(change) = changes.recv().await {
                match change {
                    Some(principal) => {
                        {
                            let mut inner = client.inner.lock().await;
                            inner.principal = Some(principal.clone());
                        }
                        let _ = client
                            .events
                            .send(ClientEvent::IdentityChanged(Some(principal)));
                    }
                    None => {
                        client.stop_sync().await;
                        client.clear_session().await;
                    }
                }
            }
        });
        if let Some(previous) = self.identity_watch.lock().await.replace(task) {
            previous.abort();
        }
    }

    /// Establishes the live subscription and mirrors every delivered
    /// snapshot into the local list. Exactly one subscription is active per
    /// session: a repeated call replaces the previous one instead of leaking
    /// a duplicate listener.
    pub async fn start_sync(self: &Arc<Self>) -> Result<(), ChatClientError> {
        let (mut feed, guard) = self
            .message_store
            .subscribe()
            .await
            .map_err(ChatClientError::Subscribe)?;

        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(snapshot) = feed.recv().await {
                client.apply_snapshot(snapshot).await;
            }
        });

        let previous = self
            .subscription
            .lock()
            .await
            .replace(ActiveSubscription { guard, task });
        if let Some(active) = previous {
            active.shutdown();
        }
        info!("sync: snapshot subscription started");
        Ok(())
    }

    /// Cancels the subscription guard and aborts the mirror task. Later
    /// deliveries must not mutate the local list.
    pub async fn stop_sync(&self) {
        if let Some(active) = self.subscription.lock().await.take() {
            active.shutdown();
            info!("sync: snapshot subscription stopped");
        }
    }

    async fn apply_snapshot(&self, snapshot: Vec<Message>) {
        {
            let mut inner = self.inner.lock().await;
            inner.messages = snapshot.clone();
        }
        let _ = self
            .events
            .send(ClientEvent::MessagesUpdated { messages: snapshot });
    }

    /// Sends a message. No-op when both text and attachment are absent; when
    /// an attachment is present it is uploaded first, and an upload failure
    /// aborts the whole send without inserting a record.
    pub async fn send(
        &self,
        text: &str,
        attachment: Option<AttachmentDraft>,
    ) -> Result<SendOutcome, ChatClientError> {
        if text.is_empty() && attachment.is_none() {
            return Ok(SendOutcome::NothingToSend);
        }
        let principal = self.require_principal().await?;

        let stored = match attachment {
            Some(draft) => Some(
                self.attachments
                    .upload(&draft.bytes, &draft.file_name)
                    .await
                    .map_err(ChatClientError::Upload)?,
            ),
            None => None,
        };

        let record = NewMessageRecord {
            text: text.to_string(),
            attachment_url: stored.as_ref().map(|s| s.url.clone()).unwrap_or_default(),
            attachment_path: stored.as_ref().map(|s| s.path.clone()).unwrap_or_default(),
            author_id: principal.id.clone(),
            author_email: principal.email.clone(),
        };

        let message_id = self
            .message_store
            .insert(record)
            .await
            .map_err(ChatClientError::Send)?;
        info!(message_id = %message_id, "sync: message record persisted");
        Ok(SendOutcome::Sent(message_id))
    }

    /// Sends the composer draft; the draft is cleared on success only, so a
    /// failed attempt can be retried verbatim.
    pub async fn send_draft(&self) -> Result<SendOutcome, ChatClientError> {
        let (text, attachment) = {
            let inner = self.inner.lock().await;
            (inner.draft_text.clone(), inner.draft_attachment.clone())
        };

        let outcome = self.send(&text, attachment).await?;
        if matches!(outcome, SendOutcome::Sent(_)) {
            let mut inner = self.inner.lock().await;
            inner.draft_text.clear();
            inner.draft_attachment = None;
        }
        Ok(outcome)
    }

    pub async fn set_draft_text(&self, text: impl Into<String>) {
        self.inner.lock().await.draft_text = text.into();
    }

    pub async fn set_draft_attachment(&self, draft: Option<AttachmentDraft>) {
        self.inner.lock().await.draft_attachment = draft;
    }

    pub async fn draft(&self) -> (String, Option<AttachmentDraft>) {
        let inner = self.inner.lock().await;
        (inner.draft_text.clone(), inner.draft_attachment.clone())
    }

    /// Idempotent selection toggle. Selection is a UI-only concept; no
    /// ownership check happens here.
    pub async fn toggle_selection(&self, id: MessageId) {
        let selected = {
            let mut inner = self.inner.lock().await;
            if !inner.selection.remove(&id) {
                inner.selection.insert(id);
            }
            inner.selection.iter().cloned().collect()
        };
        let _ = self.events.send(ClientEvent::SelectionChanged { selected });
    }

    /// Deletes every selected message the caller owns, sequentially: record
    /// first, then the paired blob when one exists. Unknown or foreign ids
    /// are skipped silently; a blob-delete failure is logged and never rolls
    /// back the already-deleted record.
    pub async fn delete_selected(&self) -> Result<DeleteOutcome, ChatClientError> {
        let (principal, targets) = {
            let inner = self.inner.lock().await;
            let principal = inner
                .principal
                .clone()
                .ok_or(ChatClientError::NotSignedIn)?;
            let targets: Vec<MessageId> = inner.selection.iter().cloned().collect();
            (principal, targets)
        };

        let mut outcome = DeleteOutcome::default();
        let mut still_selected = HashSet::new();

        for id in targets {
            let message = {
                let inner = self.inner.lock().await;
                inner.messages.iter().find(|m| m.id == id).cloned()
            };
            let Some(message) = message else {
                outcome.skipped += 1;
                continue;
            };
            if !can_delete(&principal, &message) {
                outcome.skipped += 1;
                continue;
            }

            if let Err(err) = self.message_store.delete_by_id(&id).await {
                warn!(message_id = %id, "sync: record delete failed: {err:#}");
                let _ = self.events.send(ClientEvent::Error(format!(
                    "failed to delete message {id}"
                )));
                outcome.failed.push(id.clone());
                still_selected.insert(id);
                continue;
            }
            info!(message_id = %id, "sync: message record deleted");
            outcome.deleted += 1;

            if message.has_attachment() {
                if let Err(err) = self.attachments.delete(&message.attachment_path).await {
                    // The record is already gone; a dangling blob is a
                    // recoverable leak, not a user-visible failure.
                    warn!(path = %message.attachment_path, "sync: blob cleanup failed: {err:#}");
                }
            }
        }

        let selected = {
            let mut inner = self.inner.lock().await;
            inner.selection = still_selected;
            inner.selection.iter().cloned().collect()
        };
        let _ = self.events.send(ClientEvent::SelectionChanged { selected });
        Ok(outcome)
    }

    pub async fn toggle_dark_mode(&self) -> bool {
        let dark_mode = {
            let mut inner = self.inner.lock().await;
            inner.dark_mode = !inner.dark_mode;
            inner.dark_mode
        };
        let _ = self.events.send(ClientEvent::ThemeChanged { dark_mode });
        dark_mode
    }

    pub async fn dark_mode(&self) -> bool {
        self.inner.lock().await.dark_mode
    }

    pub async fn principal(&self) -> Option<Principal> {
        self.inner.lock().await.principal.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.lock().await.messages.clone()
    }

    pub async fn selected_ids(&self) -> HashSet<MessageId> {
        self.inner.lock().await.selection.clone()
    }

    async fn require_principal(&self) -> Result<Principal, ChatClientError> {
        self.inner
            .lock()
            .await
            .principal
            .clone()
            .ok_or(ChatClientError::NotSignedIn)
    }

    async fn clear_session(&self) {
        {
            let mut inner = self.inner.lock().await;
            *inner = SessionState::default();
        }
        let _ = self.events.send(ClientEvent::IdentityChanged(None));
        info!("auth: session cleared");
    }
}

/// Default snapshot buffer for store implementations.
pub fn default_snapshot_channel() -> (SnapshotPublisher, SnapshotFeed, SubscriptionGuard) {
    snapshot_channel(SNAPSHOT_BUFFER)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
