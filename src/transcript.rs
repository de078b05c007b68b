//! Chat message model and the shared transcript store.
//!
//! The transcript is mutated concurrently by the send pipeline and by the
//! deployment/payment orchestrators, each on its own completion schedule.
//! Every mutation goes through [`TranscriptStore::update`], which applies a
//! caller-supplied fold to the *latest* sequence under the store lock, so a
//! writer can never clobber an insert made after it captured its own view.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

/// An image or file attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub content_type: String,
    pub title: String,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_loading: bool,
    /// Origin tag rendered as a badge: "Deployment", "Transaction", "System".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            created_at: Utc::now(),
            is_loading: false,
            source: None,
            attachments: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::System,
            created_at: Utc::now(),
            is_loading: false,
            source: None,
            attachments: Vec::new(),
        }
    }

    /// Placeholder shown while a send is in flight. Carries the user's text
    /// so the renderer can echo it next to the loading indicator.
    pub fn loading(text: impl Into<String>) -> Self {
        let mut msg = Self::system(text);
        msg.is_loading = true;
        msg
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Stable render key derived from (timestamp, sender, text).
    pub fn key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.created_at.timestamp_millis(),
            self.sender.as_str(),
            self.text
        )
    }
}

/// Ordered transcripts keyed by conversation id, with change notification.
///
/// Cheap to clone; all clones share the same underlying map. Updates on the
/// same conversation serialize behind the store lock, updates on different
/// conversations don't interact. Unknown conversation ids read as empty.
#[derive(Clone)]
pub struct TranscriptStore {
    inner: Arc<Mutex<HashMap<Uuid, Vec<Message>>>>,
    changes: broadcast::Sender<Uuid>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    /// Snapshot of the current transcript for a conversation.
    pub async fn read(&self, conversation: Uuid) -> Vec<Message> {
        let map = self.inner.lock().await;
        map.get(&conversation).cloned().unwrap_or_default()
    }

    /// Replace the transcript with `f(current)`.
    ///
    /// `f` receives the sequence as it exists at application time, never a
    /// snapshot the caller took earlier. Observers are notified afterwards.
    pub async fn update<F>(&self, conversation: Uuid, f: F)
    where
        F: FnOnce(Vec<Message>) -> Vec<Message>,
    {
        {
            let mut map = self.inner.lock().await;
            let current = map.remove(&conversation).unwrap_or_default();
            map.insert(conversation, f(current));
        }
        // No receivers is fine; rendering is optional.
        let _ = self.changes.send(conversation);
    }

    /// Append messages to the end of a conversation.
    pub async fn append(&self, conversation: Uuid, messages: Vec<Message>) {
        self.update(conversation, move |mut current| {
            current.extend(messages);
            current
        })
        .await;
    }

    /// Subscribe to conversation-changed notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Uuid> {
        self.changes.subscribe()
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}
