//! Chat transport trait — the abstraction over chat platforms.
//!
//! A transport delivers inbound message events and lets the agent create,
//! edit and read back messages in a thread. Slack is the production
//! implementation; tests use recording doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::TransportError;

/// Who wrote a message in a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Author {
    /// Posted by a bot (including this agent)
    Agent { bot_id: String },
    /// Posted by a human user
    User { user_id: String },
    /// Neither shape matched (system notices, unfurls, ...)
    Unknown,
}

/// A message as read back from a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Platform timestamp; also the message identifier
    pub ts: String,

    /// Who posted it
    pub author: Author,

    /// The text (may be empty, e.g. audio-only messages)
    #[serde(default)]
    pub text: String,
}

impl ThreadMessage {
    pub fn user(ts: impl Into<String>, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ts: ts.into(),
            author: Author::User { user_id: user_id.into() },
            text: text.into(),
        }
    }

    pub fn agent(ts: impl Into<String>, bot_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ts: ts.into(),
            author: Author::Agent { bot_id: bot_id.into() },
            text: text.into(),
        }
    }
}

/// Handle to a message the agent created and may keep editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel: String,
    pub ts: String,
}

/// An attachment on an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Type of attachment
    pub kind: AttachmentKind,

    /// Private download URL
    pub url: String,

    /// Optional filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// A recorded voice clip
    Audio,
    Other,
}

/// An inbound message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Channel the message was posted in
    pub channel: String,

    /// Timestamp / id of the message itself
    pub ts: String,

    /// Thread root, if the message is a reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,

    /// Posting user, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Set for bot-authored messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,

    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,

    /// Edits, deletions and other housekeeping events
    #[serde(default)]
    pub hidden: bool,
}

impl InboundEvent {
    /// The thread this message belongs to (the message itself if it
    /// starts a new thread).
    pub fn thread_key(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

/// A slash command invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashCommand {
    /// e.g. "/clear"
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
}

/// The core ChatTransport trait.
///
/// Failed writes are reported, never retried here.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Human-readable transport name (e.g., "slack").
    fn name(&self) -> &str;

    /// Post a new message, optionally inside a thread.
    async fn create_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> std::result::Result<MessageHandle, TransportError>;

    /// Replace the text of an existing message.
    async fn update_message(
        &self,
        handle: &MessageHandle,
        text: &str,
    ) -> std::result::Result<(), TransportError>;

    /// Read a whole thread, oldest first.
    async fn fetch_thread(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> std::result::Result<Vec<ThreadMessage>, TransportError>;

    /// Post a message only `user` can see.
    async fn post_ephemeral(
        &self,
        _channel: &str,
        _user: &str,
        _thread_ts: Option<&str>,
        _text: &str,
    ) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    /// Download a private file attachment.
    async fn download_file(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
        Err(TransportError::NotConfigured(format!(
            "{} cannot download {url}",
            self.name()
        )))
    }

    /// Delete a message.
    async fn delete_message(&self, channel: &str, ts: &str) -> std::result::Result<(), TransportError> {
        Err(TransportError::NotConfigured(format!(
            "{} cannot delete {channel}/{ts}",
            self.name()
        )))
    }

    /// Top-level channel history, newest first.
    async fn channel_history(&self, _channel: &str) -> std::result::Result<Vec<ThreadMessage>, TransportError> {
        Ok(Vec::new())
    }
}
