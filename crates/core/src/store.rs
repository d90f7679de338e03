//! Persistence traits — the tool-call context store and the tool result cache.
//!
//! Both are the only state shared between concurrently running turns, so
//! implementations must be `Send + Sync` and serialize writes per key
//! while letting unrelated keys proceed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::StoreError;
use crate::message::PromptEntry;

/// Extra prompt entries recorded for one chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Timestamp of the chat message that introduced the entries
    pub ts: String,

    /// Channel the message lives in
    pub channel: String,

    /// Thread root, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,

    /// Tool calls, tool results and transcripts, in order
    pub prompts: Vec<PromptEntry>,
}

/// Side-channel storage for prompt entries that never appear as chat
/// messages (tool calls, tool results, audio transcripts).
///
/// The store never owns message lifecycle; it is only a lookup keyed by the
/// timestamp the chat transport assigned.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Append `entries` to the record for `ts`, creating it if needed.
    ///
    /// No-op when `entries` is empty.
    async fn record(
        &self,
        ts: &str,
        channel: &str,
        thread_ts: Option<&str>,
        entries: &[PromptEntry],
    ) -> std::result::Result<(), StoreError>;

    /// The stored entries for `ts`, or an empty list.
    async fn fetch(&self, ts: &str) -> std::result::Result<Vec<PromptEntry>, StoreError>;

    /// The full record for `ts`, if one exists.
    async fn get(&self, ts: &str) -> std::result::Result<Option<ContextRecord>, StoreError>;
}

/// A normalized tool call signature and its storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Tool name
    pub tool: String,

    /// Human-readable normalized call, e.g. `search(query="rust")`
    pub signature: String,

    /// Fixed-length digest of `signature`, used as the primary key
    pub digest: String,
}

/// Durable cache of tool results keyed by call signature.
///
/// Two concurrent calls with the same key may both miss and both write;
/// the last write wins.
#[async_trait]
pub trait ToolCache: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a previous result.
    async fn get(&self, key: &CacheKey) -> std::result::Result<Option<String>, StoreError>;

    /// Store a result, replacing any previous one.
    async fn put(&self, key: &CacheKey, result: &str) -> std::result::Result<(), StoreError>;
}
