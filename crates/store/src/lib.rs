//! Persistence for threadbot.
//!
//! Two stores live here, both shared between concurrently running turns:
//!
//! - the **context store**, which keeps tool calls, tool results and
//!   transcripts keyed by the chat message that produced them;
//! - the **tool cache**, which keeps results of cacheable tools keyed by a
//!   normalized call signature.
//!
//! Each has a SQLite implementation for production and an in-memory one
//! for tests and ephemeral runs.

pub mod in_memory;
mod locks;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::{InMemoryContextStore, InMemoryToolCache};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteContextStore, SqliteToolCache, open_pool};

use threadbot_core::error::StoreError;
use threadbot_core::message::PromptEntry;

/// Serialize a prompt list for storage.
pub(crate) fn encode_prompts(prompts: &[PromptEntry]) -> Result<String, StoreError> {
    serde_json::to_string(prompts)
        .map_err(|e| StoreError::Storage(format!("Prompt serialization: {e}")))
}

/// Decode a stored prompt list.
pub(crate) fn decode_prompts(key: &str, json: &str) -> Result<Vec<PromptEntry>, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
