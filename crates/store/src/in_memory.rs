//! In-memory stores — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use threadbot_core::error::StoreError;
use threadbot_core::message::PromptEntry;
use threadbot_core::store::{CacheKey, ContextRecord, ContextStore, ToolCache};
use tokio::sync::RwLock;

/// A context store that keeps records in a HashMap.
#[derive(Clone, Default)]
pub struct InMemoryContextStore {
    records: Arc<RwLock<HashMap<String, ContextRecord>>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn record(
        &self,
        ts: &str,
        channel: &str,
        thread_ts: Option<&str>,
        entries: &[PromptEntry],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        // The write guard serializes the read-modify-write
        let mut records = self.records.write().await;
        records
            .entry(ts.to_string())
            .or_insert_with(|| ContextRecord {
                ts: ts.to_string(),
                channel: channel.to_string(),
                thread_ts: thread_ts.map(String::from),
                prompts: Vec::new(),
            })
            .prompts
            .extend_from_slice(entries);
        Ok(())
    }

    async fn fetch(&self, ts: &str) -> Result<Vec<PromptEntry>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(ts)
            .map(|r| r.prompts.clone())
            .unwrap_or_default())
    }

    async fn get(&self, ts: &str) -> Result<Option<ContextRecord>, StoreError> {
        Ok(self.records.read().await.get(ts).cloned())
    }
}

/// A tool cache that keeps results in a HashMap keyed by digest.
#[derive(Clone, Default)]
pub struct InMemoryToolCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryToolCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolCache for InMemoryToolCache {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(&key.digest).cloned())
    }

    async fn put(&self, key: &CacheKey, result: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.digest.clone(), result.to_string());
        Ok(())
    }
}
