//! SQLite-backed context store and tool cache.
//!
//! Both live in the same database file (`DB_PATH`, default `db.sqlite`):
//! - `tool_call_prompts` — extra prompt entries keyed by message timestamp
//! - `tool_cache` — cached tool results keyed by signature digest

use crate::locks::KeyLocks;
use crate::{decode_prompts, encode_prompts};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use threadbot_core::error::StoreError;
use threadbot_core::message::PromptEntry;
use threadbot_core::store::{CacheKey, ContextRecord, ContextStore, ToolCache};
use tracing::{debug, info};

/// Open (creating if needed) a SQLite pool.
///
/// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests);
/// the pool is then limited to one connection so every query sees the
/// same database.
pub async fn open_pool(path: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(path)
        .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let max_connections = if path.contains(":memory:") { 1 } else { 4 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

    info!("SQLite database opened at {path}");
    Ok(pool)
}

/// Tool-call context store over SQLite.
///
/// Appends are read-modify-write inside a transaction, and additionally
/// serialized per key so two turns recording under the same timestamp
/// cannot lose each other's entries.
pub struct SqliteContextStore {
    pool: SqlitePool,
    locks: KeyLocks,
}

impl SqliteContextStore {
    /// Open a store at `path`, creating the schema if needed.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        Self::from_pool(open_pool(path).await?).await
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            locks: KeyLocks::default(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tool_call_prompts (
                ts         TEXT PRIMARY KEY,
                channel    TEXT NOT NULL,
                thread_ts  TEXT,
                prompts    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("tool_call_prompts table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tool_call_prompts_thread ON tool_call_prompts(channel, thread_ts)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("thread index: {e}")))?;

        debug!("Context store migrations complete");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ContextRecord, StoreError> {
        let ts: String = row
            .try_get("ts")
            .map_err(|e| StoreError::QueryFailed(format!("ts column: {e}")))?;
        let channel: String = row
            .try_get("channel")
            .map_err(|e| StoreError::QueryFailed(format!("channel column: {e}")))?;
        let thread_ts: Option<String> = row
            .try_get("thread_ts")
            .map_err(|e| StoreError::QueryFailed(format!("thread_ts column: {e}")))?;
        let prompts_json: String = row
            .try_get("prompts")
            .map_err(|e| StoreError::QueryFailed(format!("prompts column: {e}")))?;

        let prompts = decode_prompts(&ts, &prompts_json)?;
        Ok(ContextRecord {
            ts,
            channel,
            thread_ts,
            prompts,
        })
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    fn name(&self) -> &str {
        "sqlite"
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

        let _guard = self.locks.acquire(ts).await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT prompts FROM tool_call_prompts WHERE ts = ?1")
                .bind(ts)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("SELECT failed: {e}")))?;

        let mut prompts = match existing {
            Some(json) => decode_prompts(ts, &json)?,
            None => Vec::new(),
        };
        prompts.extend_from_slice(entries);
        let prompts_json = encode_prompts(&prompts)?;

        sqlx::query(
            r#"
            INSERT INTO tool_call_prompts (ts, channel, thread_ts, prompts)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(ts) DO UPDATE SET prompts = excluded.prompts
            "#,
        )
        .bind(ts)
        .bind(channel)
        .bind(thread_ts)
        .bind(&prompts_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(ts, added = entries.len(), total = prompts.len(), "Recorded context");
        Ok(())
    }

    async fn fetch(&self, ts: &str) -> Result<Vec<PromptEntry>, StoreError> {
        Ok(self.get(ts).await?.map(|r| r.prompts).unwrap_or_default())
    }

    async fn get(&self, ts: &str) -> Result<Option<ContextRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT ts, channel, thread_ts, prompts FROM tool_call_prompts WHERE ts = ?1",
        )
        .bind(ts)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT failed: {e}")))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }
}

/// Tool result cache over SQLite.
pub struct SqliteToolCache {
    pool: SqlitePool,
}

impl SqliteToolCache {
    /// Open a cache at `path`, creating the schema if needed.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        Self::from_pool(open_pool(path).await?).await
    }

    /// Create from an existing pool (shared with the context store).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tool_cache (
                key        TEXT PRIMARY KEY,
                tool       TEXT NOT NULL,
                signature  TEXT NOT NULL,
                result     TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("tool_cache table: {e}")))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ToolCache for SqliteToolCache {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT result FROM tool_cache WHERE key = ?1")
            .bind(&key.digest)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT failed: {e}")))
    }

    async fn put(&self, key: &CacheKey, result: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tool_cache (key, tool, signature, result, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET
                result = excluded.result,
                created_at = excluded.created_at
            "#,
        )
        .bind(&key.digest)
        .bind(&key.tool)
        .bind(&key.signature)
        .bind(result)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        debug!(tool = %key.tool, signature = %key.signature, "Cached tool result");
        Ok(())
    }
}
