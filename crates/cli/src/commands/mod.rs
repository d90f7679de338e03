//! Subcommand implementations and the wiring they share.

pub mod ask;
pub mod doctor;
pub mod run;
pub mod tools;

use std::path::Path;
use std::sync::Arc;
use threadbot_agent::Orchestrator;
use threadbot_config::AppConfig;
use threadbot_core::error::StoreError;
use threadbot_core::provider::Provider;
use threadbot_core::store::{ContextStore, ToolCache};
use threadbot_store::{SqliteContextStore, SqliteToolCache, open_pool};
use threadbot_tools::ToolExecutor;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Load `path` (or the default config file), then the environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => AppConfig::load_with_env(p),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

pub struct Stores {
    pub context: Arc<dyn ContextStore>,
    pub cache: Option<Arc<dyn ToolCache>>,
}

/// Open the context store and, when enabled, the tool cache on one pool.
pub async fn open_stores(config: &AppConfig) -> Result<Stores, StoreError> {
    let pool = open_pool(&config.storage.db_path).await?;
    let context: Arc<dyn ContextStore> = Arc::new(SqliteContextStore::from_pool(pool.clone()).await?);

    let cache: Option<Arc<dyn ToolCache>> = if config.storage.cache_enabled {
        Some(Arc::new(SqliteToolCache::from_pool(pool).await?))
    } else {
        None
    };

    Ok(Stores { context, cache })
}

pub fn build_orchestrator(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    cache: Option<Arc<dyn ToolCache>>,
) -> Orchestrator {
    let registry = Arc::new(threadbot_tools::default_registry(&config.tools));
    let mut executor = ToolExecutor::new(registry);
    if let Some(cache) = cache {
        executor = executor.with_cache(cache);
    }

    Orchestrator::new(provider, executor, &config.provider.model)
        .with_max_rounds(config.agent.max_tool_rounds)
        .with_temperature(config.provider.temperature)
        .with_max_tokens(config.provider.max_tokens)
}
