//! Tool executor — runs every tool call of one model round.
//!
//! All calls run concurrently and every call yields exactly one tool
//! result entry. Failures never abort the round; they become a visible
//! placeholder the model can react to.

use crate::cache_key::{BoundArguments, bind_arguments, cache_key, decode_arguments};
use futures::future::join_all;
use std::sync::Arc;
use threadbot_core::error::ToolError;
use threadbot_core::message::{PromptEntry, ToolCallRecord};
use threadbot_core::store::ToolCache;
use threadbot_core::tool::{Tool, ToolRegistry};
use tracing::{debug, error, warn};

/// Dispatches tool calls against a registry, with an optional result cache.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    cache: Option<Arc<dyn ToolCache>>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            cache: None,
        }
    }

    /// Serve cacheable tools from `cache`.
    pub fn with_cache(mut self, cache: Arc<dyn ToolCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute all calls concurrently and return one tool result entry per
    /// call, in the order the calls were given.
    pub async fn execute_all(&self, calls: &[ToolCallRecord]) -> Vec<PromptEntry> {
        join_all(calls.iter().map(|call| self.execute_one(call))).await
    }

    async fn execute_one(&self, call: &ToolCallRecord) -> PromptEntry {
        debug!(tool = %call.name, id = %call.id, arguments = %call.arguments, "Executing tool call");

        let content = match self.run(call).await {
            Ok(output) => output,
            Err(e) => {
                error!(tool = %call.name, id = %call.id, error = %e, "Tool call failed");
                format!("(Exception in function call: {e})")
            }
        };

        PromptEntry::tool_result(&call.id, &call.name, content)
    }

    async fn run(&self, call: &ToolCallRecord) -> Result<String, ToolError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let args = bind_arguments(&tool.parameter_names(), decode_arguments(&call.arguments)?);

        match &self.cache {
            Some(cache) if tool.cacheable() => Self::run_cached(tool.as_ref(), cache.as_ref(), args).await,
            _ => tool.execute(to_value(args)).await,
        }
    }

    async fn run_cached(
        tool: &dyn Tool,
        cache: &dyn ToolCache,
        args: BoundArguments,
    ) -> Result<String, ToolError> {
        let key = cache_key(tool.name(), &args);

        match cache.get(&key).await {
            Ok(Some(hit)) => {
                debug!(signature = %key.signature, "Tool cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => warn!(signature = %key.signature, error = %e, "Tool cache read failed"),
        }

        let output = tool.execute(to_value(args)).await?;

        if let Err(e) = cache.put(&key, &output).await {
            warn!(signature = %key.signature, error = %e, "Tool cache write failed");
        }
        Ok(output)
    }
}

fn to_value(args: BoundArguments) -> serde_json::Value {
    serde_json::Value::Object(args.into_iter().collect())
}
