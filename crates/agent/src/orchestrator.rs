//! Streaming orchestrator — drives one model turn to completion.
//!
//! The turn is an explicit loop keyed on the last prompt entry:
//!
//! - `user` / `tool` → stream a completion, forwarding text as it arrives
//!   and collecting tool-call fragments
//! - `assistant` with tool calls → run the tools, append their results
//! - anything else → report and stop
//!
//! Prompt entries added during the turn stay in the caller's list so they
//! can be recorded in the context store afterwards.

use std::sync::Arc;
use threadbot_core::error::ProviderError;
use threadbot_core::message::{PromptEntry, Role, ToolCallRecord};
use threadbot_core::provider::{FinishReason, Provider, ProviderRequest, ToolCallDelta};
use threadbot_tools::ToolExecutor;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Reassembles streamed tool-call fragments, ordered by index.
///
/// A fragment either extends an existing call (`index < len`) or opens the
/// next one (`index == len`). Anything else cannot be placed and is dropped.
#[derive(Debug, Default)]
pub struct ToolCallAssembly {
    calls: Vec<ToolCallRecord>,
}

impl ToolCallAssembly {
    /// Apply one fragment. Returns `false` if it was dropped.
    pub fn apply(&mut self, delta: ToolCallDelta) -> bool {
        if delta.index > self.calls.len() {
            warn!(
                index = delta.index,
                pending = self.calls.len(),
                "Dropping tool call fragment with out-of-range index"
            );
            return false;
        }

        if delta.index == self.calls.len() {
            self.calls.push(ToolCallRecord::new(
                delta.id.unwrap_or_default(),
                delta.name.unwrap_or_default(),
                delta.arguments.unwrap_or_default(),
            ));
            return true;
        }

        let call = &mut self.calls[delta.index];
        if let Some(args) = delta.arguments {
            call.arguments.push_str(&args);
        }
        if call.id.is_empty()
            && let Some(id) = delta.id
        {
            call.id = id;
        }
        if call.name.is_empty()
            && let Some(name) = delta.name
        {
            call.name = name;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn into_calls(self) -> Vec<ToolCallRecord> {
        self.calls
    }
}

/// How a streamed round ended.
enum RoundOutcome {
    /// The model asked for tools; the loop continues
    ToolCalls,
    /// The turn is over
    Finished,
}

/// Drives completion rounds and tool execution for one turn.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_rounds: u32,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, executor: ToolExecutor, model: impl Into<String>) -> Self {
        Self {
            provider,
            executor,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            max_rounds: 25,
        }
    }

    /// Set the maximum number of tool rounds per turn.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Number of tools offered to the model.
    pub fn tool_count(&self) -> usize {
        self.executor.registry().len()
    }

    /// Generate the reply to `prompts`, sending text fragments to `out` in
    /// stream order.
    ///
    /// Never fails: provider errors become a single diagnostic fragment.
    /// Returns early if `out` is closed.
    pub async fn generate_reply(&self, prompts: &mut Vec<PromptEntry>, out: mpsc::Sender<String>) {
        let mut tool_rounds = 0u32;

        loop {
            let Some(last) = prompts.last() else {
                error!("Empty prompt sequence");
                let _ = out.send("Unknown message type: (none)".into()).await;
                return;
            };

            let role = last.role;
            let pending = last
                .has_pending_tool_calls()
                .then(|| last.tool_calls.clone());

            match (role, pending) {
                (Role::User | Role::Tool, _) => match self.stream_round(prompts, &out).await {
                    Ok(RoundOutcome::ToolCalls) => continue,
                    Ok(RoundOutcome::Finished) => return,
                    Err(e) => {
                        error!(error = %e, "Exception when generating reply");
                        let _ = out
                            .send(format!("(Exception when generating reply: {e})"))
                            .await;
                        return;
                    }
                },
                (Role::Assistant, Some(calls)) => {
                    if tool_rounds >= self.max_rounds {
                        warn!(max_rounds = self.max_rounds, "Tool round limit reached");
                        let _ = out
                            .send(format!("(Stopped after {} tool rounds)", self.max_rounds))
                            .await;
                        return;
                    }
                    tool_rounds += 1;

                    info!(round = tool_rounds, calls = calls.len(), "Executing tool calls");
                    let results = self.executor.execute_all(&calls).await;
                    prompts.extend(results);
                }
                (role, _) => {
                    error!(%role, "Unknown message type");
                    let _ = out.send(format!("Unknown message type: {role}")).await;
                    return;
                }
            }
        }
    }

    /// Stream one completion. Appends an assistant tool-call entry when the
    /// model finishes with `tool_calls`.
    async fn stream_round(
        &self,
        prompts: &mut Vec<PromptEntry>,
        out: &mpsc::Sender<String>,
    ) -> Result<RoundOutcome, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: prompts.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.executor.registry().schema(),
        };

        debug!(
            provider = self.provider.name(),
            prompts = prompts.len(),
            "Opening completion stream"
        );
        let mut stream = self.provider.stream(request).await?;
        let mut assembly = ToolCallAssembly::default();

        while let Some(chunk) = stream.recv().await {
            let chunk = chunk?;

            if let Some(text) = chunk.content.filter(|t| !t.is_empty())
                && out.send(text).await.is_err()
            {
                debug!("Reply receiver dropped, stopping");
                return Ok(RoundOutcome::Finished);
            }

            for delta in chunk.tool_calls {
                assembly.apply(delta);
            }

            let notice = match chunk.finish_reason {
                None | Some(FinishReason::Stop) => continue,
                Some(FinishReason::ToolCalls) => {
                    if assembly.is_empty() {
                        error!("Finish reason tool_calls without any tool call");
                        let _ = out.send("(finish: tool_calls without tool calls)".to_string()).await;
                        return Ok(RoundOutcome::Finished);
                    }
                    let calls = assembly.into_calls();
                    debug!(calls = ?calls, "Model requested tools");
                    prompts.push(PromptEntry::tool_calls(calls));
                    return Ok(RoundOutcome::ToolCalls);
                }
                Some(FinishReason::Length) => "(Response truncated due to length limit)".to_string(),
                Some(FinishReason::ContentFilter) => "(Request omitted due to content filter)".to_string(),
                Some(FinishReason::Other(reason)) => {
                    error!(%reason, "Unexpected finish reason");
                    format!("(finish: {reason})")
                }
            };

            let _ = out.send(notice).await;
            return Ok(RoundOutcome::Finished);
        }

        Ok(RoundOutcome::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use threadbot_core::error::ToolError;
    use threadbot_core::provider::StreamChunk;
    use threadbot_core::tool::{Tool, ToolRegistry};

    struct SearchStub;

    #[async_trait]
    impl Tool for SearchStub {
        fn name(&self) -> &str {
            "search"
        }
        fn description(&self) -> &str {
            "Search the web"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
            Ok(format!("[\"{}\"]", arguments["query"].as_str().unwrap_or("")))
        }
    }

    fn orchestrator(provider: Arc<ScriptedStreamProvider>, with_tools: bool) -> Orchestrator {
        let mut registry = ToolRegistry::new();
        if with_tools {
            registry.register(Arc::new(SearchStub));
        }
        Orchestrator::new(provider, ToolExecutor::new(Arc::new(registry)), "test-model")
    }

    async fn run(orch: &Orchestrator, prompts: &mut Vec<PromptEntry>) -> Vec<String> {
        let (tx, mut rx) = mpsc::channel(64);
        orch.generate_reply(prompts, tx).await;
        let mut fragments = Vec::new();
        while let Some(f) = rx.recv().await {
            fragments.push(f);
        }
        fragments
    }

    fn user_prompts(text: &str) -> Vec<PromptEntry> {
        vec![PromptEntry::system("You are a helpful assistant."), PromptEntry::user(text)]
    }

    #[test]
    fn assembly_concatenates_per_index() {
        let mut asm = ToolCallAssembly::default();
        assert!(asm.apply(ToolCallDelta {
            index: 0,
            id: Some("a".into()),
            name: Some("search".into()),
            arguments: Some("{\"q\":".into()),
        }));
        assert!(asm.apply(ToolCallDelta {
            index: 1,
            id: Some("b".into()),
            name: Some("pdf".into()),
            arguments: Some("{}".into()),
        }));
        assert!(asm.apply(ToolCallDelta {
            index: 0,
            arguments: Some("\"x\"}".into()),
            ..ToolCallDelta::default()
        }));
        // Index 3 skips 2 and cannot be placed
        assert!(!asm.apply(ToolCallDelta {
            index: 3,
            id: Some("d".into()),
            ..ToolCallDelta::default()
        }));

        let calls = asm.into_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ToolCallRecord::new("a", "search", "{\"q\":\"x\"}"));
        assert_eq!(calls[1], ToolCallRecord::new("b", "pdf", "{}"));
    }

    #[test]
    fn assembly_rebuilds_arguments_split_anywhere() {
        let originals = [
            ("call_a", "search", r#"{"query":"rust lang"}"#),
            ("call_b", "pdf", r#"{"url":"https://x.io/a.pdf"}"#),
            ("call_c", "search", "{}"),
        ];
        let (a, b) = (originals[0].2, originals[1].2);

        for i in 0..=a.len() {
            for j in 0..=b.len() {
                let opening = |index: usize, head: &str| ToolCallDelta {
                    index,
                    id: Some(originals[index].0.into()),
                    name: Some(originals[index].1.into()),
                    arguments: Some(head.into()),
                };
                let tail = |index: usize, rest: &str| ToolCallDelta {
                    index,
                    arguments: Some(rest.into()),
                    ..ToolCallDelta::default()
                };

                // Fragments for different calls interleave
                let mut asm = ToolCallAssembly::default();
                assert!(asm.apply(opening(0, &a[..i])));
                assert!(asm.apply(opening(1, &b[..j])));
                assert!(asm.apply(tail(0, &a[i..])));
                assert!(asm.apply(opening(2, originals[2].2)));
                assert!(asm.apply(tail(1, &b[j..])));

                let calls = asm.into_calls();
                let expected: Vec<_> = originals
                    .iter()
                    .map(|(id, name, args)| ToolCallRecord::new(*id, *name, *args))
                    .collect();
                assert_eq!(calls, expected, "split at {i}/{j}");
            }
        }
    }

    #[tokio::test]
    async fn tool_calls_finish_without_calls_is_reported() {
        // The only fragment skips index 0 and is dropped
        let provider = Arc::new(ScriptedStreamProvider::new(vec![Script::Chunks(vec![
            StreamChunk {
                tool_calls: vec![ToolCallDelta {
                    index: 3,
                    id: Some("call_x".into()),
                    name: Some("search".into()),
                    arguments: Some("{}".into()),
                }],
                ..StreamChunk::default()
            },
            StreamChunk::finish(FinishReason::ToolCalls),
        ])]));
        let orch = orchestrator(provider.clone(), true);
        let mut prompts = user_prompts("search");

        let fragments = run(&orch, &mut prompts).await;
        assert_eq!(fragments, vec!["(finish: tool_calls without tool calls)"]);
        assert_eq!(prompts.len(), 2);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn streams_text_in_order() {
        let provider = Arc::new(ScriptedStreamProvider::text(&["2+2", " is ", "4."]));
        let orch = orchestrator(provider.clone(), false);
        let mut prompts = user_prompts("What is 2+2?");

        let fragments = run(&orch, &mut prompts).await;
        assert_eq!(fragments, vec!["2+2", " is ", "4."]);
        assert_eq!(prompts.len(), 2);

        // No tools registered: the field is omitted
        assert!(provider.requests()[0].tools.is_none());
    }

    #[tokio::test]
    async fn tool_calls_run_then_continue() {
        let provider = Arc::new(ScriptedStreamProvider::new(vec![
            Script::Chunks(tool_call_chunks("call_1", "search", r#"{"query":"rust"}"#)),
            Script::Chunks(text_chunks(&["Rust is a language."])),
        ]));
        let orch = orchestrator(provider.clone(), true);
        let mut prompts = user_prompts("What is rust?");

        let fragments = run(&orch, &mut prompts).await;
        assert_eq!(fragments, vec!["Rust is a language."]);
        assert_eq!(provider.call_count(), 2);

        assert_eq!(prompts.len(), 4);
        assert_eq!(
            prompts[2],
            PromptEntry::tool_calls(vec![ToolCallRecord::new("call_1", "search", r#"{"query":"rust"}"#)])
        );
        assert_eq!(prompts[3], PromptEntry::tool_result("call_1", "search", "[\"rust\"]"));

        let requests = provider.requests();
        assert_eq!(requests[0].tools.as_ref().unwrap()[0].name, "search");
        assert_eq!(requests[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn finish_reasons_emit_notices() {
        let cases = [
            (FinishReason::Length, "(Response truncated due to length limit)"),
            (FinishReason::ContentFilter, "(Request omitted due to content filter)"),
            (FinishReason::Other("function_call".into()), "(finish: function_call)"),
        ];
        for (reason, expected) in cases {
            let provider = Arc::new(ScriptedStreamProvider::new(vec![Script::Chunks(vec![
                StreamChunk::text("partial"),
                StreamChunk::finish(reason),
            ])]));
            let orch = orchestrator(provider, false);
            let fragments = run(&orch, &mut user_prompts("hi")).await;
            assert_eq!(fragments, vec!["partial".to_string(), expected.to_string()]);
        }
    }

    #[tokio::test]
    async fn stream_failure_becomes_diagnostic() {
        let provider = Arc::new(ScriptedStreamProvider::new(vec![Script::Break(
            vec![StreamChunk::text("Hel")],
            ProviderError::StreamInterrupted("connection reset".into()),
        )]));
        let orch = orchestrator(provider, false);
        let fragments = run(&orch, &mut user_prompts("hi")).await;
        assert_eq!(
            fragments,
            vec![
                "Hel".to_string(),
                "(Exception when generating reply: Stream interrupted: connection reset)".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn refused_stream_becomes_diagnostic() {
        let provider = Arc::new(ScriptedStreamProvider::new(vec![Script::Refuse(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let orch = orchestrator(provider, false);
        let fragments = run(&orch, &mut user_prompts("hi")).await;
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].starts_with("(Exception when generating reply: Authentication failed"));
    }

    #[tokio::test]
    async fn pending_tool_calls_are_executed_first() {
        let provider = Arc::new(ScriptedStreamProvider::text(&["done"]));
        let orch = orchestrator(provider.clone(), true);
        let mut prompts = user_prompts("search");
        prompts.push(PromptEntry::tool_calls(vec![ToolCallRecord::new(
            "c9",
            "search",
            r#"{"query":"x"}"#,
        )]));

        let fragments = run(&orch, &mut prompts).await;
        assert_eq!(fragments, vec!["done"]);
        assert_eq!(prompts[3].role, Role::Tool);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_last_entry_is_reported() {
        let provider = Arc::new(ScriptedStreamProvider::new(vec![]));
        let orch = orchestrator(provider.clone(), false);
        let mut prompts = vec![PromptEntry::system("sys"), PromptEntry::assistant("hi")];

        let fragments = run(&orch, &mut prompts).await;
        assert_eq!(fragments, vec!["Unknown message type: assistant"]);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn tool_rounds_are_bounded() {
        let provider = Arc::new(ScriptedStreamProvider::new(vec![
            Script::Chunks(tool_call_chunks("c1", "search", r#"{"query":"a"}"#)),
            Script::Chunks(tool_call_chunks("c2", "search", r#"{"query":"b"}"#)),
        ]));
        let orch = orchestrator(provider.clone(), true).with_max_rounds(1);

        let fragments = run(&orch, &mut user_prompts("loop")).await;
        assert_eq!(fragments, vec!["(Stopped after 1 tool rounds)"]);
        assert_eq!(provider.call_count(), 2);
    }
}
