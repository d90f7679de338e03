//! Prompt entries — the ordered dialogue handed to the model.
//!
//! Thread message → Conversation Assembler builds entries → Orchestrator
//! extends them with tool calls and tool results → Context Store persists
//! the extension under the chat message that produced it.

use serde::{Deserialize, Serialize};

/// The role of a prompt entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed instruction at the head of every prompt
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the prompt sequence.
///
/// Serialized in the chat-completions wire shape
/// (`{role, content | tool_calls, tool_call_id?, name?}`), which is also the
/// shape persisted by the context store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptEntry {
    /// Who produced this entry
    pub role: Role,

    /// The text content (absent on an assistant entry carrying tool calls)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,

    /// For tool results: the call this entry answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// For tool results: the tool that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PromptEntry {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a system entry.
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// Create a user entry.
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// Create an assistant text entry.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Create an assistant entry carrying pending tool calls.
    pub fn tool_calls(calls: Vec<ToolCallRecord>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: calls,
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a tool result entry answering `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    /// Whether this is an assistant entry waiting for tool results.
    pub fn has_pending_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// A model-declared request to invoke a tool.
///
/// `arguments` is the raw JSON text exactly as streamed by the model; it is
/// only decoded when the tool is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireToolCall", into = "WireToolCall")]
pub struct ToolCallRecord {
    /// Opaque call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string buffer
    pub arguments: String,
}

impl ToolCallRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

// Wire shape: {"id", "type": "function", "function": {"name", "arguments"}}.
// Unknown fields such as a streamed `index` are ignored on read.
#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".into()
}

impl From<WireToolCall> for ToolCallRecord {
    fn from(w: WireToolCall) -> Self {
        Self {
            id: w.id,
            name: w.function.name,
            arguments: w.function.arguments,
        }
    }
}

impl From<ToolCallRecord> for WireToolCall {
    fn from(r: ToolCallRecord) -> Self {
        Self {
            id: r.id,
            kind: function_kind(),
            function: WireFunction {
                name: r.name,
                arguments: r.arguments,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_entry() {
        let entry = PromptEntry::user("Hello, agent!");
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.content.as_deref(), Some("Hello, agent!"));
        assert!(!entry.has_pending_tool_calls());
    }

    #[test]
    fn tool_call_entry_serializes_in_wire_shape() {
        let entry = PromptEntry::tool_calls(vec![ToolCallRecord::new(
            "call_1",
            "search",
            r#"{"query":"x"}"#,
        )]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("content").is_none());
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "search");
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], r#"{"query":"x"}"#);
    }

    #[test]
    fn reads_streamed_tool_call_dump() {
        // Older rows carry the streamed delta dump, including `index`.
        let json = r#"{"role":"assistant","tool_calls":[{"index":0,"id":"call_9","type":"function","function":{"name":"pdf","arguments":"{}"}}]}"#;
        let entry: PromptEntry = serde_json::from_str(json).unwrap();
        assert!(entry.has_pending_tool_calls());
        assert_eq!(entry.tool_calls[0], ToolCallRecord::new("call_9", "pdf", "{}"));
    }

    #[test]
    fn tool_result_carries_call_id() {
        let entry = PromptEntry::tool_result("call_1", "search", "[]");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["name"], "search");
        assert_eq!(json["content"], "[]");
    }
}
