//! Shared test doubles for the reply pipeline.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use threadbot_core::error::{ProviderError, TransportError};
use threadbot_core::provider::{
    ChunkReceiver, FinishReason, Provider, ProviderRequest, StreamChunk, ToolCallDelta,
};
use threadbot_core::transport::{ChatTransport, MessageHandle, ThreadMessage};

/// What one `stream()` call should produce.
pub enum Script {
    /// Deliver these chunks, then end the stream
    Chunks(Vec<StreamChunk>),
    /// Fail to open the stream
    Refuse(ProviderError),
    /// Deliver these chunks, then fail mid-stream
    Break(Vec<StreamChunk>, ProviderError),
}

/// A provider that replays scripted streams in order and records every
/// request it receives.
///
/// Panics if more calls are made than scripts provided.
pub struct ScriptedStreamProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
    keys: Mutex<Vec<String>>,
}

impl ScriptedStreamProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
        }
    }

    /// A provider that streams `parts` as text then finishes with `stop`.
    pub fn text(parts: &[&str]) -> Self {
        Self::new(vec![Script::Chunks(text_chunks(parts))])
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedStreamProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedStreamProvider: no more scripts");

        let (chunks, tail) = match script {
            Script::Refuse(e) => return Err(e),
            Script::Chunks(chunks) => (chunks, None),
            Script::Break(chunks, e) => (chunks, Some(e)),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(chunks.len() + 1);
        for chunk in chunks {
            tx.try_send(Ok(chunk)).unwrap();
        }
        if let Some(e) = tail {
            tx.try_send(Err(e)).unwrap();
        }
        Ok(rx)
    }

    fn set_api_key(&self, api_key: &str) -> Result<(), ProviderError> {
        self.keys.lock().unwrap().push(api_key.to_string());
        Ok(())
    }
}

/// Text chunks followed by a `stop` finish.
pub fn text_chunks(parts: &[&str]) -> Vec<StreamChunk> {
    let mut chunks: Vec<StreamChunk> = parts.iter().map(|p| StreamChunk::text(*p)).collect();
    chunks.push(StreamChunk::finish(FinishReason::Stop));
    chunks
}

/// Chunks declaring one tool call (split into two argument fragments),
/// finished with `tool_calls`.
pub fn tool_call_chunks(id: &str, name: &str, args: &str) -> Vec<StreamChunk> {
    let (head, tail) = args.split_at(args.len() / 2);
    vec![
        StreamChunk {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some(id.into()),
                name: Some(name.into()),
                arguments: Some(head.into()),
            }],
            ..StreamChunk::default()
        },
        StreamChunk {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                arguments: Some(tail.into()),
                ..ToolCallDelta::default()
            }],
            ..StreamChunk::default()
        },
        StreamChunk::finish(FinishReason::ToolCalls),
    ]
}

/// One write the transport received.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Create { ts: String, thread_ts: Option<String>, text: String },
    Update { ts: String, text: String },
    Ephemeral { user: String, text: String },
    Delete { ts: String },
}

/// A chat transport that records every write and serves a fixed thread.
#[derive(Default)]
pub struct RecordingTransport {
    pub thread: Mutex<Vec<ThreadMessage>>,
    pub history: Mutex<Vec<ThreadMessage>>,
    pub ops: Mutex<Vec<Op>>,
    pub fail_fetch: AtomicBool,
    pub fail_delete: AtomicBool,
    next_ts: AtomicUsize,
}

impl RecordingTransport {
    pub fn with_thread(thread: Vec<ThreadMessage>) -> Self {
        Self {
            thread: Mutex::new(thread),
            ..Self::default()
        }
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, Op::Create { .. }))
            .count()
    }

    pub fn updates(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, Op::Update { .. }))
            .count()
    }

    /// The final visible text of every created message, in creation order.
    pub fn final_texts(&self) -> Vec<String> {
        let mut messages: Vec<(String, String)> = Vec::new();
        for op in self.ops() {
            match op {
                Op::Create { ts, text, .. } => messages.push((ts, text)),
                Op::Update { ts, text } => {
                    if let Some(m) = messages.iter_mut().find(|(t, _)| *t == ts) {
                        m.1 = text;
                    }
                }
                _ => {}
            }
        }
        messages.into_iter().map(|(_, text)| text).collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        let n = self.next_ts.fetch_add(1, Ordering::SeqCst) + 1;
        let ts = format!("900.{n:06}");
        self.ops.lock().unwrap().push(Op::Create {
            ts: ts.clone(),
            thread_ts: thread_ts.map(String::from),
            text: text.to_string(),
        });
        Ok(MessageHandle {
            channel: channel.to_string(),
            ts,
        })
    }

    async fn update_message(&self, handle: &MessageHandle, text: &str) -> Result<(), TransportError> {
        self.ops.lock().unwrap().push(Op::Update {
            ts: handle.ts.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn fetch_thread(
        &self,
        _channel: &str,
        _thread_ts: &str,
    ) -> Result<Vec<ThreadMessage>, TransportError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(TransportError::Api {
                method: "conversations.replies".into(),
                reason: "thread_not_found".into(),
            });
        }
        Ok(self.thread.lock().unwrap().clone())
    }

    async fn post_ephemeral(
        &self,
        _channel: &str,
        user: &str,
        _thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), TransportError> {
        self.ops.lock().unwrap().push(Op::Ephemeral {
            user: user.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn download_file(&self, _url: &str) -> Result<Vec<u8>, TransportError> {
        Ok(b"RIFF....WAVE".to_vec())
    }

    async fn delete_message(&self, _channel: &str, ts: &str) -> Result<(), TransportError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(TransportError::Api {
                method: "chat.delete".into(),
                reason: "cant_delete_message".into(),
            });
        }
        self.ops.lock().unwrap().push(Op::Delete { ts: ts.to_string() });
        Ok(())
    }

    async fn channel_history(&self, _channel: &str) -> Result<Vec<ThreadMessage>, TransportError> {
        Ok(self.history.lock().unwrap().clone())
    }
}
