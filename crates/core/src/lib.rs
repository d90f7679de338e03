//! # threadbot Core
//!
//! Domain types, traits, and error definitions for the threadbot chat agent.
//! This crate has **no framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (model provider, chat transport, tool, store) is a
//! trait here. Implementations live in their respective crates, and tests
//! swap in scripted doubles.

pub mod error;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{PromptEntry, Role, ToolCallRecord};
pub use provider::{FinishReason, Provider, ProviderRequest, StreamChunk, ToolCallDelta, Transcriber};
pub use store::{CacheKey, ContextRecord, ContextStore, ToolCache};
pub use tool::{Tool, ToolRegistry};
pub use transport::{Author, ChatTransport, InboundEvent, MessageHandle, ThreadMessage};
