//! Conversation assembler — turns a chat thread into a prompt sequence.
//!
//! Tool calls, tool results and audio transcripts never appear in the chat
//! itself; they were recorded in the context store under the message that
//! produced them and are spliced back in right before that message.

use std::sync::Arc;
use threadbot_core::message::PromptEntry;
use threadbot_core::store::ContextStore;
use threadbot_core::transport::{Author, ThreadMessage};
use tracing::{debug, warn};

/// Builds prompt sequences from thread messages.
pub struct ConversationAssembler {
    system_prompt: String,
    store: Arc<dyn ContextStore>,
}

impl ConversationAssembler {
    pub fn new(system_prompt: impl Into<String>, store: Arc<dyn ContextStore>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            store,
        }
    }

    /// Assemble the prompt sequence for `thread` (oldest message first).
    ///
    /// Store read failures abort assembly.
    pub async fn assemble(&self, thread: &[ThreadMessage]) -> threadbot_core::Result<Vec<PromptEntry>> {
        let mut prompts = vec![PromptEntry::system(&self.system_prompt)];

        for msg in thread {
            prompts.extend(self.store.fetch(&msg.ts).await?);

            // Audio-only messages carry no text of their own
            if msg.text.is_empty() {
                continue;
            }

            match &msg.author {
                Author::Agent { .. } => prompts.push(PromptEntry::assistant(&msg.text)),
                Author::User { .. } => prompts.push(PromptEntry::user(&msg.text)),
                Author::Unknown => warn!(ts = %msg.ts, "Skipping message with unknown author"),
            }
        }

        debug!(messages = thread.len(), prompts = prompts.len(), "Assembled prompts");
        Ok(prompts)
    }
}
