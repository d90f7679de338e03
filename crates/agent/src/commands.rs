//! Slash command handling.

use std::sync::Arc;
use threadbot_core::provider::Provider;
use threadbot_core::transport::{Author, ChatTransport, SlashCommand};
use tracing::{info, warn};

/// Handles `/clear` and `/set-openai-key`.
pub struct CommandHandler {
    transport: Arc<dyn ChatTransport>,
    provider: Arc<dyn Provider>,
    allow_set_key: bool,
}

impl CommandHandler {
    pub fn new(transport: Arc<dyn ChatTransport>, provider: Arc<dyn Provider>, allow_set_key: bool) -> Self {
        Self {
            transport,
            provider,
            allow_set_key,
        }
    }

    pub async fn handle(&self, command: &SlashCommand) -> threadbot_core::Result<()> {
        match command.command.as_str() {
            "/clear" => self.clear(&command.channel_id).await,
            "/set-openai-key" => self.set_api_key(command).await,
            other => {
                warn!(command = other, "Unknown slash command");
                Ok(())
            }
        }
    }

    /// Delete the agent's top-level messages and every reply in threads
    /// started by others. Individual failures are logged and skipped.
    async fn clear(&self, channel: &str) -> threadbot_core::Result<()> {
        let history = self.transport.channel_history(channel).await?;
        let mut deleted = 0usize;

        for msg in &history {
            if matches!(msg.author, Author::Agent { .. }) {
                deleted += usize::from(self.try_delete(channel, &msg.ts).await);
                continue;
            }

            let replies = match self.transport.fetch_thread(channel, &msg.ts).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(channel, ts = %msg.ts, error = %e, "Failed to fetch replies");
                    continue;
                }
            };
            for reply in &replies {
                deleted += usize::from(self.try_delete(channel, &reply.ts).await);
            }
        }

        info!(channel, deleted, "Cleared conversation history");
        Ok(())
    }

    async fn try_delete(&self, channel: &str, ts: &str) -> bool {
        match self.transport.delete_message(channel, ts).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel, ts, error = %e, "Failed to delete message");
                false
            }
        }
    }

    async fn set_api_key(&self, command: &SlashCommand) -> threadbot_core::Result<()> {
        let reply = if !self.allow_set_key {
            "This command is disabled"
        } else {
            self.provider.set_api_key(command.text.trim())?;
            info!(user = %command.user_id, "API key replaced");
            "OpenAI key set"
        };

        self.transport
            .post_ephemeral(&command.channel_id, &command.user_id, None, reply)
            .await?;
        Ok(())
    }
}
