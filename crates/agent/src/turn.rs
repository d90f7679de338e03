//! Turn handler — one inbound chat message in, one streamed reply out.

use crate::assembler::ConversationAssembler;
use crate::delivery::{Delivered, DeliveryBuffer, DeliverySettings};
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use threadbot_core::Error;
use threadbot_core::message::PromptEntry;
use threadbot_core::provider::Transcriber;
use threadbot_core::store::ContextStore;
use threadbot_core::transport::{AttachmentKind, ChatTransport, InboundEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the fragment channel between orchestrator and delivery.
const FRAGMENT_BUFFER: usize = 64;

/// Everything needed to answer a message.
pub struct TurnHandler {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn ContextStore>,
    assembler: ConversationAssembler,
    orchestrator: Arc<Orchestrator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    delivery: DeliverySettings,
}

impl TurnHandler {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn ContextStore>,
        orchestrator: Arc<Orchestrator>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            assembler: ConversationAssembler::new(system_prompt, store.clone()),
            transport,
            store,
            orchestrator,
            transcriber: None,
            delivery: DeliverySettings::default(),
        }
    }

    /// Transcribe audio attachments with `transcriber`.
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_delivery(mut self, delivery: DeliverySettings) -> Self {
        self.delivery = delivery;
        self
    }

    /// Answer one inbound message.
    ///
    /// Returns `Ok(None)` for hidden or bot-authored events. Fails without
    /// posting anything if the thread cannot be read.
    pub async fn handle(&self, event: &InboundEvent) -> threadbot_core::Result<Option<Delivered>> {
        if event.hidden {
            debug!(ts = %event.ts, "Ignoring hidden event");
            return Ok(None);
        }
        // Includes the agent's own posts echoed back by the platform
        if event.bot_id.is_some() {
            debug!(ts = %event.ts, "Ignoring bot-authored event");
            return Ok(None);
        }

        let channel = event.channel.as_str();
        let thread_ts = event.thread_key();

        self.transcribe_attachments(event).await;

        let thread = self
            .transport
            .fetch_thread(channel, thread_ts)
            .await
            .inspect_err(|e| {
                error!(channel, thread_ts, error = %e, "Failed to fetch thread messages");
            })?;

        let mut prompts = self.assembler.assemble(&thread).await?;
        let assembled = prompts.len();

        let buffer = DeliveryBuffer::start(
            self.transport.clone(),
            channel,
            Some(thread_ts),
            self.delivery.clone(),
        )
        .await?;

        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let ((), delivered) = tokio::join!(
            self.orchestrator.generate_reply(&mut prompts, tx),
            buffer.run(rx),
        );
        let delivered = delivered?;

        // Tool calls and results are kept under the last message posted
        let added = &prompts[assembled..];
        if !added.is_empty() {
            let last = delivered
                .last()
                .ok_or_else(|| Error::Internal("reply delivered without a message".into()))?;
            self.store
                .record(&last.ts, channel, Some(thread_ts), added)
                .await?;
        }

        info!(
            channel,
            thread_ts,
            messages = delivered.handles.len(),
            tool_entries = added.len(),
            "Reply delivered"
        );
        Ok(Some(delivered))
    }

    /// Transcribe audio attachments, echo each transcript to the sender and
    /// record it as user input for this message. Failures are logged and
    /// the attachment skipped.
    async fn transcribe_attachments(&self, event: &InboundEvent) {
        let audio = event.files.iter().filter(|f| f.kind == AttachmentKind::Audio);

        for file in audio {
            let Some(transcriber) = &self.transcriber else {
                warn!(ts = %event.ts, "Audio attachment ignored: no transcriber configured");
                return;
            };

            let bytes = match self.transport.download_file(&file.url).await {
                Ok(b) => b,
                Err(e) => {
                    error!(url = %file.url, error = %e, "Failed to download file");
                    continue;
                }
            };

            let filename = file.filename.as_deref().unwrap_or("audio.webm");
            let text = match transcriber.transcribe(bytes, filename).await {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "Transcription failed");
                    continue;
                }
            };
            debug!(ts = %event.ts, chars = text.len(), "Transcribed audio");

            if let Some(user) = &event.user
                && let Err(e) = self
                    .transport
                    .post_ephemeral(&event.channel, user, Some(event.thread_key()), &format!("You: {text}"))
                    .await
            {
                warn!(error = %e, "Failed to echo transcript");
            }

            if let Err(e) = self
                .store
                .record(
                    &event.ts,
                    &event.channel,
                    Some(event.thread_key()),
                    &[PromptEntry::user(text)],
                )
                .await
            {
                error!(error = %e, "Failed to record transcript");
            }
        }
    }
}
