//! Delivery buffer — shows a streamed reply by live-editing chat messages.
//!
//! Fragments are appended to the current message and pushed with an
//! in-place edit at most once per flush interval. When the next fragment
//! would push the message past the payload limit, the current message is
//! finalized and a new one is started with that fragment.

use std::sync::Arc;
use std::time::Duration;
use threadbot_config::DeliveryConfig;
use threadbot_core::error::TransportError;
use threadbot_core::transport::{ChatTransport, MessageHandle};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Delivery tuning.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Largest message body in UTF-8 bytes
    pub max_payload_bytes: usize,
    /// Minimum time between in-place edits
    pub flush_interval: Duration,
    /// Text shown before the first fragment arrives
    pub placeholder: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for DeliverySettings {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_payload_bytes: config.max_payload_bytes,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            placeholder: config.placeholder_text.clone(),
        }
    }
}

/// What a finished delivery produced.
#[derive(Debug, Clone)]
pub struct Delivered {
    /// Every message created, in order (never empty)
    pub handles: Vec<MessageHandle>,
    /// Full text of the last message
    pub text: String,
}

impl Delivered {
    /// The message the reply ended in.
    pub fn last(&self) -> Option<&MessageHandle> {
        self.handles.last()
    }
}

/// Accumulates fragments into chat messages.
pub struct DeliveryBuffer {
    transport: Arc<dyn ChatTransport>,
    channel: String,
    thread_ts: Option<String>,
    settings: DeliverySettings,
    handles: Vec<MessageHandle>,
    text: String,
    last_flush: Instant,
}

impl DeliveryBuffer {
    /// Post the placeholder message and return a buffer targeting it.
    pub async fn start(
        transport: Arc<dyn ChatTransport>,
        channel: &str,
        thread_ts: Option<&str>,
        settings: DeliverySettings,
    ) -> Result<Self, TransportError> {
        let handle = transport
            .create_message(channel, thread_ts, &settings.placeholder)
            .await?;
        debug!(channel, ts = %handle.ts, "Posted placeholder");

        Ok(Self {
            transport,
            channel: channel.to_string(),
            thread_ts: thread_ts.map(String::from),
            settings,
            handles: vec![handle],
            text: String::new(),
            last_flush: Instant::now(),
        })
    }

    /// Consume fragments until the sender side closes, then flush once more.
    pub async fn run(mut self, mut fragments: mpsc::Receiver<String>) -> Result<Delivered, TransportError> {
        while let Some(fragment) = fragments.recv().await {
            self.push(&fragment).await?;
        }
        self.flush().await?;

        debug!(messages = self.handles.len(), "Delivery complete");
        Ok(Delivered {
            handles: self.handles,
            text: self.text,
        })
    }

    async fn push(&mut self, fragment: &str) -> Result<(), TransportError> {
        if self.text.len() + fragment.len() > self.settings.max_payload_bytes {
            self.flush().await?;
            let handle = self
                .transport
                .create_message(&self.channel, self.thread_ts.as_deref(), fragment)
                .await?;
            debug!(ts = %handle.ts, "Started continuation message");
            self.handles.push(handle);
            self.text = fragment.to_string();
            self.last_flush = Instant::now();
        } else {
            self.text.push_str(fragment);
        }

        if self.last_flush.elapsed() > self.settings.flush_interval {
            self.flush().await?;
        }
        Ok(())
    }

    /// Push the current text to the current message. Empty text is never
    /// sent; the placeholder stays until there is something to show.
    async fn flush(&mut self) -> Result<(), TransportError> {
        if self.text.is_empty() {
            return Ok(());
        }
        let Some(handle) = self.handles.last() else {
            return Err(TransportError::InvalidPayload(
                "no message to deliver into".into(),
            ));
        };
        self.transport.update_message(handle, &self.text).await?;
        self.last_flush = Instant::now();
        Ok(())
    }
}
