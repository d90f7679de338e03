//! Slack Web API transport.
//!
//! Posts and edits messages with the bot token, reads threads and channel
//! history back, and downloads private file attachments. Every Web API
//! reply carries an `ok` flag; `ok: false` becomes [`TransportError::Api`]
//! with Slack's error code as the reason.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use threadbot_config::SlackConfig;
use threadbot_core::error::TransportError;
use threadbot_core::transport::{Author, ChatTransport, MessageHandle, ThreadMessage};
use tracing::debug;

/// Page size for `conversations.replies` and `conversations.history`.
const PAGE_LIMIT: &str = "200";

/// Slack transport over the Web API.
pub struct SlackTransport {
    api_url: String,
    bot_token: String,
    username: String,
    client: reqwest::Client,
}

impl SlackTransport {
    pub fn new(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            username: username.into(),
            client,
        }
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, TransportError> {
        let token = config
            .bot_token
            .as_deref()
            .ok_or_else(|| TransportError::NotConfigured("SLACK_BOT_TOKEN is not set".into()))?;
        Ok(Self::new(&config.api_url, token, &config.username))
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.api_url)
    }

    /// Call a write method with a JSON body.
    async fn post(&self, method: &str, body: Value) -> Result<Value, TransportError> {
        debug!(method, "Slack API call");
        let response = self
            .client
            .post(self.endpoint(method))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("{method}: {e}")))?;

        check_response(method, response).await
    }

    /// Call a read method with query parameters.
    async fn get(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, TransportError> {
        debug!(method, "Slack API call");
        let response = self
            .client
            .get(self.endpoint(method))
            .bearer_auth(&self.bot_token)
            .query(params)
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("{method}: {e}")))?;

        check_response(method, response).await
    }

    /// Read every page of a cursor-paginated `messages` listing.
    async fn paginate(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<ThreadMessage>, TransportError> {
        let mut messages = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut query = params.to_vec();
            query.push(("limit", PAGE_LIMIT));
            if !cursor.is_empty() {
                query.push(("cursor", &cursor));
            }

            let page = self.get(method, &query).await?;
            let items = page["messages"].as_array().ok_or_else(|| {
                TransportError::InvalidPayload(format!("{method}: missing messages"))
            })?;
            messages.extend(items.iter().filter_map(parse_message));

            match next_cursor(&page) {
                Some(next) => cursor = next.to_string(),
                None => break,
            }
        }
        Ok(messages)
    }
}

async fn check_response(method: &str, response: reqwest::Response) -> Result<Value, TransportError> {
    let status = response.status();
    if status.as_u16() == 429 {
        return Err(TransportError::Api {
            method: method.to_string(),
            reason: "ratelimited".into(),
        });
    }
    if !status.is_success() {
        return Err(TransportError::Api {
            method: method.to_string(),
            reason: format!("HTTP {status}"),
        });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| TransportError::InvalidPayload(format!("{method}: {e}")))?;
    api_result(method, body)
}

/// Unwrap a Web API reply, turning `ok: false` into an error.
fn api_result(method: &str, body: Value) -> Result<Value, TransportError> {
    if body["ok"].as_bool() == Some(true) {
        return Ok(body);
    }
    Err(TransportError::Api {
        method: method.to_string(),
        reason: body["error"].as_str().unwrap_or("unknown_error").to_string(),
    })
}

fn next_cursor(page: &Value) -> Option<&str> {
    page["response_metadata"]["next_cursor"]
        .as_str()
        .filter(|c| !c.is_empty())
}

/// Parse one message object. Messages without a `ts` are dropped.
fn parse_message(raw: &Value) -> Option<ThreadMessage> {
    let ts = raw["ts"].as_str()?;
    let author = if let Some(bot_id) = raw["bot_id"].as_str() {
        Author::Agent {
            bot_id: bot_id.to_string(),
        }
    } else if let Some(user) = raw["user"].as_str() {
        Author::User {
            user_id: user.to_string(),
        }
    } else {
        Author::Unknown
    };

    Some(ThreadMessage {
        ts: ts.to_string(),
        author,
        text: raw["text"].as_str().unwrap_or_default().to_string(),
    })
}

#[async_trait]
impl ChatTransport for SlackTransport {
    fn name(&self) -> &str {
        "slack"
    }

    async fn create_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        let mut body = json!({
            "channel": channel,
            "text": text,
            "username": self.username,
        });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let reply = self.post("chat.postMessage", body).await?;
        let ts = reply["ts"].as_str().ok_or_else(|| {
            TransportError::InvalidPayload("chat.postMessage: missing ts".into())
        })?;

        Ok(MessageHandle {
            channel: reply["channel"].as_str().unwrap_or(channel).to_string(),
            ts: ts.to_string(),
        })
    }

    async fn update_message(&self, handle: &MessageHandle, text: &str) -> Result<(), TransportError> {
        self.post(
            "chat.update",
            json!({ "channel": handle.channel, "ts": handle.ts, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn fetch_thread(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Vec<ThreadMessage>, TransportError> {
        self.paginate("conversations.replies", &[("channel", channel), ("ts", thread_ts)])
            .await
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "channel": channel, "user": user, "text": text });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }
        self.post("chat.postEphemeral", body).await?;
        Ok(())
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("download: {e}")))?;

        if !response.status().is_success() {
            return Err(TransportError::Api {
                method: "download".into(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(format!("download: {e}")))?;
        debug!(url, bytes = bytes.len(), "Downloaded file");
        Ok(bytes.to_vec())
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), TransportError> {
        self.post("chat.delete", json!({ "channel": channel, "ts": ts }))
            .await?;
        Ok(())
    }

    async fn channel_history(&self, channel: &str) -> Result<Vec<ThreadMessage>, TransportError> {
        self.paginate("conversations.history", &[("channel", channel)])
            .await
    }
}
