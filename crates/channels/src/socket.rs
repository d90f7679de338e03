//! Slack Socket Mode listener.
//!
//! Opens a WebSocket through `apps.connections.open`, acknowledges every
//! envelope by its `envelope_id` and forwards message events and slash
//! commands over an mpsc channel. The connection is re-established whenever
//! Slack asks for it (`disconnect`) or the socket drops.

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use threadbot_config::SlackConfig;
use threadbot_core::error::TransportError;
use threadbot_core::transport::{Attachment, AttachmentKind, InboundEvent, SlashCommand};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Something the bot has to react to.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    Message(InboundEvent),
    Command(SlashCommand),
}

/// One parsed Socket Mode frame.
#[derive(Debug)]
enum Envelope {
    Hello,
    Disconnect { reason: String },
    /// Needs an ack; `event` is `None` for payloads the bot ignores
    Payload {
        envelope_id: String,
        event: Option<SocketEvent>,
    },
}

/// Socket Mode client.
pub struct SlackSocket {
    api_url: String,
    app_token: String,
    client: reqwest::Client,
}

impl SlackSocket {
    pub fn new(api_url: impl Into<String>, app_token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            app_token: app_token.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, TransportError> {
        let token = config
            .app_token
            .as_deref()
            .ok_or_else(|| TransportError::NotConfigured("SLACK_APP_TOKEN is not set".into()))?;
        Ok(Self::new(&config.api_url, token))
    }

    /// Spawn the listener. It stops once the receiver is dropped.
    pub fn start(self) -> mpsc::Receiver<SocketEvent> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while !tx.is_closed() {
                match self.session(&tx).await {
                    Ok(()) => info!("Socket Mode session ended, reconnecting"),
                    Err(e) => {
                        error!(error = %e, "Socket Mode session failed");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
            debug!("Socket Mode listener stopped");
        });
        rx
    }

    /// Ask Slack for a fresh WebSocket URL.
    async fn open_url(&self) -> Result<String, TransportError> {
        let method = "apps.connections.open";
        let body: Value = self
            .client
            .post(format!("{}/{method}", self.api_url))
            .bearer_auth(&self.app_token)
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| TransportError::InvalidPayload(format!("{method}: {e}")))?;

        if body["ok"].as_bool() != Some(true) {
            return Err(TransportError::Api {
                method: method.into(),
                reason: body["error"].as_str().unwrap_or("unknown_error").to_string(),
            });
        }
        body["url"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| TransportError::InvalidPayload(format!("{method}: missing url")))
    }

    /// Run one connection until Slack disconnects it.
    async fn session(&self, tx: &mpsc::Sender<SocketEvent>) -> Result<(), TransportError> {
        let url = self.open_url().await?;
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();
        info!("Socket Mode connected");

        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(t)) => t,
                Ok(Message::Ping(payload)) => {
                    sink.send(Message::Pong(payload))
                        .await
                        .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
                    continue;
                }
                Ok(Message::Close(_)) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(TransportError::ConnectionLost(e.to_string())),
            };

            let envelope = match parse_envelope(&text) {
                Ok(env) => env,
                Err(e) => {
                    warn!(error = %e, "Dropping unreadable frame");
                    continue;
                }
            };

            match envelope {
                Envelope::Hello => debug!("Socket Mode hello"),
                Envelope::Disconnect { reason } => {
                    info!(reason = %reason, "Slack requested disconnect");
                    return Ok(());
                }
                Envelope::Payload { envelope_id, event } => {
                    let ack = json!({ "envelope_id": envelope_id }).to_string();
                    sink.send(Message::Text(ack))
                        .await
                        .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;

                    if let Some(event) = event
                        && tx.send(event).await.is_err()
                    {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_envelope(text: &str) -> Result<Envelope, TransportError> {
    let frame: Value =
        serde_json::from_str(text).map_err(|e| TransportError::InvalidPayload(e.to_string()))?;

    match frame["type"].as_str().unwrap_or_default() {
        "hello" => return Ok(Envelope::Hello),
        "disconnect" => {
            return Ok(Envelope::Disconnect {
                reason: frame["reason"].as_str().unwrap_or_default().to_string(),
            });
        }
        _ => {}
    }

    let envelope_id = frame["envelope_id"]
        .as_str()
        .ok_or_else(|| TransportError::InvalidPayload("frame without envelope_id".into()))?
        .to_string();

    let payload = &frame["payload"];
    let event = match frame["type"].as_str() {
        Some("events_api") => parse_message_event(&payload["event"]).map(SocketEvent::Message),
        Some("slash_commands") => parse_command(payload).map(SocketEvent::Command),
        _ => None,
    };
    Ok(Envelope::Payload { envelope_id, event })
}

/// Parse a `message` event. Other event types are ignored.
fn parse_message_event(event: &Value) -> Option<InboundEvent> {
    if event["type"].as_str() != Some("message") {
        return None;
    }

    let files = event["files"]
        .as_array()
        .map(|files| files.iter().filter_map(parse_file).collect())
        .unwrap_or_default();

    Some(InboundEvent {
        channel: event["channel"].as_str()?.to_string(),
        ts: event["ts"].as_str()?.to_string(),
        thread_ts: event["thread_ts"].as_str().map(String::from),
        user: event["user"].as_str().map(String::from),
        bot_id: event["bot_id"].as_str().map(String::from),
        text: event["text"].as_str().unwrap_or_default().to_string(),
        files,
        hidden: event["hidden"].as_bool().unwrap_or(false),
    })
}

fn parse_file(file: &Value) -> Option<Attachment> {
    let url = file["url_private_download"]
        .as_str()
        .or_else(|| file["url_private"].as_str())?;
    let kind = if file["subtype"].as_str() == Some("slack_audio") {
        AttachmentKind::Audio
    } else {
        AttachmentKind::Other
    };

    Some(Attachment {
        kind,
        url: url.to_string(),
        filename: file["name"].as_str().map(String::from),
        mime_type: file["mimetype"].as_str().map(String::from),
    })
}

fn parse_command(payload: &Value) -> Option<SlashCommand> {
    Some(SlashCommand {
        command: payload["command"].as_str()?.to_string(),
        text: payload["text"].as_str().unwrap_or_default().to_string(),
        channel_id: payload["channel_id"].as_str()?.to_string(),
        user_id: payload["user_id"].as_str()?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_and_disconnect() {
        assert!(matches!(
            parse_envelope(r#"{"type":"hello","num_connections":1}"#).unwrap(),
            Envelope::Hello
        ));
        match parse_envelope(r#"{"type":"disconnect","reason":"refresh_requested"}"#).unwrap() {
            Envelope::Disconnect { reason } => assert_eq!(reason, "refresh_requested"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn message_event() {
        let frame = json!({
            "envelope_id": "e-1",
            "type": "events_api",
            "payload": {"event": {
                "type": "message",
                "channel": "D01",
                "user": "U1",
                "text": "hello",
                "ts": "1700000000.000200",
                "thread_ts": "1700000000.000100"
            }}
        });

        let Envelope::Payload { envelope_id, event } = parse_envelope(&frame.to_string()).unwrap() else {
            panic!("expected payload");
        };
        assert_eq!(envelope_id, "e-1");
        let Some(SocketEvent::Message(event)) = event else {
            panic!("expected message");
        };
        assert_eq!(event.channel, "D01");
        assert_eq!(event.text, "hello");
        assert_eq!(event.thread_key(), "1700000000.000100");
        assert!(!event.hidden);
    }

    #[test]
    fn audio_files_are_recognized() {
        let event = parse_message_event(&json!({
            "type": "message",
            "channel": "D01",
            "user": "U1",
            "ts": "1.0",
            "files": [
                {"subtype": "slack_audio", "url_private_download": "https://files/a.webm", "name": "a.webm", "mimetype": "audio/webm"},
                {"url_private": "https://files/b.png", "name": "b.png"},
                {"name": "no-url"}
            ]
        }))
        .unwrap();

        assert_eq!(event.files.len(), 2);
        assert_eq!(event.files[0].kind, AttachmentKind::Audio);
        assert_eq!(event.files[0].url, "https://files/a.webm");
        assert_eq!(event.files[1].kind, AttachmentKind::Other);
        assert!(event.text.is_empty());
    }

    #[test]
    fn hidden_flag_is_kept() {
        let event = parse_message_event(&json!({
            "type": "message",
            "subtype": "message_changed",
            "hidden": true,
            "channel": "D01",
            "ts": "2.0"
        }))
        .unwrap();
        assert!(event.hidden);
    }

    #[test]
    fn slash_command() {
        let frame = json!({
            "envelope_id": "e-2",
            "type": "slash_commands",
            "payload": {"command": "/clear", "text": "", "channel_id": "D01", "user_id": "U1"}
        });
        let Envelope::Payload { event, .. } = parse_envelope(&frame.to_string()).unwrap() else {
            panic!("expected payload");
        };
        let Some(SocketEvent::Command(cmd)) = event else {
            panic!("expected command");
        };
        assert_eq!(cmd.command, "/clear");
        assert_eq!(cmd.channel_id, "D01");
    }

    #[test]
    fn other_payloads_are_acked_but_ignored() {
        let frame = json!({
            "envelope_id": "e-3",
            "type": "events_api",
            "payload": {"event": {"type": "reaction_added"}}
        });
        match parse_envelope(&frame.to_string()).unwrap() {
            Envelope::Payload { envelope_id, event } => {
                assert_eq!(envelope_id, "e-3");
                assert!(event.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_envelope("not json").is_err());
        assert!(parse_envelope(r#"{"type":"events_api"}"#).is_err());
    }
}
