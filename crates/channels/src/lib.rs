//! Slack integration for threadbot.
//!
//! - **Web API** ([`SlackTransport`]) — posts, edits, reads and deletes
//!   messages; downloads private files
//! - **Socket Mode** ([`SlackSocket`]) — receives message events and slash
//!   commands over a WebSocket, no public URL required

pub mod slack;
pub mod socket;

pub use slack::SlackTransport;
pub use socket::{SlackSocket, SocketEvent};
