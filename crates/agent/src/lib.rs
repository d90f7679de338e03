//! The reply pipeline for threadbot.
//!
//! One inbound chat message becomes one turn:
//!
//! 1. **Fetch** the thread from the chat transport
//! 2. **Assemble** prompts: system instruction, stored tool context, messages
//! 3. **Stream** the model reply, running tools whenever the model asks
//! 4. **Deliver** fragments by live-editing chat messages
//! 5. **Record** new tool calls and results under the last message posted
//!
//! The orchestrator and the delivery buffer run side by side, connected by
//! a bounded channel of text fragments.

pub mod assembler;
pub mod commands;
pub mod delivery;
pub mod orchestrator;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assembler::ConversationAssembler;
pub use commands::CommandHandler;
pub use delivery::{Delivered, DeliveryBuffer, DeliverySettings};
pub use orchestrator::{Orchestrator, ToolCallAssembly};
pub use turn::TurnHandler;
