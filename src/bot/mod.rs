//! Companion bot command handlers.
//!
//! Updates arrive either from the webhook receiver endpoint or (in polling
//! deployments) from an external poller posting to the same endpoint; both
//! paths dispatch through `BotHandler`.

mod commands;
mod update;

pub use commands::{BotHandler, BotReply, SharedBotHandler};
pub use update::{BotUpdate, IncomingMessage};
