//! Client for the external messaging platform's HTTP API.
//!
//! The `PlatformApi` trait is the seam between the delivery-mode controller
//! and the wire; production uses the Telegram Bot API client, tests swap in
//! a scriptable mock.

mod api;
mod telegram;

pub use api::{PlatformApi, SharedPlatformApi, WebhookInfo};
pub use telegram::TelegramClient;

#[cfg(test)]
pub use api::testing::MockPlatform;
