use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// The platform's view of its callback registration.
#[derive(Debug, Clone, Default)]
pub struct WebhookInfo {
    /// Currently registered callback URL; empty when none is registered.
    pub url: String,

    /// Updates queued on the platform waiting for delivery.
    pub pending_update_count: u32,

    /// Most recent delivery error reported by the platform, if any.
    pub last_error_message: Option<String>,
}

/// Operations the bot needs from the messaging platform.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Register `url` as the push callback, replacing any prior registration.
    async fn set_webhook(&self, url: &str) -> Result<()>;

    /// Remove the callback registration. Absence of a prior registration is
    /// not an error.
    async fn delete_webhook(&self) -> Result<()>;

    /// Fetch the actual registered callback state.
    async fn get_webhook_info(&self) -> Result<WebhookInfo>;

    /// Send a text message to a chat participant.
    async fn send_message(&self, chat_identity: &str, text: &str) -> Result<()>;
}

/// Shared platform client type
pub type SharedPlatformApi = Arc<dyn PlatformApi>;
