//! Telegram Bot API implementation of `PlatformApi`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::api::{PlatformApi, WebhookInfo};
use crate::error::{BotError, Result};

/// Every platform call is bounded by this deadline so apply/repair cannot
/// hang on a stalled remote.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram Bot API client.
pub struct TelegramClient {
    http_client: reqwest::Client,
    base_url: String,
}

/// Envelope every Bot API response arrives in.
#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct WebhookInfoPayload {
    url: String,
    #[serde(default)]
    pending_update_count: u32,
    last_error_message: Option<String>,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, "https://api.telegram.org")
    }

    pub fn with_base_url(token: &str, base: &str) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            base_url: format!("{}/bot{}", base.trim_end_matches('/'), token),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        debug!("Calling platform method {}", method);

        let response = self
            .http_client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| BotError::Platform {
            message: format!("{} returned an unparseable response: {}", method, e),
        })?;

        if !envelope.ok {
            return Err(BotError::Platform {
                message: envelope
                    .description
                    .unwrap_or_else(|| format!("{} failed with HTTP {}", method, status)),
            });
        }

        envelope.result.ok_or_else(|| BotError::Platform {
            message: format!("{} succeeded but returned no result", method),
        })
    }
}

#[async_trait]
impl PlatformApi for TelegramClient {
    async fn set_webhook(&self, url: &str) -> Result<()> {
        self.call::<bool>("setWebhook", serde_json::json!({ "url": url }))
            .await?;
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        self.call::<bool>("deleteWebhook", serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn get_webhook_info(&self) -> Result<WebhookInfo> {
        let payload: WebhookInfoPayload = self
            .call("getWebhookInfo", serde_json::json!({}))
            .await?;

        Ok(WebhookInfo {
            url: payload.url,
            pending_update_count: payload.pending_update_count,
            last_error_message: payload.last_error_message,
        })
    }

    async fn send_message(&self, chat_identity: &str, text: &str) -> Result<()> {
        let chat_id = parse_chat_id(chat_identity)?;
        self.call::<serde_json::Value>(
            "sendMessage",
            serde_json::json!({ "chat_id": chat_id, "text": text }),
        )
        .await?;
        Ok(())
    }
}

/// Internal chat identities are `tg-<chat id>`; the wire wants the bare id.
fn parse_chat_id(chat_identity: &str) -> Result<i64> {
    chat_identity
        .strip_prefix("tg-")
        .unwrap_or(chat_identity)
        .parse()
        .map_err(|_| BotError::Platform {
            message: format!("Not a chat identity: '{}'", chat_identity),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_embeds_token() {
        let client = TelegramClient::with_base_url("123:ABC", "https://api.telegram.org");
        assert_eq!(
            client.method_url("setWebhook"),
            "https://api.telegram.org/bot123:ABC/setWebhook"
        );
    }

    #[test]
    fn webhook_info_envelope_parses() {
        let raw = r#"{"ok":true,"result":{"url":"https://app.example/bot/update","pending_update_count":3,"last_error_message":"connection refused"}}"#;
        let envelope: ApiResponse<WebhookInfoPayload> = serde_json::from_str(raw).unwrap();

        assert!(envelope.ok);
        let info = envelope.result.unwrap();
        assert_eq!(info.url, "https://app.example/bot/update");
        assert_eq!(info.pending_update_count, 3);
        assert_eq!(info.last_error_message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn chat_identity_maps_to_numeric_chat_id() {
        assert_eq!(parse_chat_id("tg-555").unwrap(), 555);
        assert_eq!(parse_chat_id("-100123").unwrap(), -100123);
        assert!(parse_chat_id("tg-alice").is_err());
    }

    #[test]
    fn error_envelope_parses() {
        let raw = r#"{"ok":false,"description":"Unauthorized"}"#;
        let envelope: ApiResponse<bool> = serde_json::from_str(raw).unwrap();

        assert!(!envelope.ok);
        assert_eq!(envelope.description.as_deref(), Some("Unauthorized"));
    }
}
