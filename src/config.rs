//! Application configuration loaded from environment variables.
//!
//! The intended delivery mode is resolved here once, at startup, and handed
//! to the controller as an explicit value. Nothing below the config layer
//! reads ambient process state.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{BotError, Result};

/// How the bot receives updates from the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Repeatedly ask the platform for new updates.
    Polling,
    /// The platform pushes updates to a registered callback URL.
    Webhook,
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Polling => write!(f, "polling"),
            DeliveryMode::Webhook => write!(f, "webhook"),
        }
    }
}

/// The intended delivery configuration, source of truth for reconciliation.
#[derive(Debug, Clone)]
pub struct DeliveryIntent {
    pub mode: DeliveryMode,
    pub webhook_url: Option<String>,
}

impl DeliveryIntent {
    /// The callback URL the platform is expected to have registered.
    /// Empty for polling intent (no registration should exist).
    pub fn expected_url(&self) -> Option<&str> {
        match self.mode {
            DeliveryMode::Polling => None,
            DeliveryMode::Webhook => self.webhook_url.as_deref(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP API binds to.
    pub bind_addr: SocketAddr,
    /// Directory holding the persisted state files.
    pub state_path: String,
    /// Bot token for the messaging platform API.
    pub bot_token: String,
    /// Intended delivery mode and callback URL.
    pub delivery: DeliveryIntent,
    /// Interval between automatic session cleanup sweeps, in seconds.
    pub cleanup_interval_secs: u64,
}

impl AppConfig {
    /// Build configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| BotError::ConfigValidation {
                message: format!("BIND_ADDR is not a valid socket address: {}", e),
            })?;

        let state_path = std::env::var("STATE_PATH").unwrap_or_else(|_| "state".to_string());

        let bot_token = std::env::var("BOT_TOKEN").map_err(|_| BotError::ConfigValidation {
            message: "Missing BOT_TOKEN environment variable".to_string(),
        })?;

        let mode = match std::env::var("DELIVERY_MODE")
            .unwrap_or_else(|_| "polling".to_string())
            .to_lowercase()
            .as_str()
        {
            "polling" => DeliveryMode::Polling,
            "webhook" => DeliveryMode::Webhook,
            other => {
                return Err(BotError::ConfigValidation {
                    message: format!(
                        "DELIVERY_MODE must be 'polling' or 'webhook', got '{}'",
                        other
                    ),
                })
            }
        };

        // WEBHOOK_URL may be given directly, or derived from the public base
        // URL the deployment is reachable at.
        let webhook_url = std::env::var("WEBHOOK_URL").ok().or_else(|| {
            std::env::var("WEB_BASE_URL")
                .ok()
                .map(|base| format!("{}/bot/update", base.trim_end_matches('/')))
        });

        let cleanup_interval_secs = std::env::var("SESSION_CLEANUP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);

        Ok(Self {
            bind_addr,
            state_path,
            bot_token,
            delivery: DeliveryIntent { mode, webhook_url },
            cleanup_interval_secs,
        })
    }
}
