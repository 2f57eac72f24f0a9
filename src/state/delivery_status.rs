//! Persisted snapshot of the bot's delivery-mode status.
//!
//! Operator-visibility telemetry: which mode was last applied, whether the
//! apply succeeded, how many times it has failed. Like the session store,
//! writes here are logged and swallowed on failure; the intent itself lives
//! in deployment configuration, so nothing here is load-bearing.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::current_timestamp;
use crate::config::DeliveryMode;

/// Observed outcome of the last delivery-mode apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// The intended mode is in effect on the platform.
    Active,
    /// No mode has been applied yet.
    #[default]
    Inactive,
    /// The last apply attempt failed.
    Error,
}

/// The persisted status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryModeStatus {
    /// Schema version for migrations
    pub version: u32,

    /// Mode most recently applied, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<DeliveryMode>,

    /// Webhook URL most recently registered, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Outcome of the last apply
    pub status: RegistrationStatus,

    /// Consecutive apply failures; reset on a successful apply
    pub error_count: u32,

    /// When the status last changed (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<u64>,

    /// Failure reason from the last unsuccessful apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for DeliveryModeStatus {
    fn default() -> Self {
        Self {
            version: 1,
            mode: None,
            webhook_url: None,
            status: RegistrationStatus::Inactive,
            error_count: 0,
            last_update_time: None,
            last_error: None,
        }
    }
}

/// Store wrapping the status record with degraded persistence.
pub struct DeliveryStatusStore {
    status: RwLock<DeliveryModeStatus>,
    path: String,
}

impl DeliveryStatusStore {
    /// Load from disk. Any failure degrades to the default (inactive) record.
    pub async fn load(path: &str) -> Self {
        let status = match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(status) => {
                    debug!("Loaded delivery status from {}", path);
                    status
                }
                Err(e) => {
                    warn!("Could not parse delivery status {}: {}, starting inactive", path, e);
                    DeliveryModeStatus::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DeliveryModeStatus::default(),
            Err(e) => {
                warn!("Could not read delivery status {}: {}, starting inactive", path, e);
                DeliveryModeStatus::default()
            }
        };

        Self {
            status: RwLock::new(status),
            path: path.to_string(),
        }
    }

    /// Current status snapshot.
    pub async fn snapshot(&self) -> DeliveryModeStatus {
        self.status.read().await.clone()
    }

    /// Apply a mutation to the record and persist it. The write lock covers
    /// the mutation so concurrent updates serialize; the disk write failure
    /// is telemetry-only and swallowed with a warning.
    pub async fn update<F>(&self, mutate: F) -> DeliveryModeStatus
    where
        F: FnOnce(&mut DeliveryModeStatus),
    {
        let snapshot = {
            let mut status = self.status.write().await;
            mutate(&mut status);
            status.last_update_time = Some(current_timestamp());
            status.clone()
        };

        match serde_json::to_string_pretty(&snapshot) {
            Ok(content) => {
                let temp_path = format!("{}.tmp", self.path);
                let write = tokio::fs::write(&temp_path, &content).await;
                let rename = match write {
                    Ok(()) => tokio::fs::rename(&temp_path, &self.path).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = rename {
                    warn!("Could not persist delivery status {}: {}", self.path, e);
                }
            }
            Err(e) => warn!("Could not serialize delivery status: {}", e),
        }

        snapshot
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        let path = std::env::temp_dir()
            .join(format!("feltlink-status-scratch-{}.json", std::process::id()))
            .to_string_lossy()
            .into_owned();
        Self {
            status: RwLock::new(DeliveryModeStatus::default()),
            path,
        }
    }
}

/// Shared delivery status store type
pub type SharedDeliveryStatusStore = Arc<DeliveryStatusStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_status_is_inactive() {
        let store = DeliveryStatusStore::in_memory();
        let status = store.snapshot().await;

        assert_eq!(status.status, RegistrationStatus::Inactive);
        assert_eq!(status.error_count, 0);
        assert!(status.mode.is_none());
    }

    #[tokio::test]
    async fn update_stamps_time_and_applies_mutation() {
        let store = DeliveryStatusStore::in_memory();
        let status = store
            .update(|s| {
                s.mode = Some(DeliveryMode::Webhook);
                s.status = RegistrationStatus::Error;
                s.error_count += 1;
                s.last_error = Some("registration rejected".to_string());
            })
            .await;

        assert_eq!(status.status, RegistrationStatus::Error);
        assert_eq!(status.error_count, 1);
        assert!(status.last_update_time.is_some());

        let reread = store.snapshot().await;
        assert_eq!(reread.error_count, 1);
        assert_eq!(reread.last_error.as_deref(), Some("registration rejected"));
    }
}
