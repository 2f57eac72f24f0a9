//! Owns the intended delivery mode and reconciles it against the platform's
//! actual callback registration.
//!
//! The controller is a pure function of (intent, remote state): the intent
//! arrives as an explicit `DeliveryIntent` at construction, never read from
//! ambient process state. Mode transitions:
//! `Unconfigured -> Polling` or `Unconfigured -> WebhookPending ->
//! WebhookActive`, with `Error` reachable from any apply step and every
//! retry driven on demand rather than on a timer.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{DeliveryIntent, DeliveryMode};
use crate::error::{BotError, Result};
use crate::platform::SharedPlatformApi;
use crate::state::{DeliveryModeStatus, RegistrationStatus, SharedDeliveryStatusStore};

/// Read-only drift report: local intent versus remote registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    /// Callback URL actually registered on the platform; empty when none.
    pub current_remote_url: String,
    /// Callback URL the intent expects; empty for polling intent.
    pub expected_url: String,
    pub matches: bool,
    /// Updates queued on the platform awaiting delivery.
    pub pending_remote_backlog: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_remote_error: Option<String>,
}

/// Outcome of a forced drift repair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    /// False when the remote already matched and nothing was rewritten.
    pub repaired: bool,
    pub previous_url: String,
    pub new_url: String,
}

/// Controls the bot's delivery mode against the platform registration API.
pub struct DeliveryModeController {
    intent: DeliveryIntent,
    platform: SharedPlatformApi,
    status: SharedDeliveryStatusStore,
}

impl DeliveryModeController {
    pub fn new(
        intent: DeliveryIntent,
        platform: SharedPlatformApi,
        status: SharedDeliveryStatusStore,
    ) -> Self {
        Self {
            intent,
            platform,
            status,
        }
    }

    pub fn intent(&self) -> &DeliveryIntent {
        &self.intent
    }

    /// Current persisted status (error count and timestamps included), for
    /// operator dashboards.
    pub async fn current_status(&self) -> DeliveryModeStatus {
        self.status.snapshot().await
    }

    /// Apply the intended mode to the platform and persist the outcome.
    pub async fn apply_intended_mode(&self) -> Result<DeliveryModeStatus> {
        match self.intent.mode {
            DeliveryMode::Polling => {
                // Best-effort deregistration: the absence of a prior
                // registration is not an error.
                if let Err(e) = self.platform.delete_webhook().await {
                    warn!("Webhook deregistration failed (continuing): {}", e);
                }

                let status = self
                    .status
                    .update(|s| {
                        s.mode = Some(DeliveryMode::Polling);
                        s.webhook_url = None;
                        s.status = RegistrationStatus::Active;
                        s.error_count = 0;
                        s.last_error = None;
                    })
                    .await;

                info!("Delivery mode applied: polling");
                Ok(status)
            }
            DeliveryMode::Webhook => {
                // Terminal misconfiguration, not a transient failure: fail
                // fast with no side effects.
                let url = self
                    .intent
                    .webhook_url
                    .clone()
                    .ok_or(BotError::WebhookUrlMissing)?;

                match self.platform.set_webhook(&url).await {
                    Ok(()) => {
                        let status = self
                            .status
                            .update(|s| {
                                s.mode = Some(DeliveryMode::Webhook);
                                s.webhook_url = Some(url.clone());
                                s.status = RegistrationStatus::Active;
                                s.error_count = 0;
                                s.last_error = None;
                            })
                            .await;

                        info!("Delivery mode applied: webhook -> {}", url);
                        Ok(status)
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        self.status
                            .update(|s| {
                                s.mode = Some(DeliveryMode::Webhook);
                                s.status = RegistrationStatus::Error;
                                s.error_count += 1;
                                s.last_error = Some(reason.clone());
                            })
                            .await;

                        warn!("Webhook registration failed: {}", reason);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Fetch the platform's actual registration and compare it against the
    /// intent. Read-only; performs no mutation.
    pub async fn reconciliation_report(&self) -> Result<ReconciliationReport> {
        let info = self.platform.get_webhook_info().await?;
        let expected = self.intent.expected_url().unwrap_or("").to_string();
        let matches = info.url == expected;

        Ok(ReconciliationReport {
            current_remote_url: info.url,
            expected_url: expected,
            matches,
            pending_remote_backlog: info.pending_update_count,
            last_remote_error: info.last_error_message,
        })
    }

    /// If the remote registration has drifted from the intent, idempotently
    /// re-apply it. A matching remote is left untouched.
    pub async fn repair_drift(&self) -> Result<RepairOutcome> {
        let report = self.reconciliation_report().await?;
        if report.matches {
            return Ok(RepairOutcome {
                repaired: false,
                previous_url: report.current_remote_url.clone(),
                new_url: report.current_remote_url,
            });
        }

        info!(
            "Repairing delivery-mode drift: remote '{}' -> expected '{}'",
            report.current_remote_url, report.expected_url
        );
        self.apply_intended_mode().await?;

        Ok(RepairOutcome {
            repaired: true,
            previous_url: report.current_remote_url,
            new_url: report.expected_url,
        })
    }
}

/// Shared delivery controller type
pub type SharedDeliveryController = Arc<DeliveryModeController>;

pub fn create_shared_delivery_controller(
    intent: DeliveryIntent,
    platform: SharedPlatformApi,
    status: SharedDeliveryStatusStore,
) -> SharedDeliveryController {
    Arc::new(DeliveryModeController::new(intent, platform, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatform;
    use crate::state::DeliveryStatusStore;

    fn controller(
        mode: DeliveryMode,
        webhook_url: Option<&str>,
        platform: Arc<MockPlatform>,
    ) -> DeliveryModeController {
        DeliveryModeController::new(
            DeliveryIntent {
                mode,
                webhook_url: webhook_url.map(String::from),
            },
            platform,
            Arc::new(DeliveryStatusStore::in_memory()),
        )
    }

    #[tokio::test]
    async fn polling_apply_deregisters_and_activates() {
        let platform = Arc::new(MockPlatform::with_registered_url("https://old.example/cb"));
        let ctl = controller(DeliveryMode::Polling, None, platform.clone());

        let status = ctl.apply_intended_mode().await.unwrap();
        assert_eq!(status.mode, Some(DeliveryMode::Polling));
        assert_eq!(status.status, RegistrationStatus::Active);
        assert!(platform.current_url().is_empty());
    }

    #[tokio::test]
    async fn webhook_apply_registers_url() {
        let platform = Arc::new(MockPlatform::new());
        let ctl = controller(
            DeliveryMode::Webhook,
            Some("https://app.example/cb"),
            platform.clone(),
        );

        let status = ctl.apply_intended_mode().await.unwrap();
        assert_eq!(status.mode, Some(DeliveryMode::Webhook));
        assert_eq!(status.status, RegistrationStatus::Active);
        assert_eq!(status.webhook_url.as_deref(), Some("https://app.example/cb"));
        assert_eq!(platform.current_url(), "https://app.example/cb");
    }

    #[tokio::test]
    async fn webhook_apply_without_url_fails_fast() {
        let platform = Arc::new(MockPlatform::new());
        let ctl = controller(DeliveryMode::Webhook, None, platform);

        let result = ctl.apply_intended_mode().await;
        assert!(matches!(result, Err(BotError::WebhookUrlMissing)));

        // No side effects: status untouched.
        let status = ctl.current_status().await;
        assert_eq!(status.status, RegistrationStatus::Inactive);
        assert_eq!(status.error_count, 0);
    }

    #[tokio::test]
    async fn failed_registration_increments_error_count() {
        let platform = Arc::new(MockPlatform::new());
        let ctl = controller(
            DeliveryMode::Webhook,
            Some("https://app.example/cb"),
            platform.clone(),
        );

        platform.fail_next_set_webhook("bad webhook: HTTPS url must be provided");
        let result = ctl.apply_intended_mode().await;
        assert!(matches!(result, Err(BotError::Platform { .. })));

        let status = ctl.current_status().await;
        assert_eq!(status.status, RegistrationStatus::Error);
        assert_eq!(status.error_count, 1);
        assert!(status.last_error.as_deref().unwrap().contains("bad webhook"));

        // A successful retry resets the failure counter.
        ctl.apply_intended_mode().await.unwrap();
        let status = ctl.current_status().await;
        assert_eq!(status.status, RegistrationStatus::Active);
        assert_eq!(status.error_count, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn report_detects_drift_and_repair_fixes_it() {
        let platform = Arc::new(MockPlatform::with_registered_url("https://stale.example/cb"));
        platform
            .last_error_message
            .lock()
            .unwrap()
            .replace("connection refused".to_string());
        *platform.pending_update_count.lock().unwrap() = 7;

        let ctl = controller(
            DeliveryMode::Webhook,
            Some("https://app.example/cb"),
            platform.clone(),
        );

        let report = ctl.reconciliation_report().await.unwrap();
        assert!(!report.matches);
        assert_eq!(report.current_remote_url, "https://stale.example/cb");
        assert_eq!(report.expected_url, "https://app.example/cb");
        assert_eq!(report.pending_remote_backlog, 7);
        assert_eq!(report.last_remote_error.as_deref(), Some("connection refused"));

        let outcome = ctl.repair_drift().await.unwrap();
        assert!(outcome.repaired);
        assert_eq!(outcome.previous_url, "https://stale.example/cb");
        assert_eq!(outcome.new_url, "https://app.example/cb");

        let report = ctl.reconciliation_report().await.unwrap();
        assert!(report.matches);
    }

    #[tokio::test]
    async fn repair_is_a_noop_when_matching() {
        let platform = Arc::new(MockPlatform::with_registered_url("https://app.example/cb"));
        let ctl = controller(
            DeliveryMode::Webhook,
            Some("https://app.example/cb"),
            platform,
        );

        let outcome = ctl.repair_drift().await.unwrap();
        assert!(!outcome.repaired);
        assert_eq!(outcome.previous_url, outcome.new_url);
    }

    #[tokio::test]
    async fn polling_intent_matches_empty_remote() {
        let platform = Arc::new(MockPlatform::new());
        let ctl = controller(DeliveryMode::Polling, None, platform.clone());

        let report = ctl.reconciliation_report().await.unwrap();
        assert!(report.matches);

        // A lingering registration is drift for polling intent too.
        *platform.registered_url.lock().unwrap() = "https://stale.example/cb".to_string();
        let report = ctl.reconciliation_report().await.unwrap();
        assert!(!report.matches);

        let outcome = ctl.repair_drift().await.unwrap();
        assert!(outcome.repaired);
        assert!(platform.current_url().is_empty());
    }
}
