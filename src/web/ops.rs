//! Operator endpoints: delivery-mode control, session cleanup, and the
//! inbound update receiver.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use super::server::AppState;
use crate::bot::BotUpdate;
use crate::error::Result;
use crate::managers::ReconciliationReport;
use crate::state::{DeliveryModeStatus, RegistrationStatus};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyModeResponse {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntendedMode {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedRemote {
    pub url: String,
    pub pending_update_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeHealth {
    pub status: String,
    pub error_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<u64>,
}

/// Reconciliation report plus health fields for operator dashboards.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeReportResponse {
    pub intended: IntendedMode,
    pub observed_remote: ObservedRemote,
    pub matches: bool,
    pub recommendations: Vec<String>,
    pub health: ModeHealth,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResponse {
    pub success: bool,
    pub previous_url: String,
    pub new_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub cleaned_count: usize,
}

/// GET / - health probe
pub async fn health() -> &'static str {
    "feltlink running"
}

/// POST /bot/mode/apply
pub async fn apply_mode(State(state): State<AppState>) -> Result<Json<ApplyModeResponse>> {
    let status = state.delivery.apply_intended_mode().await?;

    Ok(Json(ApplyModeResponse {
        mode: status
            .mode
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unconfigured".to_string()),
        webhook_url: status.webhook_url.clone(),
        status: status_label(&status).to_string(),
    }))
}

/// GET /bot/mode - reconciliation report
pub async fn get_mode(State(state): State<AppState>) -> Result<Json<ModeReportResponse>> {
    let report = state.delivery.reconciliation_report().await?;
    let status = state.delivery.current_status().await;
    let intent = state.delivery.intent();

    let recommendations = build_recommendations(&report, &status);

    Ok(Json(ModeReportResponse {
        intended: IntendedMode {
            mode: intent.mode.to_string(),
            webhook_url: intent.webhook_url.clone(),
        },
        observed_remote: ObservedRemote {
            url: report.current_remote_url.clone(),
            pending_update_count: report.pending_remote_backlog,
            last_error_message: report.last_remote_error.clone(),
        },
        matches: report.matches,
        recommendations,
        health: ModeHealth {
            status: status_label(&status).to_string(),
            error_count: status.error_count,
            last_update_time: status.last_update_time,
        },
    }))
}

/// POST /bot/mode/repair - force drift repair
pub async fn repair_mode(State(state): State<AppState>) -> Result<Json<RepairResponse>> {
    let outcome = state.delivery.repair_drift().await?;
    if outcome.repaired {
        info!(
            "Drift repaired: '{}' -> '{}'",
            outcome.previous_url, outcome.new_url
        );
    }

    Ok(Json(RepairResponse {
        success: true,
        previous_url: outcome.previous_url,
        new_url: outcome.new_url,
    }))
}

/// POST /sessions/cleanup - administrative sweep trigger
pub async fn cleanup_sessions(State(state): State<AppState>) -> Json<CleanupResponse> {
    let cleaned_count = state.sessions.cleanup_expired().await;
    info!("Session cleanup removed {} expired session(s)", cleaned_count);
    Json(CleanupResponse { cleaned_count })
}

/// POST /bot/update - inbound update from the platform (webhook mode) or a
/// relay poller. Always acknowledged with 200 so the platform does not
/// retry-storm on our own reply failures.
pub async fn bot_update(
    State(state): State<AppState>,
    Json(update): Json<BotUpdate>,
) -> Json<serde_json::Value> {
    if let Some(reply) = state.bot.handle_update(&update).await {
        if let Err(e) = state
            .platform
            .send_message(&reply.chat_identity, &reply.text)
            .await
        {
            warn!("Could not deliver reply to {}: {}", reply.chat_identity, e);
        }
    }
    Json(serde_json::json!({}))
}

fn status_label(status: &DeliveryModeStatus) -> &'static str {
    match status.status {
        RegistrationStatus::Active => "active",
        RegistrationStatus::Inactive => "inactive",
        RegistrationStatus::Error => "error",
    }
}

fn build_recommendations(
    report: &ReconciliationReport,
    status: &DeliveryModeStatus,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if !report.matches {
        recommendations.push(format!(
            "Remote registration '{}' does not match intent '{}'; POST /bot/mode/repair to fix.",
            report.current_remote_url, report.expected_url
        ));
    }
    if report.pending_remote_backlog > 0 {
        recommendations.push(format!(
            "{} update(s) are queued on the platform awaiting delivery.",
            report.pending_remote_backlog
        ));
    }
    if let Some(err) = &report.last_remote_error {
        recommendations.push(format!("Platform reported a delivery error: {}", err));
    }
    if status.status == RegistrationStatus::Error {
        recommendations.push(format!(
            "Last apply failed ({} failure(s)); retry with POST /bot/mode/apply.",
            status.error_count
        ));
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(matches: bool, backlog: u32, err: Option<&str>) -> ReconciliationReport {
        ReconciliationReport {
            current_remote_url: "https://stale.example/cb".to_string(),
            expected_url: "https://app.example/cb".to_string(),
            matches,
            pending_remote_backlog: backlog,
            last_remote_error: err.map(String::from),
        }
    }

    #[test]
    fn healthy_report_yields_no_recommendations() {
        let status = DeliveryModeStatus::default();
        assert!(build_recommendations(&report(true, 0, None), &status).is_empty());
    }

    #[test]
    fn drift_and_backlog_are_called_out() {
        let mut status = DeliveryModeStatus::default();
        status.status = RegistrationStatus::Error;
        status.error_count = 3;

        let recs = build_recommendations(&report(false, 7, Some("connection refused")), &status);
        assert_eq!(recs.len(), 4);
        assert!(recs[0].contains("/bot/mode/repair"));
        assert!(recs[1].contains("7 update(s)"));
        assert!(recs[2].contains("connection refused"));
        assert!(recs[3].contains("3 failure(s)"));
    }
}
