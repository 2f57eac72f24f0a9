//! Account-linking endpoints, called by the web application.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::server::AppState;
use crate::error::{BotError, Result};
use crate::managers::LinkStatus;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCodeRequest {
    #[serde(default)]
    pub account_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCodeResponse {
    pub code: String,
    pub expires_at: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    #[serde(default)]
    pub chat_identity: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    pub account_id: String,
    pub display_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnbindRequest {
    #[serde(default)]
    pub account_id: String,
}

#[derive(Serialize)]
pub struct UnbindResponse {
    pub success: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusParams {
    #[serde(default)]
    pub account_id: String,
}

/// POST /link/generate-code
pub async fn generate_code(
    State(state): State<AppState>,
    Json(req): Json<GenerateCodeRequest>,
) -> Result<Json<GenerateCodeResponse>> {
    require_field(&req.account_id, "accountId")?;

    let pairing = state.binding.issue_code(&req.account_id).await?;
    info!("Issued pairing code for account {}", req.account_id);

    Ok(Json(GenerateCodeResponse {
        code: pairing.code,
        expires_at: format_timestamp(pairing.expires_at),
    }))
}

/// POST /link/consume
pub async fn consume(
    State(state): State<AppState>,
    Json(req): Json<ConsumeRequest>,
) -> Result<Json<ConsumeResponse>> {
    require_field(&req.chat_identity, "chatIdentity")?;
    require_field(&req.code, "code")?;

    let account = state.binding.consume(&req.chat_identity, &req.code).await?;

    Ok(Json(ConsumeResponse {
        account_id: account.account_id,
        display_name: account.display_name,
    }))
}

/// POST /link/unbind
pub async fn unbind(
    State(state): State<AppState>,
    Json(req): Json<UnbindRequest>,
) -> Result<Json<UnbindResponse>> {
    require_field(&req.account_id, "accountId")?;

    state.binding.unbind(&req.account_id).await?;
    Ok(Json(UnbindResponse { success: true }))
}

/// GET /link/status
pub async fn status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<LinkStatus>> {
    require_field(&params.account_id, "accountId")?;

    Ok(Json(state.binding.status(&params.account_id).await))
}

fn require_field(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BotError::Validation {
            message: format!("Missing required field '{}'", name),
        });
    }
    Ok(())
}

fn format_timestamp(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_field_rejects_blank_values() {
        assert!(require_field("", "accountId").is_err());
        assert!(require_field("   ", "accountId").is_err());
        assert!(require_field("acct-1", "accountId").is_ok());
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        let rendered = format_timestamp(1700000000);
        assert!(rendered.starts_with("2023-11-14T"));
    }
}
