//! Interfaces to the out-of-scope collaborators.
//!
//! Tournament/bankroll CRUD and the OCR ticket reader live in the web
//! application proper; the bot only hands payloads across these seams.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// Tournament-tracker operations the bot flows terminate in.
#[async_trait]
pub trait TrackerBackend: Send + Sync {
    /// Returns the id of the newly registered tournament.
    async fn register_tournament(&self, account_id: &str, payload: serde_json::Value)
        -> Result<String>;

    async fn add_result(&self, account_id: &str, payload: serde_json::Value) -> Result<()>;

    async fn edit_tournament(
        &self,
        account_id: &str,
        tournament_id: &str,
        payload: serde_json::Value,
    ) -> Result<()>;
}

/// Shared tracker backend type
pub type SharedTrackerBackend = Arc<dyn TrackerBackend>;

/// Ticket-reader extraction result, as delivered by the OCR black box.
#[derive(Debug, Clone)]
pub struct TicketExtraction {
    pub success: bool,
    pub data: serde_json::Value,
    pub confidence: f32,
}

/// OCR ticket reader, consumed as a black box.
#[async_trait]
pub trait TicketReader: Send + Sync {
    async fn extract(&self, input: &str) -> TicketExtraction;
}

/// Shared ticket reader type
pub type SharedTicketReader = Arc<dyn TicketReader>;

/// Stand-in backend until the tracker API is wired up: records the call in
/// the log and acknowledges.
pub struct LoggingBackend;

#[async_trait]
impl TrackerBackend for LoggingBackend {
    async fn register_tournament(
        &self,
        account_id: &str,
        payload: serde_json::Value,
    ) -> Result<String> {
        let id = format!("t-{}", crate::state::current_timestamp());
        info!("register_tournament for {}: {} -> {}", account_id, payload, id);
        Ok(id)
    }

    async fn add_result(&self, account_id: &str, payload: serde_json::Value) -> Result<()> {
        info!("add_result for {}: {}", account_id, payload);
        Ok(())
    }

    async fn edit_tournament(
        &self,
        account_id: &str,
        tournament_id: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        info!("edit_tournament {} for {}: {}", tournament_id, account_id, payload);
        Ok(())
    }
}

/// Mocked OCR: pretends to read a ticket from free text. Anything with at
/// least two whitespace-separated fields "extracts" with fixed confidence.
pub struct MockTicketReader;

#[async_trait]
impl TicketReader for MockTicketReader {
    async fn extract(&self, input: &str) -> TicketExtraction {
        let fields: Vec<&str> = input.split_whitespace().collect();
        if fields.len() < 2 {
            return TicketExtraction {
                success: false,
                data: serde_json::Value::Null,
                confidence: 0.0,
            };
        }

        TicketExtraction {
            success: true,
            data: serde_json::json!({
                "venue": fields[0],
                "buy_in": fields[1],
                "raw": input,
            }),
            confidence: 0.87,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_reader_extracts_two_fields() {
        let reader = MockTicketReader;
        let extraction = reader.extract("Bellagio 150").await;

        assert!(extraction.success);
        assert!(extraction.confidence > 0.8);
        assert_eq!(extraction.data["venue"], "Bellagio");
    }

    #[tokio::test]
    async fn mock_reader_rejects_short_input() {
        let reader = MockTicketReader;
        let extraction = reader.extract("garbled").await;

        assert!(!extraction.success);
        assert_eq!(extraction.confidence, 0.0);
    }
}
