//! Directory of web accounts as seen by the linking layer.
//!
//! The web application owns the account records themselves; this store only
//! tracks the fields the bot cares about, most importantly the nullable
//! `chat_identity` binding. Binding writes are strict: a failed save is
//! surfaced to the caller, never swallowed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::current_timestamp;

/// A tracked web account and its optional chat binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Web account identifier
    pub account_id: String,

    /// Display name shown in bot replies
    pub display_name: String,

    /// The messaging platform's identifier for the linked participant.
    /// `None` while the account is unlinked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_identity: Option<String>,

    /// When the current binding was created (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_at: Option<u64>,
}

impl AccountRecord {
    pub fn new(account_id: String, display_name: String) -> Self {
        Self {
            account_id,
            display_name,
            chat_identity: None,
            linked_at: None,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.chat_identity.is_some()
    }

    pub fn bind(&mut self, chat_identity: &str) {
        self.chat_identity = Some(chat_identity.to_string());
        self.linked_at = Some(current_timestamp());
    }

    pub fn unbind(&mut self) {
        self.chat_identity = None;
        self.linked_at = None;
    }
}

/// Database of account records, keyed by account id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDirectory {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp
    pub last_updated: u64,

    /// Map of account id -> record
    pub accounts: HashMap<String, AccountRecord>,
}

impl Default for AccountDirectory {
    fn default() -> Self {
        Self {
            version: 1,
            last_updated: current_timestamp(),
            accounts: HashMap::new(),
        }
    }
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, or create new if not exists
    pub async fn load(path: &str) -> crate::error::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| crate::error::BotError::StateParse {
                    path: path.to_string(),
                    source: e,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(crate::error::BotError::StateLoad {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &str) -> crate::error::Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content).await.map_err(|e| {
            crate::error::BotError::StateSave {
                path: path.to_string(),
                source: e,
            }
        })?;

        tokio::fs::rename(&temp_path, path).await.map_err(|e| {
            crate::error::BotError::StateSave {
                path: path.to_string(),
                source: e,
            }
        })?;

        Ok(())
    }

    pub fn find(&self, account_id: &str) -> Option<&AccountRecord> {
        self.accounts.get(account_id)
    }

    pub fn find_mut(&mut self, account_id: &str) -> Option<&mut AccountRecord> {
        self.accounts.get_mut(account_id)
    }

    /// Find the account a chat identity is bound to, if any.
    pub fn find_by_chat_identity(&self, chat_identity: &str) -> Option<&AccountRecord> {
        self.accounts
            .values()
            .find(|a| a.chat_identity.as_deref() == Some(chat_identity))
    }

    /// Insert the record if the account is not yet tracked, then return it.
    /// The web app is the source of truth for accounts, so unknown ids are
    /// admitted lazily rather than rejected.
    pub fn ensure_account(&mut self, account_id: &str) -> &mut AccountRecord {
        self.last_updated = current_timestamp();
        self.accounts
            .entry(account_id.to_string())
            .or_insert_with(|| AccountRecord::new(account_id.to_string(), account_id.to_string()))
    }

    pub fn upsert(&mut self, record: AccountRecord) {
        self.accounts.insert(record.account_id.clone(), record);
        self.last_updated = current_timestamp();
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

/// Shared account directory type
pub type SharedAccountDirectory = Arc<tokio::sync::RwLock<AccountDirectory>>;

pub fn create_shared_account_directory(dir: AccountDirectory) -> SharedAccountDirectory {
    Arc::new(tokio::sync::RwLock::new(dir))
}
