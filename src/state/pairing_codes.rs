//! Persisted store of one-time pairing codes.
//!
//! Codes are the strict half of the storage split: every mutation here is
//! followed by a loud save, since a silently lost write would break the
//! one-time-use invariant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::current_timestamp;

/// How long a freshly generated pairing code stays valid, in seconds.
pub const CODE_TTL_SECS: u64 = 600;

/// A short-lived one-time code binding a web account to a chat identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingCode {
    /// 8 uppercase alphanumeric characters.
    pub code: String,

    /// The web account that requested the code.
    pub account_id: String,

    /// When the code was generated (Unix timestamp)
    pub created_at: u64,

    /// When the code stops being usable, regardless of `used`
    pub expires_at: u64,

    /// Flipped exactly once when the code is consumed
    pub used: bool,
}

impl PairingCode {
    pub fn new(code: String, account_id: String) -> Self {
        let now = current_timestamp();
        Self {
            code,
            account_id,
            created_at: now,
            expires_at: now + CODE_TTL_SECS,
            used: false,
        }
    }

    /// Expiry is checked inclusively: a code is unusable from `expires_at`
    /// onward, whether or not it was ever consumed.
    pub fn is_expired(&self) -> bool {
        current_timestamp() >= self.expires_at
    }
}

/// Database of outstanding pairing codes, keyed by the code itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingCodeStore {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp
    pub last_updated: u64,

    /// Map of code -> pairing code record
    pub codes: HashMap<String, PairingCode>,
}

impl Default for PairingCodeStore {
    fn default() -> Self {
        Self {
            version: 1,
            last_updated: current_timestamp(),
            codes: HashMap::new(),
        }
    }
}

impl PairingCodeStore {
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

        // Write to temp file first, then rename for atomicity
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

    /// Look up a code. Callers normalize to uppercase first.
    pub fn get(&self, code: &str) -> Option<&PairingCode> {
        self.codes.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut PairingCode> {
        self.codes.get_mut(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains_key(code)
    }

    /// Insert a freshly generated code.
    pub fn insert(&mut self, pairing: PairingCode) {
        self.codes.insert(pairing.code.clone(), pairing);
        self.last_updated = current_timestamp();
    }

    /// Remove every code owned by an account. Returns how many were deleted.
    pub fn purge_account(&mut self, account_id: &str) -> usize {
        let before = self.codes.len();
        self.codes.retain(|_, c| c.account_id != account_id);
        let removed = before - self.codes.len();
        if removed > 0 {
            self.last_updated = current_timestamp();
        }
        removed
    }

    /// Drop codes that expired before `now`. Keeps the file from growing
    /// unboundedly; consumed codes past expiry carry no information.
    pub fn purge_expired(&mut self) -> usize {
        let now = current_timestamp();
        let before = self.codes.len();
        self.codes.retain(|_, c| c.expires_at > now);
        let removed = before - self.codes.len();
        if removed > 0 {
            self.last_updated = current_timestamp();
        }
        removed
    }

    pub fn code_count(&self) -> usize {
        self.codes.len()
    }
}

/// Shared pairing code store type
pub type SharedPairingCodeStore = Arc<tokio::sync::RwLock<PairingCodeStore>>;

pub fn create_shared_code_store(store: PairingCodeStore) -> SharedPairingCodeStore {
    Arc::new(tokio::sync::RwLock::new(store))
}
