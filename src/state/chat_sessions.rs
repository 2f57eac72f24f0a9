//! Ephemeral per-chat conversation state with TTL.
//!
//! This store is the degraded half of the storage split: reads always
//! succeed (a missing or unreadable file yields an empty store, a missing
//! row yields a fresh session) and persistence failures are logged and
//! swallowed. Bot handlers never fail a user interaction because session
//! storage hiccuped.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::current_timestamp;

/// How long a session survives after its last write, in seconds.
pub const SESSION_TTL_SECS: u64 = 86400;

/// Multi-turn action a chat participant is in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    #[default]
    None,
    RegisterTournament,
    AddResult,
    EditTournament,
}

/// Conversation state for one chat identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// The messaging platform's participant id
    pub chat_identity: String,

    /// What the next free-text message should be interpreted as
    pub pending_action: PendingAction,

    /// Opaque structured data accumulated by the pending flow
    pub pending_payload: serde_json::Value,

    /// Extended to now + 24h on every write
    pub expires_at: u64,
}

impl ChatSession {
    /// Fresh empty session for a chat identity.
    pub fn empty(chat_identity: &str) -> Self {
        Self {
            chat_identity: chat_identity.to_string(),
            pending_action: PendingAction::None,
            pending_payload: serde_json::Value::Null,
            expires_at: current_timestamp() + SESSION_TTL_SECS,
        }
    }

    pub fn is_expired(&self) -> bool {
        current_timestamp() > self.expires_at
    }
}

/// On-disk representation of the session store.
#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    last_updated: u64,
    sessions: HashMap<String, ChatSession>,
}

/// Store of chat sessions keyed by chat identity.
pub struct ChatSessionStore {
    sessions: DashMap<String, ChatSession>,
    path: String,
}

impl ChatSessionStore {
    /// Load from disk. Any failure degrades to an empty store.
    pub async fn load(path: &str) -> Self {
        let sessions = DashMap::new();

        match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<SessionFile>(&content) {
                Ok(file) => {
                    for (chat_identity, session) in file.sessions {
                        sessions.insert(chat_identity, session);
                    }
                    debug!("Loaded {} chat sessions from {}", sessions.len(), path);
                }
                Err(e) => {
                    warn!("Could not parse session store {}: {}, starting empty", path, e);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Could not read session store {}: {}, starting empty", path, e);
            }
        }

        Self {
            sessions,
            path: path.to_string(),
        }
    }

    /// Get the session for a chat identity, or a fresh empty one.
    /// Infallible by contract; the caller never sees a storage error.
    pub fn get(&self, chat_identity: &str) -> ChatSession {
        match self.sessions.get(chat_identity) {
            Some(entry) if !entry.is_expired() => entry.value().clone(),
            _ => ChatSession::empty(chat_identity),
        }
    }

    /// Whole-record upsert, last-write-wins. Extends expiry to now + 24h.
    pub async fn put(&self, chat_identity: &str, mut session: ChatSession) {
        session.chat_identity = chat_identity.to_string();
        session.expires_at = current_timestamp() + SESSION_TTL_SECS;
        self.sessions.insert(chat_identity.to_string(), session);
        self.persist().await;
    }

    /// Drop a session (logout/reset commands).
    pub async fn delete(&self, chat_identity: &str) {
        self.sessions.remove(chat_identity);
        self.persist().await;
    }

    /// Bulk-delete sessions past their expiry. Pure function of current
    /// time, safe to invoke concurrently and repeatedly.
    pub async fn cleanup_expired(&self) -> usize {
        let now = current_timestamp();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at >= now);
        let removed = before - self.sessions.len();
        if removed > 0 {
            self.persist().await;
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Write the store to disk, swallowing failures. Session state is
    /// reconstructible from user interaction, so losing a write only costs
    /// one multi-turn flow.
    async fn persist(&self) {
        let file = SessionFile {
            version: 1,
            last_updated: current_timestamp(),
            sessions: self
                .sessions
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };

        let content = match serde_json::to_string_pretty(&file) {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not serialize session store: {}", e);
                return;
            }
        };

        let temp_path = format!("{}.tmp", self.path);
        if let Err(e) = tokio::fs::write(&temp_path, &content).await {
            warn!("Could not write session store {}: {}", self.path, e);
            return;
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            warn!("Could not persist session store {}: {}", self.path, e);
        }
    }

    #[cfg(test)]
    fn in_memory() -> Self {
        let path = std::env::temp_dir()
            .join(format!("feltlink-sessions-scratch-{}.json", std::process::id()))
            .to_string_lossy()
            .into_owned();
        Self {
            sessions: DashMap::new(),
            path,
        }
    }

    #[cfg(test)]
    fn force_expire(&self, chat_identity: &str, secs_ago: u64) {
        if let Some(mut entry) = self.sessions.get_mut(chat_identity) {
            entry.expires_at = current_timestamp().saturating_sub(secs_ago);
        }
    }
}

/// Shared session store type
pub type SharedChatSessionStore = Arc<ChatSessionStore>;
