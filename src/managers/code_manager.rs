//! Issues, resolves, validates, and consumes one-time pairing codes.

use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{BotError, Result};
use crate::state::{PairingCode, SharedPairingCodeStore};

/// Code alphabet: uppercase alphanumerics, 8 characters.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 8;

/// Bound on regeneration attempts when a freshly minted code collides with
/// another account's live code.
const MAX_GENERATE_ATTEMPTS: u32 = 5;

/// Outcome of validating a resolved pairing code. Both rejections are
/// terminal for that code; the caller renders a distinct message for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeValidity {
    Valid,
    Expired,
    AlreadyUsed,
}

/// Manages the pairing-code lifecycle over the persisted store.
pub struct LinkingCodeManager {
    codes: SharedPairingCodeStore,
    codes_path: String,
}

impl LinkingCodeManager {
    pub fn new(codes: SharedPairingCodeStore, codes_path: String) -> Self {
        Self { codes, codes_path }
    }

    /// Generate a fresh code for an account. Any prior code owned by the
    /// account is invalidated first, so at most one live code exists per
    /// account at any time.
    pub async fn generate(&self, account_id: &str) -> Result<PairingCode> {
        let mut store = self.codes.write().await;

        let replaced = store.purge_account(account_id);
        if replaced > 0 {
            debug!("Replaced {} prior code(s) for account {}", replaced, account_id);
        }

        // Stale codes carry no information; trim them while we hold the lock.
        store.purge_expired();

        let mut code = random_code();
        let mut attempts = 1;
        while store.contains(&code) {
            if attempts >= MAX_GENERATE_ATTEMPTS {
                return Err(BotError::Internal {
                    message: "Could not generate a unique pairing code".to_string(),
                });
            }
            code = random_code();
            attempts += 1;
        }

        let pairing = PairingCode::new(code, account_id.to_string());
        store.insert(pairing.clone());
        store.save(&self.codes_path).await?;

        info!("Generated pairing code for account {}", account_id);
        Ok(pairing)
    }

    /// Case-insensitive lookup.
    pub async fn resolve(&self, code: &str) -> Option<PairingCode> {
        let normalized = code.trim().to_uppercase();
        let store = self.codes.read().await;
        store.get(&normalized).cloned()
    }

    /// Classify a resolved code. Expiry is checked first: an expired code is
    /// reported as expired whether or not it was ever used.
    pub fn validate(&self, pairing: &PairingCode) -> CodeValidity {
        if pairing.is_expired() {
            CodeValidity::Expired
        } else if pairing.used {
            CodeValidity::AlreadyUsed
        } else {
            CodeValidity::Valid
        }
    }

    /// Idempotently flip a code to used.
    pub async fn mark_used(&self, code: &str) -> Result<()> {
        let normalized = code.trim().to_uppercase();
        let mut store = self.codes.write().await;
        match store.get_mut(&normalized) {
            Some(pairing) => {
                if !pairing.used {
                    pairing.used = true;
                    store.save(&self.codes_path).await?;
                }
                Ok(())
            }
            None => Err(BotError::InvalidCode),
        }
    }

    /// Atomically claim a code: lookup, validate, and flip `used` under a
    /// single writer lock. Of two concurrent callers racing on the same
    /// still-valid code, exactly one gets the record back; the other sees
    /// `CodeAlreadyUsed`.
    pub async fn consume_one(&self, code: &str) -> Result<PairingCode> {
        let normalized = code.trim().to_uppercase();
        let mut store = self.codes.write().await;

        let pairing = store.get_mut(&normalized).ok_or(BotError::InvalidCode)?;
        if pairing.is_expired() {
            return Err(BotError::CodeExpired);
        }
        if pairing.used {
            return Err(BotError::CodeAlreadyUsed);
        }

        pairing.used = true;
        let claimed = pairing.clone();
        store.save(&self.codes_path).await?;
        Ok(claimed)
    }

    #[cfg(test)]
    pub async fn force_expire(&self, code: &str) {
        use crate::state::current_timestamp;
        let mut store = self.codes.write().await;
        if let Some(pairing) = store.get_mut(&code.trim().to_uppercase()) {
            pairing.expires_at = current_timestamp() - 1;
        }
    }

    /// Delete all codes owned by an account (used on unbind, so a stale
    /// code cannot later re-bind the identity).
    pub async fn purge_account(&self, account_id: &str) -> Result<usize> {
        let mut store = self.codes.write().await;
        let removed = store.purge_account(account_id);
        if removed > 0 {
            store.save(&self.codes_path).await?;
        }
        Ok(removed)
    }
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Shared code manager type
pub type SharedCodeManager = Arc<LinkingCodeManager>;

pub fn create_shared_code_manager(
    codes: SharedPairingCodeStore,
    codes_path: String,
) -> SharedCodeManager {
    Arc::new(LinkingCodeManager::new(codes, codes_path))
}
