pub mod accounts;
pub mod chat_sessions;
pub mod delivery_status;
pub mod pairing_codes;

pub use accounts::{create_shared_account_directory, AccountDirectory, AccountRecord, SharedAccountDirectory};
pub use chat_sessions::{ChatSession, ChatSessionStore, PendingAction, SharedChatSessionStore};
pub use delivery_status::{DeliveryModeStatus, DeliveryStatusStore, RegistrationStatus, SharedDeliveryStatusStore};
pub use pairing_codes::{create_shared_code_store, PairingCode, PairingCodeStore, SharedPairingCodeStore};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
