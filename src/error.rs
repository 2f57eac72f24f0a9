use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Request validation errors
    #[error("Invalid request: {message}")]
    Validation { message: String },

    // Linking-code rejections, one variant per user-facing outcome
    #[error("Pairing code not found")]
    InvalidCode,

    #[error("Pairing code has expired")]
    CodeExpired,

    #[error("Pairing code has already been used")]
    CodeAlreadyUsed,

    #[error("Chat identity '{chat_identity}' is already linked to another account")]
    ChatAlreadyLinked { chat_identity: String },

    #[error("Account not found: {account_id}")]
    AccountNotFound { account_id: String },

    // Delivery-mode errors
    #[error("Webhook mode requires a webhook URL to be configured")]
    WebhookUrlMissing,

    #[error("Messaging platform error: {message}")]
    Platform { message: String },

    // State errors
    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    StateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // Configuration errors
    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    /// Machine-readable kind for API responses, so callers can distinguish
    /// rejections without parsing the human-readable message.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::Validation { .. } => "validation",
            BotError::InvalidCode => "invalid_code",
            BotError::CodeExpired => "code_expired",
            BotError::CodeAlreadyUsed => "code_already_used",
            BotError::ChatAlreadyLinked { .. } => "chat_already_linked",
            BotError::AccountNotFound { .. } => "account_not_found",
            BotError::WebhookUrlMissing => "webhook_url_missing",
            BotError::Platform { .. } => "platform_error",
            BotError::StateSave { .. } | BotError::StateLoad { .. } | BotError::StateParse { .. } => {
                "storage_error"
            }
            BotError::ConfigValidation { .. } => "config_error",
            BotError::Internal { .. } => "internal_error",
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts are classified the same as explicit platform rejections so
        // apply/repair stay total functions.
        BotError::Platform {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
