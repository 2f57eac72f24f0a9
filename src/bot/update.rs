//! Wire shape of an inbound platform update, Telegram-style.

use serde::Deserialize;

/// One update pushed by the platform (or relayed by a poller).
#[derive(Debug, Clone, Deserialize)]
pub struct BotUpdate {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: IncomingChat,
    pub from: Option<IncomingUser>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl BotUpdate {
    /// The stable chat identity the session and binding stores key on.
    pub fn chat_identity(&self) -> Option<String> {
        self.message.as_ref().map(|m| format!("tg-{}", m.chat.id))
    }

    pub fn text(&self) -> Option<&str> {
        self.message.as_ref().and_then(|m| m.text.as_deref())
    }
}
