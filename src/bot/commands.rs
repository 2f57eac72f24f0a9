use std::sync::Arc;
use tracing::{error, info};

use super::update::BotUpdate;
use crate::backend::{SharedTicketReader, SharedTrackerBackend};
use crate::error::BotError;
use crate::managers::SharedBindingService;
use crate::state::{ChatSession, PendingAction, SharedChatSessionStore};

/// Minimum OCR confidence before an extraction pre-fills a result flow.
const TICKET_CONFIDENCE_FLOOR: f32 = 0.8;

/// A reply to send back to the originating chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    pub chat_identity: String,
    pub text: String,
}

/// Dispatches inbound updates to command and flow handlers.
pub struct BotHandler {
    binding: SharedBindingService,
    sessions: SharedChatSessionStore,
    backend: SharedTrackerBackend,
    ticket_reader: SharedTicketReader,
}

impl BotHandler {
    pub fn new(
        binding: SharedBindingService,
        sessions: SharedChatSessionStore,
        backend: SharedTrackerBackend,
        ticket_reader: SharedTicketReader,
    ) -> Self {
        Self {
            binding,
            sessions,
            backend,
            ticket_reader,
        }
    }

    /// Handle one platform update. Updates without a text message are
    /// ignored (edits, stickers, join events).
    pub async fn handle_update(&self, update: &BotUpdate) -> Option<BotReply> {
        let chat_identity = update.chat_identity()?;
        let text = update.text()?.trim().to_string();
        if text.is_empty() {
            return None;
        }

        let reply = self.dispatch(&chat_identity, &text).await;
        Some(BotReply {
            chat_identity,
            text: reply,
        })
    }

    async fn dispatch(&self, chat_identity: &str, text: &str) -> String {
        if let Some(rest) = text.strip_prefix('/') {
            let (command, arg) = match rest.split_once(char::is_whitespace) {
                Some((cmd, arg)) => (cmd, arg.trim()),
                None => (rest, ""),
            };

            match command {
                "start" => self.cmd_start(),
                "link" => self.cmd_link(chat_identity, arg).await,
                "status" => self.cmd_status(chat_identity).await,
                "register" => self.cmd_register(chat_identity, arg).await,
                "result" => self.cmd_result(chat_identity).await,
                "edit" => self.cmd_edit(chat_identity, arg).await,
                "ticket" => self.cmd_ticket(chat_identity, arg).await,
                "cancel" => self.cmd_cancel(chat_identity).await,
                "reset" => self.cmd_reset(chat_identity).await,
                _ => self.cmd_help(),
            }
        } else {
            self.continue_pending_flow(chat_identity, text).await
        }
    }

    fn cmd_start(&self) -> String {
        "Welcome to the tournament tracker bot!\n\
         Link your web account first: open the app, generate a pairing code, \
         then send /link <code> here.\n\
         Send /help once linked to see what I can do."
            .to_string()
    }

    fn cmd_help(&self) -> String {
        "Commands:\n\
         /link <code> - link this chat to your web account\n\
         /status - show your link state\n\
         /register <name> - register a tournament\n\
         /result - record a tournament result\n\
         /edit <id> - edit a tournament\n\
         /ticket <text> - read a ticket and pre-fill a result\n\
         /cancel - abandon the current flow\n\
         /reset - forget this conversation"
            .to_string()
    }

    /// `/link <code>` — the bot half of the pairing handshake. Every
    /// rejection kind gets its own user-facing message.
    async fn cmd_link(&self, chat_identity: &str, code: &str) -> String {
        if code.is_empty() {
            return "Usage: /link <code> — generate the code from the web app's settings page."
                .to_string();
        }

        match self.binding.consume(chat_identity, code).await {
            Ok(account) => {
                format!(
                    "Linked! This chat is now connected to {}. Send /help to get started.",
                    account.display_name
                )
            }
            Err(BotError::InvalidCode) => {
                "That code doesn't match anything. Check for typos, or generate a fresh one from the web app.".to_string()
            }
            Err(BotError::CodeExpired) => {
                "That code has expired (codes last 10 minutes). Generate a new one and try again.".to_string()
            }
            Err(BotError::CodeAlreadyUsed) => {
                "That code has already been used. Each code works exactly once — generate a new one.".to_string()
            }
            Err(BotError::ChatAlreadyLinked { .. }) => {
                "This chat is already linked to an account. Unlink it from the web app first.".to_string()
            }
            Err(e) => {
                error!("Link attempt failed for {}: {}", chat_identity, e);
                "Something went wrong on our side. Please try again in a moment.".to_string()
            }
        }
    }

    async fn cmd_status(&self, chat_identity: &str) -> String {
        match self.binding.account_for_chat(chat_identity).await {
            Some(account) => format!("This chat is linked to {}.", account.display_name),
            None => "This chat is not linked to any account. Send /link <code> to connect.".to_string(),
        }
    }

    async fn cmd_register(&self, chat_identity: &str, name: &str) -> String {
        let Some(_account) = self.require_linked(chat_identity).await else {
            return not_linked_message();
        };
        if name.is_empty() {
            return "Usage: /register <tournament name>".to_string();
        }

        let mut session = self.sessions.get(chat_identity);
        session.pending_action = PendingAction::RegisterTournament;
        session.pending_payload = serde_json::json!({ "name": name });
        self.sessions.put(chat_identity, session).await;

        format!(
            "Registering '{}'. Now send the venue and buy-in (e.g. \"Casino Royale 150\"), or /cancel.",
            name
        )
    }

    async fn cmd_result(&self, chat_identity: &str) -> String {
        let Some(_account) = self.require_linked(chat_identity).await else {
            return not_linked_message();
        };

        let mut session = self.sessions.get(chat_identity);
        session.pending_action = PendingAction::AddResult;
        session.pending_payload = serde_json::json!({});
        self.sessions.put(chat_identity, session).await;

        "Recording a result. Send your finishing position and winnings (e.g. \"3 420\"), or /cancel.".to_string()
    }

    async fn cmd_edit(&self, chat_identity: &str, tournament_id: &str) -> String {
        let Some(_account) = self.require_linked(chat_identity).await else {
            return not_linked_message();
        };
        if tournament_id.is_empty() {
            return "Usage: /edit <tournament id>".to_string();
        }

        let mut session = self.sessions.get(chat_identity);
        session.pending_action = PendingAction::EditTournament;
        session.pending_payload = serde_json::json!({ "tournament_id": tournament_id });
        self.sessions.put(chat_identity, session).await;

        format!(
            "Editing tournament {}. Send the change (e.g. \"buy_in 200\"), or /cancel.",
            tournament_id
        )
    }

    /// `/ticket <text>` — run the OCR black box and, when it is confident
    /// enough, pre-fill an add-result flow from the extraction.
    async fn cmd_ticket(&self, chat_identity: &str, input: &str) -> String {
        let Some(_account) = self.require_linked(chat_identity).await else {
            return not_linked_message();
        };
        if input.is_empty() {
            return "Usage: /ticket <ticket text>".to_string();
        }

        let extraction = self.ticket_reader.extract(input).await;
        if !extraction.success || extraction.confidence < TICKET_CONFIDENCE_FLOOR {
            return "I couldn't read that ticket. Try /result to enter it manually.".to_string();
        }

        let mut session = self.sessions.get(chat_identity);
        session.pending_action = PendingAction::AddResult;
        session.pending_payload = extraction.data.clone();
        self.sessions.put(chat_identity, session).await;

        format!(
            "Read your ticket ({:.0}% confident): {}. Send your finishing position and winnings to complete, or /cancel.",
            extraction.confidence * 100.0,
            extraction.data
        )
    }

    async fn cmd_cancel(&self, chat_identity: &str) -> String {
        let mut session = self.sessions.get(chat_identity);
        if session.pending_action == PendingAction::None {
            return "Nothing to cancel.".to_string();
        }
        session.pending_action = PendingAction::None;
        session.pending_payload = serde_json::Value::Null;
        self.sessions.put(chat_identity, session).await;
        "Cancelled.".to_string()
    }

    async fn cmd_reset(&self, chat_identity: &str) -> String {
        self.sessions.delete(chat_identity).await;
        "Conversation state cleared.".to_string()
    }

    /// Free text continues whatever multi-turn flow the session is in.
    async fn continue_pending_flow(&self, chat_identity: &str, text: &str) -> String {
        let session = self.sessions.get(chat_identity);

        match session.pending_action {
            PendingAction::None => {
                "I didn't catch that. Send /help to see what I understand.".to_string()
            }
            PendingAction::RegisterTournament => {
                self.finish_register(chat_identity, session, text).await
            }
            PendingAction::AddResult => self.finish_result(chat_identity, session, text).await,
            PendingAction::EditTournament => self.finish_edit(chat_identity, session, text).await,
        }
    }

    async fn finish_register(
        &self,
        chat_identity: &str,
        mut session: ChatSession,
        text: &str,
    ) -> String {
        let Some(account) = self.require_linked(chat_identity).await else {
            return not_linked_message();
        };

        session.pending_payload["details"] = serde_json::Value::String(text.to_string());
        let payload = session.pending_payload.clone();

        match self
            .backend
            .register_tournament(&account.account_id, payload)
            .await
        {
            Ok(tournament_id) => {
                self.clear_pending(chat_identity, session).await;
                info!(
                    "Registered tournament {} for account {}",
                    tournament_id, account.account_id
                );
                format!("Tournament registered (id {}). Good luck!", tournament_id)
            }
            Err(e) => {
                error!("register_tournament failed for {}: {}", account.account_id, e);
                "Couldn't save that tournament. Please try again.".to_string()
            }
        }
    }

    async fn finish_result(
        &self,
        chat_identity: &str,
        mut session: ChatSession,
        text: &str,
    ) -> String {
        let Some(account) = self.require_linked(chat_identity).await else {
            return not_linked_message();
        };

        session.pending_payload["result"] = serde_json::Value::String(text.to_string());
        let payload = session.pending_payload.clone();

        match self.backend.add_result(&account.account_id, payload).await {
            Ok(()) => {
                self.clear_pending(chat_identity, session).await;
                "Result recorded.".to_string()
            }
            Err(e) => {
                error!("add_result failed for {}: {}", account.account_id, e);
                "Couldn't save that result. Please try again.".to_string()
            }
        }
    }

    async fn finish_edit(
        &self,
        chat_identity: &str,
        mut session: ChatSession,
        text: &str,
    ) -> String {
        let Some(account) = self.require_linked(chat_identity).await else {
            return not_linked_message();
        };

        let tournament_id = session.pending_payload["tournament_id"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        session.pending_payload["change"] = serde_json::Value::String(text.to_string());
        let payload = session.pending_payload.clone();

        match self
            .backend
            .edit_tournament(&account.account_id, &tournament_id, payload)
            .await
        {
            Ok(()) => {
                self.clear_pending(chat_identity, session).await;
                format!("Tournament {} updated.", tournament_id)
            }
            Err(e) => {
                error!("edit_tournament failed for {}: {}", account.account_id, e);
                "Couldn't apply that edit. Please try again.".to_string()
            }
        }
    }

    async fn clear_pending(&self, chat_identity: &str, mut session: ChatSession) {
        session.pending_action = PendingAction::None;
        session.pending_payload = serde_json::Value::Null;
        self.sessions.put(chat_identity, session).await;
    }

    async fn require_linked(&self, chat_identity: &str) -> Option<crate::state::AccountRecord> {
        self.binding.account_for_chat(chat_identity).await
    }
}

fn not_linked_message() -> String {
    "You need to link your account first: generate a code in the web app, then send /link <code>.".to_string()
}

/// Shared bot handler type
pub type SharedBotHandler = Arc<BotHandler>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LoggingBackend, MockTicketReader, TrackerBackend};
    use crate::error::Result;
    use crate::managers::{create_shared_binding_service, create_shared_code_manager};
    use crate::state::{
        create_shared_account_directory, create_shared_code_store, AccountDirectory,
        ChatSessionStore, PairingCodeStore,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend that records every call for assertions.
    #[derive(Default)]
    struct RecordingBackend {
        registered: Mutex<Vec<(String, serde_json::Value)>>,
        results: Mutex<Vec<(String, serde_json::Value)>>,
        edits: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TrackerBackend for RecordingBackend {
        async fn register_tournament(
            &self,
            account_id: &str,
            payload: serde_json::Value,
        ) -> Result<String> {
            self.registered
                .lock()
                .unwrap()
                .push((account_id.to_string(), payload));
            Ok("t-1".to_string())
        }

        async fn add_result(&self, account_id: &str, payload: serde_json::Value) -> Result<()> {
            self.results
                .lock()
                .unwrap()
                .push((account_id.to_string(), payload));
            Ok(())
        }

        async fn edit_tournament(
            &self,
            account_id: &str,
            tournament_id: &str,
            _payload: serde_json::Value,
        ) -> Result<()> {
            self.edits
                .lock()
                .unwrap()
                .push((account_id.to_string(), tournament_id.to_string()));
            Ok(())
        }
    }

    fn temp_path(tag: &str, kind: &str) -> String {
        std::env::temp_dir()
            .join(format!("feltlink-bot-{}-{}-{}.json", kind, tag, std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    async fn handler_with_backend(
        tag: &str,
        backend: Arc<dyn TrackerBackend>,
    ) -> (BotHandler, SharedBindingService) {
        let binding = create_shared_binding_service(
            create_shared_code_manager(
                create_shared_code_store(PairingCodeStore::new()),
                temp_path(tag, "codes"),
            ),
            create_shared_account_directory(AccountDirectory::new()),
            temp_path(tag, "accounts"),
        );
        let sessions = Arc::new(ChatSessionStore::load(&temp_path(tag, "sessions")).await);
        let handler = BotHandler::new(
            binding.clone(),
            sessions,
            backend,
            Arc::new(MockTicketReader),
        );
        (handler, binding)
    }

    async fn handler(tag: &str) -> (BotHandler, SharedBindingService) {
        handler_with_backend(tag, Arc::new(LoggingBackend)).await
    }

    async fn link(handler: &BotHandler, binding: &SharedBindingService, chat: &str, account: &str) {
        let code = binding.issue_code(account).await.unwrap();
        let reply = handler.dispatch(chat, &format!("/link {}", code.code)).await;
        assert!(reply.starts_with("Linked!"), "unexpected reply: {}", reply);
    }

    #[tokio::test]
    async fn link_happy_path_and_reuse_rejection() {
        let (handler, binding) = handler("link").await;
        let code = binding.issue_code("acct-a").await.unwrap();

        let reply = handler.dispatch("tg-555", &format!("/link {}", code.code)).await;
        assert!(reply.contains("Linked!"));

        // Second chat replays the same code.
        let reply = handler.dispatch("tg-777", &format!("/link {}", code.code)).await;
        assert!(reply.contains("already been used"));
    }

    #[tokio::test]
    async fn link_rejections_have_distinct_messages() {
        let (handler, binding) = handler("link-msgs").await;

        let reply = handler.dispatch("tg-555", "/link NOPE0000").await;
        assert!(reply.contains("doesn't match"));

        link(&handler, &binding, "tg-555", "acct-a").await;
        let other = binding.issue_code("acct-b").await.unwrap();
        let reply = handler.dispatch("tg-555", &format!("/link {}", other.code)).await;
        assert!(reply.contains("already linked"));
    }

    #[tokio::test]
    async fn tournament_commands_require_link() {
        let (handler, _binding) = handler("gate").await;

        let reply = handler.dispatch("tg-555", "/register Friday Deepstack").await;
        assert!(reply.contains("link your account first"));
    }

    #[tokio::test]
    async fn register_flow_is_multi_turn() {
        let backend = Arc::new(RecordingBackend::default());
        let (handler, binding) = handler_with_backend("register", backend.clone()).await;
        link(&handler, &binding, "tg-555", "acct-a").await;

        let reply = handler.dispatch("tg-555", "/register Friday Deepstack").await;
        assert!(reply.contains("Registering 'Friday Deepstack'"));

        let reply = handler.dispatch("tg-555", "Casino Royale 150").await;
        assert!(reply.contains("registered"));

        let registered = backend.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].0, "acct-a");
        assert_eq!(registered[0].1["name"], "Friday Deepstack");
        assert_eq!(registered[0].1["details"], "Casino Royale 150");
    }

    #[tokio::test]
    async fn result_flow_completes_and_clears_session() {
        let backend = Arc::new(RecordingBackend::default());
        let (handler, binding) = handler_with_backend("result", backend.clone()).await;
        link(&handler, &binding, "tg-555", "acct-a").await;

        handler.dispatch("tg-555", "/result").await;
        let reply = handler.dispatch("tg-555", "3 420").await;
        assert_eq!(reply, "Result recorded.");
        assert_eq!(backend.results.lock().unwrap().len(), 1);

        // Follow-up free text no longer lands in a flow.
        let reply = handler.dispatch("tg-555", "hello again").await;
        assert!(reply.contains("/help"));
    }

    #[tokio::test]
    async fn edit_flow_targets_the_given_tournament() {
        let backend = Arc::new(RecordingBackend::default());
        let (handler, binding) = handler_with_backend("edit", backend.clone()).await;
        link(&handler, &binding, "tg-555", "acct-a").await;

        handler.dispatch("tg-555", "/edit t-99").await;
        let reply = handler.dispatch("tg-555", "buy_in 200").await;
        assert!(reply.contains("t-99"));
        assert_eq!(backend.edits.lock().unwrap()[0].1, "t-99");
    }

    #[tokio::test]
    async fn cancel_abandons_pending_flow() {
        let (handler, binding) = handler("cancel").await;
        link(&handler, &binding, "tg-555", "acct-a").await;

        handler.dispatch("tg-555", "/result").await;
        assert_eq!(handler.dispatch("tg-555", "/cancel").await, "Cancelled.");
        assert_eq!(handler.dispatch("tg-555", "/cancel").await, "Nothing to cancel.");
    }

    #[tokio::test]
    async fn ticket_prefills_result_flow() {
        let backend = Arc::new(RecordingBackend::default());
        let (handler, binding) = handler_with_backend("ticket", backend.clone()).await;
        link(&handler, &binding, "tg-555", "acct-a").await;

        let reply = handler.dispatch("tg-555", "/ticket Bellagio 150").await;
        assert!(reply.contains("Read your ticket"));

        handler.dispatch("tg-555", "1 900").await;
        let results = backend.results.lock().unwrap();
        assert_eq!(results[0].1["venue"], "Bellagio");
        assert_eq!(results[0].1["result"], "1 900");
    }

    #[tokio::test]
    async fn handle_update_ignores_non_text_updates() {
        let (handler, _binding) = handler("non-text").await;
        let update: BotUpdate = serde_json::from_str(r#"{"update_id": 1}"#).unwrap();
        assert!(handler.handle_update(&update).await.is_none());
    }

    #[tokio::test]
    async fn handle_update_replies_to_the_originating_chat() {
        let (handler, _binding) = handler("reply").await;
        let update: BotUpdate = serde_json::from_str(
            r#"{"update_id": 1, "message": {"chat": {"id": 555}, "text": "/start"}}"#,
        )
        .unwrap();

        let reply = handler.handle_update(&update).await.unwrap();
        assert_eq!(reply.chat_identity, "tg-555");
        assert!(reply.text.contains("Welcome"));
    }
}
