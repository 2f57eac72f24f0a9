//! Enforces the 1:1 invariant between a web account and a chat identity.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{BotError, Result};
use crate::managers::{CodeValidity, SharedCodeManager};
use crate::state::{AccountRecord, SharedAccountDirectory};

/// Read-only projection of an account's link state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub is_linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_identity: Option<String>,
}

/// Binds web accounts to chat identities through one-time pairing codes.
pub struct AccountBindingService {
    code_manager: SharedCodeManager,
    accounts: SharedAccountDirectory,
    accounts_path: String,
}

impl AccountBindingService {
    pub fn new(
        code_manager: SharedCodeManager,
        accounts: SharedAccountDirectory,
        accounts_path: String,
    ) -> Self {
        Self {
            code_manager,
            accounts,
            accounts_path,
        }
    }

    /// Mint a pairing code for an account. Unknown accounts are admitted
    /// lazily; the web app owns the account records themselves.
    pub async fn issue_code(&self, account_id: &str) -> Result<crate::state::PairingCode> {
        {
            let mut dir = self.accounts.write().await;
            dir.ensure_account(account_id);
            dir.save(&self.accounts_path).await?;
        }
        self.code_manager.generate(account_id).await
    }

    /// Exchange a pairing code for a binding.
    ///
    /// Resolution and validation run first so the caller gets the precise
    /// rejection; the chat-uniqueness check runs before the claim so a
    /// `ChatAlreadyLinked` rejection leaves the code unburned. The claim
    /// itself (`consume_one`) is the race arbiter: of two concurrent callers
    /// only one reaches the binding write.
    pub async fn consume(&self, chat_identity: &str, code: &str) -> Result<AccountRecord> {
        let pairing = self
            .code_manager
            .resolve(code)
            .await
            .ok_or(BotError::InvalidCode)?;

        match self.code_manager.validate(&pairing) {
            CodeValidity::Valid => {}
            CodeValidity::Expired => return Err(BotError::CodeExpired),
            CodeValidity::AlreadyUsed => return Err(BotError::CodeAlreadyUsed),
        }

        {
            let dir = self.accounts.read().await;
            if dir.find_by_chat_identity(chat_identity).is_some() {
                return Err(BotError::ChatAlreadyLinked {
                    chat_identity: chat_identity.to_string(),
                });
            }
        }

        let claimed = self.code_manager.consume_one(code).await?;

        let record = {
            let mut dir = self.accounts.write().await;
            let account = dir.ensure_account(&claimed.account_id);
            account.bind(chat_identity);
            let record = account.clone();
            dir.save(&self.accounts_path).await?;
            record
        };

        info!(
            "Linked chat identity {} to account {}",
            chat_identity, record.account_id
        );
        Ok(record)
    }

    /// Clear an account's binding and purge its outstanding codes, so a
    /// stale code cannot later re-bind a now-unlinked identity.
    pub async fn unbind(&self, account_id: &str) -> Result<()> {
        {
            let mut dir = self.accounts.write().await;
            let account = dir
                .find_mut(account_id)
                .ok_or_else(|| BotError::AccountNotFound {
                    account_id: account_id.to_string(),
                })?;
            account.unbind();
            dir.save(&self.accounts_path).await?;
        }

        let purged = self.code_manager.purge_account(account_id).await?;
        info!(
            "Unlinked account {} (purged {} outstanding code(s))",
            account_id, purged
        );
        Ok(())
    }

    /// Read-only projection for the web UI.
    pub async fn status(&self, account_id: &str) -> LinkStatus {
        let dir = self.accounts.read().await;
        match dir.find(account_id) {
            Some(account) => LinkStatus {
                is_linked: account.is_linked(),
                chat_identity: account.chat_identity.clone(),
            },
            None => LinkStatus {
                is_linked: false,
                chat_identity: None,
            },
        }
    }

    /// The account a chat identity is bound to, if any. Used by bot command
    /// handlers to resolve the caller.
    pub async fn account_for_chat(&self, chat_identity: &str) -> Option<AccountRecord> {
        let dir = self.accounts.read().await;
        dir.find_by_chat_identity(chat_identity).cloned()
    }
}

/// Shared binding service type
pub type SharedBindingService = Arc<AccountBindingService>;

pub fn create_shared_binding_service(
    code_manager: SharedCodeManager,
    accounts: SharedAccountDirectory,
    accounts_path: String,
) -> SharedBindingService {
    Arc::new(AccountBindingService::new(code_manager, accounts, accounts_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::create_shared_code_manager;
    use crate::state::{
        create_shared_account_directory, create_shared_code_store, AccountDirectory,
        PairingCodeStore,
    };

    fn temp_path(tag: &str, kind: &str) -> String {
        std::env::temp_dir()
            .join(format!("feltlink-{}-{}-{}.json", kind, tag, std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    fn service(tag: &str) -> AccountBindingService {
        let code_manager = create_shared_code_manager(
            create_shared_code_store(PairingCodeStore::new()),
            temp_path(tag, "codes"),
        );
        AccountBindingService::new(
            code_manager,
            create_shared_account_directory(AccountDirectory::new()),
            temp_path(tag, "accounts"),
        )
    }

    #[tokio::test]
    async fn end_to_end_link_flow() {
        let svc = service("e2e");

        let pairing = svc.issue_code("acct-a").await.unwrap();
        assert_eq!(pairing.code.len(), 8);
        assert_eq!(pairing.expires_at - pairing.created_at, 600);

        let bound = svc.consume("tg-555", &pairing.code).await.unwrap();
        assert_eq!(bound.account_id, "acct-a");

        let status = svc.status("acct-a").await;
        assert!(status.is_linked);
        assert_eq!(status.chat_identity.as_deref(), Some("tg-555"));

        // Same code from a second chat identity is already consumed.
        let second = svc.consume("tg-777", &pairing.code).await;
        assert!(matches!(second, Err(BotError::CodeAlreadyUsed)));
    }

    #[tokio::test]
    async fn unknown_code_is_invalid() {
        let svc = service("invalid");
        assert!(matches!(
            svc.consume("tg-555", "NOPE0000").await,
            Err(BotError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn expired_code_is_rejected_distinctly() {
        let svc = service("expired");
        let pairing = svc.issue_code("acct-a").await.unwrap();
        svc.code_manager.force_expire(&pairing.code).await;

        assert!(matches!(
            svc.consume("tg-555", &pairing.code).await,
            Err(BotError::CodeExpired)
        ));
    }

    #[tokio::test]
    async fn chat_identity_binds_to_at_most_one_account() {
        let svc = service("uniqueness");

        let code_a = svc.issue_code("acct-a").await.unwrap();
        svc.consume("tg-555", &code_a.code).await.unwrap();

        // Same chat identity tries a code for a different account.
        let code_b = svc.issue_code("acct-b").await.unwrap();
        let result = svc.consume("tg-555", &code_b.code).await;
        assert!(matches!(result, Err(BotError::ChatAlreadyLinked { .. })));

        // B stays unbound and its code stays unburned.
        assert!(!svc.status("acct-b").await.is_linked);
        let pairing = svc.code_manager.resolve(&code_b.code).await.unwrap();
        assert!(!pairing.used);
    }

    #[tokio::test]
    async fn unbind_clears_binding_and_codes() {
        let svc = service("unbind");

        let code = svc.issue_code("acct-a").await.unwrap();
        svc.consume("tg-555", &code.code).await.unwrap();

        // A fresh outstanding code exists at unbind time.
        let outstanding = svc.issue_code("acct-a").await.unwrap();
        svc.unbind("acct-a").await.unwrap();

        assert!(!svc.status("acct-a").await.is_linked);
        assert!(matches!(
            svc.consume("tg-777", &outstanding.code).await,
            Err(BotError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn unbind_unknown_account_errors() {
        let svc = service("unbind-unknown");
        assert!(matches!(
            svc.unbind("ghost").await,
            Err(BotError::AccountNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn status_for_unknown_account_is_unlinked() {
        let svc = service("status");
        let status = svc.status("ghost").await;
        assert!(!status.is_linked);
        assert!(status.chat_identity.is_none());
    }
}
