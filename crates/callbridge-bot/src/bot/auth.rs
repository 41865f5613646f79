use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::ChatId;
use callbridge_integrations::portal::PortalCredential;
use callbridge_integrations::store::{kinds, load, save};

use super::errors::user_message;
use super::Bridge;
use crate::service::session::{ChatSession, Step};

impl Bridge {
    pub(crate) async fn credential(&self, chat_id: ChatId) -> Result<Option<PortalCredential>> {
        load(self.store.as_ref(), kinds::PORTAL_CREDENTIAL, chat_id).await
    }

    pub(crate) async fn cmd_start(&self, chat_id: ChatId) -> Result<()> {
        match self.credential(chat_id).await? {
            Some(credential) => {
                let mut session = ChatSession::new(Step::AwaitModeChoice);
                session.email = Some(credential.email);
                session.sheet_id = self.linked_sheet(chat_id).await?;
                self.sessions.save(chat_id, &session).await?;
                self.prompt_mode(chat_id, "Welcome back.").await
            }
            None => {
                self.sessions
                    .save(chat_id, &ChatSession::new(Step::AwaitEmail))
                    .await?;
                self.say_text(
                    chat_id,
                    "Welcome! I pull daily call reports from the portal.\nSend your portal email to log in.",
                )
                .await
            }
        }
    }

    pub(crate) async fn on_email(&self, chat_id: ChatId, mut session: ChatSession, text: &str) -> Result<()> {
        let email = text.trim();
        if email.is_empty() || !email.contains('@') || email.contains(char::is_whitespace) {
            return self
                .say_text(chat_id, "That does not look like an email address. Send your portal email.")
                .await;
        }

        session.email = Some(email.to_string());
        session.step = Step::AwaitPassword;
        self.sessions.save(chat_id, &session).await?;
        self.say_text(chat_id, "Now send your portal password.").await
    }

    pub(crate) async fn on_password(
        &self,
        chat_id: ChatId,
        mut session: ChatSession,
        password: &str,
    ) -> Result<()> {
        let Some(email) = session.email.clone() else {
            session.step = Step::AwaitEmail;
            self.sessions.save(chat_id, &session).await?;
            return self.say_text(chat_id, "Send your portal email first.").await;
        };

        match self.portal.ensure_logged_in(chat_id, &email, password).await {
            Ok(()) => {
                let credential = PortalCredential {
                    email,
                    password: password.to_string(),
                };
                save(self.store.as_ref(), kinds::PORTAL_CREDENTIAL, chat_id, &credential).await?;
                tracing::info!(chat_id, "[portal] credential stored");

                session.login_attempts = 0;
                session.step = Step::AwaitModeChoice;
                self.sessions.save(chat_id, &session).await?;
                self.prompt_mode(chat_id, "Logged in.").await
            }
            Err(BridgeError::Auth(reason)) => {
                session.login_attempts += 1;
                tracing::info!(
                    chat_id,
                    attempts = session.login_attempts,
                    "[portal] login rejected: {reason}"
                );

                if session.login_attempts >= self.settings.max_login_attempts {
                    self.sessions.delete(chat_id).await?;
                    return self
                        .say_text(chat_id, "Too many failed login attempts. Send /start to try again.")
                        .await;
                }

                let left = self.settings.max_login_attempts - session.login_attempts;
                session.step = Step::AwaitEmail;
                session.email = None;
                self.sessions.save(chat_id, &session).await?;
                self.say_text(
                    chat_id,
                    format!(
                        "Login failed: wrong email or password ({left} attempt(s) left).\nPlease enter your portal email again."
                    ),
                )
                .await
            }
            Err(e) => {
                tracing::warn!(chat_id, "[portal] login error: {e}");
                session.step = Step::AwaitEmail;
                session.email = None;
                self.sessions.save(chat_id, &session).await?;
                self.say_text(
                    chat_id,
                    format!("{}\nSend your portal email to try again.", user_message(&e)),
                )
                .await
            }
        }
    }

    /// Forget the portal login and the workflow. The Google link stays.
    pub(crate) async fn cmd_logout(&self, chat_id: ChatId) -> Result<()> {
        self.sessions.delete(chat_id).await?;
        self.store.delete(kinds::PORTAL_CREDENTIAL, chat_id).await?;
        self.store.delete(kinds::PORTAL_COOKIES, chat_id).await?;
        tracing::info!(chat_id, "[session] logged out");
        self.say_text(
            chat_id,
            "Logged out. Your Google link is kept; use /unlink to remove it.\nSend /start to log in again.",
        )
        .await
    }

    pub(crate) async fn cmd_reset(&self, chat_id: ChatId) -> Result<()> {
        self.sessions.delete(chat_id).await?;
        tracing::info!(chat_id, "[session] reset");
        self.cmd_start(chat_id).await
    }
}
