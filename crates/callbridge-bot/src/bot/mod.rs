use std::sync::Arc;

use callbridge_core::config::Config;
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::ChatId;
use callbridge_integrations::google::GoogleAuth;
use callbridge_integrations::portal::ReportSource;
use callbridge_integrations::store::{kinds, load, KvStore};
use chrono::NaiveDate;

use crate::service::dates;
use crate::service::locks::ChatLocks;
use crate::service::session::{ChatSession, SessionStore, Step};
use crate::service::sync::SheetSync;

pub mod action;
mod auth;
pub mod calendar;
mod commands;
pub mod errors;
mod fetch;
pub mod front;
pub mod render;
pub mod router;
mod setup;
pub mod telegram;


use action::Action;
use errors::user_message;
use front::{ChatEvent, ChatFront, Reply};

/// Callback answer for a button whose menu has moved on.
pub(crate) const STALE_BUTTON: &str = "That menu is no longer active.";

/// Optional popup text for a callback answer.
pub(crate) type Notice = Option<&'static str>;

#[derive(Debug, Clone, Copy)]
pub struct BridgeSettings {
    pub max_login_attempts: u32,
    /// UTC offset in hours for "today".
    pub timezone_offset: i32,
}

impl From<&Config> for BridgeSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_login_attempts: config.portal.max_login_attempts.max(1),
            timezone_offset: config.bot.timezone_offset,
        }
    }
}

/// Google consent plus the sheet writer that depends on it.
pub struct GoogleLink {
    pub auth: Arc<GoogleAuth>,
    pub sync: SheetSync,
}

/// The conversation engine: routes chat events through the per-chat step
/// machine and talks to the portal, the sheet writer and the chat front.
pub struct Bridge {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) sessions: SessionStore,
    pub(crate) portal: Arc<dyn ReportSource>,
    pub(crate) google: Option<GoogleLink>,
    pub(crate) front: Arc<dyn ChatFront>,
    pub(crate) locks: ChatLocks,
    pub(crate) settings: BridgeSettings,
}

impl Bridge {
    pub fn new(
        store: Arc<dyn KvStore>,
        portal: Arc<dyn ReportSource>,
        google: Option<GoogleLink>,
        front: Arc<dyn ChatFront>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            sessions: SessionStore::new(Arc::clone(&store)),
            store,
            portal,
            google,
            front,
            locks: ChatLocks::new(),
            settings,
        }
    }

    pub(crate) fn today(&self) -> NaiveDate {
        dates::today(self.settings.timezone_offset)
    }

    pub(crate) async fn say(&self, chat_id: ChatId, reply: Reply) -> Result<()> {
        self.front.send(chat_id, reply).await
    }

    pub(crate) async fn say_text(&self, chat_id: ChatId, text: impl Into<String>) -> Result<()> {
        self.say(chat_id, Reply::text(text)).await
    }

    pub(crate) async fn linked_sheet(&self, chat_id: ChatId) -> Result<Option<String>> {
        load(self.store.as_ref(), kinds::SHEET_ID, chat_id).await
    }

    /// Handle one inbound event under the chat's lock. Handler errors are
    /// turned into chat text here and never escape.
    pub async fn handle_event(&self, chat_id: ChatId, event: ChatEvent) -> Result<()> {
        let _guard = self.locks.lock(chat_id).await;

        let result = match event {
            ChatEvent::Command { name, args } => self.on_command(chat_id, &name, &args).await,
            ChatEvent::Callback { id, action } => self.on_callback(chat_id, &id, action).await,
            ChatEvent::Text(text) => self.on_text(chat_id, &text).await,
            ChatEvent::DatePicked(date) => match self.on_date(chat_id, date).await {
                Ok(Some(notice)) => self.say_text(chat_id, notice).await,
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => self.recover(chat_id, e).await,
        }
    }

    async fn on_command(&self, chat_id: ChatId, name: &str, args: &str) -> Result<()> {
        tracing::info!(chat_id, command = name, "[recv] command");
        match name {
            "start" => self.cmd_start(chat_id).await,
            "fetch" => self.cmd_fetch(chat_id).await,
            "team" => self.cmd_team(chat_id, args).await,
            "agent" => self.cmd_agent(chat_id, args).await,
            "summary" => self.cmd_summary(chat_id, args).await,
            "mode" => self.cmd_mode(chat_id).await,
            "logout" => self.cmd_logout(chat_id).await,
            "reset" => self.cmd_reset(chat_id).await,
            "unlink" => self.cmd_unlink(chat_id).await,
            "help" => self.say(chat_id, Reply::rich(commands::HELP)).await,
            _ => self.say_text(chat_id, "Unknown command. Send /help for the list.").await,
        }
    }

    async fn on_callback(&self, chat_id: ChatId, callback_id: &str, action: Action) -> Result<()> {
        tracing::info!(chat_id, action = %action.encode(), "[recv] button");
        let outcome = match action {
            Action::ChooseMode(mode) => self.on_mode_chosen(chat_id, mode).await,
            Action::Team(index) => self.on_team_button(chat_id, index).await,
            Action::Agent(index) => self.on_agent_button(chat_id, index).await,
            Action::Write { overwrite } => self.on_write_mode(chat_id, overwrite).await,
            Action::Day(date) => self.on_date(chat_id, date).await,
            Action::Month { .. } | Action::Noop => Ok(None),
        };

        let notice = outcome.as_ref().ok().copied().flatten();
        if let Err(e) = self.front.answer_callback(callback_id, notice).await {
            tracing::warn!(chat_id, "[telegram] answer callback failed: {e}");
        }
        outcome.map(|_| ())
    }

    async fn on_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let Some(session) = self.require_session(chat_id).await? else {
            return Ok(());
        };
        tracing::debug!(chat_id, step = ?session.step, "[recv] text");

        match session.step {
            Step::AwaitEmail => self.on_email(chat_id, session, text).await,
            Step::AwaitPassword => self.on_password(chat_id, session, text).await,
            Step::AwaitSheetUrl => self.on_sheet_url(chat_id, session, text).await,
            Step::AwaitOAuth => self.remind_consent(chat_id).await,
            Step::AwaitDate => {
                let date = dates::parse_date(text, self.today())?;
                self.load_report(chat_id, session, date).await
            }
            Step::AwaitTeam => self.on_team_text(chat_id, session, text).await,
            Step::AwaitAgent => self.on_agent_text(chat_id, session, text).await,
            Step::AwaitModeChoice => {
                self.prompt_mode(chat_id, "Please choose a mode with the buttons.").await
            }
            Step::AwaitWriteMode => {
                self.say(
                    chat_id,
                    Reply::text("Overwrite the sheet or append to it?").with_menu(fetch::write_menu()),
                )
                .await
            }
            Step::Ready => {
                self.say_text(
                    chat_id,
                    "Send /fetch to pick a date, /summary <date> <team> for a quick summary, or /help.",
                )
                .await
            }
        }
    }

    /// Load the chat's session. When it is missing the flow restarts at the
    /// mode prompt and `None` is returned; the caller just stops.
    pub(crate) async fn require_session(&self, chat_id: ChatId) -> Result<Option<ChatSession>> {
        match self.sessions.load(chat_id).await? {
            Some(session) => Ok(Some(session)),
            None => {
                tracing::info!(chat_id, "[session] missing, restarting at mode choice");
                self.restart_flow(chat_id).await?;
                Ok(None)
            }
        }
    }

    pub(crate) async fn restart_flow(&self, chat_id: ChatId) -> Result<()> {
        let mut session = ChatSession::new(Step::AwaitModeChoice);
        session.email = self.credential(chat_id).await?.map(|c| c.email);
        session.sheet_id = self.linked_sheet(chat_id).await?;
        self.sessions.save(chat_id, &session).await?;
        self.prompt_mode(chat_id, &user_message(&BridgeError::SessionExpired))
            .await
    }

    /// Put the chat back on a step it can continue from, then explain.
    async fn recover(&self, chat_id: ChatId, err: BridgeError) -> Result<()> {
        tracing::warn!(chat_id, retryable = err.is_retryable(), "[session] handler failed: {err}");

        if matches!(err, BridgeError::SessionExpired) {
            return self.restart_flow(chat_id).await;
        }

        let mut text = user_message(&err);
        let session = self.sessions.load(chat_id).await?;

        match (&err, session) {
            (BridgeError::Auth(_), session) => {
                let mut session = session.unwrap_or_else(|| ChatSession::new(Step::AwaitEmail));
                session.step = Step::AwaitEmail;
                session.email = None;
                self.sessions.save(chat_id, &session).await?;
            }
            (BridgeError::SheetAuth(_), Some(mut session)) => {
                match &self.google {
                    Some(google) => {
                        session.step = Step::AwaitOAuth;
                        text = format!("{text}\n{}", google.auth.auth_url(chat_id));
                    }
                    None => session.step = Step::AwaitModeChoice,
                }
                self.sessions.save(chat_id, &session).await?;
            }
            (BridgeError::DateParse(_), _) | (_, None) => {}
            (_, Some(mut session)) => {
                session.step = match session.step {
                    Step::AwaitEmail | Step::AwaitPassword => Step::AwaitEmail,
                    _ if session.mode.is_some() => Step::Ready,
                    _ => Step::AwaitModeChoice,
                };
                self.sessions.save(chat_id, &session).await?;
            }
        }

        self.say_text(chat_id, text).await
    }
}
