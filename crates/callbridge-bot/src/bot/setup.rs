use async_trait::async_trait;
use callbridge_core::error::Result;
use callbridge_core::types::ChatId;
use callbridge_integrations::google::sheets::parse_spreadsheet_id;
use callbridge_integrations::http::ConsentListener;
use callbridge_integrations::store::{kinds, save};

use super::action::Action;
use super::front::{Choice, Menu, Reply};
use super::{Bridge, Notice, STALE_BUTTON};
use crate::service::session::{ChatSession, Mode, Step};

impl Bridge {
    pub(crate) fn mode_menu(&self) -> Menu {
        let mut choices = Vec::with_capacity(2);
        if self.google.is_some() {
            choices.push(Choice::new("Google Sheet", Action::ChooseMode(Mode::Sheet)));
        }
        choices.push(Choice::new("Chat", Action::ChooseMode(Mode::Chat)));
        Menu::grid(choices, 2)
    }

    pub(crate) async fn prompt_mode(&self, chat_id: ChatId, lead: &str) -> Result<()> {
        let text = format!("{lead}\nWhere should reports go: a Google Sheet, or right here in the chat?");
        self.say(chat_id, Reply::text(text).with_menu(self.mode_menu()))
            .await
    }

    pub(crate) async fn on_mode_chosen(&self, chat_id: ChatId, mode: Mode) -> Result<Notice> {
        let Some(mut session) = self.require_session(chat_id).await? else {
            return Ok(None);
        };
        if session.step != Step::AwaitModeChoice {
            return Ok(Some(STALE_BUTTON));
        }

        match mode {
            Mode::Chat => {
                session.mode = Some(Mode::Chat);
                session.connect_sheet = false;
                session.step = Step::Ready;
                self.sessions.save(chat_id, &session).await?;
                self.say_text(
                    chat_id,
                    "Chat mode on. Send /fetch to pick a date, or /summary <date> <team>.",
                )
                .await?;
            }
            Mode::Sheet if self.google.is_none() => {
                self.say_text(chat_id, "Google Sheets is not configured on this bot. Choose Chat instead.")
                    .await?;
            }
            Mode::Sheet => {
                session.mode = Some(Mode::Sheet);
                session.connect_sheet = true;
                session.step = Step::AwaitSheetUrl;
                self.sessions.save(chat_id, &session).await?;
                self.say_text(chat_id, "Paste the link of the Google Sheet to write into.")
                    .await?;
            }
        }
        Ok(None)
    }

    pub(crate) async fn on_sheet_url(&self, chat_id: ChatId, mut session: ChatSession, text: &str) -> Result<()> {
        let Some(sheet_id) = parse_spreadsheet_id(text) else {
            return self
                .say_text(
                    chat_id,
                    "That is not a Google Sheets link. Paste the full URL, like https://docs.google.com/spreadsheets/d/…",
                )
                .await;
        };

        let Some(google) = &self.google else {
            session.step = Step::AwaitModeChoice;
            self.sessions.save(chat_id, &session).await?;
            return self.prompt_mode(chat_id, "Google Sheets is not configured on this bot.").await;
        };

        save(self.store.as_ref(), kinds::SHEET_ID, chat_id, &sheet_id).await?;
        session.sheet_id = Some(sheet_id);
        tracing::info!(chat_id, "[sheets] sheet linked");

        if google.auth.is_connected(chat_id).await {
            session.step = Step::Ready;
            self.sessions.save(chat_id, &session).await?;
            return self
                .say_text(chat_id, "Sheet linked. Send /fetch to pick a date.")
                .await;
        }

        session.step = Step::AwaitOAuth;
        self.sessions.save(chat_id, &session).await?;
        self.say_text(
            chat_id,
            format!(
                "Sheet saved. Now allow access to Google Sheets:\n{}\nI will continue once you approve.",
                google.auth.auth_url(chat_id)
            ),
        )
        .await
    }

    pub(crate) async fn remind_consent(&self, chat_id: ChatId) -> Result<()> {
        match &self.google {
            Some(google) => {
                self.say_text(
                    chat_id,
                    format!(
                        "Still waiting for Google access. Open this link to approve:\n{}",
                        google.auth.auth_url(chat_id)
                    ),
                )
                .await
            }
            None => self.restart_flow(chat_id).await,
        }
    }

    async fn advance_after_consent(&self, chat_id: ChatId) -> Result<()> {
        let _guard = self.locks.lock(chat_id).await;

        match self.sessions.load(chat_id).await? {
            Some(mut session) if session.step == Step::AwaitOAuth => {
                session.mode = Some(Mode::Sheet);
                session.connect_sheet = true;
                session.step = Step::Ready;
                self.sessions.save(chat_id, &session).await?;
                self.say_text(chat_id, "Google connected. Send /fetch to pick a date.")
                    .await
            }
            Some(_) => self.say_text(chat_id, "Google connected.").await,
            None => self.say_text(chat_id, "Google connected. Send /start to continue.").await,
        }
    }

    pub(crate) async fn cmd_mode(&self, chat_id: ChatId) -> Result<()> {
        let Some(credential) = self.credential(chat_id).await? else {
            return self.cmd_start(chat_id).await;
        };

        let mut session = self
            .sessions
            .load(chat_id)
            .await?
            .unwrap_or_else(|| ChatSession::new(Step::AwaitModeChoice));
        session.step = Step::AwaitModeChoice;
        session.email = Some(credential.email);
        if session.sheet_id.is_none() {
            session.sheet_id = self.linked_sheet(chat_id).await?;
        }
        self.sessions.save(chat_id, &session).await?;
        self.prompt_mode(chat_id, "Switching mode.").await
    }

    /// Drop the Google grant and linked sheet. The portal login stays.
    pub(crate) async fn cmd_unlink(&self, chat_id: ChatId) -> Result<()> {
        match &self.google {
            Some(google) => google.auth.revoke_local(chat_id).await?,
            None => self.store.delete(kinds::GOOGLE_TOKEN, chat_id).await?,
        }
        self.store.delete(kinds::SHEET_ID, chat_id).await?;
        tracing::info!(chat_id, "[oauth] google unlinked");

        let Some(mut session) = self.sessions.load(chat_id).await? else {
            return self.say_text(chat_id, "Google unlinked.").await;
        };
        session.sheet_id = None;

        if session.mode == Some(Mode::Sheet) || session.step == Step::AwaitOAuth {
            session.mode = None;
            session.connect_sheet = false;
            session.step = Step::AwaitModeChoice;
            self.sessions.save(chat_id, &session).await?;
            return self.prompt_mode(chat_id, "Google unlinked.").await;
        }

        self.sessions.save(chat_id, &session).await?;
        self.say_text(chat_id, "Google unlinked.").await
    }
}

#[async_trait]
impl ConsentListener for Bridge {
    async fn on_consent(&self, chat_id: ChatId) {
        tracing::info!(chat_id, "[oauth] consent received");
        if let Err(e) = self.advance_after_consent(chat_id).await {
            tracing::error!(chat_id, "[oauth] failed to resume chat after consent: {e}");
        }
    }
}
