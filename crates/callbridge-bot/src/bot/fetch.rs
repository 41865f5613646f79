use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::{CallRecord, ChatId};
use chrono::NaiveDate;

use super::action::Action;
use super::front::{Choice, Menu, Reply};
use super::render::{self, team_label};
use super::{Bridge, Notice, STALE_BUTTON};
use crate::service::report::{
    distinct_agents, distinct_teams, records_for_agent, records_for_team, same_name, to_call_records,
};
use crate::service::session::{CachedReport, ChatSession, Mode, Step};
use crate::service::stats::best_agent_match;

pub(crate) fn team_menu(teams: &[String]) -> Menu {
    let choices = teams
        .iter()
        .enumerate()
        .map(|(i, team)| Choice::new(team_label(team), Action::Team(i)))
        .collect();
    Menu::grid(choices, 2)
}

pub(crate) fn agent_menu(agents: &[String]) -> Menu {
    let choices = agents
        .iter()
        .enumerate()
        .map(|(i, agent)| Choice::new(agent.as_str(), Action::Agent(i)))
        .collect();
    Menu::grid(choices, 2)
}

pub(crate) fn write_menu() -> Menu {
    Menu::grid(
        vec![
            Choice::new("Overwrite", Action::Write { overwrite: true }),
            Choice::new("Append", Action::Write { overwrite: false }),
        ],
        2,
    )
}

impl Bridge {
    pub(crate) async fn cmd_fetch(&self, chat_id: ChatId) -> Result<()> {
        let Some(mut session) = self.require_session(chat_id).await? else {
            return Ok(());
        };

        if matches!(session.step, Step::AwaitEmail | Step::AwaitPassword) {
            return self
                .say_text(chat_id, "Finish logging in first: send your portal email.")
                .await;
        }

        match session.mode {
            None => {
                session.step = Step::AwaitModeChoice;
                self.sessions.save(chat_id, &session).await?;
                self.prompt_mode(chat_id, "Choose a mode first.").await
            }
            Some(Mode::Sheet) if session.sheet_id.is_none() => {
                session.step = Step::AwaitSheetUrl;
                self.sessions.save(chat_id, &session).await?;
                self.say_text(chat_id, "Paste the link of the Google Sheet to write into first.")
                    .await
            }
            Some(_) => {
                session.step = Step::AwaitDate;
                self.sessions.save(chat_id, &session).await?;
                self.say(
                    chat_id,
                    Reply::text("Pick the report date, or type one (today, yesterday, YYYY-MM-DD).")
                        .with_menu(Menu::DatePicker { month: self.today() }),
                )
                .await
            }
        }
    }

    pub(crate) async fn on_date(&self, chat_id: ChatId, date: NaiveDate) -> Result<Notice> {
        let Some(session) = self.require_session(chat_id).await? else {
            return Ok(None);
        };
        if session.step != Step::AwaitDate {
            return Ok(Some(STALE_BUTTON));
        }
        self.load_report(chat_id, session, date).await?;
        Ok(None)
    }

    /// Download, normalize and cache one day, then offer the team menu.
    pub(crate) async fn load_report(
        &self,
        chat_id: ChatId,
        mut session: ChatSession,
        date: NaiveDate,
    ) -> Result<()> {
        let iso = date.format("%Y-%m-%d").to_string();
        self.say_text(chat_id, format!("Fetching the report for {iso}…"))
            .await?;

        let rows = self.portal.download_report(chat_id, &iso).await?;
        let records = to_call_records(&rows);
        tracing::info!(chat_id, date = %iso, records = records.len(), "[portal] report normalized");

        session.clear_report();
        if records.is_empty() {
            session.step = Step::Ready;
            self.sessions.save(chat_id, &session).await?;
            return self
                .say_text(chat_id, format!("No calls found on {iso}. Send /fetch to pick another date."))
                .await;
        }

        let count = records.len();
        session.teams = distinct_teams(&records);
        session.report = Some(CachedReport { date, rows: records });
        session.step = Step::AwaitTeam;
        self.sessions.save(chat_id, &session).await?;

        self.say(
            chat_id,
            Reply::text(format!("{count} calls on {iso}. Choose a team:"))
                .with_menu(team_menu(&session.teams)),
        )
        .await
    }

    pub(crate) async fn on_team_button(&self, chat_id: ChatId, index: usize) -> Result<Notice> {
        let Some(session) = self.require_session(chat_id).await? else {
            return Ok(None);
        };
        if session.step != Step::AwaitTeam {
            return Ok(Some(STALE_BUTTON));
        }
        let Some(team) = session.teams.get(index).cloned() else {
            return Ok(Some(STALE_BUTTON));
        };
        self.select_team(chat_id, session, team).await?;
        Ok(None)
    }

    pub(crate) async fn on_team_text(&self, chat_id: ChatId, session: ChatSession, text: &str) -> Result<()> {
        match session.teams.iter().find(|t| same_name(t, text)).cloned() {
            Some(team) => self.select_team(chat_id, session, team).await,
            None => {
                self.say(
                    chat_id,
                    Reply::text(format!("No team named \"{}\" in this report. Choose one:", text.trim()))
                        .with_menu(team_menu(&session.teams)),
                )
                .await
            }
        }
    }

    async fn select_team(&self, chat_id: ChatId, mut session: ChatSession, team: String) -> Result<()> {
        let Some(report) = session.report.clone() else {
            session.step = Step::Ready;
            self.sessions.save(chat_id, &session).await?;
            return self
                .say_text(chat_id, "The report is no longer loaded. Send /fetch again.")
                .await;
        };

        let records: Vec<&CallRecord> = records_for_team(&report.rows, Some(team.as_str())).collect();
        session.selected_team = Some(team.clone());

        if session.mode == Some(Mode::Sheet) {
            session.step = Step::AwaitWriteMode;
            self.sessions.save(chat_id, &session).await?;
            return self
                .say(
                    chat_id,
                    Reply::text(format!(
                        "{} rows for {}. Overwrite the sheet or append to it?",
                        records.len(),
                        team_label(&team)
                    ))
                    .with_menu(write_menu()),
                )
                .await;
        }

        session.agents = distinct_agents(&report.rows, Some(team.as_str()));
        session.step = if session.agents.is_empty() {
            Step::Ready
        } else {
            Step::AwaitAgent
        };
        self.sessions.save(chat_id, &session).await?;

        self.say(chat_id, Reply::rich(render::team_summary(&team, report.date, &records)))
            .await?;

        if session.agents.is_empty() {
            return self
                .say_text(chat_id, "No agent names in this team. Send /fetch for another date.")
                .await;
        }
        self.say(
            chat_id,
            Reply::text("Pick an agent, or type a name:").with_menu(agent_menu(&session.agents)),
        )
        .await
    }

    pub(crate) async fn on_write_mode(&self, chat_id: ChatId, overwrite: bool) -> Result<Notice> {
        let Some(mut session) = self.require_session(chat_id).await? else {
            return Ok(None);
        };
        if session.step != Step::AwaitWriteMode {
            return Ok(Some(STALE_BUTTON));
        }

        let (Some(report), Some(team)) = (session.report.clone(), session.selected_team.clone()) else {
            session.step = Step::Ready;
            self.sessions.save(chat_id, &session).await?;
            self.say_text(chat_id, "Nothing to write. Send /fetch first.").await?;
            return Ok(None);
        };
        let Some(sheet_id) = session.sheet_id.clone() else {
            session.step = Step::AwaitSheetUrl;
            self.sessions.save(chat_id, &session).await?;
            self.say_text(chat_id, "Paste the link of the Google Sheet to write into first.")
                .await?;
            return Ok(None);
        };
        let google = self
            .google
            .as_ref()
            .ok_or_else(|| BridgeError::Config("google sheets is not configured".to_string()))?;

        let records: Vec<CallRecord> = records_for_team(&report.rows, Some(team.as_str())).cloned().collect();
        let written = google.sync.write(chat_id, &sheet_id, &records, overwrite).await?;

        session.step = Step::Ready;
        self.sessions.save(chat_id, &session).await?;
        self.say_text(
            chat_id,
            format!(
                "{} {written} rows for {} ({}) to your sheet. Send /fetch for another date.",
                if overwrite { "Wrote" } else { "Appended" },
                team_label(&team),
                report.date.format("%Y-%m-%d"),
            ),
        )
        .await?;
        Ok(None)
    }

    pub(crate) async fn on_agent_button(&self, chat_id: ChatId, index: usize) -> Result<Notice> {
        let Some(session) = self.require_session(chat_id).await? else {
            return Ok(None);
        };
        if session.step != Step::AwaitAgent {
            return Ok(Some(STALE_BUTTON));
        }
        let Some(agent) = session.agents.get(index).cloned() else {
            return Ok(Some(STALE_BUTTON));
        };
        self.show_agent(chat_id, session, agent).await?;
        Ok(None)
    }

    pub(crate) async fn on_agent_text(&self, chat_id: ChatId, session: ChatSession, text: &str) -> Result<()> {
        match best_agent_match(&session.agents, text) {
            Some(agent) => self.show_agent(chat_id, session, agent).await,
            None => {
                self.say(
                    chat_id,
                    Reply::text(format!("No agent matches \"{}\". Choose one:", text.trim()))
                        .with_menu(agent_menu(&session.agents)),
                )
                .await
            }
        }
    }

    async fn show_agent(&self, chat_id: ChatId, mut session: ChatSession, agent: String) -> Result<()> {
        let Some(report) = session.report.clone() else {
            session.step = Step::Ready;
            self.sessions.save(chat_id, &session).await?;
            return self
                .say_text(chat_id, "The report is no longer loaded. Send /fetch again.")
                .await;
        };

        let team = session.selected_team.clone();
        let records = records_for_agent(&report.rows, team.as_deref(), &agent);
        session.step = Step::Ready;
        self.sessions.save(chat_id, &session).await?;

        self.say(
            chat_id,
            Reply::rich(render::agent_stats(&agent, team.as_deref(), report.date, &records)),
        )
        .await
    }
}
