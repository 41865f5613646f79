use callbridge_core::error::Result;
use callbridge_core::types::{CallRecord, ChatId};

use super::fetch::{agent_menu, team_menu};
use super::front::Reply;
use super::render;
use super::Bridge;
use crate::service::dates::parse_date;
use crate::service::report::{distinct_agents, records_for_agent, records_for_team, to_call_records};
use crate::service::session::Step;
use crate::service::stats::best_agent_match;

pub(crate) const HELP: &str = "**Commands**
/start: log in to the portal and choose a mode
/fetch: pick a date and browse or export its report
/team <name>: team summary from the loaded report
/agent <name>: agent stats from the loaded report
/summary <date> <team>: one-shot team summary (date: today, yesterday, YYYY-MM-DD)
/mode: switch between Google Sheet and chat
/unlink: disconnect Google and forget the linked sheet
/reset: restart the conversation
/logout: forget your portal login";

const SUMMARY_USAGE: &str = "Usage: /summary <date> <team>\nExample: /summary today Sales";

impl Bridge {
    /// Fetch, normalize and summarize in one go. Needs the stored portal
    /// login but not any particular step.
    pub(crate) async fn cmd_summary(&self, chat_id: ChatId, args: &str) -> Result<()> {
        let Some((date_token, team)) = args
            .trim()
            .split_once(char::is_whitespace)
            .map(|(d, t)| (d, t.trim()))
            .filter(|(_, t)| !t.is_empty())
        else {
            return self.say_text(chat_id, SUMMARY_USAGE).await;
        };

        let date = parse_date(date_token, self.today())?;
        let iso = date.format("%Y-%m-%d").to_string();

        let rows = self.portal.download_report(chat_id, &iso).await?;
        let records = to_call_records(&rows);
        let matching: Vec<&CallRecord> = records_for_team(&records, Some(team)).collect();
        tracing::info!(chat_id, date = %iso, matching = matching.len(), "[summary] computed");

        match matching.first() {
            None => self.say_text(chat_id, render::no_calls_for_team(team, date)).await,
            Some(first) => {
                let display = first.team.clone();
                self.say(chat_id, Reply::rich(render::team_summary(&display, date, &matching)))
                    .await
            }
        }
    }

    /// `/team` alone reopens the team menu; `/team <name>` summarizes it.
    pub(crate) async fn cmd_team(&self, chat_id: ChatId, args: &str) -> Result<()> {
        let Some(mut session) = self.require_session(chat_id).await? else {
            return Ok(());
        };
        let Some(report) = session.report.clone() else {
            return self
                .say_text(chat_id, "No report loaded. Send /fetch first.")
                .await;
        };

        let name = args.trim();
        if name.is_empty() {
            session.step = Step::AwaitTeam;
            self.sessions.save(chat_id, &session).await?;
            return self
                .say(chat_id, Reply::text("Choose a team:").with_menu(team_menu(&session.teams)))
                .await;
        }

        let matching: Vec<&CallRecord> = records_for_team(&report.rows, Some(name)).collect();
        let Some(first) = matching.first() else {
            return self
                .say_text(chat_id, render::no_calls_for_team(name, report.date))
                .await;
        };

        let display = first.team.clone();
        session.selected_team = Some(display.clone());
        session.agents = distinct_agents(&report.rows, Some(display.as_str()));
        self.sessions.save(chat_id, &session).await?;
        self.say(chat_id, Reply::rich(render::team_summary(&display, report.date, &matching)))
            .await
    }

    /// Fuzzy agent lookup in the loaded report, within the selected team if any.
    pub(crate) async fn cmd_agent(&self, chat_id: ChatId, args: &str) -> Result<()> {
        let Some(mut session) = self.require_session(chat_id).await? else {
            return Ok(());
        };
        let Some(report) = session.report.clone() else {
            return self
                .say_text(chat_id, "No report loaded. Send /fetch first.")
                .await;
        };

        let team = session.selected_team.clone();
        let candidates = distinct_agents(&report.rows, team.as_deref());
        if candidates.is_empty() {
            return self.say_text(chat_id, "No agents in the loaded report.").await;
        }

        let query = args.trim();
        if query.is_empty() {
            session.agents = candidates;
            session.step = Step::AwaitAgent;
            self.sessions.save(chat_id, &session).await?;
            return self
                .say(chat_id, Reply::text("Pick an agent:").with_menu(agent_menu(&session.agents)))
                .await;
        }

        let Some(agent) = best_agent_match(&candidates, query) else {
            return self
                .say_text(chat_id, format!("No agent matches \"{query}\"."))
                .await;
        };
        let records = records_for_agent(&report.rows, team.as_deref(), &agent);
        self.say(
            chat_id,
            Reply::rich(render::agent_stats(&agent, team.as_deref(), report.date, &records)),
        )
        .await
    }
}
