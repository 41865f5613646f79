use std::sync::Arc;

use callbridge_core::error::Result;
use callbridge_core::types::{CallRecord, ChatId};
use callbridge_integrations::store::{kinds, save, KvStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a chat is in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AwaitEmail,
    AwaitPassword,
    AwaitModeChoice,
    AwaitSheetUrl,
    #[serde(rename = "await_oauth")]
    AwaitOAuth,
    Ready,
    AwaitDate,
    AwaitTeam,
    AwaitWriteMode,
    AwaitAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Sheet,
    Chat,
}

/// One day's normalized report. Rows and their date travel together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedReport {
    pub date: NaiveDate,
    pub rows: Vec<CallRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub step: Step,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub connect_sheet: bool,
    #[serde(default)]
    pub sheet_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub report: Option<CachedReport>,
    /// Team menu last shown; callback buttons carry indices into it.
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub selected_team: Option<String>,
    #[serde(default)]
    pub login_attempts: u32,
}

impl ChatSession {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            mode: None,
            connect_sheet: false,
            sheet_id: None,
            email: None,
            report: None,
            teams: Vec::new(),
            agents: Vec::new(),
            selected_team: None,
            login_attempts: 0,
        }
    }

    /// Drop the cached report and every menu derived from it.
    pub fn clear_report(&mut self) {
        self.report = None;
        self.teams.clear();
        self.agents.clear();
        self.selected_team = None;
    }
}

/// Typed access to persisted sessions.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KvStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// A record that no longer decodes counts as no session at all.
    pub async fn load(&self, chat_id: ChatId) -> Result<Option<ChatSession>> {
        let Some(value) = self.store.get(kinds::SESSION, chat_id).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(chat_id, "[session] discarding undecodable session: {e}");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, chat_id: ChatId, session: &ChatSession) -> Result<()> {
        tracing::debug!(chat_id, step = ?session.step, "[session] save");
        save(self.store.as_ref(), kinds::SESSION, chat_id, session).await
    }

    pub async fn delete(&self, chat_id: ChatId) -> Result<()> {
        self.store.delete(kinds::SESSION, chat_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_core::types::CallStatus;
    use callbridge_integrations::store::MemoryStore;

    fn record() -> CallRecord {
        CallRecord {
            caller: "0811".into(),
            agent: "Jane Doe".into(),
            team: "Sales".into(),
            callee: "0822".into(),
            status: CallStatus::Answer,
            duration_sec: 30,
            talktime_sec: 20,
            hangup_by: "caller".into(),
            call_date: "2025-07-01".into(),
            call_time: "09:00:00".into(),
            end_time: "09:00:30".into(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_with_report() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()));
        let mut session = ChatSession::new(Step::AwaitTeam);
        session.mode = Some(Mode::Chat);
        session.report = Some(CachedReport {
            date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            rows: vec![record()],
        });
        session.teams = vec!["Sales".into()];

        sessions.save(9, &session).await.unwrap();
        assert_eq!(sessions.load(9).await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_unknown_step_is_treated_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(kinds::SESSION, 9, serde_json::json!({ "step": "await_captcha" }))
            .await
            .unwrap();
        let sessions = SessionStore::new(store);
        assert!(sessions.load(9).await.unwrap().is_none());
    }

    #[test]
    fn test_step_wire_names() {
        assert_eq!(serde_json::to_string(&Step::AwaitOAuth).unwrap(), "\"await_oauth\"");
        assert_eq!(serde_json::to_string(&Step::AwaitWriteMode).unwrap(), "\"await_write_mode\"");
    }

    #[test]
    fn test_clear_report_drops_menus() {
        let mut session = ChatSession::new(Step::AwaitAgent);
        session.report = Some(CachedReport {
            date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            rows: vec![],
        });
        session.teams = vec!["Sales".into()];
        session.agents = vec!["Jane".into()];
        session.selected_team = Some("Sales".into());
        session.clear_report();
        assert!(session.report.is_none());
        assert!(session.teams.is_empty() && session.agents.is_empty());
        assert!(session.selected_team.is_none());
    }
}
