use async_trait::async_trait;
use callbridge_core::error::Result;
use callbridge_core::types::ChatId;
use chrono::NaiveDate;

use super::action::Action;

/// A button on a choice menu.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub label: String,
    pub action: Action,
}

impl Choice {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Menu {
    Choices(Vec<Vec<Choice>>),
    /// Month grid opened on the month containing this date.
    DatePicker { month: NaiveDate },
}

impl Menu {
    /// Lay choices out `per_row` to a row.
    pub fn grid(choices: Vec<Choice>, per_row: usize) -> Self {
        Self::Choices(choices.chunks(per_row.max(1)).map(<[Choice]>::to_vec).collect())
    }

    /// Every action reachable from this menu, in display order.
    pub fn actions(&self) -> Vec<&Action> {
        match self {
            Self::Choices(rows) => rows.iter().flatten().map(|c| &c.action).collect(),
            Self::DatePicker { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Render `text` as Markdown.
    pub rich: bool,
    pub menu: Option<Menu>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rich: false,
            menu: None,
        }
    }

    pub fn rich(text: impl Into<String>) -> Self {
        Self {
            rich: true,
            ..Self::text(text)
        }
    }

    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.menu = Some(menu);
        self
    }
}

/// Inbound events from the chat transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// `/name args`, name lowercased without the slash.
    Command { name: String, args: String },
    Callback { id: String, action: Action },
    Text(String),
    DatePicked(NaiveDate),
}

/// Outbound half of the chat transport.
#[async_trait]
pub trait ChatFront: Send + Sync {
    async fn send(&self, chat_id: ChatId, reply: Reply) -> Result<()>;
    async fn answer_callback(&self, callback_id: &str, notice: Option<&str>) -> Result<()>;
}

/// Split `/cmd@bot rest` into (`cmd`, `rest`).
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, args.trim().to_string()))
}
