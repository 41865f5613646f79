use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callbridge_core::config::TelegramConfig;
use callbridge_core::error::Result;
use callbridge_core::types::ChatId;
use callbridge_integrations::store::{kinds, load, save, KvStore};
use callbridge_telegram::bot::TelegramBot;
use callbridge_telegram::types::Update;
use chrono::NaiveDate;

use super::action::Action;
use super::front::{parse_command, ChatEvent, Menu};
use super::telegram::TelegramFront;
use super::{Bridge, STALE_BUTTON};
use crate::service::queue::{ChatQueues, ChatWorker};

/// Commands registered in Telegram's command menu.
const COMMANDS: &[(&str, &str)] = &[
    ("start", "Log in and choose a mode"),
    ("fetch", "Pick a report date"),
    ("summary", "Team summary: /summary <date> <team>"),
    ("team", "Team summary from the loaded report"),
    ("agent", "Agent stats from the loaded report"),
    ("mode", "Switch between sheet and chat"),
    ("unlink", "Disconnect Google"),
    ("reset", "Restart the conversation"),
    ("logout", "Forget the portal login"),
    ("help", "List commands"),
];

/// The offset is global, stored under this pseudo chat.
const OFFSET_CHAT: ChatId = 0;

/// What to do with one Telegram update.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event { chat_id: ChatId, event: ChatEvent },
    /// Date picker page turn: redraw the keyboard in place.
    Navigate {
        chat_id: ChatId,
        message_id: i64,
        callback_id: String,
        month: NaiveDate,
    },
    /// Answer the callback and do nothing else.
    Acknowledge {
        callback_id: String,
        notice: Option<&'static str>,
    },
}

impl Inbound {
    fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::Event { chat_id, .. } | Self::Navigate { chat_id, .. } => Some(*chat_id),
            Self::Acknowledge { .. } => None,
        }
    }
}

/// Map an update onto the bridge. Updates with nothing to act on give `None`.
pub fn classify(update: &Update) -> Option<Inbound> {
    if let Some(msg) = &update.message {
        let text = msg.text.as_deref()?;
        let event = match parse_command(text) {
            Some((name, args)) => ChatEvent::Command { name, args },
            None => ChatEvent::Text(text.to_string()),
        };
        return Some(Inbound::Event {
            chat_id: msg.chat.id,
            event,
        });
    }

    let query = update.callback_query.as_ref()?;
    let callback_id = query.id.clone();
    let message = query.message.as_ref();
    let stale = Inbound::Acknowledge {
        callback_id: callback_id.clone(),
        notice: Some(STALE_BUTTON),
    };

    let Some(action) = query.data.as_deref().and_then(Action::parse) else {
        return Some(stale);
    };
    let Some(message) = message else {
        return Some(stale);
    };
    let chat_id = message.chat.id;

    Some(match action {
        Action::Noop => Inbound::Acknowledge {
            callback_id,
            notice: None,
        },
        Action::Month { year, month } => match NaiveDate::from_ymd_opt(year, month, 1) {
            Some(month) => Inbound::Navigate {
                chat_id,
                message_id: message.message_id,
                callback_id,
                month,
            },
            None => stale,
        },
        action => Inbound::Event {
            chat_id,
            event: ChatEvent::Callback {
                id: callback_id,
                action,
            },
        },
    })
}

/// Runs one chat's updates against the bridge.
struct UpdateWorker {
    bridge: Arc<Bridge>,
    bot: Arc<TelegramBot>,
    front: Arc<TelegramFront>,
}

#[async_trait]
impl ChatWorker<Inbound> for UpdateWorker {
    async fn run(&self, chat_id: ChatId, inbound: Inbound) {
        let outcome = match inbound {
            Inbound::Event { event, .. } => self.bridge.handle_event(chat_id, event).await,
            Inbound::Navigate {
                message_id,
                callback_id,
                month,
                ..
            } => {
                let markup = self.front.markup(&Menu::DatePicker { month });
                let edited = self.bot.edit_reply_markup(chat_id, message_id, &markup).await;
                let answered = self.bot.answer_callback_query(&callback_id, None).await;
                edited.and(answered)
            }
            Inbound::Acknowledge {
                callback_id,
                notice,
            } => self.bot.answer_callback_query(&callback_id, notice).await,
        };
        if let Err(e) = outcome {
            tracing::error!(chat_id, "[telegram] error handling update: {e}");
        }
    }
}

/// Long-polls Telegram and feeds updates to the bridge. Updates of one chat
/// are handled in poll order; chats run in parallel.
pub struct Poller {
    bot: Arc<TelegramBot>,
    store: Arc<dyn KvStore>,
    telegram: TelegramConfig,
    queues: ChatQueues<Inbound, UpdateWorker>,
}

impl Poller {
    pub fn new(
        bridge: Arc<Bridge>,
        bot: Arc<TelegramBot>,
        front: Arc<TelegramFront>,
        telegram: TelegramConfig,
    ) -> Self {
        let store = Arc::clone(&bridge.store);
        let worker = UpdateWorker {
            bridge,
            bot: Arc::clone(&bot),
            front,
        };
        Self {
            bot,
            store,
            telegram,
            queues: ChatQueues::new(Arc::new(worker)),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let me = self.bot.get_me().await?;
        tracing::info!(
            "[telegram] bot started as @{}",
            me.username.as_deref().unwrap_or("unknown")
        );

        if let Err(e) = self.bot.set_my_commands(COMMANDS).await {
            tracing::warn!("[telegram] failed to register commands: {e}");
        }

        let mut offset: i64 = load(self.store.as_ref(), kinds::TELEGRAM_OFFSET, OFFSET_CHAT)
            .await?
            .unwrap_or(0);

        loop {
            let updates = match self.bot.get_updates(offset, 30).await {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!("[telegram] error polling updates: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in &updates {
                if update.update_id >= offset {
                    offset = update.update_id + 1;
                }
                if let Some(inbound) = classify(update) {
                    self.dispatch(inbound);
                }
            }

            if !updates.is_empty() {
                if let Err(e) = save(self.store.as_ref(), kinds::TELEGRAM_OFFSET, OFFSET_CHAT, &offset).await {
                    tracing::warn!("[db] failed to store telegram offset: {e}");
                }
            }
        }
    }

    fn dispatch(&self, inbound: Inbound) {
        let Some(chat_id) = inbound.chat_id() else {
            // Bare callback answers touch no session.
            if let Inbound::Acknowledge { callback_id, notice } = inbound {
                let bot = Arc::clone(&self.bot);
                tokio::spawn(async move {
                    if let Err(e) = bot.answer_callback_query(&callback_id, notice).await {
                        tracing::warn!("[telegram] answer callback failed: {e}");
                    }
                });
            }
            return;
        };

        if !self.telegram.is_allowed(chat_id) {
            tracing::info!(chat_id, "[auth] DENIED");
            return;
        }
        self.queues.push(chat_id, inbound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_telegram::types::{CallbackQuery, Chat, TelegramMessage, User};

    fn message(text: &str) -> TelegramMessage {
        TelegramMessage {
            message_id: 10,
            from: None,
            chat: Chat { id: 42 },
            text: Some(text.to_string()),
        }
    }

    fn callback(data: &str) -> Update {
        Update {
            update_id: 1,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "cb".to_string(),
                from: User {
                    id: 7,
                    first_name: "Op".to_string(),
                    username: None,
                },
                message: Some(message("Choose a team:")),
                data: Some(data.to_string()),
            }),
        }
    }

    #[test]
    fn test_classify_messages() {
        let update = Update {
            update_id: 1,
            message: Some(message("/summary today Sales")),
            callback_query: None,
        };
        assert_eq!(
            classify(&update),
            Some(Inbound::Event {
                chat_id: 42,
                event: ChatEvent::Command {
                    name: "summary".into(),
                    args: "today Sales".into()
                },
            })
        );

        let update = Update {
            update_id: 2,
            message: Some(message("someone@example.com")),
            callback_query: None,
        };
        assert!(matches!(
            classify(&update),
            Some(Inbound::Event { event: ChatEvent::Text(_), .. })
        ));
    }

    #[test]
    fn test_classify_buttons() {
        assert_eq!(
            classify(&callback("team:3")),
            Some(Inbound::Event {
                chat_id: 42,
                event: ChatEvent::Callback {
                    id: "cb".into(),
                    action: Action::Team(3)
                },
            })
        );
        assert_eq!(
            classify(&callback("cal:2025-06")),
            Some(Inbound::Navigate {
                chat_id: 42,
                message_id: 10,
                callback_id: "cb".into(),
                month: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            })
        );
        assert_eq!(
            classify(&callback("noop")),
            Some(Inbound::Acknowledge {
                callback_id: "cb".into(),
                notice: None
            })
        );
    }

    #[test]
    fn test_unknown_button_is_stale() {
        assert_eq!(
            classify(&callback("confirm_delete:9")),
            Some(Inbound::Acknowledge {
                callback_id: "cb".into(),
                notice: Some(STALE_BUTTON)
            })
        );
    }
}
