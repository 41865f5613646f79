use std::sync::Arc;

use async_trait::async_trait;
use callbridge_core::error::Result;
use callbridge_core::types::ChatId;
use callbridge_telegram::bot::TelegramBot;
use callbridge_telegram::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use super::calendar::month_grid;
use super::front::{ChatFront, Choice, Menu, Reply};
use crate::service::dates;

/// Telegram rendering of [`ChatFront`]: menus become inline keyboards.
pub struct TelegramFront {
    bot: Arc<TelegramBot>,
    utc_offset: i32,
}

impl TelegramFront {
    pub fn new(bot: Arc<TelegramBot>, utc_offset: i32) -> Self {
        Self { bot, utc_offset }
    }

    pub fn markup(&self, menu: &Menu) -> InlineKeyboardMarkup {
        match menu {
            Menu::Choices(rows) => to_markup(rows),
            Menu::DatePicker { month } => {
                to_markup(&month_grid(*month, dates::today(self.utc_offset)))
            }
        }
    }
}

pub fn to_markup(rows: &[Vec<Choice>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| InlineKeyboardButton::new(c.label.as_str(), c.action.encode()))
                    .collect()
            })
            .collect(),
    }
}

#[async_trait]
impl ChatFront for TelegramFront {
    async fn send(&self, chat_id: ChatId, reply: Reply) -> Result<()> {
        let markup = reply.menu.as_ref().map(|m| self.markup(m));
        self.bot
            .send_message(chat_id, &reply.text, reply.rich, markup.as_ref())
            .await
    }

    async fn answer_callback(&self, callback_id: &str, notice: Option<&str>) -> Result<()> {
        self.bot.answer_callback_query(callback_id, notice).await
    }
}
