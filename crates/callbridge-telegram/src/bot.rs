use callbridge_core::error::{BridgeError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::types::*;

const MAX_MESSAGE_LENGTH: usize = 4096;

pub struct TelegramBot {
    client: Client,
    base_url: String,
}

impl TelegramBot {
    pub fn new(token: &str) -> Self {
        Self::with_api_url("https://api.telegram.org", token)
    }

    /// Point the bot at a different Bot API host (local bot server, tests).
    pub fn with_api_url(api_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        }
    }

    /// POST a Bot API method and unwrap the `{ok, result, description}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>> {
        let url = format!("{}/{method}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BridgeError::Telegram(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let telegram_response: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|e| BridgeError::Telegram(e.to_string()))?;

        if !telegram_response.ok {
            return Err(BridgeError::Telegram(
                telegram_response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(telegram_response.result)
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({}))
            .await?
            .ok_or_else(|| BridgeError::Telegram("missing result in response".to_string()))
    }

    pub async fn get_updates(&self, offset: i64, timeout: u32) -> Result<Vec<Update>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout,
            "allowed_updates": ["message", "callback_query"],
        });

        Ok(self.call("getUpdates", &body).await?.unwrap_or_default())
    }

    /// Send a message, split at Telegram's length limit. The keyboard rides on
    /// the last chunk. With `rich`, the text is treated as Markdown.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        rich: bool,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let chunks = split_message(text);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { keyboard } else { None };
            if rich {
                let html = markdown_to_html(chunk);
                match self.send_single(chat_id, &html, Some("HTML"), markup).await {
                    Ok(()) => continue,
                    // Rejected entities: fall back to plain text
                    Err(BridgeError::Http { status: 400, body }) => {
                        tracing::warn!(chat_id, "[telegram] html rejected, resending plain: {body}");
                    }
                    Err(e) => return Err(e),
                }
            }
            self.send_single(chat_id, chunk, None, markup).await?;
        }

        Ok(())
    }

    async fn send_single(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<&str>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = mode.into();
        }
        if let Some(markup) = keyboard {
            body["reply_markup"] = serde_json::to_value(markup)
                .map_err(|e| BridgeError::Telegram(e.to_string()))?;
        }

        self.call::<serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }

    /// Replace the inline keyboard of an existing message.
    pub async fn edit_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
        keyboard: &InlineKeyboardMarkup,
    ) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reply_markup": keyboard,
        });

        match self.call::<serde_json::Value>("editMessageReplyMarkup", &body).await {
            Err(BridgeError::Http { body, .. }) if body.contains("message is not modified") => {
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = serde_json::json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            body["text"] = text.into();
        }
        self.call::<serde_json::Value>("answerCallbackQuery", &body).await?;
        Ok(())
    }

    /// Register bot commands with Telegram so they appear in the command menu.
    pub async fn set_my_commands(&self, commands: &[(&str, &str)]) -> Result<()> {
        let cmds: Vec<serde_json::Value> = commands
            .iter()
            .map(|(cmd, desc)| serde_json::json!({ "command": cmd, "description": desc }))
            .collect();

        self.call::<serde_json::Value>("setMyCommands", &serde_json::json!({ "commands": cmds }))
            .await?;
        Ok(())
    }
}

/// Convert Markdown to the HTML subset Telegram accepts.
///
/// Telegram supports: <b>, <i>, <s>, <code>, <pre>, <a href="">.
/// Headers are rendered as bold text.
pub fn markdown_to_html(text: &str) -> String {
    use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

    let parser = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH);
    let mut html = String::with_capacity(text.len() + 64);

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { .. } | Tag::Strong => html.push_str("<b>"),
                Tag::Emphasis => html.push_str("<i>"),
                Tag::Strikethrough => html.push_str("<s>"),
                Tag::CodeBlock(_) => html.push_str("<pre>"),
                Tag::Link { dest_url, .. } => {
                    html.push_str(&format!("<a href=\"{}\">", html_escape(&dest_url)));
                }
                Tag::Item => html.push_str("• "),
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Heading(_) => html.push_str("</b>\n"),
                TagEnd::Strong => html.push_str("</b>"),
                TagEnd::Emphasis => html.push_str("</i>"),
                TagEnd::Strikethrough => html.push_str("</s>"),
                TagEnd::CodeBlock => html.push_str("</pre>"),
                TagEnd::Link => html.push_str("</a>"),
                TagEnd::Paragraph | TagEnd::Item => html.push('\n'),
                _ => {}
            },
            Event::Text(text) => html.push_str(&html_escape(&text)),
            Event::Code(code) => {
                html.push_str("<code>");
                html.push_str(&html_escape(&code));
                html.push_str("</code>");
            }
            Event::SoftBreak | Event::HardBreak => html.push('\n'),
            _ => {}
        }
    }

    html.trim().to_string()
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn split_message(text: &str) -> Vec<String> {
    if text.len() <= MAX_MESSAGE_LENGTH {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= MAX_MESSAGE_LENGTH {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = MAX_MESSAGE_LENGTH;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let split_pos = match remaining[..limit].rfind('\n') {
            Some(pos) => pos + 1,
            None => limit,
        };

        chunks.push(remaining[..split_pos].to_string());
        remaining = &remaining[split_pos..];
    }

    chunks
}
