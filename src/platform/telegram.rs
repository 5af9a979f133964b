use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{info, warn};

use super::{Adapter, BackendKind, InboundMessage, OutgoingMessage};
use crate::bot::BotCore;

/// Telegram caps a message at 4096 chars; leave some headroom.
const MAX_MESSAGE_LEN: usize = 4000;

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// In groups Telegram sends commands as `/help@SomeBot`; drop our own mention.
fn strip_bot_mention(text: &str, username: &str) -> String {
    let (head, rest) = match text.find(char::is_whitespace) {
        Some(pos) => text.split_at(pos),
        None => (text, ""),
    };
    match head.rsplit_once('@') {
        Some((command, mention)) if mention.eq_ignore_ascii_case(username) => {
            format!("{}{}", command, rest)
        }
        _ => text.to_string(),
    }
}

/// One Telegram bot session.
pub struct TelegramAdapter {
    bot: Bot,
    prefix: String,
}

impl TelegramAdapter {
    pub fn new(bot: Bot, prefix: String) -> Self {
        Self { bot, prefix }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            if let Err(e) = self.bot.send_message(chat_id, chunk).await {
                warn!("Telegram send to {} failed: {}", chat_id, e);
                return;
            }
        }
    }
}

#[async_trait]
impl Adapter for TelegramAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Telegram
    }

    fn command_prefix(&self) -> &str {
        &self.prefix
    }

    async fn post_message(&self, message: OutgoingMessage) {
        let chat_id = match message.channel.parse::<i64>() {
            Ok(id) => ChatId(id),
            Err(_) => {
                warn!("Invalid Telegram chat id: {}", message.channel);
                return;
            }
        };

        if !message.text.is_empty() {
            self.send_text(chat_id, &message.text).await;
        }

        // No attachments on Telegram: text block, then the image as a photo
        let Some(attachment) = message.attachment else {
            return;
        };
        let body = attachment.to_plain_text();
        if !body.is_empty() {
            self.send_text(chat_id, &body).await;
        }
        if let Some(image_url) = attachment.image_url {
            match image_url.parse() {
                Ok(url) => {
                    if let Err(e) = self.bot.send_photo(chat_id, InputFile::url(url)).await {
                        warn!("Telegram photo to {} failed: {}", chat_id, e);
                    }
                }
                Err(e) => warn!("Invalid image URL {}: {}", image_url, e),
            }
        }
    }
}

/// Connect with one bot token and dispatch updates until the connection ends.
pub async fn run(core: Arc<BotCore>, token: String, prefix: String) -> Result<()> {
    let bot = Bot::new(token);

    let me = bot
        .get_me()
        .await
        .context("Failed to authenticate Telegram bot")?;
    let username = me.username().to_string();
    info!("Starting Telegram platform as @{}...", username);

    let adapter = Arc::new(TelegramAdapter::new(bot.clone(), prefix));

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![core, adapter, username])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(
    msg: Message,
    core: Arc<BotCore>,
    adapter: Arc<TelegramAdapter>,
    username: String,
) -> ResponseResult<()> {
    let text = match msg.text() {
        Some(t) => strip_bot_mention(t, &username),
        None => return Ok(()),
    };

    let inbound = InboundMessage::new(msg.chat.id.0.to_string(), text);
    core.handle_inbound(adapter, inbound).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_message() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 5);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.len() <= 5));
    }

    #[test]
    fn test_strip_bot_mention() {
        assert_eq!(strip_bot_mention("/help@TorpedoBot", "torpedobot"), "/help");
        assert_eq!(
            strip_bot_mention("/wiki@TorpedoBot rust lang", "TorpedoBot"),
            "/wiki rust lang"
        );
        assert_eq!(strip_bot_mention("/help@OtherBot", "TorpedoBot"), "/help@OtherBot");
        assert_eq!(strip_bot_mention("/help", "TorpedoBot"), "/help");
        assert_eq!(
            strip_bot_mention("/wiki a@TorpedoBot", "TorpedoBot"),
            "/wiki a@TorpedoBot"
        );
    }
}
