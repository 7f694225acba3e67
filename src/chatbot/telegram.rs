//! Outbound Telegram calls.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, MessageId, ReplyParameters};
use tracing::{info, warn};

/// Outbound side of the chat transport.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Send text, optionally threaded under `reply_to_message_id`. Returns the new message id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String>;

    async fn send_sticker(
        &self,
        chat_id: i64,
        file_id: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatSender for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);

        if let Some(msg_id) = reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_sticker(
        &self,
        chat_id: i64,
        file_id: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String> {
        info!("🎭 Sending sticker to chat {}", chat_id);

        let sticker = InputFile::file_id(FileId(file_id.to_string()));
        let mut request = self.bot.send_sticker(ChatId(chat_id), sticker);

        if let Some(msg_id) = reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send sticker: {e}");
            warn!("{}", msg);
            msg
        })
    }
}
