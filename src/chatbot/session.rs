//! Telegram long-polling session: start, stop, status.
//!
//! The dispatcher runs updates of one chat sequentially and different chats
//! concurrently, so replies within a chat keep their order.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use teloxide::RequestError;
use teloxide::dispatching::{DefaultKey, ShutdownToken};
use teloxide::prelude::*;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chatbot::engine::ChatbotEngine;
use crate::chatbot::message::{ChatKind, IncomingMessage, NewMember, ReplyTo};

/// Why the session could not start. The process keeps running.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid bot token: {0}")]
    InvalidToken(String),
    #[error("failed to reach Telegram: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_running: bool,
    pub bot_username: Option<String>,
}

/// Lifecycle control used by the dashboard.
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn start(&self) -> Result<(), StartupError>;
    async fn stop(&self);
    async fn status(&self) -> SessionStatus;
}

struct Running {
    shutdown: ShutdownToken,
    handle: JoinHandle<()>,
}

pub struct BotSession {
    bot: Bot,
    token: String,
    engine: Arc<ChatbotEngine>,
    running: Mutex<Option<Running>>,
}

impl BotSession {
    pub fn new(bot: Bot, token: String, engine: Arc<ChatbotEngine>) -> Self {
        Self {
            bot,
            token,
            engine,
            running: Mutex::new(None),
        }
    }

    async fn try_start(&self, running: &mut Option<Running>) -> Result<(), StartupError> {
        validate_token(&self.token)?;

        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| StartupError::Connection(e.to_string()))?;
        info!("Bot user ID: {}, username: {:?}", me.user.id, me.user.username);
        self.engine.set_account(me.user.id.0 as i64, me.user.username.clone());

        let mut dispatcher = self.dispatcher();
        let shutdown = dispatcher.shutdown_token();
        let handle = tokio::spawn(async move {
            dispatcher.dispatch().await;
        });

        *running = Some(Running { shutdown, handle });
        Ok(())
    }

    fn dispatcher(&self) -> Dispatcher<Bot, RequestError, DefaultKey> {
        let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_update));

        Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.engine.clone()])
            .build()
    }
}

#[async_trait]
impl SessionControl for BotSession {
    async fn start(&self) -> Result<(), StartupError> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Session already running");
            return Ok(());
        }

        match self.try_start(&mut running).await {
            Ok(()) => {
                info!("🚀 Telegram session started");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start Telegram session: {e}");
                *running = None;
                Err(e)
            }
        }
    }

    /// The lock is held until the dispatcher has drained; a concurrent
    /// `start` waits for it.
    async fn stop(&self) {
        let mut guard = self.running.lock().await;
        let Some(running) = guard.take() else {
            return;
        };

        match running.shutdown.shutdown() {
            Ok(done) => done.await,
            Err(_) => {
                // Dispatcher never got going.
                running.handle.abort();
            }
        }
        if let Err(e) = running.handle.await
            && !e.is_cancelled()
        {
            warn!("Dispatcher task failed: {e}");
        }
        drop(guard);
        info!("🛑 Telegram session stopped");
    }

    async fn status(&self) -> SessionStatus {
        let running = self.running.lock().await;
        SessionStatus {
            is_running: running.as_ref().is_some_and(|r| !r.handle.is_finished()),
            bot_username: self.engine.identity().username.map(|u| format!("@{u}")),
        }
    }
}

/// Telegram tokens are formatted as `{bot_id}:{secret}` where bot_id is numeric.
pub fn validate_token(token: &str) -> Result<(), StartupError> {
    if token.is_empty() {
        return Err(StartupError::InvalidToken("telegram_bot_token is not set".into()));
    }
    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() != 2 || parts[0].parse::<u64>().is_err() || parts[1].is_empty() {
        return Err(StartupError::InvalidToken(
            "expected format: 123456789:ABCdefGHI...".into(),
        ));
    }
    Ok(())
}

async fn handle_update(msg: Message, engine: Arc<ChatbotEngine>) -> ResponseResult<()> {
    if let Some(users) = msg.new_chat_members() {
        let members: Vec<NewMember> = users
            .iter()
            .map(|u| NewMember {
                user_id: u.id.0 as i64,
                username: u.username.clone(),
            })
            .collect();
        let title = msg.chat.title().map(str::to_string);
        engine.handle_new_members(msg.chat.id.0, title, &members).await;
        return Ok(());
    }

    if let Some(incoming) = telegram_to_incoming(&msg) {
        engine.handle_message(incoming).await;
    }
    Ok(())
}

/// Private and group text messages only; channels and media are ignored.
fn telegram_to_incoming(msg: &Message) -> Option<IncomingMessage> {
    let chat = if msg.chat.is_private() {
        ChatKind::Private
    } else if msg.chat.is_group() || msg.chat.is_supergroup() {
        ChatKind::Group {
            title: msg.chat.title().map(str::to_string),
        }
    } else {
        return None;
    };

    let text = msg.text()?.to_string();

    let reply_to = msg.reply_to_message().map(|reply| {
        let user = reply.from.as_ref();
        ReplyTo {
            message_id: reply.id.0 as i64,
            user_id: user.map(|u| u.id.0 as i64),
            username: user.and_then(|u| u.username.clone()),
        }
    });

    Some(IncomingMessage {
        message_id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        chat,
        user_id: msg.from.as_ref().map(|u| u.id.0 as i64),
        text,
        reply_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::completion::{CohereClient, CompletionSettings};
    use crate::chatbot::decision::BotIdentity;
    use crate::chatbot::engine::ChatbotConfig;
    use crate::chatbot::store::MemoryStore;
    use crate::chatbot::telegram::TelegramClient;
    use std::time::Duration;

    fn session() -> BotSession {
        let bot = Bot::new("123456789:TEST");
        let engine = Arc::new(ChatbotEngine::new(
            ChatbotConfig::default(),
            BotIdentity::default(),
            Arc::new(MemoryStore::default()),
            Arc::new(CohereClient::new(None, CompletionSettings::default())),
            Arc::new(TelegramClient::new(bot.clone())),
        ));
        BotSession::new(bot, "123456789:TEST".to_string(), engine)
    }

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn test_stop_holds_lock_until_dispatcher_drained() {
        let session = Arc::new(session());
        // Blocking tasks ignore abort, so stop has to wait the full sleep.
        let handle = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(200)));
        *session.running.lock().await = Some(Running {
            shutdown: session.dispatcher().shutdown_token(),
            handle,
        });

        let stopping = tokio::spawn({
            let session = session.clone();
            async move { session.stop().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = session.status().await;
        assert!(stopping.is_finished());
        assert!(!status.is_running);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let session = session();
        session.stop().await;
        assert!(!session.status().await.is_running);
    }

    #[test]
    fn test_private_text_message() {
        let msg = message(serde_json::json!({
            "message_id": 11,
            "date": 1700000000,
            "chat": { "id": 7, "first_name": "Ann", "type": "private" },
            "from": { "id": 7, "is_bot": false, "first_name": "Ann", "username": "ann" },
            "text": "how are you?"
        }));
        let incoming = telegram_to_incoming(&msg).unwrap();
        assert_eq!(incoming.chat, ChatKind::Private);
        assert_eq!(incoming.message_id, 11);
        assert_eq!(incoming.chat_id, 7);
        assert_eq!(incoming.user_id, Some(7));
        assert_eq!(incoming.text, "how are you?");
        assert!(incoming.reply_to.is_none());
    }

    #[test]
    fn test_supergroup_reply_maps_to_group() {
        let chat = serde_json::json!({ "id": -1001555296434_i64, "title": "Rustaceans", "type": "supergroup" });
        let msg = message(serde_json::json!({
            "message_id": 5,
            "date": 1700000001,
            "chat": chat.clone(),
            "from": { "id": 9, "is_bot": false, "first_name": "Bo" },
            "text": "and then?",
            "reply_to_message": {
                "message_id": 4,
                "date": 1700000000,
                "chat": chat,
                "from": { "id": 42, "is_bot": true, "first_name": "ChatPal", "username": "pal_bot" },
                "text": "earlier reply"
            }
        }));

        let incoming = telegram_to_incoming(&msg).unwrap();
        assert_eq!(incoming.chat, ChatKind::Group { title: Some("Rustaceans".to_string()) });
        assert_eq!(
            incoming.reply_to,
            Some(ReplyTo { message_id: 4, user_id: Some(42), username: Some("pal_bot".to_string()) })
        );
    }

    #[test]
    fn test_channel_post_skipped() {
        let msg = message(serde_json::json!({
            "message_id": 3,
            "date": 1700000000,
            "chat": { "id": -1002236736395_i64, "title": "News", "type": "channel" },
            "text": "announcement"
        }));
        assert!(telegram_to_incoming(&msg).is_none());
    }

    #[test]
    fn test_message_without_text_skipped() {
        let msg = message(serde_json::json!({
            "message_id": 875400,
            "date": 0,
            "chat": { "id": 1234567890, "first_name": "FN", "type": "private" }
        }));
        assert!(telegram_to_incoming(&msg).is_none());
    }

    #[test]
    fn test_valid_token() {
        assert!(validate_token("123456789:ABCdefGHIjklMNOpqrsTUVwxyz").is_ok());
    }

    #[test]
    fn test_empty_token() {
        let err = validate_token("").unwrap_err();
        assert!(err.to_string().contains("not set"));
    }

    #[test]
    fn test_invalid_token_format_no_colon() {
        assert!(matches!(
            validate_token("invalid_token_no_colon"),
            Err(StartupError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_invalid_token_format_non_numeric_id() {
        assert!(validate_token("notanumber:ABCdef").is_err());
    }

    #[test]
    fn test_invalid_token_format_empty_secret() {
        assert!(validate_token("123456789:").is_err());
    }

    #[test]
    fn test_status_json() {
        let status = SessionStatus { is_running: true, bot_username: Some("@pal_bot".into()) };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isRunning"], true);
        assert_eq!(json["botUsername"], "@pal_bot");
    }
}
