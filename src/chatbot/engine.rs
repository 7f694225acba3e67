//! Chatbot engine - decides, generates and replies.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::chatbot::command::{self, Command, CommandError, SettingOption};
use crate::chatbot::completion::{CompletionClient, GenerationError};
use crate::chatbot::decision::{self, BotIdentity, Decision, SkipReason};
use crate::chatbot::message::{IncomingMessage, NewMember};
use crate::chatbot::store::{ActivityEntry, ActivityKind, BotSettings, SettingsPatch, Store};
use crate::chatbot::telegram::ChatSender;

/// Sent in private chats when a reply could not be generated.
pub const APOLOGY: &str = "I'm having trouble right now. Please try again in a moment! 🤖";

/// Default bound on a single completion call.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// Chatbot configuration.
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    /// Display name used in help and welcome texts.
    pub bot_name: String,
    /// Users allowed to run `/option_set`. Empty = everyone.
    pub admin_ids: Vec<i64>,
    /// Sticker file ids to pick from after a reply.
    pub stickers: Vec<String>,
    pub stickers_in_groups: bool,
    pub completion_timeout: Duration,
    /// Fixed seed for reproducible decisions.
    pub rng_seed: Option<u64>,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            bot_name: "ChatPal".to_string(),
            admin_ids: Vec::new(),
            stickers: Vec::new(),
            stickers_in_groups: false,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            rng_seed: None,
        }
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replied { message_id: i64 },
    Skipped(SkipReason),
    /// Completion failed; an apology may have been sent.
    GenerationFailed,
    /// Reply generated but Telegram refused it.
    SendFailed,
    Command,
}

/// The chatbot engine.
pub struct ChatbotEngine {
    config: ChatbotConfig,
    identity: RwLock<BotIdentity>,
    store: Arc<dyn Store>,
    completion: Arc<dyn CompletionClient>,
    telegram: Arc<dyn ChatSender>,
    rng: Mutex<StdRng>,
}

impl ChatbotEngine {
    pub fn new(
        config: ChatbotConfig,
        identity: BotIdentity,
        store: Arc<dyn Store>,
        completion: Arc<dyn CompletionClient>,
        telegram: Arc<dyn ChatSender>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            identity: RwLock::new(identity),
            store,
            completion,
            telegram,
            rng: Mutex::new(rng),
        }
    }

    pub fn identity(&self) -> BotIdentity {
        self.identity.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Record the bot's account as reported by Telegram.
    pub fn set_account(&self, user_id: i64, username: Option<String>) {
        let mut identity = self.identity.write().unwrap_or_else(PoisonError::into_inner);
        identity.user_id = Some(user_id);
        if username.is_some() {
            identity.username = username;
        }
    }

    /// Handle an incoming text message.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Outcome {
        info!("📨 chat {} msg {}: \"{}\"", msg.chat_id, msg.message_id, msg.preview());

        let username = self.identity().username;
        if let Some(parsed) = command::parse(&msg.text, username.as_deref()) {
            self.handle_command(&msg, parsed).await;
            return Outcome::Command;
        }

        self.store.increment_messages().await;
        let settings = self.store.settings().await;

        let decision = {
            let identity = self.identity.read().unwrap_or_else(PoisonError::into_inner);
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            decision::decide(&msg, &settings, &identity, &mut *rng)
        };

        let context = match decision {
            Decision::Respond { context } => context,
            Decision::Skip(reason) => {
                debug!("Not responding to msg {}: {:?}", msg.message_id, reason);
                return Outcome::Skipped(reason);
            }
        };

        let text = match self.generate(&msg.text, &context).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Generation failed for chat {}: {e}", msg.chat_id);
                if !msg.chat.is_group() {
                    self.telegram.send_message(msg.chat_id, APOLOGY, None).await.ok();
                }
                return Outcome::GenerationFailed;
            }
        };

        let message_id = match self
            .telegram
            .send_message(msg.chat_id, &text, Some(msg.message_id))
            .await
        {
            Ok(id) => id,
            Err(_) => {
                if !msg.chat.is_group() {
                    self.telegram.send_message(msg.chat_id, APOLOGY, None).await.ok();
                }
                return Outcome::SendFailed;
            }
        };

        info!("💬 Replied in chat {} ({})", msg.chat_id, context);
        self.store
            .append_activity(ActivityEntry::new(
                ActivityKind::Response,
                "AI response sent",
                Some(msg.chat.activity_source()),
            ))
            .await;
        self.store.record_response().await;

        self.maybe_send_sticker(&msg, &settings).await;

        Outcome::Replied { message_id }
    }

    /// Handle new members in a chat. Returns true if the bot itself was added.
    pub async fn handle_new_members(
        &self,
        chat_id: i64,
        chat_title: Option<String>,
        members: &[NewMember],
    ) -> bool {
        let bot_joined = {
            let identity = self.identity.read().unwrap_or_else(PoisonError::into_inner);
            members
                .iter()
                .any(|m| identity.is_me(Some(m.user_id), m.username.as_deref()))
        };
        if !bot_joined {
            return false;
        }

        info!("👋 Added to group {} ({:?})", chat_id, chat_title);
        self.telegram
            .send_message(chat_id, &self.welcome_text(), None)
            .await
            .ok();
        self.store.increment_groups().await;
        self.store
            .append_activity(ActivityEntry::new(
                ActivityKind::Group,
                "Added to new group",
                Some(chat_title.unwrap_or_else(|| "Unknown Group".to_string())),
            ))
            .await;
        true
    }

    async fn generate(&self, text: &str, context: &str) -> Result<String, GenerationError> {
        let limit = self.config.completion_timeout;
        match tokio::time::timeout(limit, self.completion.generate(text, Some(context))).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(limit)),
        }
    }

    async fn maybe_send_sticker(&self, msg: &IncomingMessage, settings: &BotSettings) {
        if self.config.stickers.is_empty() || (msg.chat.is_group() && !self.config.stickers_in_groups) {
            return;
        }

        let sticker = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            if rng.gen_range(0.0..1.0) < settings.sticker_probability {
                self.config.stickers.choose(&mut *rng).cloned()
            } else {
                None
            }
        };

        if let Some(file_id) = sticker {
            self.telegram.send_sticker(msg.chat_id, &file_id, None).await.ok();
        }
    }

    async fn handle_command(&self, msg: &IncomingMessage, parsed: Result<Command, CommandError>) {
        let reply = match parsed {
            Ok(Command::Help) => self.help_text(),
            Ok(Command::Stats) => self.stats_text().await,
            Ok(Command::SetOption { option, value }) => {
                match self.set_option(msg, option, value).await {
                    Ok(text) => text,
                    Err(e) => e.to_string(),
                }
            }
            Ok(Command::Unknown(name)) => {
                debug!("Ignoring unknown command /{name}");
                return;
            }
            Err(e) => {
                debug!("Rejected command in chat {}: {e}", msg.chat_id);
                e.to_string()
            }
        };

        self.telegram.send_message(msg.chat_id, &reply, None).await.ok();
    }

    async fn set_option(
        &self,
        msg: &IncomingMessage,
        option: SettingOption,
        value: f64,
    ) -> Result<String, CommandError> {
        let allowed = self.config.admin_ids.is_empty()
            || msg.user_id.is_some_and(|id| self.config.admin_ids.contains(&id));
        if !allowed {
            return Err(CommandError::NotAllowed);
        }

        let patch = match option {
            SettingOption::ReplyProbability => SettingsPatch {
                reply_probability: Some(value),
                ..Default::default()
            },
            SettingOption::StickerProbability => SettingsPatch {
                sticker_probability: Some(value),
                ..Default::default()
            },
        };
        self.store.update_settings(patch).await;
        self.store
            .append_activity(ActivityEntry::new(
                ActivityKind::Config,
                format!("{} updated to {}", option.name(), value),
                Some(format!("Chat {}", msg.chat_id)),
            ))
            .await;

        info!("⚙️ {} set to {} from chat {}", option.name(), value, msg.chat_id);
        Ok(format!("✅ {} set to {:.0}%", option.label(), value * 100.0))
    }

    fn help_text(&self) -> String {
        format!(
            "🤖 {} Commands\n\n\
             /help - Display this help message\n\
             /stats - Show bot statistics and usage data\n\
             /option_set reply_prob <0-1.0> - Adjust reply probability (admin only)\n\
             /option_set sticker_prob <0-1.0> - Control sticker frequency (admin only)",
            self.config.bot_name
        )
    }

    async fn stats_text(&self) -> String {
        let stats = self.store.stats().await;
        let settings = self.store.settings().await;
        format!(
            "📊 Bot Statistics\n\n\
             💬 Total Messages: {}\n\
             👥 Active Groups: {}\n\
             ⚡ Response Rate: {:.1}%\n\
             🎯 Reply Probability: {:.0}%\n\
             🎭 Sticker Probability: {:.0}%\n\n\
             🧠 AI Model: {}",
            stats.total_messages,
            stats.active_groups,
            stats.response_rate * 100.0,
            settings.reply_probability * 100.0,
            settings.sticker_probability * 100.0,
            self.completion.model(),
        )
    }

    fn welcome_text(&self) -> String {
        format!(
            "👋 Hello! I'm {}, an AI chatbot.\n\n\
             I can engage in conversations and respond to messages. Use /help to see available commands.\n\n\
             I'll participate respectfully in your group discussions. You can configure my behavior using the /option_set commands.",
            self.config.bot_name
        )
    }
}
