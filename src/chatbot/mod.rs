//! Chatbot module - decides when to answer Telegram messages and relays them
//! to the completion API.

pub mod command;
pub mod completion;
pub mod decision;
pub mod engine;
pub mod message;
pub mod session;
pub mod store;
pub mod telegram;


pub use completion::{CohereClient, CompletionClient, CompletionSettings, GenerationError};
pub use decision::BotIdentity;
pub use engine::{ChatbotConfig, ChatbotEngine, Outcome};
pub use message::{ChatKind, IncomingMessage, NewMember, ReplyTo};
pub use session::{BotSession, SessionControl, StartupError};
pub use store::{MemoryStore, Store};
pub use telegram::{ChatSender, TelegramClient};
