//! Whether to answer a non-command message.
//!
//! Private chats answer on any of three independent signals: the message is a
//! question, it carries a mention token, or a random draw falls under the reply
//! probability. Groups gate on `group_auto_respond`, then on mentions, then fall
//! back to the private rule at half the probability.
//!
//! Everything here is pure given the random source, so a seeded `StdRng` makes
//! decisions reproducible.

use rand::Rng;
use regex::Regex;

use crate::chatbot::message::{ChatKind, IncomingMessage};
use crate::chatbot::store::BotSettings;

/// Words that mark a message as a question when they open it.
const INTERROGATIVES: &[&str] = &["what", "how", "why", "when", "where"];

/// How the bot recognises itself in chat.
#[derive(Debug, Clone, Default)]
pub struct BotIdentity {
    pub user_id: Option<i64>,
    /// Handle without the leading `@`.
    pub username: Option<String>,
    /// Name patterns, e.g. the bot's display name.
    pub mention_patterns: Vec<Regex>,
}

impl BotIdentity {
    pub fn is_me(&self, user_id: Option<i64>, username: Option<&str>) -> bool {
        if let (Some(me), Some(id)) = (self.user_id, user_id)
            && me == id
        {
            return true;
        }
        match (&self.username, username) {
            (Some(me), Some(name)) => me.eq_ignore_ascii_case(name.trim_start_matches('@')),
            _ => false,
        }
    }

    fn matches_name(&self, text: &str) -> bool {
        self.mention_patterns.iter().any(|p| p.is_match(text))
    }

    /// `@handle` not followed by another handle character.
    fn matches_handle(&self, text: &str) -> bool {
        let Some(handle) = &self.username else {
            return false;
        };
        let needle = format!("@{}", handle.to_lowercase());
        let text = text.to_lowercase();
        text.match_indices(&needle).any(|(at, _)| {
            !text[at + needle.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Respond { context: String },
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    GroupAutoRespondOff,
    NotMentioned,
    Chance,
}

pub fn is_question(text: &str) -> bool {
    if text.contains('?') {
        return true;
    }
    let Some(first) = text.split_whitespace().next() else {
        return false;
    };
    let word = first
        .trim_end_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    INTERROGATIVES.contains(&word.as_str())
}

/// Any `@` or a match on one of the bot's name patterns.
pub fn has_mention_token(text: &str, identity: &BotIdentity) -> bool {
    text.contains('@') || identity.matches_name(text)
}

/// Group mention: a reply to the bot, its `@handle`, or its name.
pub fn is_mentioned(msg: &IncomingMessage, identity: &BotIdentity) -> bool {
    let replied_to_bot = msg
        .reply_to
        .as_ref()
        .is_some_and(|r| identity.is_me(r.user_id, r.username.as_deref()));

    replied_to_bot || identity.matches_handle(&msg.text) || identity.matches_name(&msg.text)
}

/// `is_question || has_mention_token || draw < probability`.
///
/// The draw is only taken when neither deterministic signal fires.
pub fn private_rule<R: Rng>(
    text: &str,
    probability: f64,
    identity: &BotIdentity,
    rng: &mut R,
) -> bool {
    is_question(text) || has_mention_token(text, identity) || rng.gen_range(0.0..1.0) < probability
}

pub fn decide<R: Rng>(
    msg: &IncomingMessage,
    settings: &BotSettings,
    identity: &BotIdentity,
    rng: &mut R,
) -> Decision {
    let respond = Decision::Respond { context: msg.chat.context() };

    match msg.chat {
        ChatKind::Private => {
            if private_rule(&msg.text, settings.reply_probability, identity, rng) {
                respond
            } else {
                Decision::Skip(SkipReason::Chance)
            }
        }
        ChatKind::Group { .. } => {
            if !settings.group_auto_respond {
                return Decision::Skip(SkipReason::GroupAutoRespondOff);
            }

            let mentioned = is_mentioned(msg, identity);
            if settings.mentions_only {
                return if mentioned {
                    respond
                } else {
                    Decision::Skip(SkipReason::NotMentioned)
                };
            }

            if mentioned || private_rule(&msg.text, settings.reply_probability * 0.5, identity, rng) {
                respond
            } else {
                Decision::Skip(SkipReason::Chance)
            }
        }
    }
}
