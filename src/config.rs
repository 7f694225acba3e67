use regex::Regex;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::chatbot::completion::{self, CompletionSettings};
use crate::chatbot::store::{BotSettings, clamp_probability};

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file '{}': {source}", .path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    #[error("invalid regex pattern '{pattern}': {source}")]
    InvalidRegex { pattern: String, source: regex::Error },
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    /// Cohere API key for reply generation
    #[serde(default)]
    cohere_api_key: String,
    /// Display name; also the default mention pattern.
    #[serde(default = "default_bot_name")]
    bot_name: String,
    /// Handle without @. Learned from Telegram on start if unset.
    bot_username: Option<String>,
    /// Regexes that count as mentioning the bot. Defaults to the bot name.
    #[serde(default)]
    mention_patterns: Vec<String>,
    /// Users allowed to change settings from chat (empty = everyone)
    #[serde(default)]
    admin_ids: Vec<i64>,
    #[serde(default = "default_dashboard_addr")]
    dashboard_addr: String,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
    /// Start the Telegram session at launch.
    #[serde(default = "default_true")]
    autostart: bool,
    #[serde(default)]
    completion: CompletionFile,
    #[serde(default)]
    defaults: DefaultsFile,
    /// Sticker file ids sent after replies.
    #[serde(default)]
    stickers: Vec<String>,
    #[serde(default)]
    stickers_in_groups: bool,
    rng_seed: Option<u64>,
}

#[derive(Deserialize)]
#[serde(default)]
struct CompletionFile {
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
    personality: Option<String>,
}

impl Default for CompletionFile {
    fn default() -> Self {
        Self {
            endpoint: completion::DEFAULT_ENDPOINT.to_string(),
            model: completion::DEFAULT_MODEL.to_string(),
            max_tokens: 200,
            temperature: 0.8,
            timeout_secs: 30,
            personality: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct DefaultsFile {
    reply_probability: f64,
    sticker_probability: f64,
    group_auto_respond: bool,
    mentions_only: bool,
}

impl Default for DefaultsFile {
    fn default() -> Self {
        let settings = BotSettings::default();
        Self {
            reply_probability: settings.reply_probability,
            sticker_probability: settings.sticker_probability,
            group_auto_respond: settings.group_auto_respond,
            mentions_only: settings.mentions_only,
        }
    }
}

fn default_bot_name() -> String {
    "ChatPal".to_string()
}

fn default_dashboard_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_true() -> bool {
    true
}

pub struct Config {
    /// May be empty or malformed; the session refuses to start in that case.
    pub telegram_bot_token: String,
    pub cohere_api_key: Option<String>,
    pub bot_name: String,
    pub bot_username: Option<String>,
    pub mention_patterns: Vec<Regex>,
    pub admin_ids: Vec<i64>,
    pub dashboard_addr: SocketAddr,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub autostart: bool,
    pub completion: CompletionSettings,
    pub completion_timeout: Duration,
    /// Initial live settings, probabilities clamped.
    pub defaults: BotSettings,
    pub stickers: Vec<String>,
    pub stickers_in_groups: bool,
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Load from a JSON file, then apply credential overrides from the environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        if file.bot_name.trim().is_empty() {
            return Err(ConfigError::Validation("bot_name must not be empty".into()));
        }
        let dashboard_addr: SocketAddr = file.dashboard_addr.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "dashboard_addr '{}' is not a valid socket address",
                file.dashboard_addr
            ))
        })?;
        if file.completion.timeout_secs == 0 {
            return Err(ConfigError::Validation("completion.timeout_secs must be positive".into()));
        }

        let mention_patterns = if file.mention_patterns.is_empty() {
            vec![name_pattern(&file.bot_name)?]
        } else {
            file.mention_patterns
                .into_iter()
                .map(|p| Regex::new(&p).map_err(|e| ConfigError::InvalidRegex { pattern: p, source: e }))
                .collect::<Result<Vec<_>, _>>()?
        };

        let defaults = BotSettings {
            reply_probability: clamp_probability(file.defaults.reply_probability),
            sticker_probability: clamp_probability(file.defaults.sticker_probability),
            group_auto_respond: file.defaults.group_auto_respond,
            mentions_only: file.defaults.mentions_only,
            ..BotSettings::default()
        };

        let completion = CompletionSettings {
            endpoint: file.completion.endpoint,
            model: file.completion.model,
            max_tokens: file.completion.max_tokens,
            temperature: file.completion.temperature,
            personality: file
                .completion
                .personality
                .unwrap_or_else(|| completion::DEFAULT_PERSONALITY.to_string()),
        };

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token.trim().to_string(),
            cohere_api_key: non_empty(file.cohere_api_key),
            bot_name: file.bot_name,
            bot_username: file
                .bot_username
                .map(|u| u.trim_start_matches('@').to_string()),
            mention_patterns,
            admin_ids: file.admin_ids,
            dashboard_addr,
            data_dir,
            autostart: file.autostart,
            completion,
            completion_timeout: Duration::from_secs(file.completion.timeout_secs),
            defaults,
            stickers: file.stickers,
            stickers_in_groups: file.stickers_in_groups,
            rng_seed: file.rng_seed,
        })
    }

    /// `TELEGRAM_BOT_TOKEN` (or `BOT_TOKEN`) and `COHERE_API_KEY` win over the file.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var("TELEGRAM_BOT_TOKEN")
            .or_else(|| var("BOT_TOKEN"))
            .and_then(non_empty)
        {
            self.telegram_bot_token = token.trim().to_string();
        }
        if let Some(key) = var("COHERE_API_KEY").and_then(non_empty) {
            self.cohere_api_key = Some(key);
        }
    }
}

/// Case-insensitive literal match on the bot's name.
fn name_pattern(name: &str) -> Result<Regex, ConfigError> {
    let pattern = format!("(?i){}", regex::escape(name.trim()));
    Regex::new(&pattern).map_err(|e| ConfigError::InvalidRegex { pattern, source: e })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}
