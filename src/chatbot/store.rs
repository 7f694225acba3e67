//! Bot settings, counters and the recent-activity log.
//!
//! Everything lives behind the [`Store`] trait so a durable backend can be
//! swapped in without touching the engine. [`MemoryStore`] is the only
//! implementation today.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Maximum number of activity entries kept.
pub const MAX_ACTIVITY: usize = 50;

/// Default number of entries returned when listing activity.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 10;

/// Live bot behaviour settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSettings {
    pub reply_probability: f64,
    pub sticker_probability: f64,
    pub group_auto_respond: bool,
    pub mentions_only: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            reply_probability: 0.75,
            sticker_probability: 0.15,
            group_auto_respond: true,
            mentions_only: false,
            updated_at: Utc::now(),
        }
    }
}

impl BotSettings {
    /// Apply a partial update. Probabilities are clamped to [0, 1].
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(p) = patch.reply_probability {
            self.reply_probability = clamp_probability(p);
        }
        if let Some(p) = patch.sticker_probability {
            self.sticker_probability = clamp_probability(p);
        }
        if let Some(v) = patch.group_auto_respond {
            self.group_auto_respond = v;
        }
        if let Some(v) = patch.mentions_only {
            self.mentions_only = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial settings update, as sent by the dashboard or a chat command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub reply_probability: Option<f64>,
    #[serde(default)]
    pub sticker_probability: Option<f64>,
    #[serde(default)]
    pub group_auto_respond: Option<bool>,
    #[serde(default)]
    pub mentions_only: Option<bool>,
}

/// NaN collapses to 0.
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

/// Usage counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_messages: u64,
    pub active_groups: u64,
    pub response_rate: f64,
    pub last_update_time: DateTime<Utc>,
    /// Cumulative responses; only used to derive `response_rate`.
    #[serde(skip)]
    pub total_responses: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            total_messages: 0,
            active_groups: 0,
            response_rate: 0.0,
            last_update_time: Utc::now(),
            total_responses: 0,
        }
    }
}

impl Stats {
    fn record_response(&mut self) {
        self.total_responses += 1;
        // A zero denominator gives inf, which min caps at 1.
        self.response_rate = (self.total_responses as f64 / self.total_messages as f64).min(1.0);
        self.last_update_time = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Response,
    Message,
    Group,
    Config,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(kind: ActivityKind, description: impl Into<String>, source: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            description: description.into(),
            source,
            timestamp: Utc::now(),
        }
    }
}

/// Repository for settings, stats and activity.
#[async_trait]
pub trait Store: Send + Sync {
    async fn settings(&self) -> BotSettings;
    async fn update_settings(&self, patch: SettingsPatch) -> BotSettings;

    async fn stats(&self) -> Stats;
    async fn increment_messages(&self);
    async fn increment_groups(&self);
    /// Count one sent response and recompute the response rate.
    async fn record_response(&self);

    async fn append_activity(&self, entry: ActivityEntry) -> ActivityEntry;
    /// Newest first, at most `limit` (itself capped at [`MAX_ACTIVITY`]).
    async fn recent_activity(&self, limit: usize) -> Vec<ActivityEntry>;
}

struct Inner {
    settings: BotSettings,
    stats: Stats,
    /// Front is newest.
    activity: VecDeque<ActivityEntry>,
}

/// In-memory store. Nothing survives a restart.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(settings: BotSettings) -> Self {
        Self {
            inner: Mutex::new(Inner {
                settings,
                stats: Stats::default(),
                activity: VecDeque::with_capacity(MAX_ACTIVITY + 1),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(BotSettings::default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn settings(&self) -> BotSettings {
        self.inner.lock().await.settings.clone()
    }

    async fn update_settings(&self, patch: SettingsPatch) -> BotSettings {
        let mut inner = self.inner.lock().await;
        inner.settings.apply(&patch);
        inner.settings.clone()
    }

    async fn stats(&self) -> Stats {
        self.inner.lock().await.stats.clone()
    }

    async fn increment_messages(&self) {
        let mut inner = self.inner.lock().await;
        inner.stats.total_messages += 1;
        inner.stats.last_update_time = Utc::now();
    }

    async fn increment_groups(&self) {
        let mut inner = self.inner.lock().await;
        inner.stats.active_groups += 1;
        inner.stats.last_update_time = Utc::now();
    }

    async fn record_response(&self) {
        self.inner.lock().await.stats.record_response();
    }

    async fn append_activity(&self, entry: ActivityEntry) -> ActivityEntry {
        let mut inner = self.inner.lock().await;
        inner.activity.push_front(entry.clone());
        inner.activity.truncate(MAX_ACTIVITY);
        entry
    }

    async fn recent_activity(&self, limit: usize) -> Vec<ActivityEntry> {
        let inner = self.inner.lock().await;
        inner.activity.iter().take(limit.min(MAX_ACTIVITY)).cloned().collect()
    }
}
