//! Dashboard REST API.
//!
//! JSON read/write views over settings, stats and activity, plus start/stop
//! of the Telegram session. There is no UI here; a browser client consumes it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info};

use crate::chatbot::session::{SessionControl, SessionStatus};
use crate::chatbot::store::{
    ActivityEntry, ActivityKind, BotSettings, DEFAULT_ACTIVITY_LIMIT, MAX_ACTIVITY, SettingsPatch,
    Stats, Store,
};

/// Shared state for all routes.
#[derive(Clone)]
pub struct DashboardState {
    pub store: Arc<dyn Store>,
    pub session: Arc<dyn SessionControl>,
}

/// Error body: `{"message": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self { message: message.into() })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(flatten)]
    pub session: SessionStatus,
    pub stats: Stats,
    pub config: BotSettings,
}

/// Raw query; read the limit through [`ActivityQuery::limit`].
#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<String>,
}

impl ActivityQuery {
    /// Leading digits of `limit`; missing, zero, negative or non-numeric
    /// values give [`DEFAULT_ACTIVITY_LIMIT`].
    pub fn limit(&self) -> usize {
        let Some(raw) = self.limit.as_deref() else {
            return DEFAULT_ACTIVITY_LIMIT;
        };
        let raw = raw.trim();
        let digits = raw.strip_prefix('+').unwrap_or(raw);
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        match digits[..end].parse::<usize>() {
            Ok(n) if n > 0 => n,
            // Overflowing digit runs are still a request for "everything".
            Err(_) if end > 0 => MAX_ACTIVITY,
            _ => DEFAULT_ACTIVITY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandInfo {
    pub command: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub status: &'static str,
}

pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        command: "/help",
        description: "Display available commands and usage information",
        icon: "question",
        status: "active",
    },
    CommandInfo {
        command: "/stats",
        description: "Show bot statistics and usage data",
        icon: "chart-bar",
        status: "active",
    },
    CommandInfo {
        command: "/option_set",
        description: "Adjust reply_prob and sticker_prob settings",
        icon: "cog",
        status: "admin",
    },
];

pub fn router(state: DashboardState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::default())
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/api/bot/status", get(bot_status))
        .route("/api/bot/start", post(bot_start))
        .route("/api/bot/stop", post(bot_stop))
        .route("/api/config", get(get_config).patch(patch_config))
        .route("/api/stats", get(get_stats))
        .route("/api/activity", get(get_activity))
        .route("/api/commands", get(get_commands))
        .layer(trace_layer)
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: DashboardState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard to {addr}"))?;
    info!("📊 Dashboard listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Dashboard server failed")
}

pub async fn bot_status(State(state): State<DashboardState>) -> Json<StatusReport> {
    Json(StatusReport {
        session: state.session.status().await,
        stats: state.store.stats().await,
        config: state.store.settings().await,
    })
}

pub async fn bot_start(State(state): State<DashboardState>) -> Result<Json<MessageBody>, ApiError> {
    state.session.start().await.map_err(|e| {
        error!("Dashboard start failed: {e}");
        ApiError::Internal(format!("Failed to start bot: {e}"))
    })?;
    Ok(MessageBody::new("Bot started successfully"))
}

pub async fn bot_stop(State(state): State<DashboardState>) -> Json<MessageBody> {
    state.session.stop().await;
    MessageBody::new("Bot stopped successfully")
}

pub async fn get_config(State(state): State<DashboardState>) -> Json<BotSettings> {
    Json(state.store.settings().await)
}

pub async fn patch_config(
    State(state): State<DashboardState>,
    body: Result<Json<SettingsPatch>, JsonRejection>,
) -> Result<Json<BotSettings>, ApiError> {
    let Json(patch) = body.map_err(|e| {
        info!("Rejected config update: {e}");
        ApiError::BadRequest("Invalid configuration data".to_string())
    })?;

    let updated = state.store.update_settings(patch).await;
    state
        .store
        .append_activity(ActivityEntry::new(
            ActivityKind::Config,
            "Configuration updated via dashboard",
            Some("Web Dashboard".to_string()),
        ))
        .await;
    Ok(Json(updated))
}

pub async fn get_stats(State(state): State<DashboardState>) -> Json<Stats> {
    Json(state.store.stats().await)
}

pub async fn get_activity(
    State(state): State<DashboardState>,
    Query(query): Query<ActivityQuery>,
) -> Json<Vec<ActivityEntry>> {
    Json(state.store.recent_activity(query.limit()).await)
}

pub async fn get_commands() -> Json<&'static [CommandInfo]> {
    Json(COMMANDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::session::StartupError;
    use crate::chatbot::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Session stub that fails to start when `fail` is set.
    struct FakeSession {
        running: AtomicBool,
        fail: bool,
    }

    #[async_trait]
    impl SessionControl for FakeSession {
        async fn start(&self) -> Result<(), StartupError> {
            if self.fail {
                return Err(StartupError::InvalidToken("expected format".into()));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
        }

        async fn status(&self) -> SessionStatus {
            SessionStatus {
                is_running: self.running.load(Ordering::SeqCst),
                bot_username: Some("@pal_bot".to_string()),
            }
        }
    }

    fn state(fail: bool) -> DashboardState {
        DashboardState {
            store: Arc::new(MemoryStore::default()),
            session: Arc::new(FakeSession { running: AtomicBool::new(false), fail }),
        }
    }

    #[tokio::test]
    async fn test_patch_config_clamps_and_logs() {
        let state = state(false);
        let patch = SettingsPatch {
            reply_probability: Some(1.4),
            mentions_only: Some(true),
            ..Default::default()
        };
        let Json(updated) = patch_config(State(state.clone()), Ok(Json(patch))).await.unwrap();
        assert_eq!(updated.reply_probability, 1.0);
        assert!(updated.mentions_only);

        let activity = state.store.recent_activity(10).await;
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].kind, ActivityKind::Config);
        assert_eq!(activity[0].source.as_deref(), Some("Web Dashboard"));
    }

    #[tokio::test]
    async fn test_get_config_reflects_store() {
        let state = state(false);
        state
            .store
            .update_settings(SettingsPatch { sticker_probability: Some(0.5), ..Default::default() })
            .await;
        let Json(settings) = get_config(State(state)).await;
        assert_eq!(settings.sticker_probability, 0.5);
    }

    #[tokio::test]
    async fn test_activity_limit_default_and_cap() {
        let state = state(false);
        for i in 0..60 {
            state
                .store
                .append_activity(ActivityEntry::new(ActivityKind::Response, format!("r{i}"), None))
                .await;
        }

        let query = |limit: Option<&str>| Query(ActivityQuery { limit: limit.map(str::to_string) });

        let Json(default) = get_activity(State(state.clone()), query(None)).await;
        assert_eq!(default.len(), DEFAULT_ACTIVITY_LIMIT);
        assert_eq!(default[0].description, "r59");

        let Json(huge) = get_activity(State(state.clone()), query(Some("500"))).await;
        assert_eq!(huge.len(), MAX_ACTIVITY);

        let Json(zero) = get_activity(State(state), query(Some("0"))).await;
        assert_eq!(zero.len(), DEFAULT_ACTIVITY_LIMIT);
    }

    #[test]
    fn test_activity_limit_parsing() {
        let limit = |raw: &str| ActivityQuery { limit: Some(raw.to_string()) }.limit();
        assert_eq!(limit("5"), 5);
        assert_eq!(limit(" 7 "), 7);
        assert_eq!(limit("12abc"), 12);
        assert_eq!(limit("abc"), DEFAULT_ACTIVITY_LIMIT);
        assert_eq!(limit("-5"), DEFAULT_ACTIVITY_LIMIT);
        assert_eq!(limit(""), DEFAULT_ACTIVITY_LIMIT);
        assert_eq!(limit("99999999999999999999999"), MAX_ACTIVITY);
        assert_eq!(ActivityQuery::default().limit(), DEFAULT_ACTIVITY_LIMIT);
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_malformed_activity_limit_falls_back_over_http() {
        let state = state(false);
        for i in 0..15 {
            state
                .store
                .append_activity(ActivityEntry::new(ActivityKind::Message, format!("m{i}"), None))
                .await;
        }

        for uri in ["/api/activity?limit=abc", "/api/activity?limit=-5", "/api/activity"] {
            let (status, body) = get_json(router(state.clone()), uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body.as_array().unwrap().len(), DEFAULT_ACTIVITY_LIMIT, "{uri}");
        }

        let (_, body) = get_json(router(state), "/api/activity?limit=3").await;
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[0]["description"], "m14");
    }

    #[tokio::test]
    async fn test_start_stop_and_status() {
        let state = state(false);
        bot_start(State(state.clone())).await.unwrap();
        let Json(report) = bot_status(State(state.clone())).await;
        assert!(report.session.is_running);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["isRunning"], true);
        assert_eq!(json["botUsername"], "@pal_bot");
        assert!(json["stats"].get("totalMessages").is_some());
        assert!(json["config"].get("replyProbability").is_some());

        bot_stop(State(state.clone())).await;
        let Json(report) = bot_status(State(state)).await;
        assert!(!report.session.is_running);
    }

    #[tokio::test]
    async fn test_start_failure_is_500() {
        let state = state(true);
        let err = bot_start(State(state)).await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bad_request_status() {
        let response = ApiError::BadRequest("Invalid configuration data".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_commands_list() {
        let Json(commands) = get_commands().await;
        let names: Vec<_> = commands.iter().map(|c| c.command).collect();
        assert_eq!(names, vec!["/help", "/stats", "/option_set"]);
    }

    #[test]
    fn test_router_builds() {
        let _ = router(state(false));
    }
}
