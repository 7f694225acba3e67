use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use chatpal::chatbot::{
    BotIdentity, BotSession, ChatbotConfig, ChatbotEngine, CohereClient, MemoryStore, SessionControl,
    TelegramClient,
};
use chatpal::config::Config;
use chatpal::dashboard::{self, DashboardState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "chatpal.json".to_string());
    let config = Config::load(&config_path).with_context(|| format!("loading {config_path}"))?;

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("chatpal.log"))
        .context("Failed to open log file")?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting chatpal...");
    info!("Loaded config from {config_path}");

    let store = Arc::new(MemoryStore::new(config.defaults.clone()));

    let completion = CohereClient::new(config.cohere_api_key.clone(), config.completion.clone());
    if !completion.is_configured() {
        warn!("COHERE_API_KEY is not set; replies will fail until it is configured");
    }

    let identity = BotIdentity {
        user_id: None,
        username: config.bot_username.clone(),
        mention_patterns: config.mention_patterns.clone(),
    };
    let chatbot_config = ChatbotConfig {
        bot_name: config.bot_name.clone(),
        admin_ids: config.admin_ids.clone(),
        stickers: config.stickers.clone(),
        stickers_in_groups: config.stickers_in_groups,
        completion_timeout: config.completion_timeout,
        rng_seed: config.rng_seed,
    };

    // Outbound sends and the polling session share one Bot.
    let session_bot = teloxide::Bot::new(&config.telegram_bot_token);
    let telegram = Arc::new(TelegramClient::new(session_bot.clone()));
    let engine = Arc::new(ChatbotEngine::new(
        chatbot_config,
        identity,
        store.clone(),
        Arc::new(completion),
        telegram,
    ));

    let session = Arc::new(BotSession::new(
        session_bot,
        config.telegram_bot_token.clone(),
        engine,
    ));

    if config.autostart {
        // Failure is logged by the session and leaves it stopped.
        session.start().await.ok();
    } else {
        info!("Autostart disabled; start the bot from the dashboard");
    }

    let state = DashboardState {
        store,
        session: session.clone(),
    };
    let served = dashboard::serve(config.dashboard_addr, state, shutdown_signal()).await;

    session.stop().await;
    if let Err(ref e) = served {
        error!("{e:#}");
    }
    info!("👋 Shutdown complete");
    served
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal");
}
