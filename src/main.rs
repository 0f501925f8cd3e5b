//! Parley - moderated, tool-using conversational assistant
//!
//! Streams assistant turns over SSE. Each turn passes a moderation gate,
//! then alternates model steps and tool executions under a step budget.

mod api;
mod config;
mod llm;
mod message;
mod moderation;
mod session;
mod stream;
mod tools;
mod turn;

use api::{create_router, AppState, TurnSettings};
use config::{AppConfig, ModerationMode};
use llm::{LoggingModel, OpenAiChatModel};
use moderation::{DisabledModerator, Moderator, OpenAiModerator};
use session::{Session, SessionManager, SnapshotStore, SqliteStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tools::ToolRegistry;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const IN_MEMORY_DB: &str = ":memory:";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Session storage
    let store = if config.db_path == IN_MEMORY_DB {
        tracing::info!("Using in-memory session store");
        SqliteStore::open_in_memory()?
    } else {
        if let Some(parent) = PathBuf::from(&config.db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %config.db_path, "Opening session store");
        SqliteStore::open(&config.db_path)?
    };
    let store: Arc<dyn SnapshotStore> = Arc::new(store);
    let session = Arc::new(SessionManager::new(Session::load(store)));

    let moderator: Arc<dyn Moderator> = match (&config.moderation, &config.openai_api_key) {
        (ModerationMode::OpenAi, Some(key)) => {
            Arc::new(OpenAiModerator::new(key.clone(), &config.openai_base_url)?)
        }
        _ => {
            tracing::warn!("Moderation disabled; every input will be sent to the model");
            Arc::new(DisabledModerator)
        }
    };

    let model = Arc::new(LoggingModel::new(Arc::new(OpenAiChatModel::new(
        config.openai_api_key.clone(),
        &config.openai_base_url,
        config.model.clone(),
    )?)));
    if config.openai_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; model steps will fail");
    }

    let tools = Arc::new(ToolRegistry::from_config(&config.tools)?);
    tracing::info!(
        model = %config.model,
        tools = ?tools.names(),
        max_steps = config.policy.max_steps,
        concurrency = ?config.policy.concurrency,
        "Assistant initialized"
    );

    let state = AppState::new(
        moderator,
        model,
        tools,
        session,
        TurnSettings::from(&config),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
