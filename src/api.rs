//! HTTP API
//!
//! Turns are streamed to the client as server-sent events, one JSON-encoded
//! [`StreamEvent`](crate::stream::StreamEvent) per `data:` line.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::config::AppConfig;
use crate::llm::LanguageModel;
use crate::message::Message;
use crate::moderation::{ModerationGate, Moderator};
use crate::session::SessionManager;
use crate::stream::StreamWriter;
use crate::tools::{ToolExecutor, ToolPolicy};
use crate::turn::{TurnContext, TurnRunner};
use std::sync::Arc;

/// Per-turn settings fixed at startup
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub policy: ToolPolicy,
    pub system_prompt: Option<String>,
    pub denial_message: String,
}

impl From<&AppConfig> for TurnSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            policy: config.policy,
            system_prompt: config.system_prompt.clone(),
            denial_message: config.denial_message.clone(),
        }
    }
}

type Runner = TurnRunner<Arc<dyn Moderator>, Arc<dyn LanguageModel>, dyn ToolExecutor>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub moderator: Arc<dyn Moderator>,
    pub model: Arc<dyn LanguageModel>,
    pub tools: Arc<dyn ToolExecutor>,
    pub session: Arc<SessionManager>,
    pub settings: Arc<TurnSettings>,
}

impl AppState {
    pub fn new(
        moderator: Arc<dyn Moderator>,
        model: Arc<dyn LanguageModel>,
        tools: Arc<dyn ToolExecutor>,
        session: Arc<SessionManager>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            moderator,
            model,
            tools,
            session,
            settings: Arc::new(settings),
        }
    }

    fn turn_context(&self) -> TurnContext {
        TurnContext::new(self.settings.policy)
    }

    fn runner(&self, context: TurnContext, writer: StreamWriter, history: Vec<Message>) -> Runner {
        let gate = ModerationGate::new(
            Arc::clone(&self.moderator),
            self.settings.denial_message.clone(),
        );
        TurnRunner::new(
            context,
            gate,
            Arc::clone(&self.model),
            Arc::clone(&self.tools),
            writer,
        )
        .with_history(history)
        .with_system_prompt(self.settings.system_prompt.clone())
    }
}
