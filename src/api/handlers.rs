//! HTTP request handlers

use super::sse::turn_stream;
use super::types::{
    ChatRequest, ErrorResponse, HealthResponse, SessionResponse, StopResponse, SuccessResponse,
    TurnRequest,
};
use super::AppState;
use crate::message::{Conversation, Role};
use crate::session::ResetError;
use crate::stream::turn_channel;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Stateless turns
        .route("/api/chat", post(chat))
        // Server-held session
        .route("/api/session", get(get_session).delete(reset_session))
        .route("/api/session/turn", post(session_turn))
        .route("/api/session/stop", post(stop_turn))
        .route("/api/health", get(health))
        .with_state(state)
}

// ============================================================================
// Turns
// ============================================================================

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let conversation =
        Conversation::from_messages(req.messages).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if conversation.is_empty() {
        return Err(AppError::BadRequest("history is empty".to_string()));
    }
    if let Some(open) = conversation.first_unfinished() {
        return Err(AppError::BadRequest(format!(
            "message {} is still streaming",
            open.id
        )));
    }
    let history = conversation.messages().to_vec();
    if history.last().map(|m| m.role) != Some(Role::User) {
        return Err(AppError::BadRequest(
            "history must end with a user message".to_string(),
        ));
    }

    let context = state.turn_context();
    let turn_id = context.turn_id.clone();
    let cancel = CancellationToken::new();
    let (writer, rx) = turn_channel(cancel.clone());
    let runner = state.runner(context, writer, history);

    tracing::info!(turn_id = %turn_id, "Starting stateless turn");
    tokio::spawn(async move {
        runner.run().await;
    });

    Ok(turn_stream(ReceiverStream::new(rx), cancel).into_response())
}

async fn session_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Result<Response, AppError> {
    let context = state.turn_context();
    let guard = state
        .session
        .begin_turn(&context.turn_id)
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    let history = state
        .session
        .append_user(&req.text)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let cancel = guard.cancel_token().clone();
    let (writer, rx) = turn_channel(cancel.clone());
    tracing::info!(turn_id = %context.turn_id, "Starting session turn");
    let runner = state.runner(context, writer, history);
    let session = state.session.clone();

    tokio::spawn(async move {
        let report = runner.run().await;
        if let Some(assembled) = report.message {
            match session.commit(assembled).await {
                Ok(()) => tracing::debug!(
                    turn_id = %report.turn_id,
                    outcome = ?report.outcome,
                    steps = report.steps,
                    "Session turn committed"
                ),
                Err(e) => {
                    tracing::error!(turn_id = %report.turn_id, error = %e, "Failed to commit assistant message");
                }
            }
        }
        // The slot frees only once the reply is in the history
        drop(guard);
    });

    Ok(turn_stream(ReceiverStream::new(rx), cancel).into_response())
}

async fn stop_turn(State(state): State<AppState>) -> Json<StopResponse> {
    let turn_id = state.session.stop();
    if let Some(id) = &turn_id {
        tracing::info!(turn_id = %id, "Stop requested");
    }
    Json(StopResponse {
        stopped: turn_id.is_some(),
        turn_id,
    })
}

// ============================================================================
// Session
// ============================================================================

async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        snapshot: state.session.snapshot().await,
        active_turn: state.session.active_turn(),
    })
}

async fn reset_session(State(state): State<AppState>) -> Result<Json<SuccessResponse>, AppError> {
    state.session.reset().await.map_err(|e| match e {
        ResetError::Busy(e) => AppError::Conflict(e.to_string()),
        ResetError::Session(e) => AppError::Internal(e.to_string()),
    })?;
    tracing::info!("Session reset");
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================================
// Misc
// ============================================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.model.model_id().to_string(),
        tools: state.tools.definitions().into_iter().map(|d| d.name).collect(),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
