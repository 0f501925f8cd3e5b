//! Content moderation gate
//!
//! Runs before any generation. The classifier is an external collaborator;
//! the gate only decides what its verdict means for the turn.

mod openai;

pub use openai::OpenAiModerator;

use crate::message::{latest_user_text, Message};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Classifier output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verdict {
    pub flagged: bool,
    /// Replacement reply for flagged input, if the classifier supplies one
    pub denial_message: Option<String>,
}

impl Verdict {
    pub fn clear() -> Self {
        Self::default()
    }

    pub fn flagged(denial_message: Option<String>) -> Self {
        Self {
            flagged: true,
            denial_message,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("moderation request failed: {0}")]
    Request(String),
    #[error("moderation backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed moderation response: {0}")]
    Malformed(String),
}

/// Text classifier
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError>;
}

#[async_trait]
impl<T: Moderator + ?Sized> Moderator for Arc<T> {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        (**self).classify(text).await
    }
}

/// Operator opt-out: every input clears
pub struct DisabledModerator;

#[async_trait]
impl Moderator for DisabledModerator {
    async fn classify(&self, _text: &str) -> Result<Verdict, ModerationError> {
        Ok(Verdict::clear())
    }
}

/// What the gate decided for a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// No user text to classify; the classifier was not called
    Skipped,
    Cleared,
    Denied { message: String },
}

/// Applies a [`Moderator`] to the latest user message, failing closed
pub struct ModerationGate<M> {
    moderator: M,
    fallback: String,
}

impl<M: Moderator> ModerationGate<M> {
    pub fn new(moderator: M, fallback: impl Into<String>) -> Self {
        Self {
            moderator,
            fallback: fallback.into(),
        }
    }

    pub async fn check(&self, messages: &[Message]) -> GateDecision {
        let text = latest_user_text(messages);
        if text.is_empty() {
            return GateDecision::Skipped;
        }
        self.check_text(&text).await
    }

    /// Classify non-empty text
    pub async fn check_text(&self, text: &str) -> GateDecision {
        match self.moderator.classify(text).await {
            Ok(verdict) if verdict.flagged => {
                tracing::info!(chars = text.len(), "Input flagged by moderation");
                GateDecision::Denied {
                    message: verdict
                        .denial_message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| self.fallback.clone()),
                }
            }
            Ok(_) => GateDecision::Cleared,
            Err(e) => {
                tracing::warn!(error = %e, "Moderation failed, denying input");
                GateDecision::Denied {
                    message: self.fallback.clone(),
                }
            }
        }
    }
}
