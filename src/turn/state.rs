//! Turn state types

use crate::llm::ToolCallRequest;
use crate::stream::FinishReason;
use crate::tools::ToolPolicy;
use serde::Serialize;

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnOutcome {
    Completed,
    Denied,
    StepBudget,
    Cancelled,
    Failed,
}

impl TurnOutcome {
    /// Reason carried by the closing `finish` event; cancelled and failed
    /// turns never send one
    pub fn finish_reason(self) -> Option<FinishReason> {
        match self {
            TurnOutcome::Completed => Some(FinishReason::Stop),
            TurnOutcome::Denied => Some(FinishReason::Denied),
            TurnOutcome::StepBudget => Some(FinishReason::StepBudget),
            TurnOutcome::Cancelled | TurnOutcome::Failed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    /// Submitted but not yet started
    Idle,

    /// Classifying the latest user text
    Moderating,

    /// Input was flagged; the denial reply is being emitted
    Denied,

    /// Streaming model step `step` (1-based)
    Generating { step: u32 },

    /// Running the tools requested by model step `step`
    ToolCalls {
        step: u32,
        pending: Vec<ToolCallRequest>,
    },

    Done { outcome: TurnOutcome },
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Moderating => "moderating",
            TurnState::Denied => "denied",
            TurnState::Generating { .. } => "generating",
            TurnState::ToolCalls { .. } => "tool_calls",
            TurnState::Done { .. } => "done",
        }
    }

    pub fn outcome(&self) -> Option<TurnOutcome> {
        match self {
            TurnState::Done { outcome } => Some(*outcome),
            _ => None,
        }
    }
}

/// Fixed parameters of one turn
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub turn_id: String,
    /// Id of the assistant message this turn produces
    pub message_id: String,
    pub policy: ToolPolicy,
}

impl TurnContext {
    pub fn new(policy: ToolPolicy) -> Self {
        let turn_id = uuid::Uuid::new_v4().to_string();
        Self {
            message_id: format!("msg-{turn_id}"),
            turn_id,
            policy,
        }
    }
}
