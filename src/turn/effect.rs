//! Effects produced by turn transitions

use crate::llm::ToolCallRequest;
use crate::stream::FinishReason;
use crate::tools::ToolConcurrency;

/// Work for the runner to perform after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEffect {
    /// Announce the assistant message
    EmitStart,

    /// Run the moderation gate on the latest user text
    Moderate,

    /// Emit the denial as one complete text part
    EmitDenial { message: String },

    /// Stream one model step with the full history
    RequestModelStep { step: u32 },

    /// Run tool calls and emit one result per call, in call order
    ExecuteTools {
        calls: Vec<ToolCallRequest>,
        concurrency: ToolConcurrency,
    },

    EmitFinish { reason: FinishReason },

    /// Report a producer-side failure; no `finish` follows
    EmitError { message: String },
}
