//! Events that drive a turn

use crate::llm::ToolCallRequest;

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// The user submitted the turn
    Submitted { has_user_text: bool },

    ModerationCleared,

    ModerationDenied { message: String },

    /// The denial reply has been emitted
    DenialSent,

    /// A model step streamed to completion
    StepCompleted { tool_calls: Vec<ToolCallRequest> },

    /// A model step could not start or broke mid-stream
    StepFailed { message: String },

    /// Every pending tool call has a result
    ToolsCompleted,

    /// Stop requested, or the receiver went away
    UserCancel,
}
