//! Common types for model interactions

use crate::message::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One generation step's input
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: Option<String>,
    /// Full history, ending with the in-progress assistant message if it has parts
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// Tool definition offered to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A complete tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub args: Value,
}

/// Incremental output of a generation step, in production order
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    TextDelta(String),
    ReasoningDelta(String),
    ToolInputStart { call_id: String, tool_name: String },
    ToolInputDelta { call_id: String, delta: String },
    ToolCall(ToolCallRequest),
}
