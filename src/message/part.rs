//! Typed message parts

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a tool call's input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    /// Arguments are still arriving from the model
    InputStreaming,
    /// Arguments are complete and the call can be dispatched
    InputAvailable,
}

/// Why a tool invocation produced an error instead of output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolErrorKind {
    /// The arguments did not match the tool's declared input schema
    InvalidArguments,
    /// The tool ran and failed
    Execution,
    /// No tool with the requested name is registered
    UnknownTool,
}

/// Result payload of a tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ToolOutcome {
    Output { output: Value },
    Error { error: String, kind: ToolErrorKind },
}

impl ToolOutcome {
    pub fn output(output: Value) -> Self {
        ToolOutcome::Output { output }
    }

    pub fn error(kind: ToolErrorKind, error: impl Into<String>) -> Self {
        ToolOutcome::Error {
            error: error.into(),
            kind,
        }
    }
}

/// One typed segment of a message.
///
/// A tool call and its result are separate parts correlated by `call_id`;
/// the result is appended after the call and never folded into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        id: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Reasoning {
        id: String,
        text: String,
        started_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finished_at: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        call_id: String,
        tool_name: String,
        args: Value,
        state: ToolCallState,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        call_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },
}

impl Part {
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Part::Text {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Call id of a tool-call or tool-result part
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Part::ToolCall { call_id, .. } | Part::ToolResult { call_id, .. } => Some(call_id),
            Part::Text { .. } | Part::Reasoning { .. } => None,
        }
    }

    /// Elapsed deliberation time, once a reasoning part has finished
    pub fn reasoning_duration(&self) -> Option<Duration> {
        match self {
            Part::Reasoning {
                started_at,
                finished_at: Some(finished_at),
                ..
            } => Some(*finished_at - *started_at),
            _ => None,
        }
    }
}
