//! Wire events for a single turn

use crate::message::ToolErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why the producer ended a turn normally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The model ended its reply
    Stop,
    /// The step budget ran out; output is best-effort
    StepBudget,
    /// The moderation gate denied the turn
    Denied,
}

/// One event of the incremental message-part stream.
///
/// Text and reasoning parts arrive as scoped `*-start`, `*-delta`, `*-end`
/// triples keyed by part id. Tool calls and their results are correlated by
/// `callId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        message_id: String,
    },
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputStart {
        call_id: String,
        tool_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputDelta {
        call_id: String,
        delta: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        call_id: String,
        tool_name: String,
        args: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        call_id: String,
        output: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        call_id: String,
        error: String,
        kind: ToolErrorKind,
    },
    /// The producer hit an unrecoverable failure; no `finish` follows
    Error {
        message: String,
    },
    Finish {
        reason: FinishReason,
    },
}

impl StreamEvent {
    /// Wire name, also used as the SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::TextStart { .. } => "text-start",
            StreamEvent::TextDelta { .. } => "text-delta",
            StreamEvent::TextEnd { .. } => "text-end",
            StreamEvent::ReasoningStart { .. } => "reasoning-start",
            StreamEvent::ReasoningDelta { .. } => "reasoning-delta",
            StreamEvent::ReasoningEnd { .. } => "reasoning-end",
            StreamEvent::ToolInputStart { .. } => "tool-input-start",
            StreamEvent::ToolInputDelta { .. } => "tool-input-delta",
            StreamEvent::ToolInputAvailable { .. } => "tool-input-available",
            StreamEvent::ToolOutputAvailable { .. } => "tool-output-available",
            StreamEvent::ToolOutputError { .. } => "tool-output-error",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Finish { .. } => "finish",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let event = StreamEvent::TextDelta {
            id: "text-1".to_string(),
            delta: "Hel".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "text-delta", "id": "text-1", "delta": "Hel"})
        );

        let event = StreamEvent::ToolInputAvailable {
            call_id: "call_1".to_string(),
            tool_name: "web_search".to_string(),
            args: json!({"query": "weather"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool-input-available");
        assert_eq!(value["callId"], "call_1");
        assert_eq!(value["toolName"], "web_search");
    }

    #[test]
    fn test_name_matches_serde_tag() {
        let events = [
            StreamEvent::Start {
                message_id: "m".to_string(),
            },
            StreamEvent::ReasoningEnd {
                id: "r".to_string(),
            },
            StreamEvent::ToolOutputError {
                call_id: "c".to_string(),
                error: "boom".to_string(),
                kind: ToolErrorKind::Execution,
            },
            StreamEvent::Finish {
                reason: FinishReason::StepBudget,
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.name());
        }
    }

    #[test]
    fn test_finish_reason_parses() {
        let event: StreamEvent =
            serde_json::from_value(json!({"type": "finish", "reason": "denied"})).unwrap();
        assert_eq!(
            event,
            StreamEvent::Finish {
                reason: FinishReason::Denied
            }
        );
    }
}
