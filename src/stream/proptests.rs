//! Property-based tests for the emit/assemble round trip
//!
//! Random model output is folded into wire events by the emitter and replayed
//! through the assembler.

use super::*;
use super::assembler::Applied;
use crate::llm::{ModelChunk, ToolCallRequest};
use crate::message::{MessageStatus, Part, ToolCallState};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;

// ============================================================================
// Generators
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Text(String),
    Reasoning(String),
    Tool,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => "[a-zA-Z ,.]{1,12}".prop_map(Step::Text),
        2 => "[a-z ]{1,12}".prop_map(Step::Reasoning),
        1 => Just(Step::Tool),
    ]
}

/// Build the full event sequence for a turn, with a result after every call
fn script(steps: &[Step]) -> Vec<StreamEvent> {
    let mut emitter = StepEmitter::new();
    let mut events = vec![StreamEvent::Start {
        message_id: "msg".to_string(),
    }];
    for (index, step) in steps.iter().enumerate() {
        let chunk = match step {
            Step::Text(text) => ModelChunk::TextDelta(text.clone()),
            Step::Reasoning(text) => ModelChunk::ReasoningDelta(text.clone()),
            Step::Tool => ModelChunk::ToolCall(ToolCallRequest {
                call_id: format!("call-{index}"),
                tool_name: "vector_search".to_string(),
                args: json!({"query": index}),
            }),
        };
        events.extend(emitter.push(chunk));
        for call in emitter.take_tool_calls() {
            events.push(StreamEvent::ToolOutputAvailable {
                call_id: call.call_id,
                output: json!({"passages": []}),
            });
        }
    }
    events.extend(emitter.close());
    events.push(StreamEvent::Finish {
        reason: FinishReason::Stop,
    });
    events
}

/// Identity of each part in the order its opening event was emitted
fn opened_order(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::TextStart { id } | StreamEvent::ReasoningStart { id } => {
                Some(id.clone())
            }
            StreamEvent::ToolInputAvailable { call_id, .. } => Some(format!("call:{call_id}")),
            StreamEvent::ToolOutputAvailable { call_id, .. } => Some(format!("result:{call_id}")),
            _ => None,
        })
        .collect()
}

fn part_identity(part: &Part) -> String {
    match part {
        Part::Text { id, .. } | Part::Reasoning { id, .. } => id.clone(),
        Part::ToolCall { call_id, .. } => format!("call:{call_id}"),
        Part::ToolResult { call_id, .. } => format!("result:{call_id}"),
    }
}

fn deltas_by_id(events: &[StreamEvent]) -> HashMap<String, String> {
    let mut deltas: HashMap<String, String> = HashMap::new();
    for event in events {
        if let StreamEvent::TextDelta { id, delta } | StreamEvent::ReasoningDelta { id, delta } =
            event
        {
            deltas.entry(id.clone()).or_default().push_str(delta);
        }
    }
    deltas
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Parts appear in emission order and hold the ordered concatenation of their deltas
    #[test]
    fn prop_replay_preserves_emission_order(steps in proptest::collection::vec(arb_step(), 0..30)) {
        let events = script(&steps);
        let mut assembler = MessageAssembler::new();
        for event in events.clone() {
            prop_assert_eq!(assembler.apply(event), Ok(Applied::Applied));
        }

        let message = assembler.message().unwrap().clone();
        prop_assert_eq!(message.status, MessageStatus::Complete);
        let order: Vec<String> = message.parts.iter().map(part_identity).collect();
        prop_assert_eq!(order, opened_order(&events));

        let deltas = deltas_by_id(&events);
        for part in &message.parts {
            if let Part::Text { id, text } | Part::Reasoning { id, text, .. } = part {
                prop_assert_eq!(Some(text), deltas.get(id));
            }
        }
    }

    // Every call has at most one result, and it comes strictly after the call
    #[test]
    fn prop_results_follow_calls(steps in proptest::collection::vec(arb_step(), 0..30)) {
        let mut assembler = MessageAssembler::new();
        for event in script(&steps) {
            assembler.apply(event).unwrap();
        }
        let message = assembler.message().unwrap();
        prop_assert!(message.validate().is_ok());

        for (index, part) in message.parts.iter().enumerate() {
            if let Part::ToolResult { call_id, .. } = part {
                let call_positions: Vec<usize> = message.parts.iter().enumerate()
                    .filter(|(_, p)| matches!(p, Part::ToolCall { call_id: c, .. } if c == call_id))
                    .map(|(i, _)| i)
                    .collect();
                prop_assert_eq!(call_positions.len(), 1);
                prop_assert!(call_positions[0] < index);
            }
        }
    }

    // Cancelling after N events leaves only closed parts and ignores the rest
    #[test]
    fn prop_cancel_is_forward_only(
        steps in proptest::collection::vec(arb_step(), 1..30),
        cut in any::<prop::sample::Index>()
    ) {
        let events = script(&steps);
        let n = cut.index(events.len());
        let (delivered, remaining) = events.split_at(n);

        let mut assembler = MessageAssembler::new();
        for event in delivered {
            assembler.apply(event.clone()).unwrap();
        }
        assembler.cancel();
        for event in remaining {
            prop_assert_eq!(assembler.apply(event.clone()), Ok(Applied::Ignored));
        }

        let assembled = assembler.into_assembled().unwrap();
        let message = assembled.message;
        prop_assert_eq!(message.status, MessageStatus::Cancelled);
        prop_assert_eq!(
            message.parts.iter().map(part_identity).collect::<Vec<_>>(),
            opened_order(delivered)
        );
        for part in &message.parts {
            match part {
                Part::Reasoning { finished_at, .. } => prop_assert!(finished_at.is_some()),
                Part::ToolCall { state, .. } => prop_assert_eq!(*state, ToolCallState::InputAvailable),
                _ => {}
            }
        }
    }
}
