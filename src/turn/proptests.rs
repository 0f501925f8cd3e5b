//! Property-based tests for the turn state machine
//!
//! Random event sequences are fed through `transition`; whatever the model
//! and the user do, the turn stays within its step budget and ends once.

use super::*;
use crate::llm::ToolCallRequest;
use crate::stream::FinishReason;
use crate::tools::{ToolConcurrency, ToolPolicy};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Generators
// ============================================================================

fn arb_tool_calls() -> impl Strategy<Value = Vec<ToolCallRequest>> {
    proptest::collection::vec("[a-z]{6}", 0..3).prop_map(|ids| {
        ids.into_iter()
            .map(|call_id| ToolCallRequest {
                call_id,
                tool_name: "web_search".to_string(),
                args: json!({}),
            })
            .collect()
    })
}

fn arb_event() -> impl Strategy<Value = TurnEvent> {
    prop_oneof![
        1 => any::<bool>().prop_map(|has_user_text| TurnEvent::Submitted { has_user_text }),
        2 => Just(TurnEvent::ModerationCleared),
        1 => "[a-z ]{1,10}".prop_map(|message| TurnEvent::ModerationDenied { message }),
        1 => Just(TurnEvent::DenialSent),
        4 => arb_tool_calls().prop_map(|tool_calls| TurnEvent::StepCompleted { tool_calls }),
        1 => "[a-z ]{1,10}".prop_map(|message| TurnEvent::StepFailed { message }),
        3 => Just(TurnEvent::ToolsCompleted),
        1 => Just(TurnEvent::UserCancel),
    ]
}

fn context(max_steps: u32) -> TurnContext {
    TurnContext {
        turn_id: "turn".to_string(),
        message_id: "msg".to_string(),
        policy: ToolPolicy {
            max_steps,
            concurrency: ToolConcurrency::Serial,
        },
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // No event sequence requests more model steps than the budget allows
    #[test]
    fn prop_model_steps_within_budget(
        max_steps in 1u32..6,
        events in proptest::collection::vec(arb_event(), 0..60)
    ) {
        let ctx = context(max_steps);
        let mut state = TurnState::Idle;
        let mut requested = 0;
        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                requested += result.effects.iter()
                    .filter(|e| matches!(e, TurnEffect::RequestModelStep { .. }))
                    .count();
                state = result.new_state;
            }
            if let TurnState::Generating { step } | TurnState::ToolCalls { step, .. } = &state {
                prop_assert!(*step <= max_steps);
            }
        }
        prop_assert!(requested <= max_steps as usize);
    }

    // A finished turn accepts nothing, and at most one finish is ever emitted
    #[test]
    fn prop_done_is_final(events in proptest::collection::vec(arb_event(), 0..60)) {
        let ctx = context(3);
        let mut state = TurnState::Idle;
        let mut finishes = Vec::new();
        for event in events {
            let was_done = state.is_terminal();
            match transition(&state, &ctx, event) {
                Ok(result) => {
                    prop_assert!(!was_done);
                    for effect in &result.effects {
                        if let TurnEffect::EmitFinish { reason } = effect {
                            prop_assert!(result.new_state.is_terminal());
                            finishes.push(*reason);
                        }
                    }
                    state = result.new_state;
                }
                Err(e) => {
                    if was_done {
                        prop_assert_eq!(e, TransitionError::TurnFinished);
                    }
                }
            }
        }
        prop_assert!(finishes.len() <= 1);
    }

    // Stop from any live state ends the turn without a finish event
    #[test]
    fn prop_cancel_always_wins(events in proptest::collection::vec(arb_event(), 0..30)) {
        let ctx = context(3);
        let mut state = TurnState::Idle;
        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                state = result.new_state;
            }
        }
        let result = transition(&state, &ctx, TurnEvent::UserCancel);
        if state.is_terminal() {
            prop_assert!(result.is_err());
        } else {
            let result = result.unwrap();
            prop_assert_eq!(result.new_state, TurnState::Done { outcome: TurnOutcome::Cancelled });
            let finishes = result.effects.iter().any(|e| matches!(e, TurnEffect::EmitFinish { .. }));
            prop_assert!(!finishes, "finish emitted after cancel");
        }
    }

    // Denied turns finish with reason denied and never reach a model step
    #[test]
    fn prop_denial_never_generates(message in "[a-z ]{1,20}") {
        let ctx = context(3);
        let mut effects = Vec::new();
        let mut state = TurnState::Idle;
        for event in [
            TurnEvent::Submitted { has_user_text: true },
            TurnEvent::ModerationDenied { message },
            TurnEvent::DenialSent,
        ] {
            let result = transition(&state, &ctx, event).unwrap();
            effects.extend(result.effects);
            state = result.new_state;
        }
        prop_assert_eq!(state, TurnState::Done { outcome: TurnOutcome::Denied });
        let generated = effects.iter().any(|e| matches!(e, TurnEffect::RequestModelStep { .. }));
        prop_assert!(!generated, "denied turn requested a model step");
        prop_assert_eq!(
            effects.last(),
            Some(&TurnEffect::EmitFinish { reason: FinishReason::Denied })
        );
    }
}
