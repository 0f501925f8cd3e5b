//! Pure state transition function

use super::{TurnContext, TurnEffect, TurnEvent, TurnOutcome, TurnState};
use crate::stream::FinishReason;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<TurnEffect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: TurnEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A turn is already in progress (stop it first)")]
    Busy,
    #[error("Turn already finished")]
    TurnFinished,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

fn done(outcome: TurnOutcome) -> TransitionResult {
    let result = TransitionResult::new(TurnState::Done { outcome });
    match outcome.finish_reason() {
        Some(reason) => result.with_effect(TurnEffect::EmitFinish { reason }),
        None => result,
    }
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs; all I/O is
/// described by the returned effects.
pub fn transition(
    state: &TurnState,
    context: &TurnContext,
    event: TurnEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (TurnState::Done { .. }, _) => Err(TransitionError::TurnFinished),

        // Submission
        (TurnState::Idle, TurnEvent::Submitted { has_user_text: true }) => {
            Ok(TransitionResult::new(TurnState::Moderating)
                .with_effect(TurnEffect::EmitStart)
                .with_effect(TurnEffect::Moderate))
        }
        // Nothing to classify: the gate is a no-op
        (TurnState::Idle, TurnEvent::Submitted { has_user_text: false }) => {
            Ok(TransitionResult::new(TurnState::Generating { step: 1 })
                .with_effect(TurnEffect::EmitStart)
                .with_effect(TurnEffect::RequestModelStep { step: 1 }))
        }
        (_, TurnEvent::Submitted { .. }) => Err(TransitionError::Busy),

        // Moderation
        (TurnState::Moderating, TurnEvent::ModerationCleared) => {
            Ok(TransitionResult::new(TurnState::Generating { step: 1 })
                .with_effect(TurnEffect::RequestModelStep { step: 1 }))
        }
        (TurnState::Moderating, TurnEvent::ModerationDenied { message }) => {
            Ok(TransitionResult::new(TurnState::Denied)
                .with_effect(TurnEffect::EmitDenial { message }))
        }
        (TurnState::Denied, TurnEvent::DenialSent) => Ok(done(TurnOutcome::Denied)),

        // Generation
        (TurnState::Generating { step }, TurnEvent::StepCompleted { tool_calls }) => {
            if tool_calls.is_empty() {
                return Ok(done(TurnOutcome::Completed));
            }
            Ok(TransitionResult::new(TurnState::ToolCalls {
                step: *step,
                pending: tool_calls.clone(),
            })
            .with_effect(TurnEffect::ExecuteTools {
                calls: tool_calls,
                concurrency: context.policy.concurrency,
            }))
        }
        (TurnState::Generating { .. }, TurnEvent::StepFailed { message }) => {
            Ok(TransitionResult::new(TurnState::Done {
                outcome: TurnOutcome::Failed,
            })
            .with_effect(TurnEffect::EmitError { message }))
        }

        // Tool results are in; either take another step or stop at the budget
        (TurnState::ToolCalls { step, .. }, TurnEvent::ToolsCompleted) => {
            if *step >= context.policy.max_steps {
                return Ok(done(TurnOutcome::StepBudget));
            }
            let next = step + 1;
            Ok(TransitionResult::new(TurnState::Generating { step: next })
                .with_effect(TurnEffect::RequestModelStep { step: next }))
        }

        // Stop wins from every live state; in-flight work is abandoned
        (_, TurnEvent::UserCancel) => Ok(done(TurnOutcome::Cancelled)),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {}",
            state.name()
        ))),
    }
}
