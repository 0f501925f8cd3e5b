//! Effect executor for a single turn

use super::{transition, TurnContext, TurnEffect, TurnEvent, TurnOutcome, TurnState};
use crate::llm::{LanguageModel, ModelRequest, ToolCallRequest};
use crate::message::{latest_user_text, Message, ToolErrorKind, ToolOutcome};
use crate::moderation::{GateDecision, ModerationGate, Moderator};
use crate::stream::{
    AssembledMessage, MessageAssembler, StepEmitter, StreamClosed, StreamEvent, StreamWriter,
};
use crate::tools::{ToolConcurrency, ToolContext, ToolExecutor};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Summary of a finished turn
#[derive(Debug)]
pub struct TurnReport {
    pub turn_id: String,
    pub outcome: TurnOutcome,
    /// Model steps requested
    pub steps: u32,
    /// What the receiver saw, `None` if nothing was delivered
    pub message: Option<AssembledMessage>,
}

/// Drives one turn from submission to `Done`.
///
/// Every emitted event is also applied to a local [`MessageAssembler`], so
/// later model steps see the text, calls and results of earlier ones.
pub struct TurnRunner<M, L, T: ?Sized> {
    context: TurnContext,
    state: TurnState,
    gate: ModerationGate<M>,
    model: L,
    tools: Arc<T>,
    system_prompt: Option<String>,
    history: Vec<Message>,
    writer: StreamWriter,
    cancel: CancellationToken,
    emitter: StepEmitter,
    replica: MessageAssembler,
    steps: u32,
}

impl<M, L, T> TurnRunner<M, L, T>
where
    M: Moderator,
    L: LanguageModel,
    T: ToolExecutor + ?Sized + 'static,
{
    pub fn new(
        context: TurnContext,
        gate: ModerationGate<M>,
        model: L,
        tools: Arc<T>,
        writer: StreamWriter,
    ) -> Self {
        let cancel = writer.cancel_token().clone();
        Self {
            context,
            state: TurnState::Idle,
            gate,
            model,
            tools,
            system_prompt: None,
            history: Vec::new(),
            writer,
            cancel,
            emitter: StepEmitter::new(),
            replica: MessageAssembler::new(),
            steps: 0,
        }
    }

    /// Conversation so far, ending with the new user message
    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub async fn run(mut self) -> TurnReport {
        let has_user_text = !latest_user_text(&self.history).is_empty();
        let mut queue = VecDeque::from([TurnEvent::Submitted { has_user_text }]);

        while let Some(event) = queue.pop_front() {
            let result = match transition(&self.state, &self.context, event) {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(turn_id = %self.context.turn_id, state = self.state.name(), error = %e, "Turn transition rejected");
                    break;
                }
            };

            if self.state.name() != result.new_state.name() {
                tracing::debug!(
                    turn_id = %self.context.turn_id,
                    from = self.state.name(),
                    to = result.new_state.name(),
                    "Turn state changed"
                );
            }
            self.state = result.new_state;

            // Effects before the last only emit; an event from any of them
            // (a stop) preempts the rest.
            for effect in result.effects {
                if let Some(next) = self.execute(effect).await {
                    queue.push_back(next);
                    break;
                }
            }

            if self.state.is_terminal() {
                break;
            }
        }

        self.finish()
    }

    fn finish(mut self) -> TurnReport {
        let mut outcome = self.state.outcome().unwrap_or(TurnOutcome::Failed);
        if !self.replica.is_terminal() {
            // The closing event never reached the receiver
            if self.cancel.is_cancelled() {
                self.replica.cancel();
                outcome = TurnOutcome::Cancelled;
            } else {
                self.replica.fail("turn ended without a closing event");
            }
        }

        tracing::info!(
            turn_id = %self.context.turn_id,
            outcome = ?outcome,
            status = ?self.replica.status(),
            steps = self.steps,
            events = self.writer.sent(),
            "Turn finished"
        );

        TurnReport {
            turn_id: self.context.turn_id,
            outcome,
            steps: self.steps,
            message: self.replica.into_assembled(),
        }
    }

    async fn execute(&mut self, effect: TurnEffect) -> Option<TurnEvent> {
        match effect {
            TurnEffect::EmitStart => {
                let start = StreamEvent::Start {
                    message_id: self.context.message_id.clone(),
                };
                self.send(start).await.err().map(|_| TurnEvent::UserCancel)
            }

            TurnEffect::Moderate => {
                let decision = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Some(TurnEvent::UserCancel),
                    decision = self.gate.check(&self.history) => decision,
                };
                Some(match decision {
                    GateDecision::Skipped | GateDecision::Cleared => TurnEvent::ModerationCleared,
                    GateDecision::Denied { message } => TurnEvent::ModerationDenied { message },
                })
            }

            TurnEffect::EmitDenial { message } => {
                let events = self.emitter.complete_text(message);
                if self.send_all(events).await.is_err() {
                    return Some(TurnEvent::UserCancel);
                }
                Some(TurnEvent::DenialSent)
            }

            TurnEffect::RequestModelStep { step } => Some(self.model_step(step).await),

            TurnEffect::ExecuteTools { calls, concurrency } => {
                Some(self.run_tools(calls, concurrency).await)
            }

            TurnEffect::EmitFinish { reason } => {
                let finish = StreamEvent::Finish { reason };
                self.send(finish).await.err().map(|_| TurnEvent::UserCancel)
            }

            TurnEffect::EmitError { message } => {
                let error = StreamEvent::Error { message };
                self.send(error).await.err().map(|_| TurnEvent::UserCancel)
            }
        }
    }

    async fn model_step(&mut self, step: u32) -> TurnEvent {
        self.steps += 1;
        let request = ModelRequest {
            system: self.system_prompt.clone(),
            messages: self.model_history(),
            tools: self.tools.definitions(),
        };
        tracing::debug!(turn_id = %self.context.turn_id, step, messages = request.messages.len(), "Requesting model step");

        let started = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return TurnEvent::UserCancel,
            started = self.model.stream_step(&request) => started,
        };
        let mut chunks = match started {
            Ok(chunks) => chunks,
            Err(e) => return TurnEvent::StepFailed { message: e.message },
        };

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return TurnEvent::UserCancel,
                next = chunks.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    let events = self.emitter.push(chunk);
                    if self.send_all(events).await.is_err() {
                        return TurnEvent::UserCancel;
                    }
                }
                Some(Err(e)) => {
                    // Calls from a broken step are never dispatched
                    self.emitter.take_tool_calls();
                    return TurnEvent::StepFailed { message: e.message };
                }
                None => break,
            }
        }

        let events = self.emitter.close();
        if self.send_all(events).await.is_err() {
            return TurnEvent::UserCancel;
        }
        TurnEvent::StepCompleted {
            tool_calls: self.emitter.take_tool_calls(),
        }
    }

    async fn run_tools(
        &mut self,
        calls: Vec<ToolCallRequest>,
        concurrency: ToolConcurrency,
    ) -> TurnEvent {
        match concurrency {
            ToolConcurrency::Serial => {
                for call in calls {
                    let handle = self.spawn_tool(&call);
                    if self.report_tool(&call, handle).await.is_err() {
                        return TurnEvent::UserCancel;
                    }
                }
            }
            ToolConcurrency::Parallel => {
                let handles: Vec<_> = calls
                    .into_iter()
                    .map(|call| {
                        let handle = self.spawn_tool(&call);
                        (call, handle)
                    })
                    .collect();
                for (call, handle) in handles {
                    if self.report_tool(&call, handle).await.is_err() {
                        return TurnEvent::UserCancel;
                    }
                }
            }
        }
        TurnEvent::ToolsCompleted
    }

    /// Run a call in its own task; dropping the handle detaches it
    fn spawn_tool(&self, call: &ToolCallRequest) -> JoinHandle<ToolOutcome> {
        let tools = Arc::clone(&self.tools);
        let call = call.clone();
        let ctx = ToolContext {
            turn_id: self.context.turn_id.clone(),
            call_id: call.call_id.clone(),
        };
        tokio::spawn(async move { tools.execute(&call, ctx).await })
    }

    /// Wait for a call's outcome and emit it
    async fn report_tool(
        &mut self,
        call: &ToolCallRequest,
        handle: JoinHandle<ToolOutcome>,
    ) -> Result<(), StreamClosed> {
        let joined = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::info!(turn_id = %self.context.turn_id, call_id = %call.call_id, "Abandoning in-flight tool call");
                return Err(StreamClosed::Cancelled);
            }
            joined = handle => joined,
        };
        let outcome = joined.unwrap_or_else(|e| {
            ToolOutcome::error(ToolErrorKind::Execution, format!("tool task failed: {e}"))
        });

        let event = match outcome {
            ToolOutcome::Output { output } => StreamEvent::ToolOutputAvailable {
                call_id: call.call_id.clone(),
                output,
            },
            ToolOutcome::Error { error, kind } => StreamEvent::ToolOutputError {
                call_id: call.call_id.clone(),
                error,
                kind,
            },
        };
        self.send(event).await
    }

    /// Full history for the next model step, including this turn's progress
    fn model_history(&self) -> Vec<Message> {
        let mut messages = self.history.clone();
        if let Some(current) = self.replica.message().filter(|m| !m.parts.is_empty()) {
            messages.push(current.clone());
        }
        messages
    }

    async fn send(&mut self, event: StreamEvent) -> Result<(), StreamClosed> {
        self.writer.emit(event.clone()).await?;
        if let Err(e) = self.replica.apply(event) {
            tracing::error!(turn_id = %self.context.turn_id, error = %e, "Emitted event rejected by local replica");
        }
        Ok(())
    }

    async fn send_all(&mut self, events: Vec<StreamEvent>) -> Result<(), StreamClosed> {
        for event in events {
            self.send(event).await?;
        }
        Ok(())
    }
}
