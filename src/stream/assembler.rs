//! Receiver half: materializes wire events into a message

use super::StreamEvent;
use crate::message::{
    Message, MessageStatus, Part, PartInvariantError, PartKey, Role, ToolCallState, ToolOutcome,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Protocol violations detected while applying events
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("event {event} arrived before start")]
    NotStarted { event: &'static str },
    #[error("turn already started")]
    AlreadyStarted,
    #[error("event {event} arrived after the turn ended")]
    AfterEnd { event: &'static str },
    #[error("part {id} was never started")]
    UnknownPart { id: String },
    #[error("part {id} is already closed")]
    PartClosed { id: String },
    #[error("part id {id} is already in use")]
    DuplicatePartId { id: String },
    #[error("event {event} does not match the kind of part {id}")]
    KindMismatch { id: String, event: &'static str },
    #[error("tool call {call_id} was never announced")]
    UnknownCall { call_id: String },
    #[error("tool call {call_id} has no complete input yet")]
    InputNotAvailable { call_id: String },
    #[error(transparent)]
    Invariant(#[from] PartInvariantError),
}

/// Whether an event changed the replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// The turn was cancelled locally; the event is discarded
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingStart,
    Streaming,
    Finished,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenKind {
    Text,
    Reasoning,
}

/// A finalized message plus the display timings of its reasoning parts
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledMessage {
    pub message: Message,
    pub reasoning_durations: Vec<(PartKey, u64)>,
}

/// Local replica of the in-progress assistant message.
///
/// Every mutation is keyed by part id or call id, so scopes of different
/// parts may interleave freely. Deltas for one id are appended in arrival
/// order.
#[derive(Debug)]
pub struct MessageAssembler {
    phase: Phase,
    /// `start` was applied; terminal phases alone do not imply it
    started: bool,
    message: Message,
    open: HashMap<String, (OpenKind, usize)>,
    used_ids: HashSet<String>,
    streaming_calls: HashMap<String, usize>,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingStart,
            started: false,
            message: Message::streaming(String::new(), Role::Assistant),
            open: HashMap::new(),
            used_ids: HashSet::new(),
            streaming_calls: HashMap::new(),
        }
    }

    pub fn apply(&mut self, event: StreamEvent) -> Result<Applied, StreamError> {
        self.apply_at(event, Utc::now())
    }

    /// Apply one event, stamping reasoning timings with `at`
    #[allow(clippy::too_many_lines)] // One arm per wire event
    pub fn apply_at(
        &mut self,
        event: StreamEvent,
        at: DateTime<Utc>,
    ) -> Result<Applied, StreamError> {
        match self.phase {
            Phase::Cancelled => return Ok(Applied::Ignored),
            Phase::Finished | Phase::Failed => {
                return Err(StreamError::AfterEnd {
                    event: event.name(),
                })
            }
            Phase::AwaitingStart => {
                return match event {
                    StreamEvent::Start { message_id } => {
                        self.message.id = message_id;
                        self.started = true;
                        self.phase = Phase::Streaming;
                        Ok(Applied::Applied)
                    }
                    other => Err(StreamError::NotStarted {
                        event: other.name(),
                    }),
                };
            }
            Phase::Streaming => {}
        }

        match event {
            StreamEvent::Start { .. } => return Err(StreamError::AlreadyStarted),

            StreamEvent::TextStart { id } => {
                self.open_part(id.clone(), OpenKind::Text, Part::text(id, String::new()))?;
            }
            StreamEvent::ReasoningStart { id } => {
                let part = Part::Reasoning {
                    id: id.clone(),
                    text: String::new(),
                    started_at: at,
                    finished_at: None,
                };
                self.open_part(id, OpenKind::Reasoning, part)?;
            }

            StreamEvent::TextDelta { id, delta } => {
                let index = self.open_index(&id, OpenKind::Text, "text-delta")?;
                if let Part::Text { text, .. } = &mut self.message.parts[index] {
                    text.push_str(&delta);
                }
            }
            StreamEvent::ReasoningDelta { id, delta } => {
                let index = self.open_index(&id, OpenKind::Reasoning, "reasoning-delta")?;
                if let Part::Reasoning { text, .. } = &mut self.message.parts[index] {
                    text.push_str(&delta);
                }
            }

            StreamEvent::TextEnd { id } => {
                self.open_index(&id, OpenKind::Text, "text-end")?;
                self.open.remove(&id);
            }
            StreamEvent::ReasoningEnd { id } => {
                let index = self.open_index(&id, OpenKind::Reasoning, "reasoning-end")?;
                self.open.remove(&id);
                if let Part::Reasoning { finished_at, .. } = &mut self.message.parts[index] {
                    *finished_at = Some(at);
                }
            }

            StreamEvent::ToolInputStart { call_id, tool_name } => {
                let index = self.message.parts.len();
                self.message.push_part(Part::ToolCall {
                    call_id: call_id.clone(),
                    tool_name,
                    args: serde_json::Value::Null,
                    state: ToolCallState::InputStreaming,
                })?;
                self.streaming_calls.insert(call_id, index);
            }
            StreamEvent::ToolInputDelta { call_id, .. } => {
                // Partial argument text is not kept; `tool-input-available`
                // carries the parsed arguments.
                if !self.streaming_calls.contains_key(&call_id) {
                    return Err(StreamError::UnknownCall { call_id });
                }
            }
            StreamEvent::ToolInputAvailable {
                call_id,
                tool_name,
                args,
            } => {
                if let Some(index) = self.streaming_calls.remove(&call_id) {
                    self.message.parts[index] = Part::ToolCall {
                        call_id,
                        tool_name,
                        args,
                        state: ToolCallState::InputAvailable,
                    };
                } else {
                    self.message.push_part(Part::ToolCall {
                        call_id,
                        tool_name,
                        args,
                        state: ToolCallState::InputAvailable,
                    })?;
                }
            }

            StreamEvent::ToolOutputAvailable { call_id, output } => {
                self.push_result(call_id, ToolOutcome::output(output))?;
            }
            StreamEvent::ToolOutputError {
                call_id,
                error,
                kind,
            } => {
                self.push_result(call_id, ToolOutcome::error(kind, error))?;
            }

            StreamEvent::Error { message } => {
                self.close_open_parts(at);
                self.drop_streaming_calls();
                self.message.status = MessageStatus::Incomplete;
                self.message.error = Some(message);
                self.phase = Phase::Failed;
            }
            StreamEvent::Finish { .. } => {
                self.close_open_parts(at);
                self.drop_streaming_calls();
                self.message.status = MessageStatus::Complete;
                self.phase = Phase::Finished;
            }
        }
        Ok(Applied::Applied)
    }

    /// Stop applying events: open parts are closed at their last fragment,
    /// tool calls whose input never completed are dropped.
    pub fn cancel(&mut self) {
        self.cancel_at(Utc::now());
    }

    pub fn cancel_at(&mut self, at: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.close_open_parts(at);
        self.drop_streaming_calls();
        self.message.status = MessageStatus::Cancelled;
        self.phase = Phase::Cancelled;
    }

    /// The transport broke before `finish`; the message is marked incomplete
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        let at = Utc::now();
        self.close_open_parts(at);
        self.drop_streaming_calls();
        self.message.status = MessageStatus::Incomplete;
        self.message.error = Some(reason.into());
        self.phase = Phase::Failed;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Finished, cancelled or failed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            Phase::Finished | Phase::Cancelled | Phase::Failed
        )
    }

    pub fn status(&self) -> MessageStatus {
        self.message.status
    }

    /// Current replica, `None` until `start` has been applied
    pub fn message(&self) -> Option<&Message> {
        self.is_started().then_some(&self.message)
    }

    /// Hand over the message once the turn has reached a terminal state
    pub fn into_assembled(self) -> Option<AssembledMessage> {
        if !self.is_terminal() || !self.is_started() {
            return None;
        }
        let message = self.message;
        let reasoning_durations = message
            .parts
            .iter()
            .enumerate()
            .filter_map(|(index, part)| {
                let millis = part.reasoning_duration()?.num_milliseconds();
                Some((
                    PartKey::new(message.id.clone(), index),
                    u64::try_from(millis).unwrap_or(0),
                ))
            })
            .collect();
        Some(AssembledMessage {
            message,
            reasoning_durations,
        })
    }

    fn open_part(&mut self, id: String, kind: OpenKind, part: Part) -> Result<(), StreamError> {
        if !self.used_ids.insert(id.clone()) {
            return Err(StreamError::DuplicatePartId { id });
        }
        let index = self.message.parts.len();
        self.message.push_part(part)?;
        self.open.insert(id, (kind, index));
        Ok(())
    }

    fn open_index(
        &self,
        id: &str,
        kind: OpenKind,
        event: &'static str,
    ) -> Result<usize, StreamError> {
        match self.open.get(id) {
            Some((open_kind, index)) if *open_kind == kind => Ok(*index),
            Some(_) => Err(StreamError::KindMismatch {
                id: id.to_string(),
                event,
            }),
            None if self.used_ids.contains(id) => Err(StreamError::PartClosed { id: id.to_string() }),
            None => Err(StreamError::UnknownPart { id: id.to_string() }),
        }
    }

    fn push_result(&mut self, call_id: String, outcome: ToolOutcome) -> Result<(), StreamError> {
        if self.streaming_calls.contains_key(&call_id) {
            return Err(StreamError::InputNotAvailable { call_id });
        }
        let tool_name = self
            .message
            .parts
            .iter()
            .find_map(|part| match part {
                Part::ToolCall {
                    call_id: id,
                    tool_name,
                    ..
                } if *id == call_id => Some(tool_name.clone()),
                _ => None,
            })
            .ok_or_else(|| StreamError::UnknownCall {
                call_id: call_id.clone(),
            })?;
        self.message.push_part(Part::ToolResult {
            call_id,
            tool_name,
            outcome,
        })?;
        Ok(())
    }

    fn close_open_parts(&mut self, at: DateTime<Utc>) {
        for (_, (kind, index)) in self.open.drain() {
            if kind == OpenKind::Reasoning {
                if let Part::Reasoning { finished_at, .. } = &mut self.message.parts[index] {
                    finished_at.get_or_insert(at);
                }
            }
        }
    }

    fn drop_streaming_calls(&mut self) {
        if self.streaming_calls.is_empty() {
            return;
        }
        let dropped: HashSet<usize> = self.streaming_calls.drain().map(|(_, i)| i).collect();
        let mut index = 0;
        self.message.parts.retain(|_| {
            let keep = !dropped.contains(&index);
            index += 1;
            keep
        });
    }
}
