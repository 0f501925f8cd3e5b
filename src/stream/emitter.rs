//! Folds model output chunks into scoped wire events

use super::StreamEvent;
use crate::llm::{ModelChunk, ToolCallRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Text,
    Reasoning,
}

impl ScopeKind {
    fn prefix(self) -> &'static str {
        match self {
            ScopeKind::Text => "text",
            ScopeKind::Reasoning => "reasoning",
        }
    }
}

/// Turns model chunks into `*-start`/`*-delta`/`*-end` triples.
///
/// At most one text or reasoning scope is open at a time; a chunk of a
/// different kind closes it first. Part ids are unique for the lifetime of
/// the emitter, so one emitter is used per turn.
#[derive(Debug, Default)]
pub struct StepEmitter {
    open: Option<(ScopeKind, String)>,
    next_id: usize,
    tool_calls: Vec<ToolCallRequest>,
}

impl StepEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: ModelChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        match chunk {
            ModelChunk::TextDelta(delta) => {
                if !delta.is_empty() {
                    let id = self.ensure_scope(ScopeKind::Text, &mut events);
                    events.push(StreamEvent::TextDelta { id, delta });
                }
            }
            ModelChunk::ReasoningDelta(delta) => {
                if !delta.is_empty() {
                    let id = self.ensure_scope(ScopeKind::Reasoning, &mut events);
                    events.push(StreamEvent::ReasoningDelta { id, delta });
                }
            }
            ModelChunk::ToolInputStart { call_id, tool_name } => {
                self.close_into(&mut events);
                events.push(StreamEvent::ToolInputStart { call_id, tool_name });
            }
            ModelChunk::ToolInputDelta { call_id, delta } => {
                self.close_into(&mut events);
                events.push(StreamEvent::ToolInputDelta { call_id, delta });
            }
            ModelChunk::ToolCall(request) => {
                self.close_into(&mut events);
                events.push(StreamEvent::ToolInputAvailable {
                    call_id: request.call_id.clone(),
                    tool_name: request.tool_name.clone(),
                    args: request.args.clone(),
                });
                self.tool_calls.push(request);
            }
        }
        events
    }

    /// Emit a whole text part in one go, even when `text` is empty
    pub fn complete_text(&mut self, text: impl Into<String>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.close_into(&mut events);
        let id = self.ensure_scope(ScopeKind::Text, &mut events);
        events.push(StreamEvent::TextDelta {
            id,
            delta: text.into(),
        });
        self.close_into(&mut events);
        events
    }

    /// Close whatever scope is open
    pub fn close(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.close_into(&mut events);
        events
    }

    /// Tool calls completed since the last call to this method
    pub fn take_tool_calls(&mut self) -> Vec<ToolCallRequest> {
        std::mem::take(&mut self.tool_calls)
    }

    fn ensure_scope(&mut self, kind: ScopeKind, events: &mut Vec<StreamEvent>) -> String {
        if let Some((open_kind, id)) = &self.open {
            if *open_kind == kind {
                return id.clone();
            }
        }
        self.close_into(events);

        self.next_id += 1;
        let id = format!("{}-{}", kind.prefix(), self.next_id);
        events.push(match kind {
            ScopeKind::Text => StreamEvent::TextStart { id: id.clone() },
            ScopeKind::Reasoning => StreamEvent::ReasoningStart { id: id.clone() },
        });
        self.open = Some((kind, id.clone()));
        id
    }

    fn close_into(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some((kind, id)) = self.open.take() {
            events.push(match kind {
                ScopeKind::Text => StreamEvent::TextEnd { id },
                ScopeKind::Reasoning => StreamEvent::ReasoningEnd { id },
            });
        }
    }
}
